//! use makecsr::error::MakeCsrError;

use std::path::PathBuf;

use thiserror::Error;

/// Represents errors that can occur while generating a certificate signing request.
///
/// Every variant belongs to one [`ErrorKind`], which decides the process exit code.
#[derive(Debug, Error)]
pub enum MakeCsrError {
    /// The subject has no common name, or it is blank.
    #[error("Missing common name")]
    MissingCommonName,

    /// A supplied subject field is empty after trimming.
    #[error("Field '{0}' must not be empty")]
    EmptyField(String),

    /// A field value failed validation.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// A subject alternative name entry is malformed.
    #[error("Invalid subject alternative name entry: {0}")]
    InvalidSanEntry(String),

    /// The configuration file could not be parsed or holds bad values.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The requested key algorithm, size or curve is not permitted.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The operating system random source could not be read.
    #[error("Entropy unavailable: {0}")]
    EntropyUnavailable(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// The private key could not produce a signature.
    #[error("Signing failure: {0}")]
    SigningFailure(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// An output artifact could not be written.
    #[error("Failed to write {}: {source}", .path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An input file could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Broad failure class, one per exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing user input.
    Validation,
    /// Key generation, key loading or signing failed.
    Crypto,
    /// Filesystem or stream failure.
    Io,
}

impl MakeCsrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MakeCsrError::MissingCommonName
            | MakeCsrError::EmptyField(_)
            | MakeCsrError::InvalidField { .. }
            | MakeCsrError::InvalidSanEntry(_)
            | MakeCsrError::ConfigError(_) => ErrorKind::Validation,
            MakeCsrError::UnsupportedAlgorithm(_)
            | MakeCsrError::EntropyUnavailable(_)
            | MakeCsrError::KeyGenerationError(_)
            | MakeCsrError::SigningFailure(_)
            | MakeCsrError::EncodingError(_)
            | MakeCsrError::DecodingError(_) => ErrorKind::Crypto,
            MakeCsrError::WriteFailure { .. } | MakeCsrError::ReadFailure { .. } => ErrorKind::Io,
        }
    }

    /// Process exit code for this error: 1 validation, 2 crypto, 3 I/O.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Validation => 1,
            ErrorKind::Crypto => 2,
            ErrorKind::Io => 3,
        }
    }

    pub(crate) fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        MakeCsrError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<der::Error> for MakeCsrError {
    /// Converts a `der::Error` into a `MakeCsrError`.
    fn from(err: der::Error) -> Self {
        MakeCsrError::EncodingError(err.to_string())
    }
}

impl From<rsa::Error> for MakeCsrError {
    fn from(err: rsa::Error) -> Self {
        MakeCsrError::KeyGenerationError(err.to_string())
    }
}

impl From<pkcs8::Error> for MakeCsrError {
    fn from(err: pkcs8::Error) -> Self {
        MakeCsrError::EncodingError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for MakeCsrError {
    fn from(err: pkcs8::spki::Error) -> Self {
        MakeCsrError::EncodingError(err.to_string())
    }
}

/// A specialized Result type for CSR generation.
pub type Result<T> = std::result::Result<T, MakeCsrError>;
