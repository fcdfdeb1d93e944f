//! One CSR run, from key material to written artifacts.
//!
//! ```text
//! Start -> KeyGenerated -> SubjectBuilt -> Assembled -> Written -> Done
//! ```
//!
//! Any error moves the run to [`Stage::Failed`], which is terminal.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use bon::Builder;
use tracing::{debug, info};

use crate::csr::CertificateRequest;
use crate::csr::extensions::build_extensions;
use crate::csr::params::{Subject, SubjectFields};
use crate::error::{MakeCsrError, Result};
use crate::key::{KeyAlgorithm, KeyPair};
use crate::output::{self, Destination, OutputBundle, OutputFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    KeyGenerated,
    SubjectBuilt,
    Assembled,
    Written,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::KeyGenerated => "key-generated",
            Stage::SubjectBuilt => "subject-built",
            Stage::Assembled => "assembled",
            Stage::Written => "written",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything one run needs, already merged from flags and config.
///
/// # Fields
/// * `subject` - Raw subject values; validated when the run builds the subject.
/// * `algorithm` - Algorithm for a new key. Ignored when `in_key` is set.
/// * `in_key` - Existing PKCS#8 key (PEM or DER) to sign with.
/// * `san` - `type:value` subject alternative name entries.
/// * `key_usage` - Key usage flag names.
/// * `ext_key_usage` - Extended key usage names.
/// * `format` - Encoding of both artifacts.
#[derive(Clone, Debug, Builder)]
pub struct CsrRequest {
    pub subject: SubjectFields,
    #[builder(default)]
    pub algorithm: KeyAlgorithm,
    pub in_key: Option<PathBuf>,
    #[builder(default)]
    pub san: Vec<String>,
    #[builder(default)]
    pub key_usage: Vec<String>,
    #[builder(default)]
    pub ext_key_usage: Vec<String>,
    #[builder(default)]
    pub format: OutputFormat,
}

/// Result of the in-memory part of a run.
#[derive(Debug)]
pub struct Generated {
    pub subject: Subject,
    pub csr: CertificateRequest,
    pub bundle: OutputBundle,
}

impl Generated {
    pub fn common_name(&self) -> &str {
        self.subject.common_name()
    }
}

/// Tracks the stage of a single run.
#[derive(Debug)]
pub struct Pipeline {
    stage: Stage,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            stage: Stage::Start,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Obtain the key, build subject and extensions, then sign and encode.
    ///
    /// The request is verified against its own public key before it is
    /// returned.
    pub fn generate(&mut self, request: &CsrRequest) -> Result<Generated> {
        self.require_stage(Stage::Start)?;

        let key_pair = obtain_key(request);
        let key_pair = self.advance(Stage::KeyGenerated, key_pair)?;

        let built = Subject::build(&request.subject).and_then(|subject| {
            let extensions = build_extensions(
                request.san.as_slice(),
                request.key_usage.as_slice(),
                request.ext_key_usage.as_slice(),
            )?;
            Ok((subject, extensions))
        });
        let (subject, extensions) = self.advance(Stage::SubjectBuilt, built)?;
        debug!(%subject, extensions = extensions.len(), "subject built");

        let assembled = CertificateRequest::assemble(&subject, &key_pair, &extensions)
            .and_then(|csr| {
                csr.verify()?;
                let bundle = OutputBundle::encode(&key_pair, &csr, request.format)?;
                Ok((csr, bundle))
            });
        let (csr, bundle) = self.advance(Stage::Assembled, assembled)?;

        Ok(Generated {
            subject,
            csr,
            bundle,
        })
    }

    /// Write the artifacts and finish the run.
    pub fn write(
        &mut self,
        generated: &Generated,
        key_dest: &Destination,
        csr_dest: &Destination,
    ) -> Result<()> {
        self.require_stage(Stage::Assembled)?;
        let written = output::write(&generated.bundle, key_dest, csr_dest);
        self.advance(Stage::Written, written)?;
        self.stage = Stage::Done;
        info!(stage = %self.stage, common_name = generated.common_name(), "request complete");
        Ok(())
    }

    fn require_stage(&self, stage: Stage) -> Result<()> {
        if self.stage == stage {
            Ok(())
        } else {
            Err(MakeCsrError::invalid_field(
                "pipeline",
                format!("expected stage {stage}, found {}", self.stage),
            ))
        }
    }

    fn advance<T>(&mut self, next: Stage, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                info!(from = %self.stage, stage = %next, "stage complete");
                self.stage = next;
                Ok(value)
            }
            Err(err) => {
                info!(from = %self.stage, target_stage = %next, error = %err, "stage failed");
                self.stage = Stage::Failed;
                Err(err)
            }
        }
    }
}

/// Run [`Pipeline::generate`] and [`Pipeline::write`] in one go.
pub fn run(request: &CsrRequest, key_dest: &Destination, csr_dest: &Destination) -> Result<Generated> {
    let mut pipeline = Pipeline::new();
    let generated = pipeline.generate(request)?;
    pipeline.write(&generated, key_dest, csr_dest)?;
    Ok(generated)
}

fn obtain_key(request: &CsrRequest) -> Result<KeyPair> {
    let Some(path) = &request.in_key else {
        debug!(algorithm = %request.algorithm, "generating key");
        return KeyPair::generate(request.algorithm);
    };

    debug!(path = %path.display(), "loading key");
    let bytes = fs::read(path).map_err(|source| MakeCsrError::ReadFailure {
        path: path.clone(),
        source,
    })?;
    if bytes.starts_with(b"-----BEGIN") {
        let pem = std::str::from_utf8(&bytes)
            .map_err(|e| MakeCsrError::SigningFailure(format!("{}: {e}", path.display())))?;
        KeyPair::import_pkcs8_pem(pem)
    } else {
        KeyPair::import_pkcs8_der(&bytes)
    }
}
