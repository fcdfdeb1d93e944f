//! Serialization and delivery of the generated key and request.
//!
//! Files are staged in a temporary file next to the destination and renamed
//! into place, so a reader sees either the previous file or the complete new
//! one. The private key's temporary file is created with mode `0600`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info, warn};

use crate::csr::CertificateRequest;
use crate::error::{MakeCsrError, Result};
use crate::key::KeyPair;
use crate::pem_utils::{self, CSR_LABEL, PRIVATE_KEY_LABEL};

/// Encoding of the written artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Base64 text with `-----BEGIN ...-----` delimiters.
    #[default]
    Pem,
    /// Raw DER bytes.
    Der,
}

/// Where one artifact goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    File(PathBuf),
}

impl Destination {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        path.map_or(Destination::Stdout, Destination::File)
    }
}

/// Key and request, encoded and ready to write.
pub struct OutputBundle {
    pub private_key: Vec<u8>,
    pub csr: Vec<u8>,
    pub format: OutputFormat,
}

impl OutputBundle {
    /// Encode the PKCS#8 private key and the request in `format`.
    pub fn encode(key_pair: &KeyPair, csr: &CertificateRequest, format: OutputFormat) -> Result<Self> {
        let key_doc = key_pair.to_pkcs8_der()?;
        let csr_der = csr.to_der()?;
        let (private_key, csr) = match format {
            OutputFormat::Pem => (
                pem_utils::der_to_pem(key_doc.as_bytes(), PRIVATE_KEY_LABEL).into_bytes(),
                pem_utils::der_to_pem(&csr_der, CSR_LABEL).into_bytes(),
            ),
            OutputFormat::Der => (key_doc.as_bytes().to_vec(), csr_der),
        };
        Ok(Self {
            private_key,
            csr,
            format,
        })
    }
}

// Keeps key bytes out of debug output.
impl std::fmt::Debug for OutputBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputBundle")
            .field("private_key", &format_args!("<{} bytes>", self.private_key.len()))
            .field("csr", &format_args!("<{} bytes>", self.csr.len()))
            .field("format", &self.format)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Artifact {
    PrivateKey,
    Csr,
}

impl Artifact {
    #[cfg(unix)]
    fn mode(&self) -> u32 {
        match self {
            Artifact::PrivateKey => 0o600,
            Artifact::Csr => 0o644,
        }
    }
}

/// Write the bundle: the private key to `key_dest`, the request to `csr_dest`.
///
/// Both files are fully staged and anything bound for stdout is written
/// before either file is moved into place. If the request cannot be moved
/// into place after the key was, the key is removed again, so a failed run
/// leaves no artifact at a destination path.
pub fn write(bundle: &OutputBundle, key_dest: &Destination, csr_dest: &Destination) -> Result<()> {
    let stdout = io::stdout();
    write_to(bundle, key_dest, csr_dest, &mut stdout.lock())
}

/// [`write`] with `out` in place of stdout.
pub fn write_to<W: Write>(
    bundle: &OutputBundle,
    key_dest: &Destination,
    csr_dest: &Destination,
    out: &mut W,
) -> Result<()> {
    match (key_dest, csr_dest) {
        (Destination::File(key_path), Destination::File(csr_path)) if same_file(key_path, csr_path) => {
            return Err(MakeCsrError::invalid_field(
                "out_csr",
                format!("{} is also the private key destination", csr_path.display()),
            ));
        }
        _ => {}
    }

    let staged_key = match key_dest {
        Destination::File(path) => Some((stage(path, &bundle.private_key, Artifact::PrivateKey)?, path)),
        Destination::Stdout => None,
    };
    let staged_csr = match csr_dest {
        Destination::File(path) => Some((stage(path, &bundle.csr, Artifact::Csr)?, path)),
        Destination::Stdout => None,
    };

    // Staged files are dropped, and so deleted, if stdout fails.
    emit(bundle, key_dest, csr_dest, out).map_err(|source| MakeCsrError::WriteFailure {
        path: PathBuf::from("<stdout>"),
        source,
    })?;

    let mut committed_key: Option<&PathBuf> = None;
    if let Some((temp, path)) = staged_key {
        commit(temp, path)?;
        committed_key = Some(path);
    }
    if let Some((temp, path)) = staged_csr {
        if let Err(err) = commit(temp, path) {
            if let Some(key_path) = committed_key {
                remove_key(key_path);
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Key first, then request, for whichever of the two goes to `out`.
fn emit<W: Write>(
    bundle: &OutputBundle,
    key_dest: &Destination,
    csr_dest: &Destination,
    out: &mut W,
) -> io::Result<()> {
    let mut wrote = false;
    if *key_dest == Destination::Stdout {
        out.write_all(&bundle.private_key)?;
        wrote = true;
    }
    if *csr_dest == Destination::Stdout {
        out.write_all(&bundle.csr)?;
        wrote = true;
    }
    if wrote {
        out.flush()?;
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::path::absolute(a), std::path::absolute(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn remove_key(path: &Path) {
    info!(path = %path.display(), "removing private key after failed request write");
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "could not remove private key");
    }
}

/// Write `contents` to a fresh temporary file in the destination directory.
///
/// The temporary file is deleted when the returned path is dropped without
/// being committed.
fn stage(path: &Path, contents: &[u8], artifact: Artifact) -> Result<TempPath> {
    let write_err = |source| MakeCsrError::WriteFailure {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // NamedTempFile is created 0600 on Unix, before any byte is written.
    let mut file = tempfile::Builder::new()
        .prefix(".makecsr-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_err)?;
    file.write_all(contents).map_err(write_err)?;
    file.as_file().sync_all().map_err(write_err)?;
    set_mode(&file, artifact).map_err(write_err)?;

    debug!(path = %path.display(), ?artifact, bytes = contents.len(), "staged output");
    Ok(file.into_temp_path())
}

#[cfg(unix)]
fn set_mode(file: &NamedTempFile, artifact: Artifact) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.as_file()
        .set_permissions(fs::Permissions::from_mode(artifact.mode()))
}

#[cfg(not(unix))]
fn set_mode(_file: &NamedTempFile, _artifact: Artifact) -> io::Result<()> {
    Ok(())
}

fn commit(temp: TempPath, path: &Path) -> Result<()> {
    temp.persist(path).map_err(|e| MakeCsrError::WriteFailure {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    info!(path = %path.display(), "wrote");
    Ok(())
}
