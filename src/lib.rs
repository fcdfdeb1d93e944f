//! # makecsr - PKCS#10 Certificate Signing Requests in Pure Rust
//!
//! makecsr generates a private key (or loads an existing one), builds a
//! subject name and an extension set, and signs a PKCS#10 Certificate Signing
//! Request with it. It is built entirely on the RustCrypto libraries and ships
//! as both a library and the `makecsr` command-line tool.
//!
//! ## Supported Key Types
//!
//! - **RSA**: 2048, 3072, and 4096-bit keys, signed with `sha256WithRSAEncryption`
//! - **ECDSA**: P-256 and P-384 curves, signed with `ecdsa-with-SHA256`
//!
//! ## Supported Output Formats
//!
//! - **PEM**: `PRIVATE KEY` (PKCS#8) and `CERTIFICATE REQUEST` blocks
//! - **DER**: raw PKCS#8 and PKCS#10 bytes
//!
//! ## Quick Start
//!
//! ### Generating a Request
//!
//! ```rust,no_run
//! use makecsr::{
//!     csr::{CertificateRequest, extensions::build_extensions, params::{Subject, SubjectFields}},
//!     key::{EcCurve, KeyAlgorithm, KeyPair},
//! };
//!
//! # fn main() -> Result<(), makecsr::error::MakeCsrError> {
//! let key_pair = KeyPair::generate(KeyAlgorithm::Ecdsa(EcCurve::P256))?;
//!
//! let subject = Subject::build(
//!     &SubjectFields::builder()
//!         .common_name("example.com".to_string())
//!         .organization("Example Corp".to_string())
//!         .country("US".to_string())
//!         .build(),
//! )?;
//!
//! let extensions = build_extensions(
//!     &["dns:example.com", "dns:www.example.com"],
//!     &["digital-signature"],
//!     &["server-auth"],
//! )?;
//!
//! let csr = CertificateRequest::assemble(&subject, &key_pair, &extensions)?;
//! println!("{}", csr.to_pem()?);
//! # Ok(())
//! # }
//! ```
//!
//! ### Running the Whole Pipeline
//!
//! ```rust,no_run
//! use makecsr::{
//!     csr::params::SubjectFields,
//!     output::{Destination, OutputFormat},
//!     pipeline::{self, CsrRequest},
//! };
//!
//! # fn main() -> Result<(), makecsr::error::MakeCsrError> {
//! let request = CsrRequest::builder()
//!     .subject(
//!         SubjectFields::builder()
//!             .common_name("example.com".to_string())
//!             .build(),
//!     )
//!     .san(vec!["dns:example.com".to_string()])
//!     .format(OutputFormat::Pem)
//!     .build();
//!
//! pipeline::run(
//!     &request,
//!     &Destination::File("example.com.key".into()),
//!     &Destination::File("example.com.csr".into()),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every failure is a [`error::MakeCsrError`]. Its [`kind`](error::MakeCsrError::kind)
//! says whether the input, the cryptography or the filesystem is at fault,
//! and the command-line tool uses it for its exit code:
//!
//! ```rust
//! use makecsr::{error::MakeCsrError, key::KeyPair};
//!
//! match KeyPair::import_pkcs8_pem("invalid pem data") {
//!     Ok(_) => println!("Key imported successfully"),
//!     Err(MakeCsrError::SigningFailure(msg)) => println!("Unusable key: {}", msg),
//!     Err(e) => println!("Other error ({}): {}", e.exit_code(), e),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`key`]: Key generation, PKCS#8 import/export, and signing
//! - [`csr`]: Subject names, extensions, and the signed request
//! - [`request_info`]: The to-be-signed `CertificationRequestInfo`
//! - [`output`]: PEM/DER encoding and atomic file writes
//! - [`config`]: TOML defaults and the common-name list
//! - [`pipeline`]: A single run from key to written files
//! - [`error`]: Error types and their exit codes

pub mod config;
pub mod csr;
pub mod error;
pub mod key;
pub mod output;
pub mod pem_utils;
pub mod pipeline;
pub mod request_info;
