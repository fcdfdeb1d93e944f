//! makecsr command-line tool.
//!
//! Generates (or loads) a private key and writes it together with a signed
//! PKCS#10 certificate signing request, as PEM or DER, to files or stdout.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use makecsr::config::{self, CONFIG_ENV, Config};
use makecsr::csr::params::SubjectFields;
use makecsr::error::{MakeCsrError, Result};
use makecsr::key::{KeyAlgorithm, KeyType};
use makecsr::output::{Destination, OutputFormat};
use makecsr::pipeline::{CsrRequest, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "makecsr", version)]
#[command(about = "Generate a private key and a PKCS#10 certificate signing request", long_about = None)]
struct Cli {
    /// Common name (CN) of the subject
    #[arg(long, value_name = "CN", conflicts_with = "common_name_index")]
    common_name: Option<String>,

    /// Use the N-th entry (1-based) of the common-name list
    #[arg(long, value_name = "N")]
    common_name_index: Option<usize>,

    /// Organization (O)
    #[arg(long)]
    org: Option<String>,

    /// Organizational unit (OU)
    #[arg(long)]
    ou: Option<String>,

    /// Locality or city (L)
    #[arg(long)]
    locality: Option<String>,

    /// State or province (ST)
    #[arg(long)]
    state: Option<String>,

    /// Two-letter country code (C)
    #[arg(long)]
    country: Option<String>,

    /// Email address (emailAddress)
    #[arg(long)]
    email: Option<String>,

    /// Subject alternative name: dns:<name>, ip:<address> or email:<address>
    #[arg(long, value_name = "TYPE:VALUE")]
    san: Vec<String>,

    /// Key usage flag, e.g. digital-signature,key-encipherment
    #[arg(long, value_name = "FLAG", value_delimiter = ',')]
    key_usage: Vec<String>,

    /// Extended key usage, e.g. server-auth,client-auth
    #[arg(long, value_name = "USAGE", value_delimiter = ',')]
    ext_key_usage: Vec<String>,

    /// Key type for a new key [default: rsa]
    #[arg(long, value_enum)]
    key_type: Option<KeyType>,

    /// RSA modulus size in bits [default: 2048]
    #[arg(long, value_name = "BITS")]
    key_size: Option<usize>,

    /// ECDSA curve: p256 or p384 [default: p256]
    #[arg(long)]
    curve: Option<String>,

    /// Sign with an existing PKCS#8 private key (PEM or DER)
    #[arg(long, value_name = "PATH", conflicts_with_all = ["key_type", "key_size", "curve"])]
    in_key: Option<PathBuf>,

    /// Write the private key here
    #[arg(long, value_name = "PATH")]
    out_key: Option<PathBuf>,

    /// Write the request here
    #[arg(long, value_name = "PATH")]
    out_csr: Option<PathBuf>,

    /// Write <cn>.key and <cn>.csr into this directory
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Output encoding [default: pem]
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Config file
    #[arg(long, value_name = "PATH", env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Print the numbered common-name list and exit
    #[arg(long)]
    list_common_names: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version also arrive here, on stdout.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    debug!(?config, "configuration loaded");

    if cli.list_common_names {
        let names = config::load_common_names(&common_names_path(&config)?)?;
        for (i, name) in names.iter().enumerate() {
            println!("{}: {}", i + 1, name);
        }
        return Ok(());
    }

    let common_name = match cli.common_name_index {
        Some(index) => {
            let names = config::load_common_names(&common_names_path(&config)?)?;
            Some(config::select_common_name(&names, index)?)
        }
        None => cli.common_name.clone(),
    };

    let subject = config.subject.apply(SubjectFields {
        common_name,
        organization: cli.org.clone(),
        organizational_unit: cli.ou.clone(),
        locality: cli.locality.clone(),
        state: cli.state.clone(),
        country: cli.country.clone(),
        email: cli.email.clone(),
    });

    let algorithm = match cli.in_key {
        Some(_) => None,
        None => Some(key_algorithm(&cli, &config)?),
    };

    let request = CsrRequest::builder()
        .subject(subject)
        .maybe_algorithm(algorithm)
        .maybe_in_key(cli.in_key.clone())
        .san(cli.san.clone())
        .key_usage(cli.key_usage.clone())
        .ext_key_usage(cli.ext_key_usage.clone())
        .format(cli.format.or(config.format).unwrap_or_default())
        .build();

    let mut pipeline = Pipeline::new();
    let generated = pipeline.generate(&request)?;

    let (key_dest, csr_dest) = destinations(&cli, &config, generated.common_name());
    info!(key = ?key_dest, csr = ?csr_dest, "writing output");
    pipeline.write(&generated, &key_dest, &csr_dest)
}

fn common_names_path(config: &Config) -> Result<PathBuf> {
    config.common_names_path().ok_or_else(|| {
        MakeCsrError::ConfigError("no common-name list file configured".to_string())
    })
}

/// Flags win over the config file; a curve without a key type means ECDSA.
fn key_algorithm(cli: &Cli, config: &Config) -> Result<KeyAlgorithm> {
    let curve = cli.curve.as_deref().or(config.key.curve.as_deref());
    let key_type = cli.key_type.or(config.key.key_type).unwrap_or(if cli.curve.is_some() {
        KeyType::Ecdsa
    } else {
        KeyType::Rsa
    });
    KeyAlgorithm::from_parts(key_type, cli.key_size.or(config.key.size), curve)
}

fn destinations(cli: &Cli, config: &Config, common_name: &str) -> (Destination, Destination) {
    let dir = cli.out_dir.as_deref().or(config.output_dir.as_deref());
    let in_dir = |ext: &str| dir.map(|dir| dir.join(format!("{}.{ext}", file_stem(common_name))));

    let key = cli.out_key.clone().or_else(|| in_dir("key"));
    let csr = cli.out_csr.clone().or_else(|| in_dir("csr"));
    (Destination::from_path(key), Destination::from_path(csr))
}

/// A file name derived from the common name, with characters that are not
/// allowed in file names on some platforms replaced.
fn file_stem(common_name: &str) -> String {
    common_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}
