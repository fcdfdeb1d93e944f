#![allow(dead_code)]

use std::path::Path;
use std::process::{Command, Output};

use makecsr::csr::CertificateRequest;
use makecsr::csr::params::{Subject, SubjectFields};
use makecsr::key::KeyPair;

pub fn server_subject() -> Subject {
    Subject::build(
        &SubjectFields::builder()
            .common_name("server.myca.local".to_string())
            .organization("Crab widgits SE".to_string())
            .locality("Stockholm".to_string())
            .country("SE".to_string())
            .build(),
    )
    .unwrap()
}

pub fn server_csr(key_pair: &KeyPair) -> CertificateRequest {
    CertificateRequest::assemble(&server_subject(), key_pair, &[]).unwrap()
}

/// Run the `makecsr` binary with `config` as its config file and `args`.
pub fn makecsr(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_makecsr"))
        .args(args)
        .env("MAKECSR_CONFIG", config)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

/// Write `contents` as a config file in `dir` and return its path.
pub fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

/// Names of the entries in `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
