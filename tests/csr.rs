mod util;

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};

use der::Encode;
use makecsr::csr::CertificateRequest;
use makecsr::csr::extensions::{KeyUsage, SubjectAltName, build_extensions};
use makecsr::csr::params::{Subject, SubjectAttribute, SubjectFields};
use makecsr::error::MakeCsrError;
use makecsr::key::{KeyAlgorithm, KeyPair};
use makecsr::output::{self, Destination, OutputBundle, OutputFormat};
use makecsr::pipeline::{self, CsrRequest};
use tempfile::TempDir;

pub type Result<T> = std::result::Result<T, MakeCsrError>;

/// Requests for every supported key type verify against their embedded key.
#[test]
fn signatures_verify_for_all_key_types() -> Result<()> {
    let keys = [
        KeyPair::generate(KeyAlgorithm::Rsa { bits: 2048 })?,
        KeyPair::generate_ecdsa_p256(),
        KeyPair::generate_ecdsa_p384(),
    ];
    for key_pair in &keys {
        let csr = util::server_csr(key_pair);
        csr.verify()?;

        let decoded = CertificateRequest::from_pem(&csr.to_pem()?)?;
        decoded.verify()?;
        assert_eq!(decoded.inner.info.public_key, key_pair.as_spki()?);
    }
    Ok(())
}

/// The encoded subject does not depend on the order fields were supplied in.
#[test]
fn subject_order_is_canonical() -> Result<()> {
    let pairs = vec![
        (SubjectAttribute::CommonName, "www.example.co.jp".to_string()),
        (SubjectAttribute::Organization, "BRIDGE CO.,LTD.".to_string()),
        (SubjectAttribute::OrganizationalUnit, "Infra".to_string()),
        (SubjectAttribute::Locality, "Chiyoda-ku".to_string()),
        (SubjectAttribute::State, "Tokyo".to_string()),
        (SubjectAttribute::Country, "JP".to_string()),
        (SubjectAttribute::EmailAddress, "admin@example.co.jp".to_string()),
    ];
    let expected = Subject::from_pairs(pairs.clone())?.as_x509_name()?.to_der()?;

    let mut reversed = pairs.clone();
    reversed.reverse();
    let mut rotated = pairs.clone();
    rotated.rotate_left(3);
    let mut swapped = pairs.clone();
    swapped.swap(0, 5);

    for permutation in [reversed, rotated, swapped] {
        let subject = Subject::from_pairs(permutation)?;
        assert_eq!(subject.as_x509_name()?.to_der()?, expected);
        let order: Vec<_> = subject.attributes().iter().map(|(a, _)| *a).collect();
        assert_eq!(order, SubjectAttribute::CANONICAL_ORDER.to_vec());
    }

    let subject = Subject::from_pairs(pairs)?;
    assert_eq!(
        subject.to_string(),
        "CN=www.example.co.jp, O=BRIDGE CO.,LTD., OU=Infra, L=Chiyoda-ku, ST=Tokyo, C=JP, emailAddress=admin@example.co.jp"
    );
    Ok(())
}

#[test]
fn rsa_1024_is_unsupported() {
    let err = KeyPair::generate(KeyAlgorithm::Rsa { bits: 1024 }).unwrap_err();
    assert!(matches!(err, MakeCsrError::UnsupportedAlgorithm(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn subject_validation() {
    let missing = Subject::build(&SubjectFields::builder().organization("Org".to_string()).build());
    assert!(matches!(missing, Err(MakeCsrError::MissingCommonName)));

    let blank_ou = Subject::build(
        &SubjectFields::builder()
            .common_name("example.com".to_string())
            .organizational_unit("   ".to_string())
            .build(),
    );
    assert!(matches!(blank_ou, Err(MakeCsrError::EmptyField(ref f)) if f == "organizational_unit"));

    let bad_country = Subject::build(
        &SubjectFields::builder()
            .common_name("example.com".to_string())
            .country("Japan".to_string())
            .build(),
    );
    assert!(matches!(bad_country, Err(MakeCsrError::InvalidField { .. })));

    let bad_email = Subject::build(
        &SubjectFields::builder()
            .common_name("example.com".to_string())
            .email("not-an-address".to_string())
            .build(),
    );
    assert_eq!(bad_email.unwrap_err().exit_code(), 1);
}

/// Extensions survive encoding and come back in SAN, KU, EKU order.
#[test]
fn extensions_are_carried_in_request() -> Result<()> {
    let key_pair = KeyPair::generate_ecdsa_p256();
    let extensions = build_extensions(
        &["dns:www.example.com", "ip:192.0.2.10", "email:admin@example.com"],
        &["digital-signature", "key-encipherment"],
        &["server-auth", "client-auth"],
    )?;
    let csr = CertificateRequest::assemble(&util::server_subject(), &key_pair, &extensions)?;
    let decoded = CertificateRequest::from_der(&csr.to_der()?)?;
    decoded.verify()?;

    let carried = decoded.extensions()?;
    assert_eq!(carried, extensions);
    assert_eq!(
        carried.iter().map(|e| e.critical).collect::<Vec<_>>(),
        vec![false, true, false]
    );

    let san: SubjectAltName = carried[0].to_extension()?;
    assert_eq!(san.entries.len(), 3);
    let usage: KeyUsage = carried[1].to_extension()?;
    assert_eq!(usage, KeyUsage::parse(&["key-encipherment", "digital-signature"])?);
    Ok(())
}

/// A malformed SAN fails the run before anything reaches the filesystem.
#[test]
fn bad_san_writes_no_files() {
    let dir = TempDir::new().unwrap();
    let request = CsrRequest::builder()
        .subject(
            SubjectFields::builder()
                .common_name("example.com".to_string())
                .build(),
        )
        .algorithm(KeyAlgorithm::Ecdsa(makecsr::key::EcCurve::P256))
        .san(vec!["dns:example.com".to_string(), "dns:-bad-.example".to_string()])
        .build();

    let err = pipeline::run(
        &request,
        &Destination::File(dir.path().join("example.com.key")),
        &Destination::File(dir.path().join("example.com.csr")),
    )
    .unwrap_err();

    assert!(matches!(err, MakeCsrError::InvalidSanEntry(ref entry) if entry == "dns:-bad-.example"));
    assert!(util::dir_entries(dir.path()).is_empty());
}

/// Writers racing on one path never leave a reader with an empty or
/// truncated request.
#[test]
fn concurrent_writers_never_expose_partial_files() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let csr_path = dir.path().join("shared.csr");

    let mut bundles = Vec::new();
    for _ in 0..4 {
        let key_pair = KeyPair::generate_ecdsa_p256();
        let csr = util::server_csr(&key_pair);
        bundles.push(OutputBundle::encode(&key_pair, &csr, OutputFormat::Pem)?);
    }
    let valid: Vec<Vec<u8>> = bundles.iter().map(|b| b.csr.clone()).collect();

    output::write(
        &bundles[0],
        &Destination::File(dir.path().join("seed.key")),
        &Destination::File(csr_path.clone()),
    )?;

    let done = AtomicBool::new(false);
    std::thread::scope(|scope| {
        let writers: Vec<_> = bundles
            .iter()
            .enumerate()
            .map(|(i, bundle)| {
                let key_dest = Destination::File(dir.path().join(format!("writer-{i}.key")));
                let csr_dest = Destination::File(csr_path.clone());
                scope.spawn(move || {
                    for _ in 0..25 {
                        output::write(bundle, &key_dest, &csr_dest).unwrap();
                    }
                })
            })
            .collect();

        scope.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                let contents = fs::read(&csr_path).unwrap();
                assert!(!contents.is_empty());
                assert!(valid.contains(&contents), "reader saw a partial request");
            }
        });

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
    });

    let last = fs::read_to_string(&csr_path).unwrap();
    CertificateRequest::from_pem(&last)?.verify()?;
    Ok(())
}
