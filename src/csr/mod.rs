pub mod extensions;
pub mod params;

use der::asn1::{AnyRef, BitString};
use der::{Decode, DecodePem, Encode, EncodePem};
use params::{ExtensionParam, Subject, SubjectAttribute};
use x509_cert::request::CertReq;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{MakeCsrError, Result};
use crate::key::{KeyPair, PublicKey};
use crate::request_info::RequestInfo;

/// Represents the supported signature algorithms for requests.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption (PKCS#1 v1.5).
    Sha256WithRSA,
    /// SHA-256 with ECDSA.
    Sha256WithECDSA,
}

impl SignatureAlgorithm {
    pub fn from_oid(oid: &const_oid::ObjectIdentifier) -> Result<Self> {
        match *oid {
            const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION => Ok(Self::Sha256WithRSA),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_256 => Ok(Self::Sha256WithECDSA),
            other => Err(MakeCsrError::UnsupportedAlgorithm(format!(
                "signature algorithm {other}"
            ))),
        }
    }
}

impl From<SignatureAlgorithm> for AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA carries explicit NULL parameters; ECDSA omits them.
    fn from(value: SignatureAlgorithm) -> Self {
        match value {
            SignatureAlgorithm::Sha256WithRSA => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(AnyRef::NULL.into()),
            },
            SignatureAlgorithm::Sha256WithECDSA => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
        }
    }
}

/// Represents a signed PKCS#10 certificate signing request.
///
/// This struct provides methods to encode the request into DER or PEM formats
/// and to check its self-signature.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    /// The inner representation of the request.
    pub inner: CertReq,
}

impl CertificateRequest {
    /// Encodes `subject`, the public half of `key_pair` and `extensions` into a
    /// `CertificationRequestInfo` and signs it with the private half.
    ///
    /// The signature algorithm follows the key type. Any failure to sign is a
    /// [`MakeCsrError::SigningFailure`].
    pub fn assemble(
        subject: &Subject,
        key_pair: &KeyPair,
        extensions: &[ExtensionParam],
    ) -> Result<Self> {
        let info = RequestInfo::builder()
            .subject(subject.clone())
            .subject_public_key(PublicKey::from_key_pair(key_pair))
            .extensions(extensions.to_vec())
            .build();
        let info_inner = info.to_cert_req_info()?;
        let tbs = info_inner.to_der()?;

        let signature = key_pair.sign_data(&tbs)?;
        let signature = BitString::from_bytes(&signature)
            .map_err(|e| MakeCsrError::SigningFailure(e.to_string()))?;

        Ok(Self {
            inner: CertReq {
                info: info_inner,
                algorithm: key_pair.signature_algorithm().into(),
                signature,
            },
        })
    }

    /// Checks the embedded signature against the embedded public key over the
    /// encoded `CertificationRequestInfo`.
    pub fn verify(&self) -> Result<()> {
        let algorithm = SignatureAlgorithm::from_oid(&self.inner.algorithm.oid)?;
        let public_key = PublicKey::from_x509spki(&self.inner.info.public_key)?;

        let expected = match public_key {
            PublicKey::Rsa(_) => SignatureAlgorithm::Sha256WithRSA,
            PublicKey::EcdsaP256(_) | PublicKey::EcdsaP384(_) => {
                SignatureAlgorithm::Sha256WithECDSA
            }
        };
        if algorithm != expected {
            return Err(MakeCsrError::SigningFailure(format!(
                "{algorithm:?} does not match the embedded public key"
            )));
        }

        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            MakeCsrError::SigningFailure("signature has unused bits".to_string())
        })?;
        public_key.verify(&self.inner.info.to_der()?, signature)
    }

    /// Encodes the request into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| MakeCsrError::EncodingError(e.to_string()))
    }

    /// Encodes the request into PEM format (`CERTIFICATE REQUEST`).
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(pkcs8::LineEnding::LF)
            .map_err(|e| MakeCsrError::EncodingError(e.to_string()))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der).map_err(|e| MakeCsrError::DecodingError(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner =
            CertReq::from_pem(pem).map_err(|e| MakeCsrError::DecodingError(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Extracts the request contents into a `RequestInfo`.
    pub fn to_request_info(&self) -> Result<RequestInfo> {
        RequestInfo::from_cert_req_info(&self.inner.info)
    }

    pub fn subject(&self) -> Result<Subject> {
        Subject::from_x509_name(&self.inner.info.subject)
    }

    pub fn common_name(&self) -> Result<String> {
        Ok(self.subject()?.common_name().to_string())
    }

    /// Subject attributes in encoded order.
    pub fn subject_attributes(&self) -> Result<Vec<(SubjectAttribute, String)>> {
        Ok(self.subject()?.attributes().to_vec())
    }

    pub fn extensions(&self) -> Result<Vec<ExtensionParam>> {
        Ok(self.to_request_info()?.extensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csr::extensions::{SanEntry, SubjectAltName, build_extensions};
    use crate::csr::params::SubjectFields;
    use crate::key::KeyAlgorithm;

    fn subject() -> Subject {
        Subject::build(
            &SubjectFields::builder()
                .common_name("server.myca.local".to_string())
                .organization("Crab widgits SE".to_string())
                .country("SE".to_string())
                .build(),
        )
        .unwrap()
    }

    #[test]
    fn test_ecdsa_request_verifies() {
        for key_pair in [KeyPair::generate_ecdsa_p256(), KeyPair::generate_ecdsa_p384()] {
            let csr = CertificateRequest::assemble(&subject(), &key_pair, &[]).unwrap();
            csr.verify().unwrap();
            assert_eq!(
                csr.inner.algorithm.oid,
                const_oid::db::rfc5912::ECDSA_WITH_SHA_256
            );
        }
    }

    #[test]
    fn test_rsa_request_verifies() {
        let key_pair = KeyPair::generate(KeyAlgorithm::Rsa { bits: 2048 }).unwrap();
        let csr = CertificateRequest::assemble(&subject(), &key_pair, &[]).unwrap();
        csr.verify().unwrap();
        assert_eq!(
            csr.inner.algorithm.oid,
            const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION
        );
    }

    #[test]
    fn test_tampered_request_fails_verification() {
        let key_pair = KeyPair::generate_ecdsa_p256();
        let mut csr = CertificateRequest::assemble(&subject(), &key_pair, &[]).unwrap();
        let other = Subject::build(
            &SubjectFields::builder()
                .common_name("evil.example".to_string())
                .build(),
        )
        .unwrap();
        csr.inner.info.subject = other.as_x509_name().unwrap();
        assert!(matches!(csr.verify(), Err(MakeCsrError::SigningFailure(_))));
    }

    #[test]
    fn test_der_and_pem_decode() {
        let key_pair = KeyPair::generate_ecdsa_p256();
        let extensions = build_extensions(&["dns:server.myca.local"], &[], &[]).unwrap();
        let csr = CertificateRequest::assemble(&subject(), &key_pair, &extensions).unwrap();

        let pem = csr.to_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
        let from_pem = CertificateRequest::from_pem(&pem).unwrap();
        from_pem.verify().unwrap();
        assert_eq!(from_pem.common_name().unwrap(), "server.myca.local");

        let from_der = CertificateRequest::from_der(&csr.to_der().unwrap()).unwrap();
        let san: SubjectAltName = from_der.extensions().unwrap()[0].to_extension().unwrap();
        assert_eq!(
            san.entries,
            vec![SanEntry::Dns("server.myca.local".to_string())]
        );
    }
}
