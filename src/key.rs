use std::fmt;
use std::str::FromStr;

use const_oid::AssociatedOid;
use const_oid::ObjectIdentifier;
use der::Encode;
use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, SecretDocument};
use rand_core::{OsRng, RngCore};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::csr::SignatureAlgorithm;
use crate::error::{MakeCsrError, Result};
use crate::pem_utils;

/// RSA modulus sizes accepted for new keys.
pub const SUPPORTED_RSA_BITS: [usize; 3] = [2048, 3072, 4096];

/// Named elliptic curves supported for ECDSA keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
}

impl EcCurve {
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            EcCurve::P256 => p256::NistP256::OID,
            EcCurve::P384 => p384::NistP384::OID,
        }
    }
}

impl FromStr for EcCurve {
    type Err = MakeCsrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p256" | "p-256" | "prime256v1" | "secp256r1" => Ok(EcCurve::P256),
            "p384" | "p-384" | "secp384r1" => Ok(EcCurve::P384),
            other => Err(MakeCsrError::UnsupportedAlgorithm(format!(
                "unknown curve '{other}'"
            ))),
        }
    }
}

impl fmt::Display for EcCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcCurve::P256 => f.write_str("P-256"),
            EcCurve::P384 => f.write_str("P-384"),
        }
    }
}

/// Key family, as named on the command line and in the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[default]
    Rsa,
    Ecdsa,
}

/// Algorithm and size (or curve) requested for a new key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa { bits: usize },
    Ecdsa(EcCurve),
}

impl Default for KeyAlgorithm {
    fn default() -> Self {
        KeyAlgorithm::Rsa { bits: 2048 }
    }
}

impl KeyAlgorithm {
    /// Combine a key type with an optional size and curve name.
    ///
    /// The size only applies to RSA and the curve only to ECDSA; the other is
    /// ignored. Missing values fall back to RSA-2048 and P-256.
    pub fn from_parts(key_type: KeyType, bits: Option<usize>, curve: Option<&str>) -> Result<Self> {
        match key_type {
            KeyType::Rsa => {
                let bits = bits.unwrap_or(2048);
                check_rsa_bits(bits)?;
                Ok(KeyAlgorithm::Rsa { bits })
            }
            KeyType::Ecdsa => {
                let curve = curve.map(str::parse::<EcCurve>).transpose()?.unwrap_or(EcCurve::P256);
                Ok(KeyAlgorithm::Ecdsa(curve))
            }
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa { bits } => write!(f, "RSA-{bits}"),
            KeyAlgorithm::Ecdsa(curve) => write!(f, "ECDSA-{curve}"),
        }
    }
}

/// Supported key types for certificate signing requests.
pub enum KeyPair {
    Rsa {
        private: Box<RsaPrivateKey>,
        public: RsaPublicKey,
    },
    EcdsaP256 {
        signing_key: P256SigningKey,
        verifying_key: P256VerifyingKey,
    },
    EcdsaP384 {
        signing_key: P384SigningKey,
        verifying_key: P384VerifyingKey,
    },
}

// Never print key material.
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm().to_string())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a key pair for the requested algorithm.
    ///
    /// Fails with [`MakeCsrError::UnsupportedAlgorithm`] for RSA sizes outside
    /// [`SUPPORTED_RSA_BITS`], and with [`MakeCsrError::EntropyUnavailable`] if
    /// the operating system random source cannot be read.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        if let KeyAlgorithm::Rsa { bits } = algorithm {
            check_rsa_bits(bits)?;
        }
        ensure_entropy()?;

        match algorithm {
            KeyAlgorithm::Rsa { bits } => Self::generate_rsa(bits),
            KeyAlgorithm::Ecdsa(EcCurve::P256) => Ok(Self::generate_ecdsa_p256()),
            KeyAlgorithm::Ecdsa(EcCurve::P384) => Ok(Self::generate_ecdsa_p384()),
        }
    }

    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        check_rsa_bits(bits)?;
        let mut rng = OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair::Rsa {
            private: Box::new(private),
            public,
        })
    }

    /// Generate an ECDSA P-256 key pair.
    pub fn generate_ecdsa_p256() -> Self {
        let signing_key = P256SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP256 {
            signing_key,
            verifying_key,
        }
    }

    /// Generate an ECDSA P-384 key pair.
    pub fn generate_ecdsa_p384() -> Self {
        let signing_key = P384SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP384 {
            signing_key,
            verifying_key,
        }
    }

    /// Load an unencrypted PKCS#8 private key from DER bytes.
    ///
    /// RSA, P-256 and P-384 keys are recognised; anything else is reported as
    /// [`MakeCsrError::SigningFailure`] since the key cannot sign the request.
    pub fn import_pkcs8_der(der: &[u8]) -> Result<Self> {
        if let Ok(private) = RsaPrivateKey::from_pkcs8_der(der) {
            check_rsa_bits(private.size() * 8)?;
            let public = RsaPublicKey::from(&private);
            return Ok(KeyPair::Rsa {
                private: Box::new(private),
                public,
            });
        }
        if let Ok(signing_key) = P256SigningKey::from_pkcs8_der(der) {
            let verifying_key = *signing_key.verifying_key();
            return Ok(KeyPair::EcdsaP256 {
                signing_key,
                verifying_key,
            });
        }
        if let Ok(signing_key) = P384SigningKey::from_pkcs8_der(der) {
            let verifying_key = *signing_key.verifying_key();
            return Ok(KeyPair::EcdsaP384 {
                signing_key,
                verifying_key,
            });
        }
        Err(MakeCsrError::SigningFailure(
            "private key is malformed or uses an unsupported algorithm".to_string(),
        ))
    }

    /// Load an unencrypted PKCS#8 private key from a `PRIVATE KEY` PEM block.
    pub fn import_pkcs8_pem(pem: &str) -> Result<Self> {
        let (label, der) = pem_utils::pem_to_der(pem)
            .map_err(|e| MakeCsrError::SigningFailure(format!("unreadable PEM key: {e}")))?;
        if label != pem_utils::PRIVATE_KEY_LABEL {
            return Err(MakeCsrError::SigningFailure(format!(
                "expected a '{}' PEM block, found '{label}'",
                pem_utils::PRIVATE_KEY_LABEL
            )));
        }
        Self::import_pkcs8_der(&der)
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            KeyPair::Rsa { private, .. } => KeyAlgorithm::Rsa {
                bits: private.size() * 8,
            },
            KeyPair::EcdsaP256 { .. } => KeyAlgorithm::Ecdsa(EcCurve::P256),
            KeyPair::EcdsaP384 { .. } => KeyAlgorithm::Ecdsa(EcCurve::P384),
        }
    }

    /// The signature algorithm matched to this key type.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            KeyPair::Rsa { .. } => SignatureAlgorithm::Sha256WithRSA,
            KeyPair::EcdsaP256 { .. } | KeyPair::EcdsaP384 { .. } => {
                SignatureAlgorithm::Sha256WithECDSA
            }
        }
    }

    /// Export the private key as an unencrypted PKCS#8 document.
    pub fn to_pkcs8_der(&self) -> Result<SecretDocument> {
        let doc = match self {
            KeyPair::Rsa { private, .. } => private.to_pkcs8_der()?,
            KeyPair::EcdsaP256 { signing_key, .. } => signing_key.to_pkcs8_der()?,
            KeyPair::EcdsaP384 { signing_key, .. } => signing_key.to_pkcs8_der()?,
        };
        Ok(doc)
    }

    /// The SubjectPublicKeyInfo for the public half of this key.
    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        PublicKey::from_key_pair(self).to_spki()
    }

    /// Sign `data` with SHA-256 and the algorithm from [`KeyPair::signature_algorithm`].
    ///
    /// ECDSA signatures are returned DER encoded (`Ecdsa-Sig-Value`), as X.509
    /// and PKCS#10 expect them.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            KeyPair::Rsa { private, .. } => {
                let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(*private.clone());
                let signature = signing_key
                    .try_sign(data)
                    .map_err(|e| MakeCsrError::SigningFailure(e.to_string()))?;
                Ok(signature.to_vec())
            }
            KeyPair::EcdsaP256 { signing_key, .. } => {
                let digest = Sha256::digest(data);
                let signature: p256::ecdsa::Signature = signing_key
                    .sign_prehash(&digest)
                    .map_err(|e| MakeCsrError::SigningFailure(e.to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP384 { signing_key, .. } => {
                let digest = Sha256::digest(data);
                let signature: p384::ecdsa::Signature = signing_key
                    .sign_prehash(&digest)
                    .map_err(|e| MakeCsrError::SigningFailure(e.to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }
}

/// The public half of a supported key, as embedded in a request.
#[derive(Clone, Debug, PartialEq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
    EcdsaP384(P384VerifyingKey),
}

impl PublicKey {
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        match key_pair {
            KeyPair::Rsa { public, .. } => PublicKey::Rsa(public.clone()),
            KeyPair::EcdsaP256 { verifying_key, .. } => PublicKey::EcdsaP256(*verifying_key),
            KeyPair::EcdsaP384 { verifying_key, .. } => PublicKey::EcdsaP384(*verifying_key),
        }
    }

    /// Decode a public key from a SubjectPublicKeyInfo structure.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = spki.to_der()?;
        let decode_err = |e: pkcs8::spki::Error| MakeCsrError::DecodingError(e.to_string());

        match spki.algorithm.oid {
            const_oid::db::rfc5912::RSA_ENCRYPTION => Ok(PublicKey::Rsa(
                RsaPublicKey::from_public_key_der(&der).map_err(decode_err)?,
            )),
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .ok_or_else(|| {
                        MakeCsrError::DecodingError("EC public key has no curve".to_string())
                    })?
                    .decode_as::<ObjectIdentifier>()
                    .map_err(|e| MakeCsrError::DecodingError(e.to_string()))?;
                if curve == EcCurve::P256.oid() {
                    Ok(PublicKey::EcdsaP256(
                        P256VerifyingKey::from_public_key_der(&der).map_err(decode_err)?,
                    ))
                } else if curve == EcCurve::P384.oid() {
                    Ok(PublicKey::EcdsaP384(
                        P384VerifyingKey::from_public_key_der(&der).map_err(decode_err)?,
                    ))
                } else {
                    Err(MakeCsrError::UnsupportedAlgorithm(format!(
                        "EC curve {curve}"
                    )))
                }
            }
            other => Err(MakeCsrError::UnsupportedAlgorithm(format!(
                "public key algorithm {other}"
            ))),
        }
    }

    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let spki = match self {
            PublicKey::Rsa(public) => SubjectPublicKeyInfoOwned::from_key(public.clone())?,
            PublicKey::EcdsaP256(verifying_key) => {
                SubjectPublicKeyInfoOwned::from_key(*verifying_key)?
            }
            PublicKey::EcdsaP384(verifying_key) => {
                SubjectPublicKeyInfoOwned::from_key(*verifying_key)?
            }
        };
        Ok(spki)
    }

    /// Check a SHA-256 based `signature` over `data`.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let invalid = |e: ecdsa::Error| MakeCsrError::SigningFailure(e.to_string());
        match self {
            PublicKey::Rsa(public) => {
                let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public.clone());
                let signature =
                    rsa::pkcs1v15::Signature::try_from(signature).map_err(invalid)?;
                verifying_key.verify(data, &signature).map_err(invalid)
            }
            PublicKey::EcdsaP256(verifying_key) => {
                let signature = p256::ecdsa::Signature::from_der(signature).map_err(invalid)?;
                verifying_key
                    .verify_prehash(&Sha256::digest(data), &signature)
                    .map_err(invalid)
            }
            PublicKey::EcdsaP384(verifying_key) => {
                let signature = p384::ecdsa::Signature::from_der(signature).map_err(invalid)?;
                verifying_key
                    .verify_prehash(&Sha256::digest(data), &signature)
                    .map_err(invalid)
            }
        }
    }
}

fn check_rsa_bits(bits: usize) -> Result<()> {
    if SUPPORTED_RSA_BITS.contains(&bits) {
        Ok(())
    } else {
        Err(MakeCsrError::UnsupportedAlgorithm(format!(
            "RSA-{bits} (supported sizes: 2048, 3072, 4096)"
        )))
    }
}

/// Draw from the OS random source so a broken one surfaces as an error
/// instead of a panic inside key generation.
fn ensure_entropy() -> Result<()> {
    let mut sample = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut sample)
        .map_err(|e| MakeCsrError::EntropyUnavailable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsa_below_minimum_is_unsupported() {
        let err = KeyPair::generate(KeyAlgorithm::Rsa { bits: 1024 }).unwrap_err();
        assert!(matches!(err, MakeCsrError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn test_unknown_curve_is_unsupported() {
        let err = "brainpoolP256r1".parse::<EcCurve>().unwrap_err();
        assert!(matches!(err, MakeCsrError::UnsupportedAlgorithm(_)));
        assert_eq!("prime256v1".parse::<EcCurve>().unwrap(), EcCurve::P256);
        assert_eq!("SECP384R1".parse::<EcCurve>().unwrap(), EcCurve::P384);
    }

    #[test]
    fn test_algorithm_from_parts() {
        assert_eq!(
            KeyAlgorithm::from_parts(KeyType::Rsa, None, Some("p384")).unwrap(),
            KeyAlgorithm::Rsa { bits: 2048 }
        );
        assert_eq!(
            KeyAlgorithm::from_parts(KeyType::Ecdsa, Some(4096), Some("secp384r1")).unwrap(),
            KeyAlgorithm::Ecdsa(EcCurve::P384)
        );
        assert_eq!(
            KeyAlgorithm::from_parts(KeyType::Ecdsa, None, None).unwrap(),
            KeyAlgorithm::Ecdsa(EcCurve::P256)
        );
        assert!(matches!(
            KeyAlgorithm::from_parts(KeyType::Rsa, Some(1024), None),
            Err(MakeCsrError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_sign_and_verify_ecdsa() {
        for key in [KeyPair::generate_ecdsa_p256(), KeyPair::generate_ecdsa_p384()] {
            let signature = key.sign_data(b"request info").unwrap();
            let public = PublicKey::from_key_pair(&key);
            public.verify(b"request info", &signature).unwrap();
            assert!(public.verify(b"tampered", &signature).is_err());
        }
    }

    #[test]
    fn test_sign_and_verify_rsa() {
        let key = KeyPair::generate(KeyAlgorithm::Rsa { bits: 2048 }).unwrap();
        assert_eq!(key.algorithm(), KeyAlgorithm::Rsa { bits: 2048 });
        let signature = key.sign_data(b"request info").unwrap();
        assert_eq!(signature.len(), 256);
        PublicKey::from_key_pair(&key)
            .verify(b"request info", &signature)
            .unwrap();
    }

    #[test]
    fn test_pkcs8_export_import() {
        let key = KeyPair::generate_ecdsa_p384();
        let doc = key.to_pkcs8_der().unwrap();
        let imported = KeyPair::import_pkcs8_der(doc.as_bytes()).unwrap();
        assert_eq!(imported.algorithm(), KeyAlgorithm::Ecdsa(EcCurve::P384));
        assert_eq!(
            PublicKey::from_key_pair(&imported),
            PublicKey::from_key_pair(&key)
        );
    }

    #[test]
    fn test_import_rejects_garbage() {
        let err = KeyPair::import_pkcs8_der(b"not a key").unwrap_err();
        assert!(matches!(err, MakeCsrError::SigningFailure(_)));

        let pem = pem_utils::der_to_pem(b"abc", "CERTIFICATE");
        let err = KeyPair::import_pkcs8_pem(&pem).unwrap_err();
        assert!(matches!(err, MakeCsrError::SigningFailure(_)));
    }

    #[test]
    fn test_spki_roundtrip_keeps_curve() {
        let key = KeyPair::generate_ecdsa_p256();
        let spki = key.as_spki().unwrap();
        let decoded = PublicKey::from_x509spki(&spki).unwrap();
        assert!(matches!(decoded, PublicKey::EcdsaP256(_)));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let key = KeyPair::generate_ecdsa_p256();
        let printed = format!("{key:?}");
        assert!(printed.contains("ECDSA-P-256"));
        assert!(!printed.contains("signing_key"));
    }
}
