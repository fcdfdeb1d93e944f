use bon::Builder;
use const_oid::AssociatedOid;
use der::asn1::{Any, SetOfVec};
use der::{Decode, Encode};
use x509_cert::attr::Attribute;
use x509_cert::request::{CertReqInfo, ExtensionReq, Version};

use crate::csr::params::{ExtensionParam, Subject};
use crate::error::{MakeCsrError, Result};
use crate::key::PublicKey;

/// The to-be-signed part of a PKCS#10 request (`CertificationRequestInfo`).
///
/// # Fields
/// * `subject` - The validated subject name.
/// * `subject_public_key` - The public key the request is for.
/// * `extensions` - Extensions carried in the `extensionRequest` attribute.
#[derive(Clone, Debug, Builder)]
pub struct RequestInfo {
    pub subject: Subject,
    pub subject_public_key: PublicKey,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

impl RequestInfo {
    /// Converts the `RequestInfo` into a `CertReqInfo` for DER encoding.
    ///
    /// The result depends only on the inputs, so equal inputs always encode to
    /// identical bytes. Without extensions the attribute set stays empty.
    pub fn to_cert_req_info(&self) -> Result<CertReqInfo> {
        let attributes = if self.extensions.is_empty() {
            SetOfVec::new()
        } else {
            let extensions = self
                .extensions
                .iter()
                .map(ExtensionParam::to_x509_extension)
                .collect::<Result<Vec<_>>>()?;
            let value = Any::from_der(&ExtensionReq(extensions).to_der()?)?;
            SetOfVec::try_from(vec![Attribute {
                oid: ExtensionReq::OID,
                values: SetOfVec::try_from(vec![value])?,
            }])?
        };

        Ok(CertReqInfo {
            version: Version::V1,
            subject: self.subject.as_x509_name()?,
            public_key: self.subject_public_key.to_spki()?,
            attributes,
        })
    }

    /// Creates a `RequestInfo` from a decoded `CertReqInfo`.
    pub fn from_cert_req_info(inner: &CertReqInfo) -> Result<Self> {
        let subject = Subject::from_x509_name(&inner.subject)?;
        let subject_public_key = PublicKey::from_x509spki(&inner.public_key)?;

        let mut extensions = Vec::new();
        for attribute in inner.attributes.iter() {
            if attribute.oid != ExtensionReq::OID {
                continue;
            }
            for value in attribute.values.iter() {
                let request = ExtensionReq::from_der(&value.to_der()?)
                    .map_err(|e| MakeCsrError::DecodingError(e.to_string()))?;
                extensions.extend(request.0.iter().map(ExtensionParam::from_x509_extension));
            }
        }

        Ok(Self {
            subject,
            subject_public_key,
            extensions,
        })
    }

    /// Encodes the `CertificationRequestInfo` into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_cert_req_info()?.to_der()?)
    }
}
