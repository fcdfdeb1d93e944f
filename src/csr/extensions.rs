use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use const_oid::AssociatedOid;
use der::{
    Decode, Encode,
    asn1::{Ia5String, OctetString},
    oid::ObjectIdentifier,
};
use x509_cert::ext::pkix::name::GeneralName;

use super::params::{EMAIL_PATTERN, ExtensionParam};
use crate::error::{MakeCsrError, Result};

/// Trait for converting to and from X.509 extensions.
///
/// This trait provides methods to encode and decode X.509 extension values.
///
/// # Example
/// ```
/// use makecsr::csr::extensions::{SanEntry, SubjectAltName, ToAndFromX509Extension};
/// let san = SubjectAltName { entries: vec!["dns:example.com".parse::<SanEntry>().unwrap()] };
/// let encoded = san.to_x509_extension_value().unwrap();
/// let decoded = SubjectAltName::from_x509_extension_value(&encoded).unwrap();
/// assert_eq!(san.entries, decoded.entries);
/// ```
pub trait ToAndFromX509Extension {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// Encodes the extension into a DER-encoded byte vector.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>>;

    /// Decodes the extension from a DER-encoded byte slice.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self>
    where
        Self: Sized;
}

/// One identity in a Subject Alternative Name extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanEntry {
    Dns(String),
    Ip(IpAddr),
    Email(String),
}

impl FromStr for SanEntry {
    type Err = MakeCsrError;

    /// Parses `type:value`, where type is `dns`, `ip` or `email`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || MakeCsrError::InvalidSanEntry(s.to_string());
        let (kind, value) = s.split_once(':').ok_or_else(invalid)?;
        let value = value.trim();

        match kind.trim().to_ascii_lowercase().as_str() {
            "dns" if is_valid_dns_name(value) => Ok(SanEntry::Dns(value.to_ascii_lowercase())),
            "ip" => value.parse::<IpAddr>().map(SanEntry::Ip).map_err(|_| invalid()),
            "email" if EMAIL_PATTERN.is_match(value) => Ok(SanEntry::Email(value.to_string())),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for SanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SanEntry::Dns(name) => write!(f, "dns:{name}"),
            SanEntry::Ip(addr) => write!(f, "ip:{addr}"),
            SanEntry::Email(addr) => write!(f, "email:{addr}"),
        }
    }
}

/// Hostname syntax: dot separated labels of letters, digits and hyphens,
/// with an optional leading `*.` wildcard label. Fully qualified names with
/// a trailing dot are not accepted.
fn is_valid_dns_name(name: &str) -> bool {
    let host = name.strip_prefix("*.").unwrap_or(name);
    if host.is_empty() || name.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

impl SanEntry {
    fn to_general_name(&self) -> Result<GeneralName> {
        let name = match self {
            SanEntry::Dns(name) => GeneralName::DnsName(Ia5String::try_from(name.clone())?),
            SanEntry::Email(addr) => GeneralName::Rfc822Name(Ia5String::try_from(addr.clone())?),
            SanEntry::Ip(IpAddr::V4(addr)) => {
                GeneralName::IpAddress(OctetString::new(addr.octets().to_vec())?)
            }
            SanEntry::Ip(IpAddr::V6(addr)) => {
                GeneralName::IpAddress(OctetString::new(addr.octets().to_vec())?)
            }
        };
        Ok(name)
    }

    fn from_general_name(name: &GeneralName) -> Result<Self> {
        match name {
            GeneralName::DnsName(dns) => Ok(SanEntry::Dns(dns.to_string())),
            GeneralName::Rfc822Name(addr) => Ok(SanEntry::Email(addr.to_string())),
            GeneralName::IpAddress(octets) => match octets.as_bytes().len() {
                4 => {
                    let bytes: [u8; 4] = octets.as_bytes().try_into().map_err(|_| {
                        MakeCsrError::DecodingError("bad IPv4 address".to_string())
                    })?;
                    Ok(SanEntry::Ip(IpAddr::from(bytes)))
                }
                16 => {
                    let bytes: [u8; 16] = octets.as_bytes().try_into().map_err(|_| {
                        MakeCsrError::DecodingError("bad IPv6 address".to_string())
                    })?;
                    Ok(SanEntry::Ip(IpAddr::from(bytes)))
                }
                n => Err(MakeCsrError::DecodingError(format!(
                    "IP address of {n} bytes"
                ))),
            },
            _ => Err(MakeCsrError::DecodingError(
                "Unsupported general name type".to_string(),
            )),
        }
    }
}

/// Represents the Subject Alternative Name (SAN) extension.
///
/// This extension specifies additional identities for the subject of the request.
///
/// # Fields
/// * `entries` - DNS names, IP addresses and email addresses.
#[derive(Debug, Clone, Default)]
pub struct SubjectAltName {
    pub entries: Vec<SanEntry>,
}

impl SubjectAltName {
    /// Parse `type:value` strings; the first bad one is reported by value.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let entries = entries
            .iter()
            .map(|entry| entry.as_ref().parse::<SanEntry>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }
}

impl ToAndFromX509Extension for SubjectAltName {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectAltName::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let san = x509_cert::ext::pkix::SubjectAltName(
            self.entries
                .iter()
                .map(SanEntry::to_general_name)
                .collect::<Result<Vec<_>>>()?,
        );

        Ok(san.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let san = x509_cert::ext::pkix::SubjectAltName::from_der(extension)
            .map_err(|e| MakeCsrError::DecodingError(e.to_string()))?;
        let entries = san
            .0
            .iter()
            .map(SanEntry::from_general_name)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }
}

pub use der::flagset::FlagSet;
use x509_cert::ext::pkix::KeyUsage as X509KeyUsage;
pub use x509_cert::ext::pkix::KeyUsages;

/// Represents the Key Usage extension.
///
/// This extension defines the purpose of the key contained in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsage(pub FlagSet<KeyUsages>);

impl KeyUsage {
    /// Parse flag names such as `digital-signature` or `key-encipherment`.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut flags: FlagSet<KeyUsages> = FlagSet::empty();
        for name in names {
            flags |= parse_key_usage_flag(name.as_ref())?;
        }
        Ok(Self(flags))
    }
}

fn parse_key_usage_flag(name: &str) -> Result<KeyUsages> {
    let flag = match name.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "digital-signature" => KeyUsages::DigitalSignature,
        "non-repudiation" | "content-commitment" => KeyUsages::NonRepudiation,
        "key-encipherment" => KeyUsages::KeyEncipherment,
        "data-encipherment" => KeyUsages::DataEncipherment,
        "key-agreement" => KeyUsages::KeyAgreement,
        "key-cert-sign" => KeyUsages::KeyCertSign,
        "crl-sign" => KeyUsages::CRLSign,
        _ => {
            return Err(MakeCsrError::invalid_field(
                "key_usage",
                format!("unknown key usage '{name}'"),
            ));
        }
    };
    Ok(flag)
}

impl ToAndFromX509Extension for KeyUsage {
    const OID: ObjectIdentifier = <X509KeyUsage as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let ku = X509KeyUsage(self.0);
        Ok(ku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let ku = X509KeyUsage::from_der(extension)
            .map_err(|e| MakeCsrError::DecodingError(e.to_string()))?;
        Ok(Self(ku.0))
    }
}

/// Represents the Extended Key Usage extension.
///
/// This extension indicates purposes for which the public key may be used.
#[derive(Debug, Clone, Default)]
pub struct ExtendedKeyUsage {
    pub usage: Vec<ExtendedKeyUsageOption>,
}

impl ExtendedKeyUsage {
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let usage = names
            .iter()
            .map(|name| name.as_ref().parse::<ExtendedKeyUsageOption>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { usage })
    }
}

impl ToAndFromX509Extension for ExtendedKeyUsage {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::ExtendedKeyUsage::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        let oids: Vec<ObjectIdentifier> = self.usage.iter().map(|v| (*v).into()).collect();
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage(oids);
        Ok(eku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage::from_der(extension)
            .map_err(|e| MakeCsrError::DecodingError(e.to_string()))?;
        let usage = eku
            .0
            .iter()
            .map(|v| match *v {
                const_oid::db::rfc5912::ID_KP_OCSP_SIGNING => {
                    Ok(ExtendedKeyUsageOption::OcspSigning)
                }
                const_oid::db::rfc5912::ID_KP_SERVER_AUTH => Ok(ExtendedKeyUsageOption::ServerAuth),
                const_oid::db::rfc5912::ID_KP_CLIENT_AUTH => Ok(ExtendedKeyUsageOption::ClientAuth),
                const_oid::db::rfc5912::ID_KP_CODE_SIGNING => {
                    Ok(ExtendedKeyUsageOption::CodeSigning)
                }
                const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION => {
                    Ok(ExtendedKeyUsageOption::EmailProtection)
                }
                const_oid::db::rfc5912::ID_KP_TIME_STAMPING => {
                    Ok(ExtendedKeyUsageOption::TimeStamping)
                }
                _ => Err(MakeCsrError::DecodingError(
                    "Unsupported extended key usage option".to_string(),
                )),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { usage })
    }
}

/// Represents an option for the Extended Key Usage extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExtendedKeyUsageOption {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
}

impl FromStr for ExtendedKeyUsageOption {
    type Err = MakeCsrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "server-auth" => Ok(ExtendedKeyUsageOption::ServerAuth),
            "client-auth" => Ok(ExtendedKeyUsageOption::ClientAuth),
            "code-signing" => Ok(ExtendedKeyUsageOption::CodeSigning),
            "email-protection" => Ok(ExtendedKeyUsageOption::EmailProtection),
            "time-stamping" => Ok(ExtendedKeyUsageOption::TimeStamping),
            "ocsp-signing" => Ok(ExtendedKeyUsageOption::OcspSigning),
            _ => Err(MakeCsrError::invalid_field(
                "ext_key_usage",
                format!("unknown extended key usage '{s}'"),
            )),
        }
    }
}

impl From<ExtendedKeyUsageOption> for ObjectIdentifier {
    fn from(value: ExtendedKeyUsageOption) -> Self {
        match value {
            ExtendedKeyUsageOption::OcspSigning => const_oid::db::rfc5912::ID_KP_OCSP_SIGNING,
            ExtendedKeyUsageOption::ServerAuth => const_oid::db::rfc5912::ID_KP_SERVER_AUTH,
            ExtendedKeyUsageOption::ClientAuth => const_oid::db::rfc5912::ID_KP_CLIENT_AUTH,
            ExtendedKeyUsageOption::CodeSigning => const_oid::db::rfc5912::ID_KP_CODE_SIGNING,
            ExtendedKeyUsageOption::EmailProtection => {
                const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION
            }
            ExtendedKeyUsageOption::TimeStamping => const_oid::db::rfc5912::ID_KP_TIME_STAMPING,
        }
    }
}

/// Validate the requested SANs and usages and encode them as request extensions.
///
/// Extensions come out in a fixed order (SAN, key usage, extended key usage);
/// empty inputs produce no extension.
pub fn build_extensions<S: AsRef<str>>(
    san: &[S],
    key_usage: &[S],
    extended_key_usage: &[S],
) -> Result<Vec<ExtensionParam>> {
    let san = SubjectAltName::parse(san)?;
    let key_usage = KeyUsage::parse(key_usage)?;
    let extended_key_usage = ExtendedKeyUsage::parse(extended_key_usage)?;

    let mut extensions = Vec::new();
    if !san.entries.is_empty() {
        extensions.push(ExtensionParam::from_extension(&san, false)?);
    }
    if !key_usage.0.is_empty() {
        extensions.push(ExtensionParam::from_extension(&key_usage, true)?);
    }
    if !extended_key_usage.usage.is_empty() {
        extensions.push(ExtensionParam::from_extension(&extended_key_usage, false)?);
    }
    Ok(extensions)
}
