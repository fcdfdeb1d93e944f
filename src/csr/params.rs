use std::fmt;
use std::sync::LazyLock;

use bon::Builder;
use const_oid::ObjectIdentifier;
use der::Tag;
use der::asn1::{Any, OctetString, PrintableStringRef, SetOfVec};
use regex::Regex;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::ext::Extension;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
use crate::error::{MakeCsrError, Result};

/// Address pattern accepted for `emailAddress` and email SAN entries.
pub(crate) static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

const PKCS9_EMAIL_ADDRESS: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

/// Attribute types that may appear in a request subject.
///
/// The declaration order is the canonical encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubjectAttribute {
    CommonName,
    Organization,
    OrganizationalUnit,
    Locality,
    State,
    Country,
    EmailAddress,
}

impl SubjectAttribute {
    pub const CANONICAL_ORDER: [SubjectAttribute; 7] = [
        SubjectAttribute::CommonName,
        SubjectAttribute::Organization,
        SubjectAttribute::OrganizationalUnit,
        SubjectAttribute::Locality,
        SubjectAttribute::State,
        SubjectAttribute::Country,
        SubjectAttribute::EmailAddress,
    ];

    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            SubjectAttribute::CommonName => ObjectIdentifier::new_unwrap("2.5.4.3"),
            SubjectAttribute::Organization => ObjectIdentifier::new_unwrap("2.5.4.10"),
            SubjectAttribute::OrganizationalUnit => ObjectIdentifier::new_unwrap("2.5.4.11"),
            SubjectAttribute::Locality => ObjectIdentifier::new_unwrap("2.5.4.7"),
            SubjectAttribute::State => ObjectIdentifier::new_unwrap("2.5.4.8"),
            SubjectAttribute::Country => ObjectIdentifier::new_unwrap("2.5.4.6"),
            SubjectAttribute::EmailAddress => PKCS9_EMAIL_ADDRESS,
        }
    }

    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        Self::CANONICAL_ORDER
            .into_iter()
            .find(|attr| attr.oid() == *oid)
    }

    /// Short name as used in RFC 4514 strings and OpenSSL output.
    pub fn short_name(&self) -> &'static str {
        match self {
            SubjectAttribute::CommonName => "CN",
            SubjectAttribute::Organization => "O",
            SubjectAttribute::OrganizationalUnit => "OU",
            SubjectAttribute::Locality => "L",
            SubjectAttribute::State => "ST",
            SubjectAttribute::Country => "C",
            SubjectAttribute::EmailAddress => "emailAddress",
        }
    }

    /// Name of the input field this attribute comes from.
    pub fn field_name(&self) -> &'static str {
        match self {
            SubjectAttribute::CommonName => "common_name",
            SubjectAttribute::Organization => "organization",
            SubjectAttribute::OrganizationalUnit => "organizational_unit",
            SubjectAttribute::Locality => "locality",
            SubjectAttribute::State => "state",
            SubjectAttribute::Country => "country",
            SubjectAttribute::EmailAddress => "email",
        }
    }

    fn validate(&self, value: &str) -> Result<()> {
        match self {
            SubjectAttribute::Country => {
                if value.len() != 2 || !value.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(MakeCsrError::invalid_field(
                        self.field_name(),
                        format!("'{value}' is not a two-letter country code"),
                    ));
                }
            }
            SubjectAttribute::EmailAddress => {
                if !EMAIL_PATTERN.is_match(value) {
                    return Err(MakeCsrError::invalid_field(
                        self.field_name(),
                        format!("'{value}' is not a valid email address"),
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn encode_value(&self, value: &str) -> Result<Any> {
        let any = match self {
            SubjectAttribute::Country => {
                PrintableStringRef::new(value)?;
                Any::new(Tag::PrintableString, value.as_bytes())?
            }
            SubjectAttribute::EmailAddress => Any::new(Tag::Ia5String, value.as_bytes())?,
            _ => Any::new(Tag::Utf8String, value.as_bytes())?,
        };
        Ok(any)
    }
}

impl fmt::Display for SubjectAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// User supplied subject fields, before validation.
///
/// # Fields
/// * `common_name` - The common name (CN). Required.
/// * `organization` - The organization (O).
/// * `organizational_unit` - The organizational unit (OU).
/// * `locality` - The locality or city (L).
/// * `state` - The state or province (ST).
/// * `country` - The two-letter country code (C).
/// * `email` - The PKCS#9 email address.
#[derive(Clone, Debug, Default, Builder)]
pub struct SubjectFields {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
}

impl SubjectFields {
    /// Fields as attribute pairs, skipping the ones that were not supplied.
    pub fn to_pairs(&self) -> Vec<(SubjectAttribute, String)> {
        [
            (SubjectAttribute::CommonName, &self.common_name),
            (SubjectAttribute::Organization, &self.organization),
            (SubjectAttribute::OrganizationalUnit, &self.organizational_unit),
            (SubjectAttribute::Locality, &self.locality),
            (SubjectAttribute::State, &self.state),
            (SubjectAttribute::Country, &self.country),
            (SubjectAttribute::EmailAddress, &self.email),
        ]
        .into_iter()
        .filter_map(|(attr, value)| value.clone().map(|v| (attr, v)))
        .collect()
    }
}

/// A validated distinguished name, held in canonical attribute order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subject {
    attributes: Vec<(SubjectAttribute, String)>,
}

impl Subject {
    /// Validate `fields` and build a subject.
    ///
    /// Fails with [`MakeCsrError::MissingCommonName`] when the common name is
    /// absent or blank, and with [`MakeCsrError::EmptyField`] when any other
    /// supplied field is blank after trimming.
    pub fn build(fields: &SubjectFields) -> Result<Self> {
        Self::from_pairs(fields.to_pairs())
    }

    /// Build a subject from attribute pairs given in any order.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (SubjectAttribute, String)>,
    {
        let mut attributes: Vec<(SubjectAttribute, String)> = Vec::new();
        for (attr, value) in pairs {
            let value = value.trim();
            if value.is_empty() {
                return Err(match attr {
                    SubjectAttribute::CommonName => MakeCsrError::MissingCommonName,
                    other => MakeCsrError::EmptyField(other.field_name().to_string()),
                });
            }
            if attributes.iter().any(|(seen, _)| *seen == attr) {
                return Err(MakeCsrError::invalid_field(
                    attr.field_name(),
                    "specified more than once",
                ));
            }
            attr.validate(value)?;
            attributes.push((attr, value.to_string()));
        }

        if !attributes
            .iter()
            .any(|(attr, _)| *attr == SubjectAttribute::CommonName)
        {
            return Err(MakeCsrError::MissingCommonName);
        }

        attributes.sort_by_key(|(attr, _)| *attr);
        Ok(Self { attributes })
    }

    pub fn common_name(&self) -> &str {
        self.get(SubjectAttribute::CommonName).unwrap_or_default()
    }

    pub fn get(&self, attr: SubjectAttribute) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(a, _)| *a == attr)
            .map(|(_, v)| v.as_str())
    }

    /// Attributes in canonical order.
    pub fn attributes(&self) -> &[(SubjectAttribute, String)] {
        &self.attributes
    }

    /// Converts the subject to an X.509 name, one attribute per RDN.
    pub fn as_x509_name(&self) -> Result<Name> {
        let rdns = self
            .attributes
            .iter()
            .map(|(attr, value)| {
                let atv = AttributeTypeAndValue {
                    oid: attr.oid(),
                    value: attr.encode_value(value)?,
                };
                Ok(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RdnSequence(rdns))
    }

    /// Creates a `Subject` from an X.509 name.
    ///
    /// Attribute types outside [`SubjectAttribute`] are skipped.
    pub fn from_x509_name(name: &Name) -> Result<Self> {
        let mut pairs = Vec::new();
        for rdn in name.0.iter() {
            for atv in rdn.0.iter() {
                let Some(attr) = SubjectAttribute::from_oid(&atv.oid) else {
                    continue;
                };
                let value = std::str::from_utf8(atv.value.value()).map_err(|e| {
                    MakeCsrError::DecodingError(format!("{attr} is not valid text: {e}"))
                })?;
                pairs.push((attr, value.to_string()));
            }
        }
        Self::from_pairs(pairs)
    }
}

impl fmt::Display for Subject {
    /// Renders the subject as `CN=..., O=..., C=...` in canonical order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (attr, value)) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{attr}={value}")?;
        }
        Ok(())
    }
}

/// Represents an X.509 extension requested for the certificate.
///
/// This struct contains the OID, criticality, and value of an extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: &E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        E::from_x509_extension_value(&self.value)
    }

    pub fn to_x509_extension(&self) -> Result<Extension> {
        Ok(Extension {
            extn_id: self.oid,
            critical: self.critical,
            extn_value: OctetString::new(self.value.clone())?,
        })
    }

    pub fn from_x509_extension(ext: &Extension) -> Self {
        Self {
            oid: ext.extn_id,
            critical: ext.critical,
            value: ext.extn_value.as_bytes().to_vec(),
        }
    }
}
