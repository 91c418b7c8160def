//! Typed X.509 v3 extensions (RFC 5280 §4.2 and §5.2).

use std::fmt;

use num_traits::ToPrimitive;
use pathkit_types::{Asn1Error, Asn1ResultExt};
use pathkit_utils::asn1::{
    decode_bit_string, decode_boolean, decode_integer, decode_string, encode_string, BitString,
    ChoiceTable, Decoder, Encoder, StringKind, Tag, TagClass, Tlv,
};
use pathkit_utils::oid::{known, Oid};

use super::name::{DistinguishedName, NameAttribute};

/// An extension whose `extnValue` has a typed representation.
pub trait ExtensionValue: Sized {
    /// The `extnID` this type decodes.
    fn oid() -> Oid;
    /// Decode the contents of `extnValue`.
    fn parse(value: &[u8]) -> Result<Self, Asn1Error>;
    /// Encode the contents of `extnValue`.
    fn encode(&self) -> Result<Vec<u8>, Asn1Error>;
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

fn sequence(contents: &[u8]) -> Vec<u8> {
    let mut out = Encoder::new();
    out.write_sequence(contents);
    out.finish()
}

/// Parse a whole `extnValue` with `f`, rejecting trailing data.
fn parse_whole<T>(
    value: &[u8],
    f: impl FnOnce(&mut Decoder<'_>) -> Result<T, Asn1Error>,
) -> Result<T, Asn1Error> {
    let mut dec = Decoder::new(value);
    let out = f(&mut dec)?;
    dec.finish()?;
    Ok(out)
}

fn implicit_u32(tlv: &Tlv<'_>) -> Result<u32, Asn1Error> {
    decode_integer(tlv.value, tlv.rules)?
        .to_u32()
        .ok_or(Asn1Error::IntegerOverflow)
}

fn implicit_bool(tlv: &Tlv<'_>) -> Result<bool, Asn1Error> {
    decode_boolean(tlv.value, tlv.rules)
}

fn implicit_bits(tlv: &Tlv<'_>) -> Result<BitString, Asn1Error> {
    let (unused, data) = decode_bit_string(tlv.value, tlv.rules)?;
    BitString::new(data.to_vec(), unused)
}

/// `[n] IMPLICIT INTEGER` for a small non-negative value.
fn write_implicit_u32(enc: &mut Encoder, n: u32, value: u32) {
    let mut int = Encoder::new();
    int.write_u64(u64::from(value));
    let der = int.finish();
    // short identifier and short length: content starts at 2
    enc.write_context_specific(n, false, &der[2..]);
}

fn write_implicit_bits(enc: &mut Encoder, n: u32, bits: &BitString) {
    let mut content = Vec::with_capacity(bits.as_bytes().len() + 1);
    content.push(bits.unused_bits());
    content.extend_from_slice(bits.as_bytes());
    enc.write_context_specific(n, false, &content);
}

fn mask_from_bits(bits: &BitString, width: usize) -> u16 {
    (0..width)
        .filter(|&i| bits.bit(i))
        .fold(0, |mask, i| mask | (1 << i))
}

fn bits_from_mask(mask: u16, width: usize) -> BitString {
    let flags: Vec<bool> = (0..width).map(|i| mask & (1 << i) != 0).collect();
    BitString::from_flags(&flags)
}

// ---------------------------------------------------------------------------
// GeneralName
// ---------------------------------------------------------------------------

/// `GeneralName` CHOICE (RFC 5280 §4.2.1.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneralName {
    OtherName { type_id: Oid, value: Vec<u8> },
    Rfc822Name(String),
    DnsName(String),
    /// Content octets, not interpreted.
    X400Address(Vec<u8>),
    DirectoryName(DistinguishedName),
    /// Content octets, not interpreted.
    EdiPartyName(Vec<u8>),
    Uri(String),
    IpAddress(Vec<u8>),
    RegisteredId(Oid),
}

fn gn_other_name(tlv: &Tlv<'_>) -> Result<GeneralName, Asn1Error> {
    let mut dec = tlv.contents();
    let type_id = dec.read_oid()?;
    let mut value = dec.read_explicit(0)?;
    let inner = value.read_tlv()?.raw.to_vec();
    value.finish()?;
    dec.finish()?;
    Ok(GeneralName::OtherName {
        type_id,
        value: inner,
    })
}

fn gn_rfc822(tlv: &Tlv<'_>) -> Result<GeneralName, Asn1Error> {
    decode_string(StringKind::Ia5, tlv.value).map(GeneralName::Rfc822Name)
}

fn gn_dns(tlv: &Tlv<'_>) -> Result<GeneralName, Asn1Error> {
    decode_string(StringKind::Ia5, tlv.value).map(GeneralName::DnsName)
}

fn gn_x400(tlv: &Tlv<'_>) -> Result<GeneralName, Asn1Error> {
    Ok(GeneralName::X400Address(tlv.value.to_vec()))
}

fn gn_directory(tlv: &Tlv<'_>) -> Result<GeneralName, Asn1Error> {
    let mut dec = tlv.contents();
    let name = DistinguishedName::parse(&mut dec)?;
    dec.finish()?;
    Ok(GeneralName::DirectoryName(name))
}

fn gn_edi(tlv: &Tlv<'_>) -> Result<GeneralName, Asn1Error> {
    Ok(GeneralName::EdiPartyName(tlv.value.to_vec()))
}

fn gn_uri(tlv: &Tlv<'_>) -> Result<GeneralName, Asn1Error> {
    decode_string(StringKind::Ia5, tlv.value).map(GeneralName::Uri)
}

fn gn_ip(tlv: &Tlv<'_>) -> Result<GeneralName, Asn1Error> {
    Ok(GeneralName::IpAddress(tlv.value.to_vec()))
}

fn gn_registered_id(tlv: &Tlv<'_>) -> Result<GeneralName, Asn1Error> {
    Oid::from_der_value(tlv.value).map(GeneralName::RegisteredId)
}

static GENERAL_NAME: ChoiceTable<GeneralName> = ChoiceTable::new(
    "GeneralName",
    &[
        (TagClass::ContextSpecific, 0, gn_other_name),
        (TagClass::ContextSpecific, 1, gn_rfc822),
        (TagClass::ContextSpecific, 2, gn_dns),
        (TagClass::ContextSpecific, 3, gn_x400),
        (TagClass::ContextSpecific, 4, gn_directory),
        (TagClass::ContextSpecific, 5, gn_edi),
        (TagClass::ContextSpecific, 6, gn_uri),
        (TagClass::ContextSpecific, 7, gn_ip),
        (TagClass::ContextSpecific, 8, gn_registered_id),
    ],
);

impl GeneralName {
    pub fn parse(dec: &mut Decoder<'_>) -> Result<Self, Asn1Error> {
        GENERAL_NAME.decode(dec)
    }

    pub fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut enc = Encoder::new();
        match self {
            GeneralName::OtherName { type_id, value } => {
                let mut inner = Encoder::new();
                inner.write_oid(type_id)?;
                inner.write_explicit(0, value);
                enc.write_context_specific(0, true, &inner.finish());
            }
            GeneralName::Rfc822Name(s) => {
                enc.write_context_specific(1, false, &encode_string(StringKind::Ia5, s)?);
            }
            GeneralName::DnsName(s) => {
                enc.write_context_specific(2, false, &encode_string(StringKind::Ia5, s)?);
            }
            GeneralName::X400Address(raw) => {
                enc.write_context_specific(3, true, raw);
            }
            GeneralName::DirectoryName(name) => {
                enc.write_explicit(4, name.der());
            }
            GeneralName::EdiPartyName(raw) => {
                enc.write_context_specific(5, true, raw);
            }
            GeneralName::Uri(s) => {
                enc.write_context_specific(6, false, &encode_string(StringKind::Ia5, s)?);
            }
            GeneralName::IpAddress(ip) => {
                enc.write_context_specific(7, false, ip);
            }
            GeneralName::RegisteredId(oid) => {
                enc.write_context_specific(8, false, &oid.to_der_value()?);
            }
        }
        Ok(enc.finish())
    }
}

impl fmt::Display for GeneralName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneralName::OtherName { type_id, .. } => write!(f, "othername:{type_id}"),
            GeneralName::Rfc822Name(s) => write!(f, "email:{s}"),
            GeneralName::DnsName(s) => write!(f, "DNS:{s}"),
            GeneralName::X400Address(_) => f.write_str("X400Name"),
            GeneralName::DirectoryName(name) => write!(f, "DirName:{name}"),
            GeneralName::EdiPartyName(_) => f.write_str("EdiPartyName"),
            GeneralName::Uri(s) => write!(f, "URI:{s}"),
            GeneralName::IpAddress(ip) if ip.len() == 4 => {
                write!(f, "IP:{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3])
            }
            GeneralName::IpAddress(ip) => {
                f.write_str("IP:")?;
                for b in ip {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            GeneralName::RegisteredId(oid) => write!(f, "RID:{oid}"),
        }
    }
}

pub(crate) fn parse_general_names(dec: &mut Decoder<'_>) -> Result<Vec<GeneralName>, Asn1Error> {
    let mut names = Vec::new();
    while !dec.is_empty() {
        names.push(GeneralName::parse(dec)?);
    }
    if names.is_empty() {
        return Err(Asn1Error::malformed(dec.offset(), "empty GeneralNames"));
    }
    Ok(names)
}

pub(crate) fn encode_general_names(names: &[GeneralName]) -> Result<Vec<u8>, Asn1Error> {
    let mut out = Vec::new();
    for name in names {
        out.extend_from_slice(&name.encode()?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Key and usage extensions
// ---------------------------------------------------------------------------

/// Basic constraints (RFC 5280 §4.2.1.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BasicConstraints {
    pub ca: bool,
    pub path_len_constraint: Option<u32>,
}

impl ExtensionValue for BasicConstraints {
    fn oid() -> Oid {
        known::basic_constraints()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            let mut seq = dec.read_sequence()?;
            let ca = if seq.next_is(TagClass::Universal, pathkit_utils::asn1::tags::BOOLEAN) {
                seq.read_boolean().at("cA")?
            } else {
                false
            };
            let path_len_constraint = if seq.is_empty() {
                None
            } else {
                Some(seq.read_u32().at("pathLenConstraint")?)
            };
            seq.finish()?;
            Ok(BasicConstraints {
                ca,
                path_len_constraint,
            })
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        if self.ca {
            inner.write_boolean(true);
        }
        if let Some(len) = self.path_len_constraint {
            inner.write_u64(u64::from(len));
        }
        Ok(sequence(&inner.finish()))
    }
}

/// Key usage bits (RFC 5280 §4.2.1.3). Bit `i` of the named bit list is
/// `1 << i` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyUsage(pub u16);

impl KeyUsage {
    pub const DIGITAL_SIGNATURE: u16 = 1 << 0;
    pub const NON_REPUDIATION: u16 = 1 << 1;
    pub const KEY_ENCIPHERMENT: u16 = 1 << 2;
    pub const DATA_ENCIPHERMENT: u16 = 1 << 3;
    pub const KEY_AGREEMENT: u16 = 1 << 4;
    pub const KEY_CERT_SIGN: u16 = 1 << 5;
    pub const CRL_SIGN: u16 = 1 << 6;
    pub const ENCIPHER_ONLY: u16 = 1 << 7;
    pub const DECIPHER_ONLY: u16 = 1 << 8;

    pub fn has(&self, flag: u16) -> bool {
        self.0 & flag == flag
    }
}

impl ExtensionValue for KeyUsage {
    fn oid() -> Oid {
        known::key_usage()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            let bits = dec.read_bit_string()?;
            Ok(KeyUsage(mask_from_bits(&bits, 9)))
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let bits = bits_from_mask(self.0, 9);
        let mut enc = Encoder::new();
        enc.write_bit_string(bits.unused_bits(), bits.as_bytes());
        Ok(enc.finish())
    }
}

/// Extended key usage (RFC 5280 §4.2.1.12).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedKeyUsage {
    pub purposes: Vec<Oid>,
}

impl ExtendedKeyUsage {
    pub fn contains(&self, purpose: &Oid) -> bool {
        self.purposes.iter().any(|p| p == purpose)
    }

    /// Whether the certificate may be used for `purpose`, honouring
    /// anyExtendedKeyUsage.
    pub fn permits(&self, purpose: &Oid) -> bool {
        self.contains(purpose) || self.contains(&known::any_extended_key_usage())
    }
}

impl ExtensionValue for ExtendedKeyUsage {
    fn oid() -> Oid {
        known::ext_key_usage()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            let mut seq = dec.read_sequence()?;
            let mut purposes = Vec::new();
            while !seq.is_empty() {
                purposes.push(seq.read_oid()?);
            }
            if purposes.is_empty() {
                return Err(Asn1Error::malformed(seq.offset(), "empty ExtKeyUsageSyntax"));
            }
            Ok(ExtendedKeyUsage { purposes })
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        for p in &self.purposes {
            inner.write_oid(p)?;
        }
        Ok(sequence(&inner.finish()))
    }
}

/// Subject alternative name (RFC 5280 §4.2.1.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectAltName {
    pub names: Vec<GeneralName>,
}

impl SubjectAltName {
    pub fn dns_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().filter_map(|n| match n {
            GeneralName::DnsName(s) => Some(s.as_str()),
            _ => None,
        })
    }
}

impl ExtensionValue for SubjectAltName {
    fn oid() -> Oid {
        known::subject_alt_name()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            let mut seq = dec.read_sequence()?;
            Ok(SubjectAltName {
                names: parse_general_names(&mut seq)?,
            })
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        Ok(sequence(&encode_general_names(&self.names)?))
    }
}

/// Authority key identifier (RFC 5280 §4.2.1.1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthorityKeyIdentifier {
    pub key_identifier: Option<Vec<u8>>,
    pub authority_cert_issuer: Option<Vec<GeneralName>>,
    pub authority_cert_serial: Option<Vec<u8>>,
}

impl ExtensionValue for AuthorityKeyIdentifier {
    fn oid() -> Oid {
        known::authority_key_identifier()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            let mut seq = dec.read_sequence()?;
            let key_identifier = seq
                .try_read_context_specific(0, false)?
                .map(|t| t.value.to_vec());
            let authority_cert_issuer = match seq.try_read_context_specific(1, true)? {
                Some(t) => Some(parse_general_names(&mut t.contents()).at("authorityCertIssuer")?),
                None => None,
            };
            let authority_cert_serial = match seq.try_read_context_specific(2, false)? {
                Some(t) => {
                    decode_integer(t.value, t.rules).at("authorityCertSerialNumber")?;
                    Some(t.value.to_vec())
                }
                None => None,
            };
            seq.finish()?;
            Ok(AuthorityKeyIdentifier {
                key_identifier,
                authority_cert_issuer,
                authority_cert_serial,
            })
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        if let Some(id) = &self.key_identifier {
            inner.write_context_specific(0, false, id);
        }
        if let Some(names) = &self.authority_cert_issuer {
            inner.write_context_specific(1, true, &encode_general_names(names)?);
        }
        if let Some(serial) = &self.authority_cert_serial {
            inner.write_context_specific(2, false, serial);
        }
        Ok(sequence(&inner.finish()))
    }
}

/// Subject key identifier (RFC 5280 §4.2.1.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectKeyIdentifier(pub Vec<u8>);

impl ExtensionValue for SubjectKeyIdentifier {
    fn oid() -> Oid {
        known::subject_key_identifier()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            Ok(SubjectKeyIdentifier(dec.read_octet_string()?.into_owned()))
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut enc = Encoder::new();
        enc.write_octet_string(&self.0);
        Ok(enc.finish())
    }
}

/// One `AccessDescription`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDescription {
    pub method: Oid,
    pub location: GeneralName,
}

/// Authority information access (RFC 5280 §4.2.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityInfoAccess {
    pub descriptions: Vec<AccessDescription>,
}

impl AuthorityInfoAccess {
    /// URIs of id-ad-ocsp access descriptions.
    pub fn ocsp_uris(&self) -> Vec<&str> {
        self.uris_for(&known::ad_ocsp())
    }

    /// URIs of id-ad-caIssuers access descriptions.
    pub fn ca_issuer_uris(&self) -> Vec<&str> {
        self.uris_for(&known::ad_ca_issuers())
    }

    fn uris_for(&self, method: &Oid) -> Vec<&str> {
        self.descriptions
            .iter()
            .filter(|d| &d.method == method)
            .filter_map(|d| match &d.location {
                GeneralName::Uri(u) => Some(u.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl ExtensionValue for AuthorityInfoAccess {
    fn oid() -> Oid {
        known::authority_info_access()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            let mut seq = dec.read_sequence()?;
            let mut descriptions = Vec::new();
            while !seq.is_empty() {
                let mut ad = seq.read_sequence()?;
                let method = ad.read_oid()?;
                let location = GeneralName::parse(&mut ad)?;
                ad.finish()?;
                descriptions.push(AccessDescription { method, location });
            }
            Ok(AuthorityInfoAccess { descriptions })
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        for d in &self.descriptions {
            let mut ad = Encoder::new();
            ad.write_oid(&d.method)?;
            ad.write_raw(&d.location.encode()?);
            inner.write_sequence(&ad.finish());
        }
        Ok(sequence(&inner.finish()))
    }
}

// ---------------------------------------------------------------------------
// Name constraints
// ---------------------------------------------------------------------------

/// `GeneralSubtree` (RFC 5280 §4.2.1.10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralSubtree {
    pub base: GeneralName,
    pub minimum: u32,
    pub maximum: Option<u32>,
}

impl GeneralSubtree {
    pub fn new(base: GeneralName) -> Self {
        GeneralSubtree {
            base,
            minimum: 0,
            maximum: None,
        }
    }
}

/// Name constraints (RFC 5280 §4.2.1.10).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameConstraints {
    pub permitted_subtrees: Option<Vec<GeneralSubtree>>,
    pub excluded_subtrees: Option<Vec<GeneralSubtree>>,
}

fn parse_subtrees(tlv: &Tlv<'_>) -> Result<Vec<GeneralSubtree>, Asn1Error> {
    let mut dec = tlv.contents();
    let mut subtrees = Vec::new();
    while !dec.is_empty() {
        let mut seq = dec.read_sequence()?;
        let base = GeneralName::parse(&mut seq).at("base")?;
        let minimum = match seq.try_read_context_specific(0, false)? {
            Some(t) => implicit_u32(&t).at("minimum")?,
            None => 0,
        };
        let maximum = match seq.try_read_context_specific(1, false)? {
            Some(t) => Some(implicit_u32(&t).at("maximum")?),
            None => None,
        };
        seq.finish()?;
        subtrees.push(GeneralSubtree {
            base,
            minimum,
            maximum,
        });
    }
    Ok(subtrees)
}

fn encode_subtrees(subtrees: &[GeneralSubtree]) -> Result<Vec<u8>, Asn1Error> {
    let mut out = Encoder::new();
    for s in subtrees {
        let mut inner = Encoder::new();
        inner.write_raw(&s.base.encode()?);
        if s.minimum != 0 {
            write_implicit_u32(&mut inner, 0, s.minimum);
        }
        if let Some(max) = s.maximum {
            write_implicit_u32(&mut inner, 1, max);
        }
        out.write_sequence(&inner.finish());
    }
    Ok(out.finish())
}

impl ExtensionValue for NameConstraints {
    fn oid() -> Oid {
        known::name_constraints()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            let mut seq = dec.read_sequence()?;
            let permitted_subtrees = match seq.try_read_context_specific(0, true)? {
                Some(t) => Some(parse_subtrees(&t).at("permittedSubtrees")?),
                None => None,
            };
            let excluded_subtrees = match seq.try_read_context_specific(1, true)? {
                Some(t) => Some(parse_subtrees(&t).at("excludedSubtrees")?),
                None => None,
            };
            seq.finish()?;
            Ok(NameConstraints {
                permitted_subtrees,
                excluded_subtrees,
            })
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        if let Some(p) = &self.permitted_subtrees {
            inner.write_context_specific(0, true, &encode_subtrees(p)?);
        }
        if let Some(e) = &self.excluded_subtrees {
            inner.write_context_specific(1, true, &encode_subtrees(e)?);
        }
        Ok(sequence(&inner.finish()))
    }
}

// ---------------------------------------------------------------------------
// Policy extensions
// ---------------------------------------------------------------------------

/// `PolicyQualifierInfo`, qualifier kept as raw DER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyQualifier {
    pub id: Oid,
    pub qualifier: Vec<u8>,
}

/// `PolicyInformation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyInformation {
    pub policy_id: Oid,
    pub qualifiers: Vec<PolicyQualifier>,
}

impl PolicyInformation {
    pub fn new(policy_id: Oid) -> Self {
        PolicyInformation {
            policy_id,
            qualifiers: Vec::new(),
        }
    }
}

/// Certificate policies (RFC 5280 §4.2.1.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePolicies {
    pub policies: Vec<PolicyInformation>,
}

impl CertificatePolicies {
    pub fn from_oids(oids: &[Oid]) -> Self {
        CertificatePolicies {
            policies: oids.iter().cloned().map(PolicyInformation::new).collect(),
        }
    }
}

impl ExtensionValue for CertificatePolicies {
    fn oid() -> Oid {
        known::certificate_policies()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            let mut seq = dec.read_sequence()?;
            let mut policies: Vec<PolicyInformation> = Vec::new();
            while !seq.is_empty() {
                let offset = seq.offset();
                let mut info = seq.read_sequence()?;
                let policy_id = info.read_oid().at("policyIdentifier")?;
                let mut qualifiers = Vec::new();
                if !info.is_empty() {
                    let mut qs = info.read_sequence().at("policyQualifiers")?;
                    while !qs.is_empty() {
                        let mut q = qs.read_sequence()?;
                        let id = q.read_oid()?;
                        let qualifier = q.read_tlv()?.raw.to_vec();
                        q.finish()?;
                        qualifiers.push(PolicyQualifier { id, qualifier });
                    }
                }
                info.finish()?;
                if policies.iter().any(|p| p.policy_id == policy_id) {
                    return Err(Asn1Error::malformed(offset, "policy identifier repeated"));
                }
                policies.push(PolicyInformation {
                    policy_id,
                    qualifiers,
                });
            }
            Ok(CertificatePolicies { policies })
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        for p in &self.policies {
            let mut info = Encoder::new();
            info.write_oid(&p.policy_id)?;
            if !p.qualifiers.is_empty() {
                let mut qs = Encoder::new();
                for q in &p.qualifiers {
                    let mut qi = Encoder::new();
                    qi.write_oid(&q.id)?;
                    qi.write_raw(&q.qualifier);
                    qs.write_sequence(&qi.finish());
                }
                info.write_sequence(&qs.finish());
            }
            inner.write_sequence(&info.finish());
        }
        Ok(sequence(&inner.finish()))
    }
}

/// One issuer-to-subject policy mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyMapping {
    pub issuer_domain_policy: Oid,
    pub subject_domain_policy: Oid,
}

/// Policy mappings (RFC 5280 §4.2.1.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyMappings {
    pub mappings: Vec<PolicyMapping>,
}

impl ExtensionValue for PolicyMappings {
    fn oid() -> Oid {
        known::policy_mappings()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            let mut seq = dec.read_sequence()?;
            let mut mappings = Vec::new();
            while !seq.is_empty() {
                let mut m = seq.read_sequence()?;
                let issuer_domain_policy = m.read_oid()?;
                let subject_domain_policy = m.read_oid()?;
                m.finish()?;
                mappings.push(PolicyMapping {
                    issuer_domain_policy,
                    subject_domain_policy,
                });
            }
            Ok(PolicyMappings { mappings })
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        for m in &self.mappings {
            let mut pair = Encoder::new();
            pair.write_oid(&m.issuer_domain_policy)?;
            pair.write_oid(&m.subject_domain_policy)?;
            inner.write_sequence(&pair.finish());
        }
        Ok(sequence(&inner.finish()))
    }
}

/// Policy constraints (RFC 5280 §4.2.1.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolicyConstraints {
    pub require_explicit_policy: Option<u32>,
    pub inhibit_policy_mapping: Option<u32>,
}

impl ExtensionValue for PolicyConstraints {
    fn oid() -> Oid {
        known::policy_constraints()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            let mut seq = dec.read_sequence()?;
            let require_explicit_policy = match seq.try_read_context_specific(0, false)? {
                Some(t) => Some(implicit_u32(&t).at("requireExplicitPolicy")?),
                None => None,
            };
            let inhibit_policy_mapping = match seq.try_read_context_specific(1, false)? {
                Some(t) => Some(implicit_u32(&t).at("inhibitPolicyMapping")?),
                None => None,
            };
            seq.finish()?;
            if require_explicit_policy.is_none() && inhibit_policy_mapping.is_none() {
                return Err(Asn1Error::malformed(seq.offset(), "empty PolicyConstraints"));
            }
            Ok(PolicyConstraints {
                require_explicit_policy,
                inhibit_policy_mapping,
            })
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        if self.require_explicit_policy.is_none() && self.inhibit_policy_mapping.is_none() {
            return Err(Asn1Error::malformed(0, "empty PolicyConstraints"));
        }
        let mut inner = Encoder::new();
        if let Some(n) = self.require_explicit_policy {
            write_implicit_u32(&mut inner, 0, n);
        }
        if let Some(n) = self.inhibit_policy_mapping {
            write_implicit_u32(&mut inner, 1, n);
        }
        Ok(sequence(&inner.finish()))
    }
}

/// Inhibit anyPolicy (RFC 5280 §4.2.1.14).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InhibitAnyPolicy {
    pub skip_certs: u32,
}

impl ExtensionValue for InhibitAnyPolicy {
    fn oid() -> Oid {
        known::inhibit_any_policy()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            Ok(InhibitAnyPolicy {
                skip_certs: dec.read_u32()?,
            })
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut enc = Encoder::new();
        enc.write_u64(u64::from(self.skip_certs));
        Ok(enc.finish())
    }
}

// ---------------------------------------------------------------------------
// CRL distribution points
// ---------------------------------------------------------------------------

/// `ReasonFlags` (RFC 5280 §4.2.1.13). Bit `i` of the named bit list is
/// `1 << i` here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReasonFlags(pub u16);

impl ReasonFlags {
    pub const UNUSED: u16 = 1 << 0;
    pub const KEY_COMPROMISE: u16 = 1 << 1;
    pub const CA_COMPROMISE: u16 = 1 << 2;
    pub const AFFILIATION_CHANGED: u16 = 1 << 3;
    pub const SUPERSEDED: u16 = 1 << 4;
    pub const CESSATION_OF_OPERATION: u16 = 1 << 5;
    pub const CERTIFICATE_HOLD: u16 = 1 << 6;
    pub const PRIVILEGE_WITHDRAWN: u16 = 1 << 7;
    pub const AA_COMPROMISE: u16 = 1 << 8;

    /// Every reason a CRL can cover.
    pub const ALL: ReasonFlags = ReasonFlags(0x01fe);

    pub fn has(&self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub fn union(self, other: ReasonFlags) -> ReasonFlags {
        ReasonFlags(self.0 | other.0)
    }

    pub fn intersection(self, other: ReasonFlags) -> ReasonFlags {
        ReasonFlags(self.0 & other.0)
    }

    /// Whether every reason in `other` is also in `self`.
    pub fn covers(&self, other: ReasonFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn parse_implicit(tlv: &Tlv<'_>) -> Result<Self, Asn1Error> {
        implicit_bits(tlv).map(|b| ReasonFlags(mask_from_bits(&b, 9)))
    }

    fn write_implicit(&self, enc: &mut Encoder, n: u32) {
        write_implicit_bits(enc, n, &bits_from_mask(self.0, 9));
    }
}

/// `DistributionPointName` CHOICE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionPointName {
    FullName(Vec<GeneralName>),
    NameRelativeToCrlIssuer(Vec<NameAttribute>),
}

fn dpn_full_name(tlv: &Tlv<'_>) -> Result<DistributionPointName, Asn1Error> {
    parse_general_names(&mut tlv.contents()).map(DistributionPointName::FullName)
}

fn dpn_relative(tlv: &Tlv<'_>) -> Result<DistributionPointName, Asn1Error> {
    let mut dec = tlv.contents();
    let mut attrs = Vec::new();
    while !dec.is_empty() {
        attrs.push(NameAttribute::parse(&mut dec)?);
    }
    Ok(DistributionPointName::NameRelativeToCrlIssuer(attrs))
}

static DISTRIBUTION_POINT_NAME: ChoiceTable<DistributionPointName> = ChoiceTable::new(
    "DistributionPointName",
    &[
        (TagClass::ContextSpecific, 0, dpn_full_name),
        (TagClass::ContextSpecific, 1, dpn_relative),
    ],
);

impl DistributionPointName {
    /// Read `[0] EXPLICIT DistributionPointName`.
    fn parse_tagged(tlv: &Tlv<'_>) -> Result<Self, Asn1Error> {
        let mut dec = tlv.contents();
        let name = DISTRIBUTION_POINT_NAME.decode(&mut dec)?;
        dec.finish()?;
        Ok(name)
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut enc = Encoder::new();
        match self {
            DistributionPointName::FullName(names) => {
                enc.write_context_specific(0, true, &encode_general_names(names)?);
            }
            DistributionPointName::NameRelativeToCrlIssuer(attrs) => {
                let members = attrs
                    .iter()
                    .map(NameAttribute::encode)
                    .collect::<Result<Vec<_>, _>>()?;
                let mut set = Encoder::new();
                set.write_set_of(&members);
                // swap the SET identifier for [1]
                let mut der = set.finish();
                if let Some(first) = der.first_mut() {
                    *first = Tag::context(1, true).to_bytes()[0];
                }
                enc.write_raw(&der);
            }
        }
        Ok(enc.finish())
    }

    /// Resolve to full names, appending a relative name to the CRL issuer.
    pub fn full_names(&self, crl_issuer: &DistinguishedName) -> Vec<GeneralName> {
        match self {
            DistributionPointName::FullName(names) => names.clone(),
            DistributionPointName::NameRelativeToCrlIssuer(attrs) => {
                let mut rdns = crl_issuer.rdns().to_vec();
                rdns.push(attrs.clone());
                DistinguishedName::from_rdns(rdns)
                    .map(|dn| vec![GeneralName::DirectoryName(dn)])
                    .unwrap_or_default()
            }
        }
    }
}

/// One `DistributionPoint`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DistributionPoint {
    pub name: Option<DistributionPointName>,
    pub reasons: Option<ReasonFlags>,
    pub crl_issuer: Option<Vec<GeneralName>>,
}

/// CRL distribution points (RFC 5280 §4.2.1.13).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrlDistributionPoints {
    pub points: Vec<DistributionPoint>,
}

impl ExtensionValue for CrlDistributionPoints {
    fn oid() -> Oid {
        known::crl_distribution_points()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            let mut seq = dec.read_sequence()?;
            let mut points = Vec::new();
            while !seq.is_empty() {
                let mut dp = seq.read_sequence()?;
                let name = match dp.try_read_context_specific(0, true)? {
                    Some(t) => Some(DistributionPointName::parse_tagged(&t).at("distributionPoint")?),
                    None => None,
                };
                let reasons = match dp.try_read_context_specific(1, false)? {
                    Some(t) => Some(ReasonFlags::parse_implicit(&t).at("reasons")?),
                    None => None,
                };
                let crl_issuer = match dp.try_read_context_specific(2, true)? {
                    Some(t) => Some(parse_general_names(&mut t.contents()).at("cRLIssuer")?),
                    None => None,
                };
                dp.finish()?;
                points.push(DistributionPoint {
                    name,
                    reasons,
                    crl_issuer,
                });
            }
            Ok(CrlDistributionPoints { points })
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        for p in &self.points {
            let mut dp = Encoder::new();
            if let Some(name) = &p.name {
                dp.write_explicit(0, &name.encode()?);
            }
            if let Some(reasons) = &p.reasons {
                reasons.write_implicit(&mut dp, 1);
            }
            if let Some(issuer) = &p.crl_issuer {
                dp.write_context_specific(2, true, &encode_general_names(issuer)?);
            }
            inner.write_sequence(&dp.finish());
        }
        Ok(sequence(&inner.finish()))
    }
}

/// Issuing distribution point, a CRL extension (RFC 5280 §5.2.5).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IssuingDistributionPoint {
    pub distribution_point: Option<DistributionPointName>,
    pub only_contains_user_certs: bool,
    pub only_contains_ca_certs: bool,
    pub only_some_reasons: Option<ReasonFlags>,
    pub indirect_crl: bool,
    pub only_contains_attribute_certs: bool,
}

impl ExtensionValue for IssuingDistributionPoint {
    fn oid() -> Oid {
        known::issuing_distribution_point()
    }

    fn parse(value: &[u8]) -> Result<Self, Asn1Error> {
        parse_whole(value, |dec| {
            let mut seq = dec.read_sequence()?;
            let mut idp = IssuingDistributionPoint::default();
            if let Some(t) = seq.try_read_context_specific(0, true)? {
                idp.distribution_point =
                    Some(DistributionPointName::parse_tagged(&t).at("distributionPoint")?);
            }
            if let Some(t) = seq.try_read_context_specific(1, false)? {
                idp.only_contains_user_certs = implicit_bool(&t).at("onlyContainsUserCerts")?;
            }
            if let Some(t) = seq.try_read_context_specific(2, false)? {
                idp.only_contains_ca_certs = implicit_bool(&t).at("onlyContainsCACerts")?;
            }
            if let Some(t) = seq.try_read_context_specific(3, false)? {
                idp.only_some_reasons = Some(ReasonFlags::parse_implicit(&t).at("onlySomeReasons")?);
            }
            if let Some(t) = seq.try_read_context_specific(4, false)? {
                idp.indirect_crl = implicit_bool(&t).at("indirectCRL")?;
            }
            if let Some(t) = seq.try_read_context_specific(5, false)? {
                idp.only_contains_attribute_certs =
                    implicit_bool(&t).at("onlyContainsAttributeCerts")?;
            }
            seq.finish()?;
            Ok(idp)
        })
    }

    fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        if let Some(name) = &self.distribution_point {
            inner.write_explicit(0, &name.encode()?);
        }
        if self.only_contains_user_certs {
            inner.write_context_specific(1, false, &[0xff]);
        }
        if self.only_contains_ca_certs {
            inner.write_context_specific(2, false, &[0xff]);
        }
        if let Some(reasons) = &self.only_some_reasons {
            reasons.write_implicit(&mut inner, 3);
        }
        if self.indirect_crl {
            inner.write_context_specific(4, false, &[0xff]);
        }
        if self.only_contains_attribute_certs {
            inner.write_context_specific(5, false, &[0xff]);
        }
        Ok(sequence(&inner.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn roundtrip<T: ExtensionValue + PartialEq + fmt::Debug>(value: &T) -> Vec<u8> {
        let der = value.encode().unwrap();
        assert_eq!(&T::parse(&der).unwrap(), value);
        der
    }

    #[test]
    fn test_basic_constraints_encoding() {
        let bc = BasicConstraints {
            ca: true,
            path_len_constraint: Some(0),
        };
        assert_eq!(roundtrip(&bc), hex!("30060101ff020100"));
        assert_eq!(roundtrip(&BasicConstraints::default()), hex!("3000"));
    }

    #[test]
    fn test_key_usage_bits() {
        let ku = KeyUsage(KeyUsage::KEY_CERT_SIGN | KeyUsage::CRL_SIGN);
        assert_eq!(roundtrip(&ku), hex!("03020106"));

        let ds = KeyUsage(KeyUsage::DIGITAL_SIGNATURE);
        assert_eq!(roundtrip(&ds), hex!("03020780"));

        let decipher = KeyUsage(KeyUsage::DECIPHER_ONLY);
        assert_eq!(roundtrip(&decipher), hex!("0303070080"));
        assert!(decipher.has(KeyUsage::DECIPHER_ONLY));
        assert!(!decipher.has(KeyUsage::KEY_CERT_SIGN));
    }

    #[test]
    fn test_general_name_choice() {
        let names = vec![
            GeneralName::DnsName("example.com".into()),
            GeneralName::Rfc822Name("a@example.com".into()),
            GeneralName::Uri("http://ca.example/crl".into()),
            GeneralName::IpAddress(vec![10, 0, 0, 1]),
            GeneralName::RegisteredId(Oid::new(&[1, 2, 3])),
            GeneralName::DirectoryName(
                DistinguishedName::new(&[(known::common_name(), "x")]).unwrap(),
            ),
        ];
        let san = SubjectAltName { names };
        roundtrip(&san);
        assert_eq!(san.dns_names().collect::<Vec<_>>(), vec!["example.com"]);
        assert_eq!(san.names[3].to_string(), "IP:10.0.0.1");
    }

    #[test]
    fn test_general_name_unknown_tag() {
        // [9] is not a GeneralName alternative
        let data = hex!("890100");
        let err = GeneralName::parse(&mut Decoder::new(&data)).unwrap_err();
        match err {
            Asn1Error::UnknownChoiceAlternative { tag } => assert!(tag.contains("GeneralName")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_dns_name_rejects_non_ascii() {
        let name = GeneralName::DnsName("bücher.example".into());
        assert!(matches!(
            name.encode(),
            Err(Asn1Error::InvalidCharacterSet { .. })
        ));
    }

    #[test]
    fn test_name_constraints_roundtrip() {
        let nc = NameConstraints {
            permitted_subtrees: Some(vec![GeneralSubtree::new(GeneralName::DnsName(
                ".example.com".into(),
            ))]),
            excluded_subtrees: Some(vec![GeneralSubtree {
                base: GeneralName::DirectoryName(
                    DistinguishedName::new(&[(known::organization_name(), "Evil")]).unwrap(),
                ),
                minimum: 0,
                maximum: Some(3),
            }]),
        };
        roundtrip(&nc);
    }

    #[test]
    fn test_policies_and_constraints() {
        let policies = CertificatePolicies::from_oids(&[
            Oid::new(&[1, 2, 3, 4, 5]),
            known::any_policy(),
        ]);
        roundtrip(&policies);

        let pc = PolicyConstraints {
            require_explicit_policy: Some(0),
            inhibit_policy_mapping: Some(2),
        };
        assert_eq!(roundtrip(&pc), hex!("3006800100810102"));

        let mappings = PolicyMappings {
            mappings: vec![PolicyMapping {
                issuer_domain_policy: Oid::new(&[1, 2, 3]),
                subject_domain_policy: Oid::new(&[1, 2, 4]),
            }],
        };
        roundtrip(&mappings);
        assert_eq!(roundtrip(&InhibitAnyPolicy { skip_certs: 1 }), hex!("020101"));
    }

    #[test]
    fn test_repeated_policy_rejected() {
        let dup = CertificatePolicies::from_oids(&[Oid::new(&[1, 2, 3]), Oid::new(&[1, 2, 3])]);
        let der = dup.encode().unwrap();
        assert!(matches!(
            CertificatePolicies::parse(&der),
            Err(Asn1Error::MalformedEncoding { .. })
        ));
    }

    #[test]
    fn test_empty_policy_constraints_rejected() {
        assert!(PolicyConstraints::parse(&hex!("3000")).is_err());
    }

    #[test]
    fn test_crl_distribution_points() {
        let cdp = CrlDistributionPoints {
            points: vec![DistributionPoint {
                name: Some(DistributionPointName::FullName(vec![GeneralName::Uri(
                    "http://ca.example/root.crl".into(),
                )])),
                reasons: Some(ReasonFlags(
                    ReasonFlags::KEY_COMPROMISE | ReasonFlags::CA_COMPROMISE,
                )),
                crl_issuer: None,
            }],
        };
        roundtrip(&cdp);
    }

    #[test]
    fn test_relative_distribution_point_name() {
        let issuer = DistinguishedName::new(&[(known::common_name(), "CA")]).unwrap();
        let rel = DistributionPointName::NameRelativeToCrlIssuer(vec![NameAttribute::text(
            known::organizational_unit_name(),
            "part1",
        )]);
        let idp = IssuingDistributionPoint {
            distribution_point: Some(rel.clone()),
            only_contains_user_certs: true,
            ..Default::default()
        };
        roundtrip(&idp);
        let full = rel.full_names(&issuer);
        match &full[0] {
            GeneralName::DirectoryName(dn) => assert_eq!(dn.to_string(), "CN=CA, OU=part1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reason_flags() {
        let kc = ReasonFlags(ReasonFlags::KEY_COMPROMISE);
        assert!(ReasonFlags::ALL.covers(kc));
        assert!(!kc.covers(ReasonFlags::ALL));
        let both = kc.union(ReasonFlags(ReasonFlags::SUPERSEDED));
        assert_eq!(both.intersection(kc), kc);
        assert!(ReasonFlags::default().is_empty());
    }

    #[test]
    fn test_authority_info_access() {
        let aia = AuthorityInfoAccess {
            descriptions: vec![
                AccessDescription {
                    method: known::ad_ocsp(),
                    location: GeneralName::Uri("http://ocsp.example".into()),
                },
                AccessDescription {
                    method: known::ad_ca_issuers(),
                    location: GeneralName::Uri("http://ca.example/ca.crt".into()),
                },
            ],
        };
        roundtrip(&aia);
        assert_eq!(aia.ocsp_uris(), vec!["http://ocsp.example"]);
        assert_eq!(aia.ca_issuer_uris(), vec!["http://ca.example/ca.crt"]);
    }

    #[test]
    fn test_key_identifiers() {
        let aki = AuthorityKeyIdentifier {
            key_identifier: Some(vec![1, 2, 3]),
            ..Default::default()
        };
        assert_eq!(roundtrip(&aki), hex!("30058003010203"));
        roundtrip(&SubjectKeyIdentifier(vec![9; 20]));
    }

    #[test]
    fn test_extended_key_usage() {
        let eku = ExtendedKeyUsage {
            purposes: vec![known::kp_server_auth()],
        };
        roundtrip(&eku);
        assert!(eku.permits(&known::kp_server_auth()));
        assert!(!eku.permits(&known::kp_client_auth()));
        let any = ExtendedKeyUsage {
            purposes: vec![known::any_extended_key_usage()],
        };
        assert!(any.permits(&known::kp_client_auth()));
        assert!(ExtendedKeyUsage::parse(&hex!("3000")).is_err());
    }
}
