//! Distinguished names (RFC 5280 §4.1.2.4).
//!
//! A name keeps the exact DER it was read from, so issuer names hashed into
//! OCSP CertIDs and names copied into issued certificates stay byte-identical.
//! Comparison follows RFC 5280 §7.1: attributes of one RDN match in any
//! order, and string values compare after case folding and whitespace
//! collapsing.

use std::fmt;

use pathkit_types::Asn1Error;
use pathkit_utils::asn1::{Decoder, Encoder, StringKind, Tag, TagClass};
use pathkit_utils::oid::{known, Oid};

/// The value of a single attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(StringKind, String),
    /// Any non-string type, kept as its complete DER encoding.
    Other(Vec<u8>),
}

/// One `AttributeTypeAndValue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAttribute {
    pub oid: Oid,
    pub value: AttributeValue,
}

impl NameAttribute {
    /// Build a string attribute, picking the string type X.509 profiles use
    /// for the attribute.
    pub fn text(oid: Oid, value: &str) -> Self {
        let kind = if oid == known::country_name()
            || oid.arcs() == [2, 5, 4, 5]
            || oid.arcs() == [2, 5, 4, 46]
        {
            StringKind::Printable
        } else if oid == known::email_address() || oid.arcs() == [0, 9, 2342, 19200300, 100, 1, 25]
        {
            StringKind::Ia5
        } else {
            StringKind::Utf8
        };
        NameAttribute {
            oid,
            value: AttributeValue::Text(kind, value.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            AttributeValue::Text(_, s) => Some(s),
            AttributeValue::Other(_) => None,
        }
    }

    pub(crate) fn parse(dec: &mut Decoder<'_>) -> Result<Self, Asn1Error> {
        let mut seq = dec.read_sequence()?;
        let oid = seq.read_oid()?;
        let tag = seq.peek_tag()?;
        let value = if tag.class == TagClass::Universal
            && StringKind::from_tag_number(tag.number).is_some()
        {
            let (kind, text) = seq.read_string_with_kind()?;
            AttributeValue::Text(kind, text)
        } else {
            AttributeValue::Other(seq.read_tlv()?.raw.to_vec())
        };
        seq.finish()?;
        Ok(NameAttribute { oid, value })
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, Asn1Error> {
        let mut inner = Encoder::new();
        inner.write_oid(&self.oid)?;
        match &self.value {
            AttributeValue::Text(kind, text) => {
                inner.write_string(*kind, text)?;
            }
            AttributeValue::Other(raw) => {
                inner.write_raw(raw);
            }
        }
        let mut out = Encoder::new();
        out.write_sequence(&inner.finish());
        Ok(out.finish())
    }

    fn matches(&self, other: &NameAttribute) -> bool {
        if self.oid != other.oid {
            return false;
        }
        match (&self.value, &other.value) {
            (AttributeValue::Text(_, a), AttributeValue::Text(_, b)) => {
                normalize(a) == normalize(b)
            }
            (AttributeValue::Other(a), AttributeValue::Other(b)) => a == b,
            _ => false,
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn rdn_matches(a: &[NameAttribute], b: &[NameAttribute]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|attr| {
        match (0..b.len()).find(|&i| !used[i] && attr.matches(&b[i])) {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

/// An X.501 `Name` (RDNSequence).
#[derive(Debug, Clone)]
pub struct DistinguishedName {
    der: Vec<u8>,
    rdns: Vec<Vec<NameAttribute>>,
}

impl DistinguishedName {
    /// Read a `Name` from the decoder.
    pub fn parse(dec: &mut Decoder<'_>) -> Result<Self, Asn1Error> {
        let tlv = dec.read_expected(Tag::SEQUENCE)?;
        let mut seq = tlv.contents();
        let mut rdns = Vec::new();
        while !seq.is_empty() {
            let offset = seq.offset();
            let mut set = seq.read_set()?;
            let mut rdn = Vec::new();
            while !set.is_empty() {
                rdn.push(NameAttribute::parse(&mut set)?);
            }
            if rdn.is_empty() {
                return Err(Asn1Error::malformed(offset, "empty RelativeDistinguishedName"));
            }
            rdns.push(rdn);
        }
        Ok(DistinguishedName {
            der: tlv.raw.to_vec(),
            rdns,
        })
    }

    pub fn from_der(data: &[u8]) -> Result<Self, Asn1Error> {
        let mut dec = Decoder::new(data);
        let name = Self::parse(&mut dec)?;
        dec.finish()?;
        Ok(name)
    }

    /// A name with one attribute per RDN, in the given order.
    pub fn new(attributes: &[(Oid, &str)]) -> Result<Self, Asn1Error> {
        Self::from_rdns(
            attributes
                .iter()
                .map(|(oid, value)| vec![NameAttribute::text(oid.clone(), value)])
                .collect(),
        )
    }

    /// Encode a name from its RDNs. Multi-valued RDNs are sorted as DER
    /// SET OF requires.
    pub fn from_rdns(rdns: Vec<Vec<NameAttribute>>) -> Result<Self, Asn1Error> {
        let mut seq = Encoder::new();
        for rdn in &rdns {
            let members = rdn
                .iter()
                .map(NameAttribute::encode)
                .collect::<Result<Vec<_>, _>>()?;
            seq.write_set_of(&members);
        }
        let mut out = Encoder::new();
        out.write_sequence(&seq.finish());
        Ok(DistinguishedName {
            der: out.finish(),
            rdns,
        })
    }

    /// The empty name.
    pub fn empty() -> Self {
        DistinguishedName {
            der: vec![0x30, 0x00],
            rdns: Vec::new(),
        }
    }

    /// The exact DER encoding this name was read from or built as.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn rdns(&self) -> &[Vec<NameAttribute>] {
        &self.rdns
    }

    pub fn attributes(&self) -> impl Iterator<Item = &NameAttribute> {
        self.rdns.iter().flatten()
    }

    /// First string value of the given attribute type.
    pub fn get(&self, oid: &Oid) -> Option<&str> {
        self.attributes()
            .find(|a| &a.oid == oid)
            .and_then(NameAttribute::as_str)
    }

    pub fn common_name(&self) -> Option<&str> {
        self.get(&known::common_name())
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Whether `base` is a prefix of this name (directoryName subtree
    /// membership, RFC 5280 §7.1).
    pub fn is_within(&self, base: &DistinguishedName) -> bool {
        base.rdns.len() <= self.rdns.len()
            && base
                .rdns
                .iter()
                .zip(&self.rdns)
                .all(|(a, b)| rdn_matches(a, b))
    }
}

impl PartialEq for DistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        if self.der == other.der {
            return true;
        }
        self.rdns.len() == other.rdns.len()
            && self
                .rdns
                .iter()
                .zip(&other.rdns)
                .all(|(a, b)| rdn_matches(a, b))
    }
}

impl Eq for DistinguishedName {}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            for (j, attr) in rdn.iter().enumerate() {
                if j > 0 {
                    f.write_str("+")?;
                }
                match known::oid_to_dn_short_name(&attr.oid) {
                    Some(short) => write!(f, "{short}=")?,
                    None => write!(f, "{}=", attr.oid)?,
                }
                match &attr.value {
                    AttributeValue::Text(_, text) => f.write_str(text)?,
                    AttributeValue::Other(raw) => {
                        f.write_str("#")?;
                        for b in raw {
                            write!(f, "{b:02x}")?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
