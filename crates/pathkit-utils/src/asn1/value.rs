//! The generic in-memory ASN.1 value model.

use super::decoder::{reassemble, MAX_DEPTH};
use super::primitive::{self, decode_null, StringKind};
use super::{tags, Asn1Time, Decoder, EncodingRules, Encoder, Tag, TagClass, TimeKind, Tlv};
use crate::oid::Oid;
use num_bigint::BigInt;
use pathkit_types::Asn1Error;

/// A BIT STRING: data octets plus the count of unused trailing bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BitString {
    data: Vec<u8>,
    unused_bits: u8,
}

impl BitString {
    /// Fails if `unused_bits > 7`, or if it is non-zero on empty data.
    /// Padding bits are cleared.
    pub fn new(data: Vec<u8>, unused_bits: u8) -> Result<Self, Asn1Error> {
        if unused_bits > 7 || (data.is_empty() && unused_bits != 0) {
            return Err(Asn1Error::malformed(0, "invalid unused-bits count"));
        }
        let mut data = data;
        if let Some(last) = data.last_mut() {
            *last &= !((1u8 << unused_bits) - 1);
        }
        Ok(BitString { data, unused_bits })
    }

    /// A byte-aligned bit string.
    pub fn from_bytes(data: &[u8]) -> Self {
        BitString {
            data: data.to_vec(),
            unused_bits: 0,
        }
    }

    /// Named-bit list encoding: bit `i` of the list is set for each true
    /// flag, trailing zero bits are dropped as DER requires.
    pub fn from_flags(flags: &[bool]) -> Self {
        let len = flags.iter().rposition(|&f| f).map_or(0, |i| i + 1);
        let mut data = vec![0u8; len.div_ceil(8)];
        for (i, _) in flags.iter().enumerate().take(len).filter(|(_, &f)| f) {
            data[i / 8] |= 0x80 >> (i % 8);
        }
        let unused_bits = ((8 - len % 8) % 8) as u8;
        BitString { data, unused_bits }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn unused_bits(&self) -> u8 {
        self.unused_bits
    }

    /// Number of significant bits.
    pub fn bit_len(&self) -> usize {
        self.data.len() * 8 - self.unused_bits as usize
    }

    /// Named bit `i` (bit 0 is the most significant bit of the first octet).
    /// Bits past the end read as zero.
    pub fn bit(&self, i: usize) -> bool {
        i < self.bit_len() && self.data[i / 8] & (0x80 >> (i % 8)) != 0
    }
}

/// A value carried under a non-universal tag.
///
/// With `explicit` set the tag wraps the complete encoding of `inner`;
/// otherwise the tag replaces the inner value's own identifier. A generic
/// decode cannot tell the two apart from the bytes alone, so it reads a
/// constructed element holding exactly one TLV as explicit, any other
/// constructed element as an implicit SEQUENCE, and primitive content as
/// an implicit OCTET STRING. [`TaggedObject::implicit_as`] lets a schema
/// supply the real type. Equality compares the DER encoding, so both
/// readings of the same bytes are equal.
#[derive(Debug, Clone)]
pub struct TaggedObject {
    pub class: TagClass,
    pub number: u32,
    pub explicit: bool,
    pub inner: Box<Asn1Value>,
}

impl TaggedObject {
    pub fn explicit(class: TagClass, number: u32, inner: Asn1Value) -> Self {
        TaggedObject {
            class,
            number,
            explicit: true,
            inner: Box::new(inner),
        }
    }

    pub fn implicit(class: TagClass, number: u32, inner: Asn1Value) -> Self {
        TaggedObject {
            class,
            number,
            explicit: false,
            inner: Box::new(inner),
        }
    }

    /// The identifier this object encodes with.
    pub fn tag(&self) -> Tag {
        Tag {
            class: self.class,
            constructed: self.explicit || self.inner.is_constructed(),
            number: self.number,
        }
    }

    /// Re-read the content of this object as an implicitly tagged
    /// `universal` type, returning the decoded inner value.
    pub fn implicit_as(&self, universal: u32) -> Result<Asn1Value, Asn1Error> {
        let content = self.content_octets()?;
        let constructed = self.tag().constructed;
        let mut raw = Vec::with_capacity(content.len() + 6);
        super::write_header(
            Tag::universal(universal, constructed),
            super::Length::Definite(content.len()),
            &mut raw,
        );
        raw.extend_from_slice(&content);
        Decoder::new(&raw).read_value()
    }

    fn content_octets(&self) -> Result<Vec<u8>, Asn1Error> {
        if self.explicit {
            self.inner.to_der()
        } else {
            let full = self.inner.to_der()?;
            let tlv = Decoder::new(&full).read_tlv()?;
            Ok(tlv.value.to_vec())
        }
    }
}

impl PartialEq for TaggedObject {
    fn eq(&self, other: &Self) -> bool {
        match (self.content_octets(), other.content_octets()) {
            (Ok(a), Ok(b)) => self.tag() == other.tag() && a == b,
            _ => false,
        }
    }
}

/// Closed sum type over the supported universal types.
#[derive(Debug, Clone)]
pub enum Asn1Value {
    Boolean(bool),
    Integer(BigInt),
    BitString(BitString),
    OctetString(Vec<u8>),
    Null,
    ObjectIdentifier(Oid),
    Enumerated(BigInt),
    String(StringKind, String),
    Time(Asn1Time),
    Sequence(Vec<Asn1Value>),
    /// Elements in insertion order; DER output sorts them.
    Set(Vec<Asn1Value>),
    Tagged(TaggedObject),
}

impl Asn1Value {
    pub fn integer(v: i64) -> Self {
        Asn1Value::Integer(BigInt::from(v))
    }

    pub fn oid(arcs: &[u64]) -> Self {
        Asn1Value::ObjectIdentifier(Oid::new(arcs))
    }

    pub fn utf8(text: &str) -> Self {
        Asn1Value::String(StringKind::Utf8, text.to_string())
    }

    /// The identifier this value encodes with.
    pub fn tag(&self) -> Tag {
        match self {
            Asn1Value::Boolean(_) => Tag::BOOLEAN,
            Asn1Value::Integer(_) => Tag::INTEGER,
            Asn1Value::BitString(_) => Tag::BIT_STRING,
            Asn1Value::OctetString(_) => Tag::OCTET_STRING,
            Asn1Value::Null => Tag::NULL,
            Asn1Value::ObjectIdentifier(_) => Tag::OID,
            Asn1Value::Enumerated(_) => Tag::ENUMERATED,
            Asn1Value::String(kind, _) => Tag::universal(kind.tag_number(), false),
            Asn1Value::Time(t) => match t.kind() {
                TimeKind::Utc => Tag::UTC_TIME,
                TimeKind::Generalized => Tag::GENERALIZED_TIME,
            },
            Asn1Value::Sequence(_) => Tag::SEQUENCE,
            Asn1Value::Set(_) => Tag::SET,
            Asn1Value::Tagged(t) => t.tag(),
        }
    }

    pub fn is_constructed(&self) -> bool {
        self.tag().constructed
    }

    /// Canonical DER encoding.
    pub fn to_der(&self) -> Result<Vec<u8>, Asn1Error> {
        self.encode(EncodingRules::Der)
    }

    /// Encode under the given rules. BER output uses the indefinite form
    /// for every constructed value and keeps SET elements in insertion
    /// order; DER output is definite and sorts SET elements by encoding.
    pub fn encode(&self, rules: EncodingRules) -> Result<Vec<u8>, Asn1Error> {
        let mut enc = Encoder::with_rules(rules);
        enc.write_value(self)?;
        Ok(enc.finish())
    }

    /// Decode exactly one value from `data`; trailing bytes are an error.
    pub fn from_der(data: &[u8]) -> Result<Self, Asn1Error> {
        Self::decode(data, EncodingRules::Der)
    }

    pub fn decode(data: &[u8], rules: EncodingRules) -> Result<Self, Asn1Error> {
        let mut dec = Decoder::with_rules(data, rules);
        let value = dec.read_value()?;
        dec.finish()?;
        Ok(value)
    }

    pub fn as_sequence(&self) -> Option<&[Asn1Value]> {
        match self {
            Asn1Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_oid(&self) -> Option<&Oid> {
        match self {
            Asn1Value::ObjectIdentifier(oid) => Some(oid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Asn1Value::String(_, s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Asn1Value {
    fn eq(&self, other: &Self) -> bool {
        use Asn1Value::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => a == b,
            (Integer(a), Integer(b)) | (Enumerated(a), Enumerated(b)) => a == b,
            (BitString(a), BitString(b)) => a == b,
            (OctetString(a), OctetString(b)) => a == b,
            (Null, Null) => true,
            (ObjectIdentifier(a), ObjectIdentifier(b)) => a == b,
            (String(ka, a), String(kb, b)) => ka == kb && a == b,
            (Time(a), Time(b)) => a == b,
            (Sequence(a), Sequence(b)) => a == b,
            // SET is unordered: compare as multisets of encodings.
            (Set(a), Set(b)) => a.len() == b.len() && sorted_der(a) == sorted_der(b),
            (Tagged(a), Tagged(b)) => a == b,
            _ => false,
        }
    }
}

fn sorted_der(items: &[Asn1Value]) -> Option<Vec<Vec<u8>>> {
    let mut encoded = items
        .iter()
        .map(|v| v.to_der().ok())
        .collect::<Option<Vec<_>>>()?;
    encoded.sort();
    Some(encoded)
}

/// Decode one element (already split off by the decoder) into a value.
pub(crate) fn decode_tlv(tlv: &Tlv<'_>, depth: usize) -> Result<Asn1Value, Asn1Error> {
    if depth > MAX_DEPTH {
        return Err(Asn1Error::malformed(tlv.offset, "nesting too deep"));
    }
    let at = |e: Asn1Error| rebase(e, tlv.content_offset);
    let rules = tlv.rules;

    if tlv.tag.class != TagClass::Universal {
        return decode_tagged(tlv, depth);
    }

    let number = tlv.tag.number;
    if number == tags::SEQUENCE || number == tags::SET {
        if !tlv.tag.constructed {
            return Err(Asn1Error::malformed(tlv.offset, "primitive SEQUENCE or SET"));
        }
        let mut items = Vec::new();
        let mut inner = tlv.contents();
        let mut prev: Option<&[u8]> = None;
        while !inner.is_empty() {
            let child = inner.read_tlv()?;
            if number == tags::SET && rules == EncodingRules::Der {
                if prev.is_some_and(|p| p > child.raw) {
                    return Err(Asn1Error::malformed(child.offset, "DER SET is not sorted"));
                }
                prev = Some(child.raw);
            }
            items.push(decode_tlv(&child, depth + 1)?);
        }
        return Ok(if number == tags::SET {
            Asn1Value::Set(items)
        } else {
            Asn1Value::Sequence(items)
        });
    }

    let content = reassemble(tlv)?;
    let value = match number {
        tags::BOOLEAN => Asn1Value::Boolean(primitive::decode_boolean(&content, rules).map_err(at)?),
        tags::INTEGER => Asn1Value::Integer(primitive::decode_integer(&content, rules).map_err(at)?),
        tags::ENUMERATED => {
            Asn1Value::Enumerated(primitive::decode_integer(&content, rules).map_err(at)?)
        }
        tags::BIT_STRING => {
            // constructed segments were already merged by `reassemble`
            let (unused, data) = primitive::decode_bit_string(&content, rules).map_err(at)?;
            // BER tolerates set padding bits; the value keeps them cleared
            Asn1Value::BitString(BitString::new(data.to_vec(), unused).map_err(at)?)
        }
        tags::OCTET_STRING => Asn1Value::OctetString(content.into_owned()),
        tags::NULL => {
            decode_null(&content).map_err(at)?;
            Asn1Value::Null
        }
        tags::OID => Asn1Value::ObjectIdentifier(Oid::from_der_value(&content).map_err(at)?),
        tags::UTC_TIME => {
            Asn1Value::Time(Asn1Time::parse(TimeKind::Utc, &content, rules).map_err(at)?)
        }
        tags::GENERALIZED_TIME => {
            Asn1Value::Time(Asn1Time::parse(TimeKind::Generalized, &content, rules).map_err(at)?)
        }
        n => match StringKind::from_tag_number(n) {
            Some(kind) => {
                Asn1Value::String(kind, primitive::decode_string(kind, &content).map_err(at)?)
            }
            None => {
                return Err(Asn1Error::malformed(
                    tlv.offset,
                    format!("unsupported universal type {n}"),
                ))
            }
        },
    };
    Ok(value)
}

fn decode_tagged(tlv: &Tlv<'_>, depth: usize) -> Result<Asn1Value, Asn1Error> {
    let (class, number) = (tlv.tag.class, tlv.tag.number);
    if !tlv.tag.constructed {
        return Ok(Asn1Value::Tagged(TaggedObject::implicit(
            class,
            number,
            Asn1Value::OctetString(tlv.value.to_vec()),
        )));
    }
    let mut inner = tlv.contents();
    let mut children = Vec::new();
    while !inner.is_empty() {
        let child = inner.read_tlv()?;
        children.push(decode_tlv(&child, depth + 1)?);
    }
    let tagged = if children.len() == 1 {
        let only = children.pop().unwrap_or(Asn1Value::Null);
        TaggedObject::explicit(class, number, only)
    } else {
        TaggedObject::implicit(class, number, Asn1Value::Sequence(children))
    };
    Ok(Asn1Value::Tagged(tagged))
}

/// Shift a content-relative error offset to an absolute one.
pub(crate) fn rebase(err: Asn1Error, base: usize) -> Asn1Error {
    match err {
        Asn1Error::TruncatedInput { offset } => Asn1Error::TruncatedInput {
            offset: offset + base,
        },
        Asn1Error::MalformedEncoding { offset, reason } => Asn1Error::MalformedEncoding {
            offset: offset + base,
            reason,
        },
        Asn1Error::InvalidCharacterSet {
            string_type,
            offset,
        } => Asn1Error::InvalidCharacterSet {
            string_type,
            offset: offset + base,
        },
        Asn1Error::UnexpectedTag {
            offset,
            expected,
            found,
        } => Asn1Error::UnexpectedTag {
            offset: offset + base,
            expected,
            found,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use proptest::prelude::*;

    fn roundtrip(v: &Asn1Value) {
        let der = v.to_der().unwrap();
        let back = Asn1Value::from_der(&der).unwrap();
        assert_eq!(&back, v);
        assert_eq!(back.to_der().unwrap(), der);
    }

    #[test]
    fn test_integer_encodings() {
        assert_eq!(Asn1Value::integer(0).to_der().unwrap(), hex!("020100"));
        assert_eq!(Asn1Value::integer(128).to_der().unwrap(), hex!("02020080"));
        assert_eq!(Asn1Value::integer(-128).to_der().unwrap(), hex!("020180"));
        assert_eq!(Asn1Value::integer(-129).to_der().unwrap(), hex!("0202FF7F"));
    }

    #[test]
    fn test_roundtrip_every_kind() {
        let values = vec![
            Asn1Value::Boolean(true),
            Asn1Value::integer(-1_000_000),
            Asn1Value::BitString(BitString::new(vec![0xA0], 5).unwrap()),
            Asn1Value::OctetString(vec![1, 2, 3]),
            Asn1Value::Null,
            Asn1Value::oid(&[1, 2, 840, 113549, 1, 1, 11]),
            Asn1Value::Enumerated(BigInt::from(3)),
            Asn1Value::String(StringKind::Printable, "Test CA".into()),
            Asn1Value::String(StringKind::Bmp, "\u{e9}t\u{e9}".into()),
            Asn1Value::String(StringKind::Universal, "\u{1F600}".into()),
            Asn1Value::Time(Asn1Time::utc(1_736_942_400).unwrap()),
            Asn1Value::Time(Asn1Time::generalized(2_539_296_000).unwrap()),
        ];
        for v in &values {
            roundtrip(v);
        }
        roundtrip(&Asn1Value::Sequence(values));
    }

    #[test]
    fn test_set_is_sorted_in_der() {
        let a = Asn1Value::integer(1);
        let b = Asn1Value::OctetString(vec![0]);
        let set = Asn1Value::Set(vec![b.clone(), a.clone()]);
        let der = set.to_der().unwrap();
        assert_eq!(der, hex!("3106 020101 040100"));
        // equal regardless of element order
        assert_eq!(set, Asn1Value::Set(vec![a, b]));
        roundtrip(&set);
    }

    #[test]
    fn test_der_rejects_unsorted_set() {
        assert!(Asn1Value::from_der(&hex!("3106 040100 020101")).is_err());
        let ber = Asn1Value::decode(&hex!("3106 040100 020101"), EncodingRules::Ber).unwrap();
        assert!(matches!(ber, Asn1Value::Set(ref items) if items.len() == 2));
    }

    #[test]
    fn test_tagged_explicit_and_implicit() {
        let explicit = Asn1Value::Tagged(TaggedObject::explicit(
            TagClass::ContextSpecific,
            0,
            Asn1Value::integer(2),
        ));
        assert_eq!(explicit.to_der().unwrap(), hex!("A003020102"));
        roundtrip(&explicit);

        let implicit = Asn1Value::Tagged(TaggedObject::implicit(
            TagClass::ContextSpecific,
            2,
            Asn1Value::String(StringKind::Ia5, "example.com".into()),
        ));
        let der = implicit.to_der().unwrap();
        assert_eq!(der[0], 0x82);
        let back = Asn1Value::from_der(&der).unwrap();
        assert_eq!(back, implicit);
        let Asn1Value::Tagged(t) = back else {
            panic!("expected tagged");
        };
        assert_eq!(
            t.implicit_as(tags::IA5_STRING).unwrap().as_str(),
            Some("example.com")
        );
    }

    #[test]
    fn test_implicit_sequence_reinterpreted() {
        let seq = Asn1Value::Sequence(vec![Asn1Value::integer(1), Asn1Value::integer(2)]);
        let tagged = Asn1Value::Tagged(TaggedObject::implicit(TagClass::ContextSpecific, 1, seq.clone()));
        let der = tagged.to_der().unwrap();
        assert_eq!(der, hex!("A106 020101 020102"));
        let Asn1Value::Tagged(t) = Asn1Value::from_der(&der).unwrap() else {
            panic!("expected tagged");
        };
        assert_eq!(t.implicit_as(tags::SEQUENCE).unwrap(), seq);
    }

    #[test]
    fn test_application_class_high_number() {
        let v = Asn1Value::Tagged(TaggedObject::explicit(
            TagClass::Application,
            300,
            Asn1Value::Null,
        ));
        roundtrip(&v);
    }

    #[test]
    fn test_unsupported_universal_type() {
        // REAL
        let err = Asn1Value::from_der(&hex!("090100")).unwrap_err();
        assert!(matches!(err, Asn1Error::MalformedEncoding { offset: 0, .. }));
    }

    #[test]
    fn test_ber_indefinite_roundtrip() {
        let v = Asn1Value::Sequence(vec![
            Asn1Value::Set(vec![Asn1Value::integer(5), Asn1Value::Boolean(false)]),
            Asn1Value::Tagged(TaggedObject::explicit(
                TagClass::ContextSpecific,
                3,
                Asn1Value::utf8("x"),
            )),
        ]);
        let ber = v.encode(EncodingRules::Ber).unwrap();
        assert_eq!(&ber[..2], &[0x30, 0x80]);
        assert_eq!(&ber[ber.len() - 2..], &[0x00, 0x00]);
        assert!(Asn1Value::from_der(&ber).is_err());
        assert_eq!(Asn1Value::decode(&ber, EncodingRules::Ber).unwrap(), v);
    }

    #[test]
    fn test_ber_constructed_octet_string() {
        // 24 80 | 04 02 0102 | 04 01 03 | 00 00
        let data = hex!("2480 04020102 040103 0000");
        let v = Asn1Value::decode(&data, EncodingRules::Ber).unwrap();
        assert_eq!(v, Asn1Value::OctetString(vec![1, 2, 3]));
        assert_eq!(v.to_der().unwrap(), hex!("0403010203"));
        assert!(Asn1Value::from_der(&hex!("2405 04030102 03")).is_err());
    }

    #[test]
    fn test_invalid_character_rejected_on_encode() {
        let v = Asn1Value::String(StringKind::Printable, "a*b".into());
        assert!(matches!(
            v.to_der().unwrap_err(),
            Asn1Error::InvalidCharacterSet { offset: 1, .. }
        ));
    }

    #[test]
    fn test_error_offsets_are_absolute() {
        // SEQUENCE { INTEGER 1, PrintableString "a@" }
        let err = Asn1Value::from_der(&hex!("3007 020101 13026140")).unwrap_err();
        assert_eq!(
            err,
            Asn1Error::InvalidCharacterSet {
                string_type: "PrintableString",
                offset: 8
            }
        );
    }

    #[test]
    fn test_bit_string_flags() {
        let bits = BitString::from_flags(&[false, false, false, false, false, true, true]);
        assert_eq!(bits.as_bytes(), &[0x06]);
        assert_eq!(bits.unused_bits(), 1);
        assert!(bits.bit(5) && bits.bit(6) && !bits.bit(0) && !bits.bit(40));
        let empty = BitString::from_flags(&[false, false]);
        assert_eq!(empty.bit_len(), 0);
    }

    #[test]
    fn test_trailing_data_rejected() {
        assert!(Asn1Value::from_der(&hex!("0500 00")).is_err());
    }

    fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag, content.len() as u8];
        out.extend_from_slice(content);
        out
    }

    /// Decode under BER, re-encode under DER, and require the output to be
    /// accepted by the DER decoder and to be stable.
    fn transcode(ber: &[u8]) -> Vec<u8> {
        let value = Asn1Value::decode(ber, EncodingRules::Ber).unwrap();
        let der = value.to_der().unwrap();
        let reparsed = Asn1Value::from_der(&der)
            .unwrap_or_else(|e| panic!("DER output {der:02x?} rejected: {e}"));
        assert_eq!(reparsed.to_der().unwrap(), der);
        der
    }

    fn timestamp_of(data: &[u8], rules: EncodingRules) -> i64 {
        match Asn1Value::decode(data, rules).unwrap() {
            Asn1Value::Time(t) => t.timestamp(),
            other => panic!("expected a time, got {other:?}"),
        }
    }

    #[test]
    fn test_ber_bit_string_padding_cleared() {
        let v = Asn1Value::decode(&hex!("030201FF"), EncodingRules::Ber).unwrap();
        assert_eq!(v, Asn1Value::BitString(BitString::new(vec![0xFE], 1).unwrap()));
        match &v {
            Asn1Value::BitString(bits) => assert_eq!(bits.as_bytes(), &[0xFE]),
            other => panic!("expected a bit string, got {other:?}"),
        }
        assert!(Asn1Value::from_der(&hex!("030201FF")).is_err());
    }

    #[test]
    fn test_ber_to_der_transcoding() {
        let cases: Vec<(Vec<u8>, Vec<u8>)> = vec![
            // padding bits set
            (hex!("030201FF").to_vec(), hex!("030201FE").to_vec()),
            // BOOLEAN other than 0xFF
            (hex!("010101").to_vec(), hex!("0101FF").to_vec()),
            // INTEGER with a redundant leading octet
            (hex!("0202007F").to_vec(), hex!("02017F").to_vec()),
            // constructed OCTET STRING, indefinite length
            (hex!("2480 04020102 040103 0000").to_vec(), hex!("0403010203").to_vec()),
            // indefinite-length SEQUENCE
            (hex!("3080 020101 0000").to_vec(), hex!("3003 020101").to_vec()),
            // SET out of DER order
            (hex!("3106 040100 020101").to_vec(), hex!("3106 020101 040100").to_vec()),
            // GeneralizedTime with an offset
            (tlv(0x18, b"20240101120000+0100"), tlv(0x18, b"20240101110000Z")),
            // GeneralizedTime in local form, hour only
            (tlv(0x18, b"2025011512"), tlv(0x18, b"20250115120000Z")),
            // UTCTime without seconds
            (tlv(0x17, b"5001010000Z"), tlv(0x17, b"500101000000Z")),
            // offset UTCTime nested in an indefinite SEQUENCE
            (
                [&hex!("3080")[..], &tlv(0x17, b"2501151200+0100"), &hex!("0000")].concat(),
                [&hex!("300F")[..], &tlv(0x17, b"250115110000Z")].concat(),
            ),
        ];
        for (ber, expected) in cases {
            assert_eq!(transcode(&ber), expected, "input {ber:02x?}");
        }
    }

    #[test]
    fn test_transcoded_time_keeps_instant() {
        let ber = tlv(0x18, b"20240101120000.500-0130");
        let der = transcode(&ber);
        assert_eq!(der, tlv(0x18, b"20240101133000.5Z"));
        assert_eq!(
            timestamp_of(&ber, EncodingRules::Ber),
            timestamp_of(&der, EncodingRules::Der)
        );
    }

    proptest! {
        #[test]
        fn prop_ber_bit_string_transcodes(data in prop::collection::vec(any::<u8>(), 1..16), unused in 0u8..8) {
            let mut content = vec![unused];
            content.extend_from_slice(&data);
            let der = transcode(&tlv(0x03, &content));
            let last = der[der.len() - 1];
            prop_assert_eq!(last & ((1u8 << unused) - 1), 0);
            prop_assert_eq!(&der[3..der.len() - 1], &data[..data.len() - 1]);
        }

        #[test]
        fn prop_ber_utc_time_transcodes(
            yy in 0u32..100,
            month in 1u32..13,
            day in 1u32..29,
            hour in 0u32..24,
            minute in 0u32..60,
            seconds in prop::option::of(0u32..60),
            zone in prop::option::of((any::<bool>(), 0u32..24, 0u32..60)),
        ) {
            let mut text = format!("{yy:02}{month:02}{day:02}{hour:02}{minute:02}");
            if let Some(ss) = seconds {
                text.push_str(&format!("{ss:02}"));
            }
            match zone {
                Some((east, hh, mm)) => {
                    text.push_str(&format!("{}{hh:02}{mm:02}", if east { '+' } else { '-' }));
                }
                None => text.push('Z'),
            }
            let ber = tlv(0x17, text.as_bytes());
            let der = transcode(&ber);
            prop_assert_eq!(
                timestamp_of(&ber, EncodingRules::Ber),
                timestamp_of(&der, EncodingRules::Der)
            );
        }
    }
}
