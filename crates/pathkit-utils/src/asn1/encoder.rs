//! ASN.1 DER/BER encoder.

use super::header::{write_header, write_length};
use super::primitive::{encode_string, StringKind};
use super::{Asn1Time, Asn1Value, EncodingRules, Length, Tag, TaggedObject};
use crate::oid::Oid;
use num_bigint::BigInt;
use pathkit_types::Asn1Error;

/// A builder for constructing DER- or BER-encoded ASN.1 data.
///
/// Writers append to an internal buffer and return `&mut Self` so calls
/// chain; writers that can reject their input return a `Result` instead.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
    rules: EncodingRules,
    open: Vec<(Tag, usize)>,
}

impl Encoder {
    /// Create a new DER encoder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: EncodingRules) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Consume the encoder and return the encoded bytes.
    ///
    /// Any constructed value still open is closed first.
    pub fn finish(mut self) -> Vec<u8> {
        while !self.open.is_empty() {
            self.close();
        }
        self.buf
    }

    /// Write a complete TLV with the given identifier and content.
    pub fn write_tlv(&mut self, tag: Tag, value: &[u8]) -> &mut Self {
        write_header(tag, Length::Definite(value.len()), &mut self.buf);
        self.buf.extend_from_slice(value);
        self
    }

    /// Open a constructed value whose length is not known yet. BER output
    /// uses the indefinite form; DER output back-patches a definite length
    /// in [`Encoder::end_constructed`].
    pub fn begin_constructed(&mut self, tag: Tag) -> &mut Self {
        let tag = tag.with_constructed(true);
        match self.rules {
            EncodingRules::Ber => {
                write_header(tag, Length::Indefinite, &mut self.buf);
                self.open.push((tag, self.buf.len()));
            }
            EncodingRules::Der => self.open.push((tag, self.buf.len())),
        }
        self
    }

    /// Close the innermost value opened with [`Encoder::begin_constructed`].
    pub fn end_constructed(&mut self) -> Result<&mut Self, Asn1Error> {
        if self.open.is_empty() {
            return Err(Asn1Error::malformed(self.buf.len(), "no constructed value is open"));
        }
        self.close();
        Ok(self)
    }

    fn close(&mut self) {
        let Some((tag, start)) = self.open.pop() else {
            return;
        };
        match self.rules {
            EncodingRules::Ber => self.buf.extend_from_slice(&[0x00, 0x00]),
            EncodingRules::Der => {
                let content = self.buf.split_off(start);
                write_header(tag, Length::Definite(content.len()), &mut self.buf);
                self.buf.extend_from_slice(&content);
            }
        }
    }

    /// Write an INTEGER from unsigned big-endian magnitude bytes.
    /// Leading zeros are stripped and a single zero octet is added back
    /// when the high bit is set, keeping the value positive.
    pub fn write_integer(&mut self, value: &[u8]) -> &mut Self {
        let skip = value.iter().take_while(|&&b| b == 0).count();
        let trimmed = &value[skip..];
        match trimmed.first() {
            None => self.write_tlv(Tag::INTEGER, &[0x00]),
            Some(&b) if b & 0x80 != 0 => {
                let mut padded = Vec::with_capacity(trimmed.len() + 1);
                padded.push(0x00);
                padded.extend_from_slice(trimmed);
                self.write_tlv(Tag::INTEGER, &padded)
            }
            Some(_) => self.write_tlv(Tag::INTEGER, trimmed),
        }
    }

    /// Write an INTEGER in minimal two's complement form.
    pub fn write_big_integer(&mut self, value: &BigInt) -> &mut Self {
        self.write_tlv(Tag::INTEGER, &value.to_signed_bytes_be())
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.write_integer(&value.to_be_bytes())
    }

    /// Write an ENUMERATED.
    pub fn write_enumerated(&mut self, value: u32) -> &mut Self {
        self.write_tlv(Tag::ENUMERATED, &BigInt::from(value).to_signed_bytes_be())
    }

    /// Write an OCTET STRING.
    pub fn write_octet_string(&mut self, value: &[u8]) -> &mut Self {
        self.write_tlv(Tag::OCTET_STRING, value)
    }

    /// Write a BIT STRING with the given unused_bits count.
    pub fn write_bit_string(&mut self, unused_bits: u8, value: &[u8]) -> &mut Self {
        let mut content = Vec::with_capacity(value.len() + 1);
        content.push(unused_bits);
        content.extend_from_slice(value);
        self.write_tlv(Tag::BIT_STRING, &content)
    }

    /// Write an OBJECT IDENTIFIER.
    pub fn write_oid(&mut self, oid: &Oid) -> Result<&mut Self, Asn1Error> {
        let value = oid.to_der_value()?;
        Ok(self.write_tlv(Tag::OID, &value))
    }

    /// Write a NULL.
    pub fn write_null(&mut self) -> &mut Self {
        self.write_tlv(Tag::NULL, &[])
    }

    /// Write a BOOLEAN (DER form: `FF` for true).
    pub fn write_boolean(&mut self, val: bool) -> &mut Self {
        self.write_tlv(Tag::BOOLEAN, &[if val { 0xFF } else { 0x00 }])
    }

    /// Write a SEQUENCE wrapping the given contents.
    pub fn write_sequence(&mut self, contents: &[u8]) -> &mut Self {
        self.write_tlv(Tag::SEQUENCE, contents)
    }

    /// Write a SET wrapping already-ordered contents.
    pub fn write_set(&mut self, contents: &[u8]) -> &mut Self {
        self.write_tlv(Tag::SET, contents)
    }

    /// Write a SET from individually encoded elements. DER output orders
    /// them by ascending encoding; BER keeps the given order.
    pub fn write_set_of(&mut self, elements: &[Vec<u8>]) -> &mut Self {
        let mut refs: Vec<&[u8]> = elements.iter().map(Vec::as_slice).collect();
        if self.rules == EncodingRules::Der {
            refs.sort();
        }
        let contents = refs.concat();
        self.write_set(&contents)
    }

    /// Write raw bytes directly (already encoded).
    pub fn write_raw(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Write a UTF8String. Every Rust string is valid UTF-8, so this
    /// cannot fail.
    pub fn write_utf8_string(&mut self, s: &str) -> &mut Self {
        self.write_tlv(Tag::universal(StringKind::Utf8.tag_number(), false), s.as_bytes())
    }

    /// Write any character string type, rejecting characters outside
    /// its repertoire.
    pub fn write_string(&mut self, kind: StringKind, s: &str) -> Result<&mut Self, Asn1Error> {
        let content = encode_string(kind, s)?;
        Ok(self.write_tlv(Tag::universal(kind.tag_number(), false), &content))
    }

    pub fn write_printable_string(&mut self, s: &str) -> Result<&mut Self, Asn1Error> {
        self.write_string(StringKind::Printable, s)
    }

    pub fn write_ia5_string(&mut self, s: &str) -> Result<&mut Self, Asn1Error> {
        self.write_string(StringKind::Ia5, s)
    }

    /// Write a context-specific tagged value.
    pub fn write_context_specific(
        &mut self,
        tag_num: u32,
        constructed: bool,
        content: &[u8],
    ) -> &mut Self {
        self.write_tlv(Tag::context(tag_num, constructed), content)
    }

    /// Write `[n] EXPLICIT` around already-encoded content.
    pub fn write_explicit(&mut self, tag_num: u32, content: &[u8]) -> &mut Self {
        self.write_context_specific(tag_num, true, content)
    }

    /// Write a time. BER keeps the text as decoded; DER writes the
    /// canonical form of the same instant.
    pub fn write_time(&mut self, time: &Asn1Time) -> &mut Self {
        let canonical;
        let time = if self.rules == EncodingRules::Der && !time.is_der() {
            canonical = time.to_der_form();
            &canonical
        } else {
            time
        };
        let tag = match time.kind() {
            super::TimeKind::Utc => Tag::UTC_TIME,
            super::TimeKind::Generalized => Tag::GENERALIZED_TIME,
        };
        self.write_tlv(tag, time.as_str().as_bytes())
    }

    /// Write an X.509 `Time` (UTCTime through 2049, GeneralizedTime after).
    pub fn write_x509_time(&mut self, timestamp: i64) -> Result<&mut Self, Asn1Error> {
        let time = Asn1Time::x509(timestamp)?;
        Ok(self.write_time(&time))
    }

    /// Write a GeneralizedTime from a UNIX timestamp.
    pub fn write_generalized_time(&mut self, timestamp: i64) -> Result<&mut Self, Asn1Error> {
        let time = Asn1Time::generalized(timestamp)?;
        Ok(self.write_time(&time))
    }

    /// Write a value from the generic model.
    pub fn write_value(&mut self, value: &Asn1Value) -> Result<&mut Self, Asn1Error> {
        match value {
            Asn1Value::Boolean(b) => self.write_boolean(*b),
            Asn1Value::Integer(i) => self.write_big_integer(i),
            Asn1Value::Enumerated(i) => self.write_tlv(Tag::ENUMERATED, &i.to_signed_bytes_be()),
            Asn1Value::BitString(bits) => self.write_bit_string(bits.unused_bits(), bits.as_bytes()),
            Asn1Value::OctetString(data) => self.write_octet_string(data),
            Asn1Value::Null => self.write_null(),
            Asn1Value::ObjectIdentifier(oid) => self.write_oid(oid)?,
            Asn1Value::String(kind, text) => self.write_string(*kind, text)?,
            Asn1Value::Time(t) => self.write_time(t),
            Asn1Value::Sequence(items) => {
                self.begin_constructed(Tag::SEQUENCE);
                for item in items {
                    self.write_value(item)?;
                }
                self.end_constructed()?
            }
            Asn1Value::Set(items) if self.rules == EncodingRules::Der => {
                let encoded = items
                    .iter()
                    .map(Asn1Value::to_der)
                    .collect::<Result<Vec<_>, _>>()?;
                self.write_set_of(&encoded)
            }
            Asn1Value::Set(items) => {
                self.begin_constructed(Tag::SET);
                for item in items {
                    self.write_value(item)?;
                }
                self.end_constructed()?
            }
            Asn1Value::Tagged(tagged) => self.write_tagged(tagged)?,
        };
        Ok(self)
    }

    fn write_tagged(&mut self, tagged: &TaggedObject) -> Result<&mut Self, Asn1Error> {
        let tag = tagged.tag();
        if tagged.explicit {
            self.begin_constructed(tag);
            self.write_value(&tagged.inner)?;
            return self.end_constructed();
        }
        // Implicit: encode the inner value, then swap its identifier.
        let mut inner = Encoder::with_rules(self.rules);
        inner.write_value(&tagged.inner)?;
        let bytes = inner.finish();
        let (_, inner_tag_len) = Tag::from_bytes(&bytes)?;
        tag.write_to(&mut self.buf);
        self.buf.extend_from_slice(&bytes[inner_tag_len..]);
        Ok(self)
    }

    /// Append a bare definite length (used by callers assembling headers).
    pub fn write_length(&mut self, length: usize) -> &mut Self {
        write_length(length, &mut self.buf);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::Decoder;
    use hex_literal::hex;
    use proptest::prelude::*;

    #[test]
    fn test_write_utf8_string() {
        let mut enc = Encoder::new();
        enc.write_utf8_string("Hello");
        assert_eq!(enc.finish(), &[0x0C, 5, b'H', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_write_printable_string() {
        let mut enc = Encoder::new();
        enc.write_printable_string("CN").unwrap();
        assert_eq!(enc.finish(), &[0x13, 2, b'C', b'N']);
        assert!(Encoder::new().write_printable_string("a&b").is_err());
    }

    #[test]
    fn test_write_integer_minimal() {
        let mut enc = Encoder::new();
        enc.write_integer(&[]).write_integer(&[0x00, 0x00, 0x7F]).write_integer(&[0x80]);
        assert_eq!(enc.finish(), hex!("020100 02017F 02020080"));
        let mut enc = Encoder::new();
        enc.write_u64(65_537);
        assert_eq!(enc.finish(), hex!("0203010001"));
    }

    #[test]
    fn test_write_big_integer_sign_octets() {
        let mut enc = Encoder::new();
        enc.write_big_integer(&BigInt::from(0))
            .write_big_integer(&BigInt::from(128))
            .write_big_integer(&BigInt::from(-128));
        assert_eq!(enc.finish(), hex!("020100 02020080 020180"));
    }

    #[test]
    fn test_write_x509_time() {
        // 2025-01-15 12:00:00 UTC
        let mut enc = Encoder::new();
        enc.write_x509_time(1_736_942_400).unwrap();
        let der = enc.finish();
        assert_eq!(der[0], 0x17);
        assert_eq!(&der[2..], b"250115120000Z");

        // 2050-06-20 00:00:00 UTC switches to GeneralizedTime
        let mut enc = Encoder::new();
        enc.write_x509_time(2_539_296_000).unwrap();
        let der = enc.finish();
        assert_eq!(der[0], 0x18);
        assert_eq!(&der[2..], b"20500620000000Z");
    }

    #[test]
    fn test_write_time_canonical_under_der() {
        let offset = Asn1Time::parse(
            crate::asn1::TimeKind::Generalized,
            b"20240101120000+0100",
            EncodingRules::Ber,
        )
        .unwrap();
        let mut der = Encoder::new();
        der.write_time(&offset);
        let mut expected = vec![0x18, 15];
        expected.extend_from_slice(b"20240101110000Z");
        assert_eq!(der.finish(), expected);

        let mut ber = Encoder::with_rules(EncodingRules::Ber);
        ber.write_time(&offset);
        let mut expected = vec![0x18, 19];
        expected.extend_from_slice(b"20240101120000+0100");
        assert_eq!(ber.finish(), expected);
    }

    #[test]
    fn test_write_context_specific() {
        let mut inner = Encoder::new();
        inner.write_integer(&[0x02]);
        let mut enc = Encoder::new();
        enc.write_explicit(0, &inner.finish());
        assert_eq!(enc.finish(), &[0xA0, 3, 0x02, 1, 0x02]);
    }

    #[test]
    fn test_write_boolean() {
        let mut enc = Encoder::new();
        enc.write_boolean(true).write_boolean(false);
        assert_eq!(enc.finish(), &[0x01, 1, 0xFF, 0x01, 1, 0x00]);
    }

    #[test]
    fn test_set_of_ordering() {
        let b = hex!("0C0162").to_vec();
        let a = hex!("0201FF").to_vec();
        let mut der = Encoder::new();
        der.write_set_of(&[b.clone(), a.clone()]);
        assert_eq!(der.finish(), hex!("3106 0201FF 0C0162"));
        let mut ber = Encoder::with_rules(EncodingRules::Ber);
        ber.write_set_of(&[b, a]);
        assert_eq!(ber.finish(), hex!("3106 0C0162 0201FF"));
    }

    #[test]
    fn test_streaming_constructed() {
        let mut der = Encoder::new();
        der.begin_constructed(Tag::SEQUENCE);
        der.write_null();
        der.begin_constructed(Tag::context(1, true));
        der.write_boolean(true);
        der.end_constructed().unwrap();
        der.end_constructed().unwrap();
        assert_eq!(der.finish(), hex!("3007 0500 A103 0101FF"));

        let mut ber = Encoder::with_rules(EncodingRules::Ber);
        ber.begin_constructed(Tag::SEQUENCE);
        ber.write_null();
        let bytes = ber.finish();
        assert_eq!(bytes, hex!("3080 0500 0000"));
        let mut dec = Decoder::with_rules(&bytes, EncodingRules::Ber);
        let mut seq = dec.read_sequence().unwrap();
        seq.read_null().unwrap();
        assert!(seq.is_empty() && dec.is_empty());

        assert!(Encoder::new().end_constructed().is_err());
    }

    #[test]
    fn test_long_length() {
        let content = vec![0xAB; 300];
        let mut enc = Encoder::new();
        enc.write_octet_string(&content);
        let der = enc.finish();
        assert_eq!(&der[..4], &[0x04, 0x82, 0x01, 0x2C]);
        let mut dec = Decoder::new(&der);
        assert_eq!(dec.read_octet_string().unwrap().len(), 300);
    }

    proptest! {
        #[test]
        fn prop_big_integer_roundtrip(bytes in prop::collection::vec(any::<u8>(), 0..40), negative in any::<bool>()) {
            let mut value = BigInt::from_bytes_be(num_bigint::Sign::Plus, &bytes);
            if negative {
                value = -value;
            }
            let mut enc = Encoder::new();
            enc.write_big_integer(&value);
            let der = enc.finish();
            let mut dec = Decoder::new(&der);
            prop_assert_eq!(dec.read_big_integer().unwrap(), value);
            prop_assert!(dec.is_empty());
        }
    }
}
