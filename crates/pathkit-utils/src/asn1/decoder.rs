//! ASN.1 BER/DER decoder.

use super::header::read_header;
use super::primitive::{self, StringKind};
use super::value::{decode_tlv, rebase, BitString};
use super::{tags, Asn1Time, Asn1Value, EncodingRules, Length, Tag, TagClass, TimeKind, Tlv};
use crate::oid::Oid;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use pathkit_types::Asn1Error;
use std::borrow::Cow;

/// Nesting limit for indefinite-length scans, constructed strings and
/// generic value decoding.
pub(crate) const MAX_DEPTH: usize = 64;

/// A streaming ASN.1 decoder.
///
/// Offsets reported in errors are absolute: a decoder over the contents
/// of an element reports positions in the outermost buffer.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
    rules: EncodingRules,
}

impl<'a> Decoder<'a> {
    /// Create a new DER decoder over the given data.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_rules(data, EncodingRules::Der)
    }

    pub fn with_rules(data: &'a [u8], rules: EncodingRules) -> Self {
        Self::nested(data, 0, rules)
    }

    pub(crate) fn nested(data: &'a [u8], base: usize, rules: EncodingRules) -> Self {
        Self {
            data,
            pos: 0,
            base,
            rules,
        }
    }

    pub fn rules(&self) -> EncodingRules {
        self.rules
    }

    /// Returns the remaining undecoded bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Returns true if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Absolute offset of the next byte to be read.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Fail if any bytes are left unread.
    pub fn finish(&self) -> Result<(), Asn1Error> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Asn1Error::malformed(self.offset(), "trailing data"))
        }
    }

    /// Parse the next TLV element.
    pub fn read_tlv(&mut self) -> Result<Tlv<'a>, Asn1Error> {
        let start = self.pos;
        let abs = self.offset();
        if start >= self.data.len() {
            return Err(Asn1Error::TruncatedInput { offset: abs });
        }
        let header = read_header(&self.data[start..], self.rules).map_err(|e| rebase(e, abs))?;
        if header.tag == Tag::END_OF_CONTENTS {
            return Err(Asn1Error::malformed(abs, "unexpected end-of-contents"));
        }
        let content_start = start + header.header_len;
        let (content_len, end) = match header.length {
            Length::Definite(len) => {
                let end = content_start
                    .checked_add(len)
                    .filter(|&end| end <= self.data.len())
                    .ok_or(Asn1Error::TruncatedInput {
                        offset: self.base + self.data.len(),
                    })?;
                (len, end)
            }
            Length::Indefinite => {
                let len = find_end_of_contents(
                    &self.data[content_start..],
                    self.base + content_start,
                    0,
                )?;
                (len, content_start + len + 2)
            }
        };
        self.pos = end;
        Ok(Tlv {
            tag: header.tag,
            value: &self.data[content_start..content_start + content_len],
            raw: &self.data[start..end],
            offset: abs,
            content_offset: self.base + content_start,
            rules: self.rules,
        })
    }

    /// Peek at the next tag without consuming it.
    pub fn peek_tag(&self) -> Result<Tag, Asn1Error> {
        if self.is_empty() {
            return Err(Asn1Error::TruncatedInput {
                offset: self.offset(),
            });
        }
        let (tag, _) = Tag::from_bytes(self.remaining()).map_err(|e| rebase(e, self.offset()))?;
        Ok(tag)
    }

    /// True if the next element has the given class and number.
    pub fn next_is(&self, class: TagClass, number: u32) -> bool {
        self.peek_tag()
            .map(|t| t.class == class && t.number == number)
            .unwrap_or(false)
    }

    /// Read an element and check its identifier. Under BER a string type
    /// may arrive in constructed form.
    pub fn read_expected(&mut self, expected: Tag) -> Result<Tlv<'a>, Asn1Error> {
        let offset = self.offset();
        let tlv = self.read_tlv()?;
        let form_ok = tlv.tag.constructed == expected.constructed
            || (self.rules == EncodingRules::Ber
                && expected.class == TagClass::Universal
                && !expected.constructed
                && allows_constructed(expected.number));
        if !tlv.tag.same_type(&expected) || !form_ok {
            return Err(Asn1Error::UnexpectedTag {
                offset,
                expected: expected.to_string(),
                found: tlv.tag.to_string(),
            });
        }
        Ok(tlv)
    }

    /// Read an element whose identifier matches `tag` exactly, or nothing.
    pub fn read_optional(&mut self, tag: Tag) -> Result<Option<Tlv<'a>>, Asn1Error> {
        if self.is_empty() || self.peek_tag()? != tag {
            return Ok(None);
        }
        self.read_tlv().map(Some)
    }

    /// Read an INTEGER and return its content octets (two's complement,
    /// big-endian).
    pub fn read_integer(&mut self) -> Result<&'a [u8], Asn1Error> {
        let tlv = self.read_expected(Tag::INTEGER)?;
        primitive::decode_integer(tlv.value, self.rules).map_err(|e| rebase(e, tlv.content_offset))?;
        Ok(tlv.value)
    }

    pub fn read_big_integer(&mut self) -> Result<BigInt, Asn1Error> {
        let tlv = self.read_expected(Tag::INTEGER)?;
        primitive::decode_integer(tlv.value, self.rules).map_err(|e| rebase(e, tlv.content_offset))
    }

    /// Read a non-negative INTEGER that fits in a `u64`.
    pub fn read_u64(&mut self) -> Result<u64, Asn1Error> {
        self.read_big_integer()?
            .to_u64()
            .ok_or(Asn1Error::IntegerOverflow)
    }

    /// Read a non-negative INTEGER that fits in a `u32`.
    pub fn read_u32(&mut self) -> Result<u32, Asn1Error> {
        u32::try_from(self.read_u64()?).map_err(|_| Asn1Error::IntegerOverflow)
    }

    /// Read an ENUMERATED that fits in a `u32`.
    pub fn read_enumerated(&mut self) -> Result<u32, Asn1Error> {
        let tlv = self.read_expected(Tag::ENUMERATED)?;
        primitive::decode_integer(tlv.value, self.rules)
            .map_err(|e| rebase(e, tlv.content_offset))?
            .to_u32()
            .ok_or(Asn1Error::IntegerOverflow)
    }

    /// Read a BOOLEAN value (DER: 0x00=false, 0xFF=true).
    pub fn read_boolean(&mut self) -> Result<bool, Asn1Error> {
        let tlv = self.read_expected(Tag::BOOLEAN)?;
        primitive::decode_boolean(tlv.value, self.rules).map_err(|e| rebase(e, tlv.content_offset))
    }

    pub fn read_null(&mut self) -> Result<(), Asn1Error> {
        let tlv = self.read_expected(Tag::NULL)?;
        primitive::decode_null(tlv.value).map_err(|e| rebase(e, tlv.content_offset))
    }

    /// Read an OCTET STRING. Borrowed unless BER segments had to be joined.
    pub fn read_octet_string(&mut self) -> Result<Cow<'a, [u8]>, Asn1Error> {
        let tlv = self.read_expected(Tag::OCTET_STRING)?;
        reassemble(&tlv)
    }

    /// Read a BIT STRING.
    pub fn read_bit_string(&mut self) -> Result<BitString, Asn1Error> {
        let tlv = self.read_expected(Tag::BIT_STRING)?;
        let content = reassemble(&tlv)?;
        let (unused, data) = primitive::decode_bit_string(&content, self.rules)
            .map_err(|e| rebase(e, tlv.content_offset))?;
        BitString::new(data.to_vec(), unused)
    }

    /// Read an OBJECT IDENTIFIER.
    pub fn read_oid(&mut self) -> Result<Oid, Asn1Error> {
        let tlv = self.read_expected(Tag::OID)?;
        Oid::from_der_value(tlv.value).map_err(|e| rebase(e, tlv.content_offset))
    }

    /// Read any character string type, returning its kind and text.
    pub fn read_string_with_kind(&mut self) -> Result<(StringKind, String), Asn1Error> {
        let offset = self.offset();
        let tag = self.peek_tag()?;
        let kind = match (tag.class, StringKind::from_tag_number(tag.number)) {
            (TagClass::Universal, Some(kind)) => kind,
            _ => {
                return Err(Asn1Error::UnexpectedTag {
                    offset,
                    expected: "character string".into(),
                    found: tag.to_string(),
                })
            }
        };
        let tlv = self.read_expected(Tag::universal(kind.tag_number(), false))?;
        let content = reassemble(&tlv)?;
        let text = primitive::decode_string(kind, &content)
            .map_err(|e| rebase(e, tlv.content_offset))?;
        Ok((kind, text))
    }

    /// Read a string value (UTF8String, PrintableString, IA5String,
    /// T61String, BMPString, ...) and return it as a Rust `String`.
    pub fn read_string(&mut self) -> Result<String, Asn1Error> {
        self.read_string_with_kind().map(|(_, text)| text)
    }

    /// Read a Time value (UTCTime or GeneralizedTime).
    pub fn read_time(&mut self) -> Result<Asn1Time, Asn1Error> {
        let offset = self.offset();
        let kind = match self.peek_tag()? {
            Tag::UTC_TIME => TimeKind::Utc,
            Tag::GENERALIZED_TIME => TimeKind::Generalized,
            other => {
                return Err(Asn1Error::UnexpectedTag {
                    offset,
                    expected: "UTCTime or GeneralizedTime".into(),
                    found: other.to_string(),
                })
            }
        };
        let tlv = self.read_tlv()?;
        Asn1Time::parse(kind, tlv.value, self.rules).map_err(|e| rebase(e, tlv.content_offset))
    }

    /// Read a SEQUENCE, returning a sub-decoder over its contents.
    pub fn read_sequence(&mut self) -> Result<Decoder<'a>, Asn1Error> {
        Ok(self.read_expected(Tag::SEQUENCE)?.contents())
    }

    /// Read a SET, returning a sub-decoder over its contents.
    pub fn read_set(&mut self) -> Result<Decoder<'a>, Asn1Error> {
        Ok(self.read_expected(Tag::SET)?.contents())
    }

    /// Read a context-specific tagged value with the expected tag number.
    pub fn read_context_specific(
        &mut self,
        tag_num: u32,
        constructed: bool,
    ) -> Result<Tlv<'a>, Asn1Error> {
        let offset = self.offset();
        let tlv = self.read_tlv()?;
        if tlv.tag != Tag::context(tag_num, constructed) {
            return Err(Asn1Error::UnexpectedTag {
                offset,
                expected: Tag::context(tag_num, constructed).to_string(),
                found: tlv.tag.to_string(),
            });
        }
        Ok(tlv)
    }

    /// Try to read a context-specific tagged value. Returns `None` if
    /// the next tag does not match, without consuming any bytes.
    pub fn try_read_context_specific(
        &mut self,
        tag_num: u32,
        constructed: bool,
    ) -> Result<Option<Tlv<'a>>, Asn1Error> {
        self.read_optional(Tag::context(tag_num, constructed))
    }

    /// Read `[n] EXPLICIT` and return a decoder over the wrapped element.
    pub fn read_explicit(&mut self, tag_num: u32) -> Result<Decoder<'a>, Asn1Error> {
        Ok(self.read_context_specific(tag_num, true)?.contents())
    }

    pub fn try_read_explicit(&mut self, tag_num: u32) -> Result<Option<Decoder<'a>>, Asn1Error> {
        Ok(self
            .try_read_context_specific(tag_num, true)?
            .map(|tlv| tlv.contents()))
    }

    /// Decode the next element into the generic value model.
    pub fn read_value(&mut self) -> Result<Asn1Value, Asn1Error> {
        let tlv = self.read_tlv()?;
        decode_tlv(&tlv, 0)
    }
}

/// Split a single encoded SEQUENCE into its elements. Each element keeps
/// its raw span and can be decoded on demand through [`Tlv::decode`].
pub fn decode_sequence(data: &[u8], rules: EncodingRules) -> Result<Vec<Tlv<'_>>, Asn1Error> {
    let mut outer = Decoder::with_rules(data, rules);
    let mut seq = outer.read_sequence()?;
    outer.finish()?;
    let mut items = Vec::new();
    while !seq.is_empty() {
        items.push(seq.read_tlv()?);
    }
    Ok(items)
}

fn allows_constructed(number: u32) -> bool {
    number == tags::BIT_STRING
        || number == tags::OCTET_STRING
        || StringKind::from_tag_number(number).is_some()
}

/// Length of indefinite-length content: the position of the matching
/// `00 00` marker, skipping nested elements.
fn find_end_of_contents(data: &[u8], base: usize, depth: usize) -> Result<usize, Asn1Error> {
    if depth > MAX_DEPTH {
        return Err(Asn1Error::malformed(base, "nesting too deep"));
    }
    let mut pos = 0;
    loop {
        match data.get(pos..pos + 2) {
            Some([0x00, 0x00]) => return Ok(pos),
            Some([0x00, _]) => {
                return Err(Asn1Error::malformed(base + pos, "end-of-contents with length"))
            }
            None if pos >= data.len() || data[pos] == 0x00 => {
                return Err(Asn1Error::TruncatedInput {
                    offset: base + data.len(),
                })
            }
            _ => {}
        }
        let header =
            read_header(&data[pos..], EncodingRules::Ber).map_err(|e| rebase(e, base + pos))?;
        let content = pos + header.header_len;
        pos = match header.length {
            Length::Definite(len) => content
                .checked_add(len)
                .filter(|&end| end <= data.len())
                .ok_or(Asn1Error::TruncatedInput {
                    offset: base + data.len(),
                })?,
            Length::Indefinite => {
                let len = find_end_of_contents(&data[content..], base + content, depth + 1)?;
                content + len + 2
            }
        };
    }
}

/// Content octets of a string-like element in primitive form. A BER
/// constructed encoding has its segments joined; for BIT STRING the
/// result carries a single leading unused-bits octet.
pub(crate) fn reassemble<'a>(tlv: &Tlv<'a>) -> Result<Cow<'a, [u8]>, Asn1Error> {
    if !tlv.tag.constructed {
        return Ok(Cow::Borrowed(tlv.value));
    }
    if tlv.rules == EncodingRules::Der {
        return Err(Asn1Error::malformed(tlv.offset, "constructed string in DER"));
    }
    if tlv.tag.class != TagClass::Universal || !allows_constructed(tlv.tag.number) {
        return Err(Asn1Error::malformed(tlv.offset, "type cannot be constructed"));
    }
    let mut out = Vec::new();
    let mut unused = 0u8;
    collect_segments(tlv, &mut out, &mut unused, 0)?;
    if tlv.tag.number == tags::BIT_STRING {
        out.insert(0, unused);
    }
    Ok(Cow::Owned(out))
}

fn collect_segments(
    tlv: &Tlv<'_>,
    out: &mut Vec<u8>,
    unused: &mut u8,
    depth: usize,
) -> Result<(), Asn1Error> {
    if depth > MAX_DEPTH {
        return Err(Asn1Error::malformed(tlv.offset, "nesting too deep"));
    }
    let bit_string = tlv.tag.number == tags::BIT_STRING;
    let mut inner = tlv.contents();
    while !inner.is_empty() {
        let seg = inner.read_tlv()?;
        let seg_ok = seg.tag.class == TagClass::Universal
            && (seg.tag.number == tlv.tag.number || seg.tag.number == tags::OCTET_STRING);
        if !seg_ok {
            return Err(Asn1Error::malformed(seg.offset, "foreign segment in constructed string"));
        }
        if seg.tag.constructed {
            collect_segments(&seg, out, unused, depth + 1)?;
            continue;
        }
        if bit_string {
            if *unused != 0 {
                return Err(Asn1Error::malformed(
                    seg.offset,
                    "only the last BIT STRING segment may have unused bits",
                ));
            }
            let (u, data) = primitive::decode_bit_string(seg.value, EncodingRules::Ber)
                .map_err(|e| rebase(e, seg.content_offset))?;
            *unused = u;
            out.extend_from_slice(data);
        } else {
            out.extend_from_slice(seg.value);
        }
    }
    Ok(())
}
