//! Content-octet decoders and validators for the primitive universal types.
//!
//! Offsets in errors are relative to the content octets; the decoder
//! rebases them onto the enclosing buffer.

use super::{tags, EncodingRules};
use crate::oid::Oid;
use num_bigint::BigInt;
use pathkit_types::Asn1Error;

/// The character string types, each with its own repertoire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringKind {
    Utf8,
    Numeric,
    Printable,
    T61,
    Ia5,
    Visible,
    Universal,
    Bmp,
}

impl StringKind {
    pub fn from_tag_number(number: u32) -> Option<Self> {
        Some(match number {
            tags::UTF8_STRING => StringKind::Utf8,
            tags::NUMERIC_STRING => StringKind::Numeric,
            tags::PRINTABLE_STRING => StringKind::Printable,
            tags::T61_STRING => StringKind::T61,
            tags::IA5_STRING => StringKind::Ia5,
            tags::VISIBLE_STRING => StringKind::Visible,
            tags::UNIVERSAL_STRING => StringKind::Universal,
            tags::BMP_STRING => StringKind::Bmp,
            _ => return None,
        })
    }

    pub fn tag_number(self) -> u32 {
        match self {
            StringKind::Utf8 => tags::UTF8_STRING,
            StringKind::Numeric => tags::NUMERIC_STRING,
            StringKind::Printable => tags::PRINTABLE_STRING,
            StringKind::T61 => tags::T61_STRING,
            StringKind::Ia5 => tags::IA5_STRING,
            StringKind::Visible => tags::VISIBLE_STRING,
            StringKind::Universal => tags::UNIVERSAL_STRING,
            StringKind::Bmp => tags::BMP_STRING,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StringKind::Utf8 => "UTF8String",
            StringKind::Numeric => "NumericString",
            StringKind::Printable => "PrintableString",
            StringKind::T61 => "T61String",
            StringKind::Ia5 => "IA5String",
            StringKind::Visible => "VisibleString",
            StringKind::Universal => "UniversalString",
            StringKind::Bmp => "BMPString",
        }
    }

    /// Whether `c` belongs to this type's character repertoire.
    pub fn permits(self, c: char) -> bool {
        match self {
            StringKind::Utf8 => true,
            StringKind::Numeric => c.is_ascii_digit() || c == ' ',
            StringKind::Printable => {
                c.is_ascii_alphanumeric() || " '()+,-./:=?".contains(c)
            }
            // Teletex content is read as Latin-1.
            StringKind::T61 => (c as u32) <= 0xFF,
            StringKind::Ia5 => c.is_ascii(),
            StringKind::Visible => (' '..='~').contains(&c),
            StringKind::Universal => true,
            StringKind::Bmp => (c as u32) <= 0xFFFF,
        }
    }
}

/// INTEGER / ENUMERATED content. Empty content is always invalid; a
/// redundant leading `00` or `FF` octet is rejected under DER.
pub fn decode_integer(content: &[u8], rules: EncodingRules) -> Result<BigInt, Asn1Error> {
    check_integer(content, rules)?;
    Ok(BigInt::from_signed_bytes_be(content))
}

fn check_integer(content: &[u8], rules: EncodingRules) -> Result<(), Asn1Error> {
    match content {
        [] => Err(Asn1Error::malformed(0, "empty INTEGER")),
        [0x00, next, ..] | [0xFF, next, ..]
            if rules == EncodingRules::Der && (content[0] & 0x80) == (next & 0x80) =>
        {
            Err(Asn1Error::malformed(0, "INTEGER is not minimally encoded"))
        }
        _ => Ok(()),
    }
}

/// BOOLEAN content: exactly one octet, `00` or `FF` under DER.
pub fn decode_boolean(content: &[u8], rules: EncodingRules) -> Result<bool, Asn1Error> {
    match content {
        [0x00] => Ok(false),
        [0xFF] => Ok(true),
        [_] if rules == EncodingRules::Ber => Ok(true),
        [_] => Err(Asn1Error::malformed(0, "DER BOOLEAN must be 00 or FF")),
        _ => Err(Asn1Error::malformed(0, "BOOLEAN must be one octet")),
    }
}

/// Primitive BIT STRING content: returns `(unused_bits, data)`.
pub fn decode_bit_string(content: &[u8], rules: EncodingRules) -> Result<(u8, &[u8]), Asn1Error> {
    let (&unused, data) = content
        .split_first()
        .ok_or_else(|| Asn1Error::malformed(0, "BIT STRING without unused-bits octet"))?;
    if unused > 7 {
        return Err(Asn1Error::malformed(0, "unused-bits count above 7"));
    }
    if data.is_empty() && unused != 0 {
        return Err(Asn1Error::malformed(0, "empty BIT STRING with unused bits"));
    }
    if rules == EncodingRules::Der {
        if let Some(&last) = data.last() {
            let mask = (1u8 << unused) - 1;
            if last & mask != 0 {
                return Err(Asn1Error::malformed(
                    content.len() - 1,
                    "non-zero padding bits in DER BIT STRING",
                ));
            }
        }
    }
    Ok((unused, data))
}

pub fn decode_null(content: &[u8]) -> Result<(), Asn1Error> {
    if content.is_empty() {
        Ok(())
    } else {
        Err(Asn1Error::malformed(0, "NULL with content"))
    }
}

/// Decode character string content, enforcing the type's repertoire.
pub fn decode_string(kind: StringKind, content: &[u8]) -> Result<String, Asn1Error> {
    let invalid = |offset| Asn1Error::InvalidCharacterSet {
        string_type: kind.name(),
        offset,
    };
    let text = match kind {
        StringKind::T61 => content.iter().map(|&b| b as char).collect(),
        StringKind::Bmp => {
            if content.len() % 2 != 0 {
                return Err(invalid(content.len() - 1));
            }
            let mut out = String::with_capacity(content.len() / 2);
            for (i, c) in content.chunks_exact(2).enumerate() {
                let unit = u16::from_be_bytes([c[0], c[1]]);
                out.push(char::from_u32(unit as u32).ok_or_else(|| invalid(i * 2))?);
            }
            out
        }
        StringKind::Universal => {
            if content.len() % 4 != 0 {
                return Err(invalid(content.len() - content.len() % 4));
            }
            let mut out = String::with_capacity(content.len() / 4);
            for (i, c) in content.chunks_exact(4).enumerate() {
                let cp = u32::from_be_bytes([c[0], c[1], c[2], c[3]]);
                out.push(char::from_u32(cp).ok_or_else(|| invalid(i * 4))?);
            }
            out
        }
        _ => {
            let text = std::str::from_utf8(content).map_err(|e| invalid(e.valid_up_to()))?;
            if let Some((pos, _)) = text.char_indices().find(|&(_, c)| !kind.permits(c)) {
                return Err(invalid(pos));
            }
            text.to_string()
        }
    };
    Ok(text)
}

/// Encode text as the content octets of `kind`. Characters outside the
/// repertoire fail with `InvalidCharacterSet`; nothing is substituted.
pub fn encode_string(kind: StringKind, text: &str) -> Result<Vec<u8>, Asn1Error> {
    if let Some((pos, _)) = text.char_indices().find(|&(_, c)| !kind.permits(c)) {
        return Err(Asn1Error::InvalidCharacterSet {
            string_type: kind.name(),
            offset: pos,
        });
    }
    Ok(match kind {
        StringKind::T61 => text.chars().map(|c| c as u8).collect(),
        StringKind::Bmp => text
            .chars()
            .flat_map(|c| (c as u16).to_be_bytes())
            .collect(),
        StringKind::Universal => text
            .chars()
            .flat_map(|c| (c as u32).to_be_bytes())
            .collect(),
        _ => text.as_bytes().to_vec(),
    })
}

/// Structural well-formedness of primitive content under a universal tag
/// number, independent of semantic range. Unknown numbers are not valid.
pub fn validate(number: u32, content: &[u8], rules: EncodingRules) -> bool {
    match number {
        tags::BOOLEAN => decode_boolean(content, rules).is_ok(),
        tags::INTEGER | tags::ENUMERATED => check_integer(content, rules).is_ok(),
        tags::BIT_STRING => decode_bit_string(content, rules).is_ok(),
        tags::OCTET_STRING => true,
        tags::NULL => decode_null(content).is_ok(),
        tags::OID => Oid::from_der_value(content).is_ok(),
        tags::UTC_TIME => {
            super::Asn1Time::parse(super::TimeKind::Utc, content, rules).is_ok()
        }
        tags::GENERALIZED_TIME => {
            super::Asn1Time::parse(super::TimeKind::Generalized, content, rules).is_ok()
        }
        n => StringKind::from_tag_number(n)
            .map(|kind| decode_string(kind, content).is_ok())
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DER: EncodingRules = EncodingRules::Der;

    #[test]
    fn test_integer_minimal_forms() {
        assert_eq!(decode_integer(&[0x00], DER).unwrap(), BigInt::from(0));
        assert_eq!(decode_integer(&[0x00, 0x80], DER).unwrap(), BigInt::from(128));
        assert_eq!(decode_integer(&[0x80], DER).unwrap(), BigInt::from(-128));
        assert_eq!(decode_integer(&[0xFF, 0x7F], DER).unwrap(), BigInt::from(-129));
    }

    #[test]
    fn test_integer_rejects_padding_in_der() {
        assert!(decode_integer(&[], DER).is_err());
        assert!(decode_integer(&[], EncodingRules::Ber).is_err());
        assert!(decode_integer(&[0x00, 0x7F], DER).is_err());
        assert!(decode_integer(&[0xFF, 0x80], DER).is_err());
        assert_eq!(
            decode_integer(&[0x00, 0x7F], EncodingRules::Ber).unwrap(),
            BigInt::from(127)
        );
    }

    #[test]
    fn test_boolean() {
        assert!(decode_boolean(&[0xFF], DER).unwrap());
        assert!(!decode_boolean(&[0x00], DER).unwrap());
        assert!(decode_boolean(&[0x01], DER).is_err());
        assert!(decode_boolean(&[0x01], EncodingRules::Ber).unwrap());
        assert!(decode_boolean(&[0xFF, 0xFF], EncodingRules::Ber).is_err());
    }

    #[test]
    fn test_bit_string_padding() {
        assert_eq!(decode_bit_string(&[0x07, 0x80], DER).unwrap(), (7, &[0x80][..]));
        assert!(decode_bit_string(&[0x07, 0x81], DER).is_err());
        assert!(decode_bit_string(&[0x07, 0x81], EncodingRules::Ber).is_ok());
        assert!(decode_bit_string(&[0x08, 0x00], EncodingRules::Ber).is_err());
        assert!(decode_bit_string(&[], EncodingRules::Ber).is_err());
        assert!(decode_bit_string(&[0x03], DER).is_err());
        assert_eq!(decode_bit_string(&[0x00], DER).unwrap(), (0, &[][..]));
    }

    #[test]
    fn test_printable_repertoire() {
        assert_eq!(decode_string(StringKind::Printable, b"Example CA").unwrap(), "Example CA");
        let err = decode_string(StringKind::Printable, b"a@b").unwrap_err();
        assert_eq!(
            err,
            Asn1Error::InvalidCharacterSet {
                string_type: "PrintableString",
                offset: 1
            }
        );
        assert!(encode_string(StringKind::Printable, "under_score").is_err());
    }

    #[test]
    fn test_ia5_and_numeric() {
        assert!(decode_string(StringKind::Ia5, "caf\u{e9}".as_bytes()).is_err());
        assert!(decode_string(StringKind::Numeric, b"12 34").is_ok());
        assert!(decode_string(StringKind::Numeric, b"12-34").is_err());
    }

    #[test]
    fn test_bmp_and_universal() {
        let bmp = encode_string(StringKind::Bmp, "H\u{e9}").unwrap();
        assert_eq!(bmp, vec![0x00, 0x48, 0x00, 0xE9]);
        assert_eq!(decode_string(StringKind::Bmp, &bmp).unwrap(), "H\u{e9}");
        assert!(encode_string(StringKind::Bmp, "\u{1F600}").is_err());
        assert!(decode_string(StringKind::Bmp, &[0x00]).is_err());
        // lone surrogate
        assert!(decode_string(StringKind::Bmp, &[0xD8, 0x00]).is_err());

        let uni = encode_string(StringKind::Universal, "\u{1F600}").unwrap();
        assert_eq!(uni, vec![0x00, 0x01, 0xF6, 0x00]);
        assert_eq!(decode_string(StringKind::Universal, &uni).unwrap(), "\u{1F600}");
    }

    #[test]
    fn test_t61_latin1() {
        assert_eq!(decode_string(StringKind::T61, &[0x41, 0xE9]).unwrap(), "A\u{e9}");
        assert_eq!(encode_string(StringKind::T61, "A\u{e9}").unwrap(), vec![0x41, 0xE9]);
    }

    #[test]
    fn test_validate_dispatch() {
        assert!(validate(tags::INTEGER, &[0x01], DER));
        assert!(!validate(tags::INTEGER, &[], DER));
        assert!(validate(tags::NULL, &[], DER));
        assert!(!validate(tags::OID, &[0x2A, 0x80, 0x01], DER));
        assert!(validate(tags::UTC_TIME, b"500101000000Z", DER));
        assert!(!validate(9, &[0x00], DER));
    }
}
