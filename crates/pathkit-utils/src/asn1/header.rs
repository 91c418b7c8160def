//! Identifier and length octets.

use super::{EncodingRules, Length, Tag};
use pathkit_types::Asn1Error;

/// A decoded identifier/length pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: Tag,
    pub length: Length,
    /// Number of bytes occupied by identifier and length octets.
    pub header_len: usize,
}

/// Parse identifier and length octets from the start of `input`.
///
/// Under [`EncodingRules::Der`] the indefinite form, long-form lengths
/// below 128 and lengths with leading zero octets are rejected. The
/// reserved length octet `0xFF` is rejected under both rule sets.
pub fn read_header(input: &[u8], rules: EncodingRules) -> Result<Header, Asn1Error> {
    let (tag, tag_len) = Tag::from_bytes(input)?;
    let first = *input
        .get(tag_len)
        .ok_or(Asn1Error::TruncatedInput { offset: tag_len })?;

    if first < 0x80 {
        return Ok(Header {
            tag,
            length: Length::Definite(first as usize),
            header_len: tag_len + 1,
        });
    }
    if first == 0x80 {
        if rules == EncodingRules::Der {
            return Err(Asn1Error::malformed(tag_len, "indefinite length in DER"));
        }
        if !tag.constructed {
            return Err(Asn1Error::malformed(
                tag_len,
                "indefinite length on a primitive encoding",
            ));
        }
        return Ok(Header {
            tag,
            length: Length::Indefinite,
            header_len: tag_len + 1,
        });
    }
    if first == 0xFF {
        return Err(Asn1Error::malformed(tag_len, "reserved length octet 0xFF"));
    }

    let num_bytes = (first & 0x7F) as usize;
    let start = tag_len + 1;
    let bytes = input
        .get(start..start + num_bytes)
        .ok_or(Asn1Error::TruncatedInput { offset: start })?;
    if rules == EncodingRules::Der && bytes[0] == 0 {
        return Err(Asn1Error::malformed(start, "length has leading zero octets"));
    }
    let mut length: usize = 0;
    for &b in bytes {
        if length > (usize::MAX >> 8) {
            return Err(Asn1Error::malformed(start, "length does not fit in memory"));
        }
        length = (length << 8) | b as usize;
    }
    if rules == EncodingRules::Der && length < 0x80 {
        return Err(Asn1Error::malformed(
            tag_len,
            "long-form length used for a value below 128",
        ));
    }
    Ok(Header {
        tag,
        length: Length::Definite(length),
        header_len: start + num_bytes,
    })
}

/// Append identifier and length octets to `out`. Definite lengths are
/// always written in their minimal form.
pub fn write_header(tag: Tag, length: Length, out: &mut Vec<u8>) {
    tag.write_to(out);
    match length {
        Length::Indefinite => out.push(0x80),
        Length::Definite(len) => write_length(len, out),
    }
}

pub(crate) fn write_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}
