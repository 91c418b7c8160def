//! ASN.1 identifier octets.

use super::{tags, Tag, TagClass};
use pathkit_types::Asn1Error;
use std::fmt;

impl Tag {
    pub const BOOLEAN: Tag = Tag::universal(tags::BOOLEAN, false);
    pub const INTEGER: Tag = Tag::universal(tags::INTEGER, false);
    pub const BIT_STRING: Tag = Tag::universal(tags::BIT_STRING, false);
    pub const OCTET_STRING: Tag = Tag::universal(tags::OCTET_STRING, false);
    pub const NULL: Tag = Tag::universal(tags::NULL, false);
    pub const OID: Tag = Tag::universal(tags::OID, false);
    pub const ENUMERATED: Tag = Tag::universal(tags::ENUMERATED, false);
    pub const SEQUENCE: Tag = Tag::universal(tags::SEQUENCE, true);
    pub const SET: Tag = Tag::universal(tags::SET, true);
    pub const UTC_TIME: Tag = Tag::universal(tags::UTC_TIME, false);
    pub const GENERALIZED_TIME: Tag = Tag::universal(tags::GENERALIZED_TIME, false);
    pub const END_OF_CONTENTS: Tag = Tag::universal(tags::END_OF_CONTENTS, false);

    pub const fn universal(number: u32, constructed: bool) -> Self {
        Tag {
            class: TagClass::Universal,
            constructed,
            number,
        }
    }

    pub const fn context(number: u32, constructed: bool) -> Self {
        Tag {
            class: TagClass::ContextSpecific,
            constructed,
            number,
        }
    }

    pub const fn application(number: u32, constructed: bool) -> Self {
        Tag {
            class: TagClass::Application,
            constructed,
            number,
        }
    }

    /// Same class and number, constructed flag replaced.
    pub const fn with_constructed(self, constructed: bool) -> Self {
        Tag {
            class: self.class,
            constructed,
            number: self.number,
        }
    }

    /// Class and number match, ignoring the constructed flag.
    pub fn same_type(&self, other: &Tag) -> bool {
        self.class == other.class && self.number == other.number
    }

    /// Parse identifier octets from the start of `input`.
    /// Returns the tag and the number of bytes consumed.
    ///
    /// Offsets in errors are relative to `input`.
    pub fn from_bytes(input: &[u8]) -> Result<(Self, usize), Asn1Error> {
        let first = *input.first().ok_or(Asn1Error::TruncatedInput { offset: 0 })?;
        let class = match first >> 6 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        };
        let constructed = (first & 0x20) != 0;

        let low_bits = first & 0x1F;
        if low_bits < 0x1F {
            return Ok((
                Tag {
                    class,
                    constructed,
                    number: low_bits as u32,
                },
                1,
            ));
        }

        // High-tag-number form: base-128, high bit marks continuation.
        let mut number: u32 = 0;
        let mut i = 1;
        loop {
            let byte = *input.get(i).ok_or_else(|| {
                Asn1Error::malformed(i, "tag number continuation does not terminate")
            })?;
            if i == 1 && byte == 0x80 {
                return Err(Asn1Error::malformed(i, "non-minimal tag number"));
            }
            if number > (u32::MAX >> 7) {
                return Err(Asn1Error::malformed(i, "tag number too large"));
            }
            number = (number << 7) | (byte & 0x7F) as u32;
            i += 1;
            if (byte & 0x80) == 0 {
                break;
            }
        }
        if number < 0x1F {
            return Err(Asn1Error::malformed(
                1,
                "high-tag-number form used for a tag below 31",
            ));
        }
        Ok((
            Tag {
                class,
                constructed,
                number,
            },
            i,
        ))
    }

    /// Append the identifier octets to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let class_bits = match self.class {
            TagClass::Universal => 0x00,
            TagClass::Application => 0x40,
            TagClass::ContextSpecific => 0x80,
            TagClass::Private => 0xC0,
        };
        let constructed_bit = if self.constructed { 0x20 } else { 0x00 };

        if self.number < 0x1F {
            out.push(class_bits | constructed_bit | (self.number as u8));
            return;
        }
        out.push(class_bits | constructed_bit | 0x1F);
        let mut groups = [0u8; 5];
        let mut n = 0;
        let mut num = self.number;
        while num > 0 {
            groups[n] = (num & 0x7F) as u8;
            num >>= 7;
            n += 1;
        }
        for i in (0..n).rev() {
            let cont = if i > 0 { 0x80 } else { 0x00 };
            out.push(groups[i] | cont);
        }
    }

    /// Encode this tag to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2);
        self.write_to(&mut out);
        out
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let form = if self.constructed { "c" } else { "p" };
        match self.class {
            TagClass::Universal => write!(f, "[UNIVERSAL {}]{form}", self.number),
            TagClass::Application => write!(f, "[APPLICATION {}]{form}", self.number),
            TagClass::ContextSpecific => write!(f, "[{}]{form}", self.number),
            TagClass::Private => write!(f, "[PRIVATE {}]{form}", self.number),
        }
    }
}
