//! ASN.1 BER/DER encoding and decoding.
//!
//! Layering, leaves first:
//!
//! * [`Tag`] and [`Length`] with [`read_header`] / [`write_header`],
//! * content-octet validators and decoders for the primitive types,
//! * [`Decoder`], a streaming TLV reader with typed readers,
//! * [`Encoder`], the matching writer (canonical DER or BER),
//! * [`Asn1Value`], the closed in-memory model with [`TaggedObject`] and
//!   [`ChoiceTable`] for schema-driven CHOICE dispatch.

mod choice;
mod decoder;
mod encoder;
mod header;
mod primitive;
mod tag;
mod time;
mod value;

pub use choice::{ChoiceParser, ChoiceTable};
pub use decoder::{decode_sequence, Decoder};
pub use encoder::Encoder;
pub use header::{read_header, write_header, Header};
pub use primitive::{
    decode_bit_string, decode_boolean, decode_integer, decode_string, encode_string, validate,
    StringKind,
};
pub use time::{Asn1Time, DateTime, TimeKind};
pub use value::{Asn1Value, BitString, TaggedObject};

use pathkit_types::Asn1Error;

/// Universal tag numbers.
pub mod tags {
    pub const END_OF_CONTENTS: u32 = 0;
    pub const BOOLEAN: u32 = 1;
    pub const INTEGER: u32 = 2;
    pub const BIT_STRING: u32 = 3;
    pub const OCTET_STRING: u32 = 4;
    pub const NULL: u32 = 5;
    pub const OID: u32 = 6;
    pub const ENUMERATED: u32 = 10;
    pub const UTF8_STRING: u32 = 12;
    pub const SEQUENCE: u32 = 16;
    pub const SET: u32 = 17;
    pub const NUMERIC_STRING: u32 = 18;
    pub const PRINTABLE_STRING: u32 = 19;
    pub const T61_STRING: u32 = 20;
    pub const IA5_STRING: u32 = 22;
    pub const UTC_TIME: u32 = 23;
    pub const GENERALIZED_TIME: u32 = 24;
    pub const VISIBLE_STRING: u32 = 26;
    pub const UNIVERSAL_STRING: u32 = 28;
    pub const BMP_STRING: u32 = 30;
}

/// Represents a parsed ASN.1 tag.
///
/// Tag numbers are bounded to `u32`. High-tag-number forms denoting a
/// larger number are rejected by [`Tag::from_bytes`] as malformed; no
/// X.509, CRL or OCSP schema comes near that range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    pub class: TagClass,
    pub constructed: bool,
    /// Tag number, at most `u32::MAX`.
    pub number: u32,
}

/// ASN.1 tag class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

/// A length octet group: definite, or BER indefinite (terminated by `00 00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Definite(usize),
    Indefinite,
}

/// Which rule set a decoder enforces or an encoder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingRules {
    /// Distinguished: definite minimal lengths, canonical SET order,
    /// minimal integers, zero BIT STRING padding, `Z`-terminated times.
    #[default]
    Der,
    /// Basic: indefinite lengths, constructed strings and relaxed
    /// content rules are accepted.
    Ber,
}

/// A borrowed ASN.1 TLV element.
///
/// `value` holds the content octets (for indefinite lengths, without the
/// end-of-contents marker); `raw` spans the complete element including its
/// header so signed structures can be verified over their exact bytes.
#[derive(Debug, Clone)]
pub struct Tlv<'a> {
    pub tag: Tag,
    pub value: &'a [u8],
    pub raw: &'a [u8],
    /// Absolute offset of the first identifier octet.
    pub offset: usize,
    /// Absolute offset of the first content octet.
    pub content_offset: usize,
    pub rules: EncodingRules,
}

impl<'a> Tlv<'a> {
    /// Decode this element into the generic value model.
    pub fn decode(&self) -> Result<Asn1Value, Asn1Error> {
        value::decode_tlv(self, 0)
    }

    /// A decoder over the content octets of a constructed element.
    pub fn contents(&self) -> Decoder<'a> {
        Decoder::nested(self.value, self.content_offset, self.rules)
    }

    /// The identifier of a context-specific element matches `[number]`.
    pub fn is_context(&self, number: u32) -> bool {
        self.tag.class == TagClass::ContextSpecific && self.tag.number == number
    }
}
