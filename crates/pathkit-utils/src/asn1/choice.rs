//! CHOICE resolution by tag.

use super::{Decoder, TagClass, Tlv};
use pathkit_types::Asn1Error;

/// Parses one alternative of a CHOICE from the element carrying it.
pub type ChoiceParser<T> = fn(&Tlv<'_>) -> Result<T, Asn1Error>;

/// Per-schema dispatch table from `(class, number)` to the parser of the
/// alternative that tag selects. The constructed flag is not part of the
/// key: an alternative's parser checks the form it expects.
pub struct ChoiceTable<T: 'static> {
    name: &'static str,
    alternatives: &'static [(TagClass, u32, ChoiceParser<T>)],
}

impl<T> ChoiceTable<T> {
    pub const fn new(
        name: &'static str,
        alternatives: &'static [(TagClass, u32, ChoiceParser<T>)],
    ) -> Self {
        ChoiceTable { name, alternatives }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether some alternative is selected by the element's tag.
    pub fn accepts(&self, tlv: &Tlv<'_>) -> bool {
        self.lookup(tlv).is_some()
    }

    fn lookup(&self, tlv: &Tlv<'_>) -> Option<ChoiceParser<T>> {
        self.alternatives
            .iter()
            .find(|(class, number, _)| *class == tlv.tag.class && *number == tlv.tag.number)
            .map(|(_, _, parser)| *parser)
    }

    /// Dispatch on the element's tag. An unlisted tag fails with
    /// `UnknownChoiceAlternative` naming the offending tag.
    pub fn resolve(&self, tlv: &Tlv<'_>) -> Result<T, Asn1Error> {
        match self.lookup(tlv) {
            Some(parser) => parser(tlv),
            None => Err(Asn1Error::UnknownChoiceAlternative {
                tag: format!("{} in {} at offset {}", tlv.tag, self.name, tlv.offset),
            }),
        }
    }

    /// Read the next element from `dec` and resolve it.
    pub fn decode(&self, dec: &mut Decoder<'_>) -> Result<T, Asn1Error> {
        let tlv = dec.read_tlv()?;
        self.resolve(&tlv)
    }
}
