#![no_main]
use libfuzzer_sys::fuzz_target;
use pathkit_utils::asn1::{Asn1Value, EncodingRules};

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = Asn1Value::decode(data, EncodingRules::Der) {
        let _ = value.to_der();
    }
    if let Ok(value) = Asn1Value::decode(data, EncodingRules::Ber) {
        let _ = value.encode(EncodingRules::Ber);
    }
});
