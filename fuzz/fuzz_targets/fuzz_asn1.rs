#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut decoder = pathkit_utils::asn1::Decoder::new(data);
    while !decoder.is_empty() {
        match decoder.read_tlv() {
            Ok(tlv) => {
                let _ = tlv.decode();
            }
            Err(_) => break,
        }
    }
});
