#![no_main]
use libfuzzer_sys::fuzz_target;
use pathkit_pki::x509::{OcspRequest, OcspResponse};

fuzz_target!(|data: &[u8]| {
    if let Ok(response) = OcspResponse::from_der(data) {
        if let Some(basic) = response.basic() {
            let _ = basic.nonce();
            let _ = basic.responses().len();
        }
    }
    let _ = OcspRequest::from_der(data);
});
