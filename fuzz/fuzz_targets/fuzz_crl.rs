#![no_main]
use libfuzzer_sys::fuzz_target;
use pathkit_pki::x509::CertificateRevocationList;

fuzz_target!(|data: &[u8]| {
    if let Ok(crl) = CertificateRevocationList::from_der(data) {
        let _ = crl.crl_number();
        let _ = crl.issuing_distribution_point();
        let _ = crl.find(&[0x01]);
    }
});
