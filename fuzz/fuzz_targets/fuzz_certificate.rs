#![no_main]
use libfuzzer_sys::fuzz_target;
use pathkit_pki::x509::Certificate;

fuzz_target!(|data: &[u8]| {
    if let Ok(cert) = Certificate::from_der(data) {
        let _ = cert.basic_constraints();
        let _ = cert.subject_alt_name();
        let _ = cert.name_constraints();
        let _ = cert.certificate_policies();
        let _ = cert.crl_distribution_points();
        let _ = cert.subject().to_string();
    }
});
