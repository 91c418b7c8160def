//! Deterministic keys and certificates shared by the unit tests.

use std::sync::OnceLock;

use pathkit_types::HashAlgId;
use pathkit_utils::oid::known;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rsa::RsaPrivateKey;

use crate::x509::{
    Certificate, CertificateBuilder, DistinguishedName, KeyUsage, Signer, SigningKey,
};

/// Fixed validation time: 2023-11-14T22:13:20Z.
pub(crate) const NOW: i64 = 1_700_000_000;
pub(crate) const DAY: i64 = 86_400;
pub(crate) const YEAR: i64 = 365 * DAY;

const KEY_COUNT: usize = 8;
#[allow(clippy::declare_interior_mutable_const)]
const NO_KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
static KEYS: [OnceLock<RsaPrivateKey>; KEY_COUNT] = [NO_KEY; KEY_COUNT];

/// The `i`th test key, generated once from a fixed seed.
pub(crate) fn key(i: usize) -> &'static RsaPrivateKey {
    KEYS[i].get_or_init(|| {
        let mut rng = ChaCha8Rng::seed_from_u64(0x7061_7468 + i as u64);
        RsaPrivateKey::new(&mut rng, 1024).unwrap()
    })
}

pub(crate) fn signer(i: usize) -> SigningKey {
    SigningKey::new(key(i).clone(), HashAlgId::Sha256)
}

pub(crate) fn root_signer() -> SigningKey {
    signer(0)
}

pub(crate) fn name(cn: &str) -> DistinguishedName {
    DistinguishedName::new(&[(known::common_name(), cn)]).unwrap()
}

/// Self-signed "Root CA" on key 0.
pub(crate) fn root_cert() -> Certificate {
    static ROOT: OnceLock<Certificate> = OnceLock::new();
    ROOT.get_or_init(|| {
        let (not_before, not_after) = (NOW - 10 * YEAR, NOW + 10 * YEAR);
        CertificateBuilder::self_signed(name("Root CA"), &root_signer(), not_before, not_after)
            .unwrap()
    })
    .clone()
}

/// Issue a certificate for `subject` on key `subject_key`, signed by
/// `issuer` with key `issuer_key`. `customize` adds extensions or overrides
/// the default one-year validity.
pub(crate) fn issue(
    issuer: &Certificate,
    issuer_key: usize,
    subject: &str,
    subject_key: usize,
    serial: u8,
    customize: impl FnOnce(CertificateBuilder) -> CertificateBuilder,
) -> Certificate {
    let builder = CertificateBuilder::new()
        .serial_number(&[serial])
        .issuer(issuer.subject().clone())
        .subject(name(subject))
        .validity(NOW - DAY, NOW + YEAR)
        .subject_public_key(signer(subject_key).public_key_info().unwrap());
    customize(builder).build(&signer(issuer_key)).unwrap()
}

/// A CA certificate issued by `issuer`.
pub(crate) fn ca_cert(
    issuer: &Certificate,
    issuer_key: usize,
    subject: &str,
    subject_key: usize,
    serial: u8,
) -> Certificate {
    issue(issuer, issuer_key, subject, subject_key, serial, |b| {
        b.add_basic_constraints(true, None)
            .add_key_usage(KeyUsage::KEY_CERT_SIGN | KeyUsage::CRL_SIGN)
    })
}

/// End-entity "Leaf" on key 1, serial 0x10, issued by the root.
pub(crate) fn leaf_cert(root: &Certificate, not_before: i64, not_after: i64) -> Certificate {
    issue(root, 0, "Leaf", 1, 0x10, |b| b.validity(not_before, not_after))
}

/// Root (key 0), "Intermediate CA" (key 2) and "Leaf" (key 1).
pub(crate) fn chain() -> (Certificate, Certificate, Certificate) {
    let root = root_cert();
    let intermediate = ca_cert(&root, 0, "Intermediate CA", 2, 0x02);
    let leaf = issue(&intermediate, 2, "Leaf", 1, 0x10, |b| {
        b.add_key_usage(KeyUsage::DIGITAL_SIGNATURE)
    });
    (root, intermediate, leaf)
}
