//! Codec and path validation benchmarks.
//!
//! Run with: cargo bench -p pathkit-benches

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pathkit_pki::path::{PathValidator, ValidationParameters};
use pathkit_pki::x509::{
    Certificate, CertificateBuilder, DistinguishedName, KeyUsage, Signer, SigningKey,
};
use pathkit_types::HashAlgId;
use pathkit_utils::asn1::{Asn1Value, EncodingRules};
use pathkit_utils::oid::known;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

const NOW: i64 = 1_700_000_000;
const YEAR: i64 = 365 * 86_400;

fn key(seed: u64) -> SigningKey {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    SigningKey::generate(&mut rng, 2048, HashAlgId::Sha256).unwrap()
}

fn name(cn: &str) -> DistinguishedName {
    DistinguishedName::new(&[(known::common_name(), cn)]).unwrap()
}

/// Leaf first, root last.
fn chain(len: usize) -> Vec<Certificate> {
    let keys: Vec<SigningKey> = (0..len as u64).map(key).collect();
    let root = CertificateBuilder::self_signed(name("CA 0"), &keys[0], NOW - YEAR, NOW + YEAR)
        .unwrap();
    let mut certs = vec![root];
    for i in 1..len {
        let is_leaf = i == len - 1;
        let subject = if is_leaf { name("Leaf") } else { name(&format!("CA {i}")) };
        let mut builder = CertificateBuilder::new()
            .serial_number(&[i as u8 + 1])
            .issuer(certs[i - 1].subject().clone())
            .subject(subject)
            .validity(NOW - YEAR, NOW + YEAR)
            .subject_public_key(keys[i].public_key_info().unwrap());
        if !is_leaf {
            builder = builder
                .add_basic_constraints(true, None)
                .add_key_usage(KeyUsage::KEY_CERT_SIGN | KeyUsage::CRL_SIGN);
        }
        certs.push(builder.build(&keys[i - 1]).unwrap());
    }
    certs.reverse();
    certs
}

fn bench_codec(c: &mut Criterion) {
    let der = chain(2)[0].to_der().to_vec();
    let mut group = c.benchmark_group("codec");

    group.bench_function("certificate_from_der", |b| {
        b.iter(|| Certificate::from_der(&der).unwrap());
    });
    group.bench_function("value_decode_der", |b| {
        b.iter(|| Asn1Value::decode(&der, EncodingRules::Der).unwrap());
    });
    let value = Asn1Value::from_der(&der).unwrap();
    group.bench_function("value_encode_der", |b| {
        b.iter(|| value.to_der().unwrap());
    });

    group.finish();
}

fn bench_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_validation");

    for len in [2, 3, 5] {
        let path = chain(len);
        let mut params = ValidationParameters::new();
        params
            .add_trusted_cert(path[len - 1].clone())
            .set_validation_time(NOW);
        group.bench_with_input(BenchmarkId::new("validate", len), &path, |b, path| {
            b.iter(|| {
                let result = PathValidator::new(&params).validate(path);
                assert!(result.is_valid());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_validation);
criterion_main!(benches);
