//! Signature capabilities: verification, signing and digests.
//!
//! The path validation engine and the CRL/OCSP checkers only see the
//! [`SignatureVerifier`] trait. [`RsaVerifier`] covers RSA PKCS#1 v1.5 with
//! the SHA-1 and SHA-2 digests; other algorithms plug in behind the trait.

use pathkit_types::{CryptoError, HashAlgId, PkeyAlgId};
use pathkit_utils::asn1::{Decoder, Encoder};
use pathkit_utils::oid::{known, Oid};
use rsa::rand_core::CryptoRngCore;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use super::certificate::{AlgorithmIdentifier, SubjectPublicKeyInfo};

// ---------------------------------------------------------------------------
// Digest dispatch
// ---------------------------------------------------------------------------

pub fn compute_hash(alg: HashAlgId, data: &[u8]) -> Vec<u8> {
    match alg {
        HashAlgId::Sha1 => Sha1::digest(data).to_vec(),
        HashAlgId::Sha224 => Sha224::digest(data).to_vec(),
        HashAlgId::Sha256 => Sha256::digest(data).to_vec(),
        HashAlgId::Sha384 => Sha384::digest(data).to_vec(),
        HashAlgId::Sha512 => Sha512::digest(data).to_vec(),
    }
}

fn sha224_with_rsa_encryption() -> Oid {
    Oid::new(&[1, 2, 840, 113549, 1, 1, 14])
}

fn sha224() -> Oid {
    Oid::new(&[2, 16, 840, 1, 101, 3, 4, 2, 4])
}

/// Digest used by an RSA PKCS#1 v1.5 signature algorithm.
pub fn hash_for_signature(oid: &Oid) -> Option<HashAlgId> {
    if *oid == known::sha256_with_rsa_encryption() {
        Some(HashAlgId::Sha256)
    } else if *oid == known::sha384_with_rsa_encryption() {
        Some(HashAlgId::Sha384)
    } else if *oid == known::sha512_with_rsa_encryption() {
        Some(HashAlgId::Sha512)
    } else if *oid == known::sha1_with_rsa_encryption() {
        Some(HashAlgId::Sha1)
    } else if *oid == sha224_with_rsa_encryption() {
        Some(HashAlgId::Sha224)
    } else {
        None
    }
}

fn rsa_signature_oid(hash: HashAlgId) -> Oid {
    match hash {
        HashAlgId::Sha1 => known::sha1_with_rsa_encryption(),
        HashAlgId::Sha224 => sha224_with_rsa_encryption(),
        HashAlgId::Sha256 => known::sha256_with_rsa_encryption(),
        HashAlgId::Sha384 => known::sha384_with_rsa_encryption(),
        HashAlgId::Sha512 => known::sha512_with_rsa_encryption(),
    }
}

/// OID of a digest algorithm, as used in OCSP CertIDs.
pub(crate) fn digest_oid(hash: HashAlgId) -> Oid {
    match hash {
        HashAlgId::Sha1 => known::sha1(),
        HashAlgId::Sha224 => sha224(),
        HashAlgId::Sha256 => known::sha256(),
        HashAlgId::Sha384 => known::sha384(),
        HashAlgId::Sha512 => known::sha512(),
    }
}

pub(crate) fn digest_from_oid(oid: &Oid) -> Option<HashAlgId> {
    [
        HashAlgId::Sha1,
        HashAlgId::Sha224,
        HashAlgId::Sha256,
        HashAlgId::Sha384,
        HashAlgId::Sha512,
    ]
    .into_iter()
    .find(|h| digest_oid(*h) == *oid)
}

fn pkcs1v15(hash: HashAlgId) -> Pkcs1v15Sign {
    match hash {
        HashAlgId::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        HashAlgId::Sha224 => Pkcs1v15Sign::new::<Sha224>(),
        HashAlgId::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        HashAlgId::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        HashAlgId::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    }
}

/// Key algorithm named by a SubjectPublicKeyInfo.
pub(crate) fn key_algorithm(spki: &SubjectPublicKeyInfo) -> Option<PkeyAlgId> {
    let oid = &spki.algorithm.oid;
    if *oid == known::rsa_encryption() {
        Some(PkeyAlgId::Rsa)
    } else if *oid == known::ec_public_key() {
        Some(PkeyAlgId::Ecdsa)
    } else if *oid == known::ed25519() {
        Some(PkeyAlgId::Ed25519)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verifies a signature over `message` with a subject public key.
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        algorithm: &AlgorithmIdentifier,
        key: &SubjectPublicKeyInfo,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError>;
}

/// RSA PKCS#1 v1.5 verification.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaVerifier;

fn rsa_public_key(spki: &SubjectPublicKeyInfo) -> Result<RsaPublicKey, CryptoError> {
    if key_algorithm(spki) != Some(PkeyAlgId::Rsa) {
        return Err(CryptoError::UnsupportedAlgorithm(spki.algorithm.oid.to_string()));
    }
    // RSAPublicKey ::= SEQUENCE { modulus INTEGER, publicExponent INTEGER }
    let invalid = |e: pathkit_types::Asn1Error| CryptoError::InvalidKey(e.to_string());
    let mut dec = Decoder::new(spki.key_bytes());
    let mut seq = dec.read_sequence().map_err(invalid)?;
    let n = seq.read_integer().map_err(invalid)?;
    let e = seq.read_integer().map_err(invalid)?;
    seq.finish().map_err(invalid)?;
    dec.finish().map_err(invalid)?;
    RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

impl SignatureVerifier for RsaVerifier {
    fn verify(
        &self,
        algorithm: &AlgorithmIdentifier,
        key: &SubjectPublicKeyInfo,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        let hash = hash_for_signature(&algorithm.oid)
            .ok_or_else(|| CryptoError::UnsupportedAlgorithm(algorithm.oid.to_string()))?;
        let public = rsa_public_key(key)?;
        let digest = compute_hash(hash, message);
        public
            .verify(pkcs1v15(hash), &digest, signature)
            .map_err(|_| CryptoError::SignatureMismatch)
    }
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Produces signatures for the builders.
pub trait Signer {
    /// The AlgorithmIdentifier written into signed structures.
    fn signature_algorithm(&self) -> AlgorithmIdentifier;
    fn public_key_info(&self) -> Result<SubjectPublicKeyInfo, CryptoError>;
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// An RSA private key signing with PKCS#1 v1.5 and a fixed digest.
#[derive(Clone)]
pub struct SigningKey {
    key: RsaPrivateKey,
    hash: HashAlgId,
}

impl SigningKey {
    pub fn new(key: RsaPrivateKey, hash: HashAlgId) -> Self {
        SigningKey { key, hash }
    }

    pub fn generate<R: CryptoRngCore + ?Sized>(
        rng: &mut R,
        bits: usize,
        hash: HashAlgId,
    ) -> Result<Self, CryptoError> {
        let key =
            RsaPrivateKey::new(rng, bits).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(SigningKey { key, hash })
    }

    pub fn hash(&self) -> HashAlgId {
        self.hash
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("bits", &(self.key.size() * 8))
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

impl Signer for SigningKey {
    fn signature_algorithm(&self) -> AlgorithmIdentifier {
        AlgorithmIdentifier::with_null_parameters(rsa_signature_oid(self.hash))
    }

    fn public_key_info(&self) -> Result<SubjectPublicKeyInfo, CryptoError> {
        let public = self.key.to_public_key();
        let mut inner = Encoder::new();
        inner.write_integer(&public.n().to_bytes_be());
        inner.write_integer(&public.e().to_bytes_be());
        let mut seq = Encoder::new();
        seq.write_sequence(&inner.finish());
        SubjectPublicKeyInfo::new(
            AlgorithmIdentifier::with_null_parameters(known::rsa_encryption()),
            &seq.finish(),
        )
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let digest = compute_hash(self.hash, message);
        self.key
            .sign(pkcs1v15(self.hash), &digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))
    }
}
