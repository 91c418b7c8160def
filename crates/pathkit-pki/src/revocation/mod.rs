//! Revocation checking against CRLs (RFC 5280 §6.3) and OCSP (RFC 6960).

mod crl;
mod ocsp;

pub use crl::{CrlChecker, CrlStore};
pub use ocsp::{OcspChecker, OcspResponder};

use crate::x509::{
    Certificate, DistinguishedName, RevocationReason, SignatureVerifier, SubjectPublicKeyInfo,
};

/// The answer of a single checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationStatus {
    Good,
    Revoked {
        time: i64,
        reason: Option<RevocationReason>,
    },
    /// No definitive answer; the string says why.
    Unknown(String),
}

impl RevocationStatus {
    pub fn is_definitive(&self) -> bool {
        !matches!(self, RevocationStatus::Unknown(_))
    }
}

/// The issuer of the certificate being checked, as known to the validator.
///
/// `certificate` is `None` when the issuer is a trust anchor given only as a
/// name and key.
#[derive(Debug, Clone, Copy)]
pub struct IssuerRef<'a> {
    pub name: &'a DistinguishedName,
    pub public_key: &'a SubjectPublicKeyInfo,
    pub certificate: Option<&'a Certificate>,
}

impl<'a> IssuerRef<'a> {
    pub fn from_certificate(cert: &'a Certificate) -> Self {
        IssuerRef {
            name: cert.subject(),
            public_key: cert.public_key(),
            certificate: Some(cert),
        }
    }
}

/// Determines whether a certificate was revoked at a given time.
pub trait RevocationChecker: Send + Sync {
    fn check(
        &self,
        cert: &Certificate,
        issuer: &IssuerRef<'_>,
        at: i64,
        verifier: &dyn SignatureVerifier,
    ) -> RevocationStatus;
}
