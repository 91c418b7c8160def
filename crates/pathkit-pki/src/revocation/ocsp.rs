//! OCSP-based revocation checking (RFC 6960).

use std::sync::Arc;

use pathkit_types::{HashAlgId, PkiError};
use tracing::{debug, warn};

use super::{IssuerRef, RevocationChecker, RevocationStatus};
use crate::x509::{
    compute_hash, BasicOcspResponse, CertId, Certificate, OcspCertStatus, OcspRequest,
    OcspResponse, OcspResponseStatus, ResponderId, SignatureVerifier, SubjectPublicKeyInfo,
};

/// Transport to an OCSP responder. Implementations own the network side;
/// the checker only builds requests and judges responses.
pub trait OcspResponder: Send + Sync {
    /// Digest used for the CertID of outgoing requests.
    fn hash_algorithm(&self) -> HashAlgId {
        HashAlgId::Sha1
    }

    fn query(&self, request: &OcspRequest) -> Result<OcspResponse, PkiError>;
}

/// Checks certificates by asking an [`OcspResponder`].
#[derive(Clone)]
pub struct OcspChecker {
    responder: Arc<dyn OcspResponder>,
    send_nonce: bool,
    require_nonce: bool,
    clock_skew: i64,
}

impl std::fmt::Debug for OcspChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcspChecker")
            .field("send_nonce", &self.send_nonce)
            .field("require_nonce", &self.require_nonce)
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

impl OcspChecker {
    /// Default allowance for clock differences with the responder.
    pub const DEFAULT_CLOCK_SKEW: i64 = 300;

    pub fn new(responder: Arc<dyn OcspResponder>) -> Self {
        OcspChecker {
            responder,
            send_nonce: true,
            require_nonce: false,
            clock_skew: Self::DEFAULT_CLOCK_SKEW,
        }
    }

    /// Include a random nonce in requests.
    pub fn set_send_nonce(&mut self, send: bool) -> &mut Self {
        self.send_nonce = send;
        self
    }

    /// Treat responses that do not echo the nonce as `Unknown`.
    pub fn set_require_nonce(&mut self, require: bool) -> &mut Self {
        self.require_nonce = require;
        self
    }

    pub fn set_clock_skew(&mut self, seconds: i64) -> &mut Self {
        self.clock_skew = seconds;
        self
    }

    /// The key that signed `basic`: the issuer's own, or that of a
    /// delegated responder the issuer certified (RFC 6960 §4.2.2.2).
    fn responder_key<'a>(
        &self,
        basic: &'a BasicOcspResponse,
        issuer: &IssuerRef<'a>,
        at: i64,
        verifier: &dyn SignatureVerifier,
    ) -> Option<&'a SubjectPublicKeyInfo> {
        let is_issuer = match basic.responder_id() {
            ResponderId::ByName(name) => name == issuer.name,
            ResponderId::ByKey(hash) => {
                compute_hash(HashAlgId::Sha1, issuer.public_key.key_bytes()) == *hash
            }
        };
        if is_issuer {
            return Some(issuer.public_key);
        }
        basic
            .certs()
            .iter()
            .find(|c| authorized_delegate(c, basic.responder_id(), issuer, at, verifier))
            .map(Certificate::public_key)
    }
}

fn authorized_delegate(
    cert: &Certificate,
    responder_id: &ResponderId,
    issuer: &IssuerRef<'_>,
    at: i64,
    verifier: &dyn SignatureVerifier,
) -> bool {
    responder_id.matches(cert)
        && cert.issuer() == issuer.name
        && cert.has_ocsp_signing()
        && cert.validity().contains(at)
        && cert.verify_signature(issuer.public_key, verifier).is_ok()
}

fn unknown(reason: impl Into<String>) -> RevocationStatus {
    let reason = reason.into();
    warn!(%reason, "OCSP check inconclusive");
    RevocationStatus::Unknown(reason)
}

impl RevocationChecker for OcspChecker {
    fn check(
        &self,
        cert: &Certificate,
        issuer: &IssuerRef<'_>,
        at: i64,
        verifier: &dyn SignatureVerifier,
    ) -> RevocationStatus {
        let cert_id = CertId::from_parts(
            cert.issuer(),
            issuer.public_key,
            cert.serial_number(),
            self.responder.hash_algorithm(),
        );
        let mut request = OcspRequest::new(cert_id.clone());
        let nonce = self.send_nonce.then(rand::random::<[u8; 16]>);
        if let Some(n) = nonce {
            request.set_nonce(n.to_vec());
        }

        debug!(serial = %cert.serial_hex(), "querying OCSP responder");
        let response = match self.responder.query(&request) {
            Ok(r) => r,
            Err(e) => return unknown(format!("responder failed: {e}")),
        };
        if response.status() != OcspResponseStatus::Successful {
            return unknown(format!("responder answered {}", response.status()));
        }
        let Some(basic) = response.basic() else {
            return unknown("response has no body");
        };

        let Some(key) = self.responder_key(basic, issuer, at, verifier) else {
            return unknown("response not signed by an authorized responder");
        };
        if let Err(e) = basic.verify_signature(key, verifier) {
            return unknown(format!("response signature: {e}"));
        }

        if let Some(sent) = nonce {
            match basic.nonce() {
                Some(echoed) if echoed == sent => {}
                Some(_) => return unknown("nonce mismatch"),
                None if self.require_nonce => return unknown("response carries no nonce"),
                None => {}
            }
        }

        let Some(single) = basic.find(&cert_id) else {
            return unknown("no status for the certificate");
        };
        if !single.is_current(at, self.clock_skew) {
            return unknown("status is not current");
        }
        match &single.status {
            OcspCertStatus::Good => RevocationStatus::Good,
            OcspCertStatus::Revoked { time, reason } if time.timestamp() <= at => {
                RevocationStatus::Revoked {
                    time: time.timestamp(),
                    reason: *reason,
                }
            }
            OcspCertStatus::Revoked { .. } => RevocationStatus::Good,
            OcspCertStatus::Unknown => unknown("responder does not know the certificate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use crate::x509::{
        OcspResponseBuilder, RevocationReason, RsaVerifier, SingleResponseSpec,
    };
    use pathkit_utils::asn1::Asn1Time;
    use pathkit_utils::oid::known;

    type Handler = dyn Fn(&OcspRequest) -> Result<OcspResponse, PkiError> + Send + Sync;

    struct FnResponder(Box<Handler>);

    impl OcspResponder for FnResponder {
        fn query(&self, request: &OcspRequest) -> Result<OcspResponse, PkiError> {
            (self.0)(request)
        }
    }

    fn checker(
        f: impl Fn(&OcspRequest) -> Result<OcspResponse, PkiError> + Send + Sync + 'static,
    ) -> OcspChecker {
        OcspChecker::new(Arc::new(FnResponder(Box::new(f))))
    }

    /// A responder that signs as the root and answers `status`.
    fn root_responder(status: OcspCertStatus) -> OcspChecker {
        let root = root_cert();
        checker(move |req| {
            let mut b = OcspResponseBuilder::new()
                .responder_id(ResponderId::ByName(root.subject().clone()))
                .produced_at(NOW)
                .add_response(SingleResponseSpec::new(
                    req.cert_ids[0].clone(),
                    status.clone(),
                    NOW - 3600,
                    Some(NOW + DAY),
                ));
            if let Some(n) = req.nonce() {
                b = b.nonce(n.to_vec());
            }
            b.build(&root_signer())
        })
    }

    fn run(checker: &OcspChecker) -> RevocationStatus {
        let root = root_cert();
        let leaf = leaf_cert(&root, NOW - DAY, NOW + YEAR);
        checker.check(&leaf, &IssuerRef::from_certificate(&root), NOW, &RsaVerifier)
    }

    #[test]
    fn test_good_response() {
        assert_eq!(run(&root_responder(OcspCertStatus::Good)), RevocationStatus::Good);
    }

    #[test]
    fn test_revoked_response() {
        let status = OcspCertStatus::Revoked {
            time: Asn1Time::generalized(NOW - DAY).unwrap(),
            reason: Some(RevocationReason::Superseded),
        };
        assert_eq!(
            run(&root_responder(status)),
            RevocationStatus::Revoked {
                time: NOW - DAY,
                reason: Some(RevocationReason::Superseded)
            }
        );
    }

    #[test]
    fn test_unknown_status() {
        assert!(matches!(
            run(&root_responder(OcspCertStatus::Unknown)),
            RevocationStatus::Unknown(_)
        ));
    }

    #[test]
    fn test_unsuccessful_and_failing_responders() {
        let busy = checker(|_| OcspResponse::unsuccessful(OcspResponseStatus::TryLater));
        assert!(matches!(run(&busy), RevocationStatus::Unknown(_)));
        let down = checker(|_| Err(PkiError::Builder("connection refused".into())));
        assert!(matches!(run(&down), RevocationStatus::Unknown(_)));
    }

    #[test]
    fn test_untrusted_signer_rejected() {
        let root = root_cert();
        let rogue = checker(move |req| {
            OcspResponseBuilder::new()
                .responder_id(ResponderId::ByName(root.subject().clone()))
                .produced_at(NOW)
                .add_response(SingleResponseSpec::new(
                    req.cert_ids[0].clone(),
                    OcspCertStatus::Good,
                    NOW - 3600,
                    None,
                ))
                .build(&signer(5))
        });
        assert_eq!(
            run(&rogue),
            RevocationStatus::Unknown("response signature: signature mismatch".into())
        );
    }

    #[test]
    fn test_delegated_responder() {
        let root = root_cert();
        let delegate = issue(&root, 0, "OCSP Responder", 6, 0x40, |b| {
            b.add_extended_key_usage(&[known::kp_ocsp_signing()], false)
        });
        let delegated = checker(move |req| {
            OcspResponseBuilder::new()
                .responder_id(ResponderId::by_key(delegate.public_key()))
                .produced_at(NOW)
                .add_response(SingleResponseSpec::new(
                    req.cert_ids[0].clone(),
                    OcspCertStatus::Good,
                    NOW - 3600,
                    None,
                ))
                .nonce(req.nonce().unwrap_or_default().to_vec())
                .add_certificate(delegate.clone())
                .build(&signer(6))
        });
        assert_eq!(run(&delegated), RevocationStatus::Good);
    }

    #[test]
    fn test_delegate_without_ocsp_signing_rejected() {
        let root = root_cert();
        let delegate = issue(&root, 0, "Not A Responder", 6, 0x41, |b| b);
        let delegated = checker(move |req| {
            OcspResponseBuilder::new()
                .responder_id(ResponderId::ByName(delegate.subject().clone()))
                .produced_at(NOW)
                .add_response(SingleResponseSpec::new(
                    req.cert_ids[0].clone(),
                    OcspCertStatus::Good,
                    NOW - 3600,
                    None,
                ))
                .add_certificate(delegate.clone())
                .build(&signer(6))
        });
        assert!(matches!(run(&delegated), RevocationStatus::Unknown(_)));
    }

    #[test]
    fn test_nonce_mismatch_and_requirement() {
        let root = root_cert();
        let wrong_nonce = checker(move |req| {
            OcspResponseBuilder::new()
                .responder_id(ResponderId::ByName(root.subject().clone()))
                .produced_at(NOW)
                .add_response(SingleResponseSpec::new(
                    req.cert_ids[0].clone(),
                    OcspCertStatus::Good,
                    NOW - 3600,
                    None,
                ))
                .nonce(vec![0; 16])
                .build(&root_signer())
        });
        assert_eq!(
            run(&wrong_nonce),
            RevocationStatus::Unknown("nonce mismatch".into())
        );

        let root = root_cert();
        let mut silent = checker(move |req| {
            OcspResponseBuilder::new()
                .responder_id(ResponderId::ByName(root.subject().clone()))
                .produced_at(NOW)
                .add_response(SingleResponseSpec::new(
                    req.cert_ids[0].clone(),
                    OcspCertStatus::Good,
                    NOW - 3600,
                    None,
                ))
                .build(&root_signer())
        });
        assert_eq!(run(&silent), RevocationStatus::Good);
        silent.set_require_nonce(true);
        assert!(matches!(run(&silent), RevocationStatus::Unknown(_)));
    }

    #[test]
    fn test_stale_status_is_unknown() {
        let root = root_cert();
        let stale = checker(move |req| {
            OcspResponseBuilder::new()
                .responder_id(ResponderId::ByName(root.subject().clone()))
                .produced_at(NOW - 10 * DAY)
                .add_response(SingleResponseSpec::new(
                    req.cert_ids[0].clone(),
                    OcspCertStatus::Good,
                    NOW - 10 * DAY,
                    Some(NOW - 9 * DAY),
                ))
                .build(&root_signer())
        });
        assert_eq!(
            run(&stale),
            RevocationStatus::Unknown("status is not current".into())
        );
    }
}
