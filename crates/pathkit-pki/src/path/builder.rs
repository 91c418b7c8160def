//! Certification path building.

use pathkit_types::PkiError;
use tracing::debug;

use super::params::ValidationParameters;
use super::report::ValidationResult;
use super::validator::PathValidator;
use crate::x509::Certificate;

/// A candidate path and the outcome of validating it.
#[derive(Debug, Clone)]
pub struct BuiltPath {
    /// Leaf first, ending with the certificate issued by a trust anchor (or
    /// the anchor's own certificate when a store supplied it).
    pub certificates: Vec<Certificate>,
    pub result: ValidationResult,
}

impl BuiltPath {
    pub fn is_valid(&self) -> bool {
        self.result.is_valid()
    }
}

/// Searches the configured certificate stores for paths from a target
/// certificate to a trust anchor and validates each candidate.
///
/// The search is depth first. Issuers whose key verifies the current
/// certificate are tried before the rest, and a certificate never appears
/// twice in one candidate.
#[derive(Debug, Clone, Copy)]
pub struct PathBuilder<'a> {
    params: &'a ValidationParameters,
    max_depth: usize,
}

impl<'a> PathBuilder<'a> {
    pub const DEFAULT_MAX_DEPTH: usize = 10;

    pub fn new(params: &'a ValidationParameters) -> Self {
        PathBuilder {
            params,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    /// Longest candidate path, target included.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// Build and validate a path for `target`.
    ///
    /// Returns the first valid candidate, otherwise the candidate with the
    /// fewest errors. Fails with `IssuerNotFound` when no candidate reaches a
    /// trust anchor, and with `Cancelled` when the token fires.
    pub fn build(&self, target: &Certificate) -> Result<BuiltPath, PkiError> {
        let mut path = vec![target.clone()];
        let mut best: Option<BuiltPath> = None;
        if let Some(valid) = self.search(&mut path, &mut best)? {
            return Ok(valid);
        }
        best.ok_or_else(|| PkiError::IssuerNotFound(target.issuer().to_string()))
    }

    fn search(
        &self,
        path: &mut Vec<Certificate>,
        best: &mut Option<BuiltPath>,
    ) -> Result<Option<BuiltPath>, PkiError> {
        let Some(current) = path.last().cloned() else {
            return Ok(None);
        };

        let anchored = self.params.trust_anchors().iter().any(|a| {
            &a.name == current.issuer() || (path.len() > 1 && a.is_represented_by(&current))
        });
        if anchored {
            if let Some(valid) = self.evaluate(path, best)? {
                return Ok(Some(valid));
            }
        }
        if path.len() >= self.max_depth {
            return Ok(None);
        }

        let verifier = self.params.signature_verifier();
        let mut candidates: Vec<&Certificate> = self
            .params
            .cert_stores()
            .iter()
            .flat_map(|store| store.find_by_subject(current.issuer()))
            .filter(|c| path.iter().all(|p| p.to_der() != c.to_der()))
            .collect();
        candidates.sort_by_key(|c| current.verify_signature(c.public_key(), verifier).is_err());

        for candidate in candidates {
            path.push(candidate.clone());
            let found = self.search(path, best);
            path.pop();
            if let Some(valid) = found? {
                return Ok(Some(valid));
            }
        }
        Ok(None)
    }

    fn evaluate(
        &self,
        path: &[Certificate],
        best: &mut Option<BuiltPath>,
    ) -> Result<Option<BuiltPath>, PkiError> {
        if self.params.is_cancelled() {
            return Err(PkiError::Cancelled);
        }
        let result = PathValidator::new(self.params).validate(path);
        debug!(
            len = path.len(),
            valid = result.is_valid(),
            "validated candidate path"
        );
        let built = BuiltPath {
            certificates: path.to_vec(),
            result,
        };
        if built.is_valid() {
            return Ok(Some(built));
        }
        let errors = built.result.report.errors().count();
        if best
            .as_ref()
            .map_or(true, |b| errors < b.result.report.errors().count())
        {
            *best = Some(built);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert_store::CertStore;
    use crate::path::CancellationToken;
    use crate::test_support::*;
    use std::sync::Arc;

    fn params(stores: Vec<Certificate>) -> ValidationParameters {
        let mut params = ValidationParameters::new();
        params
            .add_trusted_cert(root_cert())
            .set_validation_time(NOW)
            .add_cert_store(Arc::new(stores.into_iter().collect::<CertStore>()));
        params
    }

    #[test]
    fn test_builds_through_intermediate() {
        let (root, intermediate, leaf) = chain();
        let params = params(vec![root, intermediate.clone()]);
        let built = PathBuilder::new(&params).build(&leaf).unwrap();
        assert!(built.is_valid(), "{}", built.result.report.render());
        assert_eq!(built.certificates.len(), 2);
        assert_eq!(built.certificates[1].to_der(), intermediate.to_der());
    }

    #[test]
    fn test_prefers_issuer_with_verifying_key() {
        let (root, intermediate, leaf) = chain();
        let rekeyed = ca_cert(&root, 0, "Intermediate CA", 3, 0x03);
        let params = params(vec![rekeyed, intermediate.clone()]);
        let built = PathBuilder::new(&params).build(&leaf).unwrap();
        assert!(built.is_valid());
        assert_eq!(built.certificates[1].to_der(), intermediate.to_der());
    }

    #[test]
    fn test_best_failing_candidate_returned() {
        let (root, intermediate, _) = chain();
        let expired = issue(&intermediate, 2, "Leaf", 1, 0x10, |b| {
            b.validity(NOW - 2 * YEAR, NOW - YEAR)
        });
        let params = params(vec![root, intermediate]);
        let built = PathBuilder::new(&params).build(&expired).unwrap();
        assert!(!built.is_valid());
        assert!(built.result.report.contains("certpath.expired"));
    }

    #[test]
    fn test_issuer_not_found() {
        let (_, _, leaf) = chain();
        let params = params(Vec::new());
        assert_eq!(
            PathBuilder::new(&params).build(&leaf).unwrap_err(),
            PkiError::IssuerNotFound("CN=Intermediate CA".into())
        );
    }

    #[test]
    fn test_cross_certified_loop_terminates() {
        // A and B certify each other; neither chains to the root.
        let a_self = crate::x509::CertificateBuilder::self_signed(
            name("CA A"),
            &signer(3),
            NOW - YEAR,
            NOW + YEAR,
        )
        .unwrap();
        let b_self = crate::x509::CertificateBuilder::self_signed(
            name("CA B"),
            &signer(4),
            NOW - YEAR,
            NOW + YEAR,
        )
        .unwrap();
        let a_by_b = ca_cert(&b_self, 4, "CA A", 3, 0x0a);
        let b_by_a = ca_cert(&a_self, 3, "CA B", 4, 0x0b);
        let leaf = issue(&a_self, 3, "Leaf", 1, 0x10, |b| b);
        let params = params(vec![a_by_b, b_by_a]);
        assert!(matches!(
            PathBuilder::new(&params).max_depth(6).build(&leaf),
            Err(PkiError::IssuerNotFound(_))
        ));
    }

    #[test]
    fn test_depth_limit() {
        let (root, intermediate, leaf) = chain();
        let params = params(vec![root, intermediate]);
        assert!(PathBuilder::new(&params).max_depth(1).build(&leaf).is_err());
    }

    #[test]
    fn test_cancelled_search() {
        let (root, intermediate, leaf) = chain();
        let mut params = params(vec![root, intermediate]);
        let token = CancellationToken::new();
        params.set_cancellation_token(token.clone());
        token.cancel();
        assert_eq!(
            PathBuilder::new(&params).build(&leaf).unwrap_err(),
            PkiError::Cancelled
        );
    }
}
