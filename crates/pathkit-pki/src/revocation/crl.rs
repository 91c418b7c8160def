//! CRL-based revocation checking (RFC 5280 §6.3).

use std::sync::Arc;

use tracing::{debug, warn};

use super::{IssuerRef, RevocationChecker, RevocationStatus};
use crate::x509::{
    Certificate, CertificateRevocationList, DistributionPoint, GeneralName,
    IssuingDistributionPoint, KeyUsage, ReasonFlags, RevocationReason, SignatureVerifier,
    SubjectPublicKeyInfo,
};

/// CRLs available to a [`CrlChecker`], plus the certificates that sign
/// indirect CRLs.
#[derive(Debug, Clone, Default)]
pub struct CrlStore {
    crls: Vec<CertificateRevocationList>,
    signers: Vec<Certificate>,
}

impl CrlStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, crl: CertificateRevocationList) -> &mut Self {
        if !self.crls.contains(&crl) {
            self.crls.push(crl);
        }
        self
    }

    /// Register a certificate that may sign CRLs on behalf of another issuer.
    pub fn add_signer(&mut self, cert: Certificate) -> &mut Self {
        self.signers.push(cert);
        self
    }

    pub fn crls(&self) -> &[CertificateRevocationList] {
        &self.crls
    }

    pub fn len(&self) -> usize {
        self.crls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crls.is_empty()
    }
}

/// Checks certificates against the complete CRLs of a [`CrlStore`].
///
/// A certificate is `Good` only once the CRLs that apply to it cover every
/// revocation reason. Delta CRLs are ignored.
#[derive(Debug, Clone)]
pub struct CrlChecker {
    store: Arc<CrlStore>,
}

impl CrlChecker {
    pub fn new(store: Arc<CrlStore>) -> Self {
        CrlChecker { store }
    }

    pub fn store(&self) -> &CrlStore {
        &self.store
    }

    /// The key that must have signed `crl`, if it can be established.
    fn signing_key<'a>(
        &'a self,
        crl: &CertificateRevocationList,
        issuer: &IssuerRef<'a>,
        at: i64,
        verifier: &dyn SignatureVerifier,
    ) -> Option<&'a SubjectPublicKeyInfo> {
        if crl.issuer() == issuer.name {
            if let Some(cert) = issuer.certificate {
                if !permits_crl_sign(cert) {
                    debug!(issuer = %issuer.name, "issuer key usage lacks cRLSign");
                    return None;
                }
            }
            return Some(issuer.public_key);
        }
        // Indirect CRL: the signer must be certified by the same issuer.
        self.store
            .signers
            .iter()
            .find(|s| {
                s.subject() == crl.issuer()
                    && s.issuer() == issuer.name
                    && s.validity().contains(at)
                    && permits_crl_sign(s)
                    && s.verify_signature(issuer.public_key, verifier).is_ok()
            })
            .map(|s| s.public_key())
    }
}

fn permits_crl_sign(cert: &Certificate) -> bool {
    match cert.key_usage() {
        Ok(Some(ku)) => ku.has(KeyUsage::CRL_SIGN),
        Ok(None) => true,
        Err(_) => false,
    }
}

fn directory_names(names: &[GeneralName]) -> impl Iterator<Item = &crate::x509::DistinguishedName> {
    names.iter().filter_map(|n| match n {
        GeneralName::DirectoryName(dn) => Some(dn),
        _ => None,
    })
}

/// Whether `crl` is issued by the party `dp` names (RFC 5280 §6.3.3 (b)(1)).
fn issuer_matches(
    crl: &CertificateRevocationList,
    idp: Option<&IssuingDistributionPoint>,
    dp: &DistributionPoint,
    cert: &Certificate,
) -> bool {
    match &dp.crl_issuer {
        Some(names) => {
            idp.is_some_and(|i| i.indirect_crl) && directory_names(names).any(|dn| dn == crl.issuer())
        }
        None => crl.issuer() == cert.issuer(),
    }
}

/// Whether the CRL's scope includes `cert` (RFC 5280 §6.3.3 (b)(2)).
fn scope_matches(
    crl: &CertificateRevocationList,
    idp: &IssuingDistributionPoint,
    dp: Option<&DistributionPoint>,
    cert: &Certificate,
) -> bool {
    if let (Some(idp_name), Some(dp)) = (&idp.distribution_point, dp) {
        let idp_names = idp_name.full_names(crl.issuer());
        let matched = match (&dp.name, &dp.crl_issuer) {
            (Some(name), _) => {
                let dp_issuer = dp
                    .crl_issuer
                    .as_deref()
                    .and_then(|n| directory_names(n).next())
                    .unwrap_or(cert.issuer());
                name.full_names(dp_issuer).iter().any(|n| idp_names.contains(n))
            }
            (None, Some(crl_issuer)) => crl_issuer.iter().any(|n| idp_names.contains(n)),
            (None, None) => false,
        };
        if !matched {
            return false;
        }
    }
    if idp.only_contains_user_certs && cert.is_ca() {
        return false;
    }
    if idp.only_contains_ca_certs && !cert.is_ca() {
        return false;
    }
    !idp.only_contains_attribute_certs
}

impl RevocationChecker for CrlChecker {
    fn check(
        &self,
        cert: &Certificate,
        issuer: &IssuerRef<'_>,
        at: i64,
        verifier: &dyn SignatureVerifier,
    ) -> RevocationStatus {
        let points: Vec<Option<DistributionPoint>> = match cert.crl_distribution_points() {
            Ok(Some(cdp)) => cdp.points.into_iter().map(Some).collect(),
            Ok(None) => vec![None],
            Err(e) => return RevocationStatus::Unknown(format!("cRLDistributionPoints: {e}")),
        };
        let implicit = DistributionPoint::default();

        let mut reasons_mask = ReasonFlags::default();
        for dp in &points {
            let dp_ref = dp.as_ref().unwrap_or(&implicit);
            for crl in &self.store.crls {
                if reasons_mask.covers(ReasonFlags::ALL) {
                    break;
                }
                if crl.is_delta() {
                    continue;
                }
                let idp = match crl.issuing_distribution_point() {
                    Ok(idp) => idp,
                    Err(e) => {
                        debug!(crl_issuer = %crl.issuer(), error = %e, "skipping CRL with malformed issuingDistributionPoint");
                        continue;
                    }
                };
                if !issuer_matches(crl, idp.as_ref(), dp_ref, cert) {
                    continue;
                }
                let this_update = crl.this_update().timestamp();
                let expired = crl.next_update().is_some_and(|n| n.timestamp() < at);
                if this_update > at || expired {
                    debug!(crl_issuer = %crl.issuer(), "skipping CRL that is not current");
                    continue;
                }
                if let Some(oid) = crl.unsupported_critical_extension() {
                    debug!(crl_issuer = %crl.issuer(), %oid, "skipping CRL with unsupported critical extension");
                    continue;
                }
                if let Some(idp) = &idp {
                    if !scope_matches(crl, idp, dp.as_ref(), cert) {
                        continue;
                    }
                }

                let dp_reasons = dp_ref.reasons.unwrap_or(ReasonFlags::ALL);
                let idp_reasons = idp
                    .as_ref()
                    .and_then(|i| i.only_some_reasons)
                    .unwrap_or(ReasonFlags::ALL);
                let interim = dp_reasons.intersection(idp_reasons);
                if reasons_mask.covers(interim) {
                    continue;
                }

                let Some(key) = self.signing_key(crl, issuer, at, verifier) else {
                    debug!(crl_issuer = %crl.issuer(), "no trusted signer for CRL");
                    continue;
                };
                if let Err(e) = crl.verify_signature(key, verifier) {
                    warn!(crl_issuer = %crl.issuer(), error = %e, "CRL signature does not verify");
                    continue;
                }

                let entry = match crl.find_for_issuer(cert.serial_number(), cert.issuer()) {
                    Ok(entry) => entry,
                    Err(e) => {
                        debug!(error = %e, "skipping CRL");
                        continue;
                    }
                };
                if let Some(entry) = entry {
                    let reason = entry.reason;
                    let in_scope = reason
                        .and_then(RevocationReason::flag)
                        .map_or(true, |flag| interim.has(flag));
                    let time = entry.revocation_date.timestamp();
                    if reason != Some(RevocationReason::RemoveFromCrl) && in_scope && time <= at {
                        debug!(serial = %cert.serial_hex(), time, "certificate listed on CRL");
                        return RevocationStatus::Revoked { time, reason };
                    }
                }
                reasons_mask = reasons_mask.union(interim);
            }
        }

        if reasons_mask.covers(ReasonFlags::ALL) {
            RevocationStatus::Good
        } else if reasons_mask.is_empty() {
            RevocationStatus::Unknown("no current CRL for the certificate".into())
        } else {
            RevocationStatus::Unknown("available CRLs do not cover all reasons".into())
        }
    }
}
