//! Inputs of a validation run (RFC 5280 §6.1.1).

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use pathkit_utils::oid::Oid;

use super::CancellationToken;
use crate::cert_store::CertStore;
use crate::revocation::RevocationChecker;
use crate::x509::{
    Certificate, DistinguishedName, RsaVerifier, SignatureVerifier, SubjectPublicKeyInfo,
};

/// A trusted name and key, optionally carried by a certificate.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    pub name: DistinguishedName,
    pub public_key: SubjectPublicKeyInfo,
    pub certificate: Option<Certificate>,
}

impl TrustAnchor {
    pub fn new(name: DistinguishedName, public_key: SubjectPublicKeyInfo) -> Self {
        TrustAnchor {
            name,
            public_key,
            certificate: None,
        }
    }

    pub fn from_certificate(cert: Certificate) -> Self {
        TrustAnchor {
            name: cert.subject().clone(),
            public_key: cert.public_key().clone(),
            certificate: Some(cert),
        }
    }

    /// Whether `cert` is this anchor's certificate, or a self-signed
    /// certificate for the same name and key.
    pub(crate) fn is_represented_by(&self, cert: &Certificate) -> bool {
        if let Some(own) = &self.certificate {
            if own.to_der() == cert.to_der() {
                return true;
            }
        }
        cert.subject() == &self.name
            && cert.public_key().der() == self.public_key.der()
            && cert.is_self_issued()
    }
}

/// Configuration of path validation and path building.
#[derive(Clone)]
pub struct ValidationParameters {
    trust_anchors: Vec<TrustAnchor>,
    initial_policies: BTreeSet<Oid>,
    explicit_policy_required: bool,
    policy_mapping_inhibited: bool,
    any_policy_inhibited: bool,
    validation_time: Option<i64>,
    revocation_enabled: bool,
    revocation_mandatory: bool,
    revocation_checkers: Vec<Arc<dyn RevocationChecker>>,
    cert_stores: Vec<Arc<CertStore>>,
    supported_critical_extensions: BTreeSet<Oid>,
    acceptable_purposes: BTreeSet<Oid>,
    cancellation: Option<CancellationToken>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl Default for ValidationParameters {
    fn default() -> Self {
        ValidationParameters {
            trust_anchors: Vec::new(),
            initial_policies: BTreeSet::new(),
            explicit_policy_required: false,
            policy_mapping_inhibited: false,
            any_policy_inhibited: false,
            validation_time: None,
            revocation_enabled: false,
            revocation_mandatory: false,
            revocation_checkers: Vec::new(),
            cert_stores: Vec::new(),
            supported_critical_extensions: BTreeSet::new(),
            acceptable_purposes: BTreeSet::new(),
            cancellation: None,
            verifier: Arc::new(RsaVerifier),
        }
    }
}

impl fmt::Debug for ValidationParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationParameters")
            .field("trust_anchors", &self.trust_anchors.len())
            .field("initial_policies", &self.initial_policies)
            .field("explicit_policy_required", &self.explicit_policy_required)
            .field("policy_mapping_inhibited", &self.policy_mapping_inhibited)
            .field("any_policy_inhibited", &self.any_policy_inhibited)
            .field("validation_time", &self.validation_time)
            .field("revocation_enabled", &self.revocation_enabled)
            .field("revocation_mandatory", &self.revocation_mandatory)
            .field("revocation_checkers", &self.revocation_checkers.len())
            .field("cert_stores", &self.cert_stores.len())
            .finish_non_exhaustive()
    }
}

impl ValidationParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_trust_anchor(&mut self, anchor: TrustAnchor) -> &mut Self {
        self.trust_anchors.push(anchor);
        self
    }

    /// Trust a certificate's subject name and key.
    pub fn add_trusted_cert(&mut self, cert: Certificate) -> &mut Self {
        self.add_trust_anchor(TrustAnchor::from_certificate(cert))
    }

    /// The user-initial-policy-set. Empty means any policy.
    pub fn set_initial_policies(&mut self, policies: impl IntoIterator<Item = Oid>) -> &mut Self {
        self.initial_policies = policies.into_iter().collect();
        self
    }

    pub fn set_explicit_policy_required(&mut self, required: bool) -> &mut Self {
        self.explicit_policy_required = required;
        self
    }

    pub fn set_policy_mapping_inhibited(&mut self, inhibited: bool) -> &mut Self {
        self.policy_mapping_inhibited = inhibited;
        self
    }

    pub fn set_any_policy_inhibited(&mut self, inhibited: bool) -> &mut Self {
        self.any_policy_inhibited = inhibited;
        self
    }

    /// Validate at `time` (UNIX seconds) instead of the current time.
    pub fn set_validation_time(&mut self, time: i64) -> &mut Self {
        self.validation_time = Some(time);
        self
    }

    pub fn set_revocation_enabled(&mut self, enabled: bool) -> &mut Self {
        self.revocation_enabled = enabled;
        self
    }

    /// Make an undetermined revocation status an error instead of a
    /// notification.
    pub fn set_revocation_mandatory(&mut self, mandatory: bool) -> &mut Self {
        self.revocation_mandatory = mandatory;
        self
    }

    /// Append a checker. Checkers are consulted in insertion order.
    pub fn add_revocation_checker(&mut self, checker: Arc<dyn RevocationChecker>) -> &mut Self {
        self.revocation_checkers.push(checker);
        self
    }

    pub fn add_cert_store(&mut self, store: Arc<CertStore>) -> &mut Self {
        self.cert_stores.push(store);
        self
    }

    /// Accept a critical extension the validator does not process itself.
    pub fn add_supported_critical_extension(&mut self, oid: Oid) -> &mut Self {
        self.supported_critical_extensions.insert(oid);
        self
    }

    /// Require the end entity's extended key usage to allow `purpose`.
    /// With several purposes any one of them suffices.
    pub fn add_acceptable_purpose(&mut self, purpose: Oid) -> &mut Self {
        self.acceptable_purposes.insert(purpose);
        self
    }

    pub fn set_cancellation_token(&mut self, token: CancellationToken) -> &mut Self {
        self.cancellation = Some(token);
        self
    }

    pub fn set_signature_verifier(&mut self, verifier: Arc<dyn SignatureVerifier>) -> &mut Self {
        self.verifier = verifier;
        self
    }

    pub fn trust_anchors(&self) -> &[TrustAnchor] {
        &self.trust_anchors
    }

    pub fn initial_policies(&self) -> &BTreeSet<Oid> {
        &self.initial_policies
    }

    pub fn explicit_policy_required(&self) -> bool {
        self.explicit_policy_required
    }

    pub fn policy_mapping_inhibited(&self) -> bool {
        self.policy_mapping_inhibited
    }

    pub fn any_policy_inhibited(&self) -> bool {
        self.any_policy_inhibited
    }

    /// The configured time, or the current system time.
    pub fn validation_time(&self) -> i64 {
        self.validation_time.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        })
    }

    pub fn revocation_enabled(&self) -> bool {
        self.revocation_enabled
    }

    pub fn revocation_mandatory(&self) -> bool {
        self.revocation_mandatory
    }

    pub fn revocation_checkers(&self) -> &[Arc<dyn RevocationChecker>] {
        &self.revocation_checkers
    }

    pub fn cert_stores(&self) -> &[Arc<CertStore>] {
        &self.cert_stores
    }

    pub fn supported_critical_extensions(&self) -> &BTreeSet<Oid> {
        &self.supported_critical_extensions
    }

    pub fn acceptable_purposes(&self) -> &BTreeSet<Oid> {
        &self.acceptable_purposes
    }

    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    pub fn signature_verifier(&self) -> &dyn SignatureVerifier {
        self.verifier.as_ref()
    }
}
