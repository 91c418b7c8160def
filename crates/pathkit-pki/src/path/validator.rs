//! The RFC 5280 §6.1 path validation algorithm.
//!
//! The path is supplied leaf first: `path[0]` is the end entity and the last
//! element is either the certificate issued by a trust anchor or the trust
//! anchor's own certificate, which is then dropped from processing. Report
//! indices refer to positions in the supplied path.

use pathkit_types::PkiError;
use pathkit_utils::oid::{known, Oid};
use tracing::{debug, info};

use super::params::{TrustAnchor, ValidationParameters};
use super::policy::PolicyTree;
use super::report::{ValidationErrorKind, ValidationReport, ValidationResult};
use crate::revocation::{IssuerRef, RevocationStatus};
use crate::x509::{
    Certificate, DistinguishedName, GeneralName, KeyUsage, NameConstraints, PolicyQualifier,
    SubjectPublicKeyInfo,
};

/// Extensions the algorithm itself processes.
fn processed_extensions() -> [Oid; 13] {
    [
        known::basic_constraints(),
        known::key_usage(),
        known::ext_key_usage(),
        known::subject_alt_name(),
        known::issuer_alt_name(),
        known::name_constraints(),
        known::certificate_policies(),
        known::policy_mappings(),
        known::policy_constraints(),
        known::inhibit_any_policy(),
        known::authority_key_identifier(),
        known::subject_key_identifier(),
        known::crl_distribution_points(),
    ]
}

/// Validates certificate paths against a set of [`ValidationParameters`].
#[derive(Debug, Clone, Copy)]
pub struct PathValidator<'a> {
    params: &'a ValidationParameters,
}

/// State variables of RFC 5280 §6.1.2.
struct State {
    policy_tree: Option<PolicyTree>,
    explicit_policy: usize,
    inhibit_any_policy: usize,
    policy_mapping: usize,
    working_public_key: SubjectPublicKeyInfo,
    working_issuer_name: DistinguishedName,
    max_path_length: usize,
    name_constraints: Vec<NameConstraints>,
    policy_failed: bool,
}

impl<'a> PathValidator<'a> {
    pub fn new(params: &'a ValidationParameters) -> Self {
        PathValidator { params }
    }

    /// Validate `path`, leaf first. Problems are collected in the report;
    /// processing continues past errors so every certificate is examined.
    pub fn validate(&self, path: &[Certificate]) -> ValidationResult {
        let Some(top) = path.last() else {
            let mut report = ValidationReport::new(0);
            report.global_error(ValidationErrorKind::EmptyPath);
            return finish(report, None, None);
        };

        let anchor_cert = path.len() > 1
            && self
                .params
                .trust_anchors()
                .iter()
                .any(|a| a.is_represented_by(top));
        let certs = if anchor_cert {
            &path[..path.len() - 1]
        } else {
            path
        };
        let n = certs.len();
        let mut report = ValidationReport::new(n);
        let top = &certs[n - 1];

        let anchor = if anchor_cert {
            self.params
                .trust_anchors()
                .iter()
                .find(|a| a.is_represented_by(&path[path.len() - 1]))
        } else {
            self.find_anchor(top)
        };
        if anchor.is_none() {
            report.global_error(ValidationErrorKind::NoTrustAnchor {
                issuer: top.issuer().to_string(),
            });
        }

        let mut state = State {
            policy_tree: Some(PolicyTree::new()),
            explicit_policy: if self.params.explicit_policy_required() { 0 } else { n + 1 },
            inhibit_any_policy: if self.params.any_policy_inhibited() { 0 } else { n + 1 },
            policy_mapping: if self.params.policy_mapping_inhibited() { 0 } else { n + 1 },
            working_public_key: anchor
                .map(|a| a.public_key.clone())
                .unwrap_or_else(|| top.public_key().clone()),
            working_issuer_name: anchor
                .map(|a| a.name.clone())
                .unwrap_or_else(|| top.issuer().clone()),
            max_path_length: n,
            name_constraints: Vec::new(),
            policy_failed: false,
        };

        let time = self.params.validation_time();
        for (step, cert) in certs.iter().rev().enumerate() {
            if self.params.is_cancelled() {
                report.global_error(ValidationErrorKind::Cancelled);
                return finish(report, None, None);
            }
            let index = n - 1 - step;
            let depth = step + 1;
            debug!(index, subject = %cert.subject(), "processing certificate");

            let issuer_cert = if index + 1 < n {
                Some(&certs[index + 1])
            } else {
                anchor.and_then(|a| a.certificate.as_ref())
            };
            let skip_signature = anchor.is_none() && index + 1 == n;
            self.process_certificate(
                &mut state,
                &mut report,
                cert,
                index,
                depth,
                time,
                issuer_cert,
                skip_signature,
            );
            if index > 0 {
                self.prepare_next(&mut state, &mut report, cert, index, depth);
            } else {
                self.wrap_up(&mut state, &mut report, cert, depth);
            }
        }

        if state.policy_failed {
            report.global_error(ValidationErrorKind::NoValidPolicyTree);
        }

        let valid = report.is_valid();
        info!(
            path_len = n,
            errors = report.errors().count(),
            "certification path {}",
            if valid { "accepted" } else { "rejected" }
        );
        if valid {
            finish(report, state.policy_tree, Some(state.working_public_key))
        } else {
            finish(report, None, None)
        }
    }

    /// The anchor that issued `top`: matching name, preferring one whose key
    /// verifies the signature.
    fn find_anchor(&self, top: &Certificate) -> Option<&'a TrustAnchor> {
        let verifier = self.params.signature_verifier();
        let mut named = self
            .params
            .trust_anchors()
            .iter()
            .filter(|a| &a.name == top.issuer());
        let first = named.clone().next();
        named
            .find(|a| top.verify_signature(&a.public_key, verifier).is_ok())
            .or(first)
    }

    // -----------------------------------------------------------------------
    // §6.1.3 Basic certificate processing
    // -----------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn process_certificate(
        &self,
        state: &mut State,
        report: &mut ValidationReport,
        cert: &Certificate,
        index: usize,
        depth: usize,
        time: i64,
        issuer_cert: Option<&Certificate>,
        skip_signature: bool,
    ) {
        let n = report.path_len();

        // (a)(1)
        if !skip_signature {
            if let Err(e) =
                cert.verify_signature(&state.working_public_key, self.params.signature_verifier())
            {
                report.error(
                    index,
                    ValidationErrorKind::SignatureInvalid {
                        reason: e.to_string(),
                    },
                );
            }
        }

        // (a)(2)
        if time < cert.not_before() {
            report.error(
                index,
                ValidationErrorKind::CertificateNotYetValid {
                    not_before: cert.not_before(),
                    at: time,
                },
            );
        } else if time > cert.not_after() {
            report.error(
                index,
                ValidationErrorKind::CertificateExpired {
                    not_after: cert.not_after(),
                    at: time,
                },
            );
        }

        // (a)(3)
        if self.params.revocation_enabled() {
            let issuer = IssuerRef {
                name: &state.working_issuer_name,
                public_key: &state.working_public_key,
                certificate: issuer_cert,
            };
            self.check_revocation(report, cert, &issuer, index, time);
        }

        // (a)(4)
        if cert.issuer() != &state.working_issuer_name {
            report.error(
                index,
                ValidationErrorKind::NameChainMismatch {
                    expected: state.working_issuer_name.to_string(),
                    found: cert.issuer().to_string(),
                },
            );
        }

        // (b), (c)
        if index == 0 || !cert.is_self_issued() {
            check_name_constraints(state, report, cert, index);
        }

        // (d), (e)
        let policies = extension(
            report,
            index,
            &known::certificate_policies(),
            cert.certificate_policies(),
        );
        let critical = cert
            .extension(&known::certificate_policies())
            .is_some_and(|e| e.critical);
        let allow_any = state.inhibit_any_policy > 0 || (depth < n && cert.is_self_issued());
        if let Some(tree) = state.policy_tree.as_mut() {
            let kept = match &policies {
                Some(policies) => tree.process_certificate(depth, policies, critical, allow_any),
                None => false,
            };
            if !kept {
                debug!(index, "valid policy tree is empty");
                state.policy_tree = None;
            }
        }

        // (f)
        if state.explicit_policy == 0 && state.policy_tree.is_none() {
            state.policy_failed = true;
        }
    }

    fn check_revocation(
        &self,
        report: &mut ValidationReport,
        cert: &Certificate,
        issuer: &IssuerRef<'_>,
        index: usize,
        time: i64,
    ) {
        let verifier = self.params.signature_verifier();
        let mut reasons = Vec::new();
        for checker in self.params.revocation_checkers() {
            match checker.check(cert, issuer, time, verifier) {
                RevocationStatus::Good => {
                    debug!(index, "revocation status good");
                    return;
                }
                RevocationStatus::Revoked { time, reason } => {
                    report.error(index, ValidationErrorKind::CertificateRevoked { time, reason });
                    return;
                }
                RevocationStatus::Unknown(reason) => reasons.push(reason),
            }
        }
        let reason = if reasons.is_empty() {
            "no revocation checker configured".to_string()
        } else {
            reasons.join("; ")
        };
        let kind = ValidationErrorKind::RevocationStatusUnknown { reason };
        if self.params.revocation_mandatory() {
            report.error(index, kind);
        } else {
            report.notify(index, kind);
        }
    }

    // -----------------------------------------------------------------------
    // §6.1.4 Preparation for certificate i+1
    // -----------------------------------------------------------------------

    fn prepare_next(
        &self,
        state: &mut State,
        report: &mut ValidationReport,
        cert: &Certificate,
        index: usize,
        depth: usize,
    ) {
        let any = known::any_policy();
        let self_issued = cert.is_self_issued();

        // (a), (b)
        if let Some(mappings) =
            extension(report, index, &known::policy_mappings(), cert.policy_mappings())
        {
            let touches_any = mappings
                .mappings
                .iter()
                .any(|m| m.issuer_domain_policy == any || m.subject_domain_policy == any);
            if touches_any {
                report.error(index, ValidationErrorKind::InvalidPolicyMapping);
            } else if let Some(tree) = state.policy_tree.as_mut() {
                let any_qualifiers: Vec<PolicyQualifier> = cert
                    .certificate_policies()
                    .ok()
                    .flatten()
                    .and_then(|cp| cp.policies.into_iter().find(|p| p.policy_id == any))
                    .map(|p| p.qualifiers)
                    .unwrap_or_default();
                let allowed = state.policy_mapping > 0;
                if !tree.apply_mappings(depth, &mappings, allowed, Some(&any_qualifiers)) {
                    state.policy_tree = None;
                }
            }
        }

        // (c) - (f)
        state.working_issuer_name = cert.subject().clone();
        state.working_public_key = cert.public_key().clone();

        // (g)
        if let Some(nc) =
            extension(report, index, &known::name_constraints(), cert.name_constraints())
        {
            state.name_constraints.push(nc);
        }

        // (h)
        if !self_issued {
            state.explicit_policy = state.explicit_policy.saturating_sub(1);
            state.policy_mapping = state.policy_mapping.saturating_sub(1);
            state.inhibit_any_policy = state.inhibit_any_policy.saturating_sub(1);
        }

        // (i)
        if let Some(pc) =
            extension(report, index, &known::policy_constraints(), cert.policy_constraints())
        {
            if let Some(r) = pc.require_explicit_policy {
                state.explicit_policy = state.explicit_policy.min(r as usize);
            }
            if let Some(m) = pc.inhibit_policy_mapping {
                state.policy_mapping = state.policy_mapping.min(m as usize);
            }
        }

        // (j)
        if let Some(iap) =
            extension(report, index, &known::inhibit_any_policy(), cert.inhibit_any_policy())
        {
            state.inhibit_any_policy = state.inhibit_any_policy.min(iap.skip_certs as usize);
        }

        // (k)
        let bc = extension(report, index, &known::basic_constraints(), cert.basic_constraints());
        if !bc.as_ref().is_some_and(|bc| bc.ca) {
            report.error(index, ValidationErrorKind::NotCa);
        }

        // (l)
        if !self_issued {
            if state.max_path_length == 0 {
                report.error(index, ValidationErrorKind::PathLengthExceeded);
            } else {
                state.max_path_length -= 1;
            }
        }

        // (m)
        if let Some(len) = bc.and_then(|bc| bc.path_len_constraint) {
            state.max_path_length = state.max_path_length.min(len as usize);
        }

        // (n)
        if let Some(ku) = extension(report, index, &known::key_usage(), cert.key_usage()) {
            if !ku.has(KeyUsage::KEY_CERT_SIGN) {
                report.error(
                    index,
                    ValidationErrorKind::KeyUsageViolation {
                        required: "keyCertSign",
                    },
                );
            }
        }

        // (o)
        self.check_critical_extensions(report, cert, index);
    }

    // -----------------------------------------------------------------------
    // §6.1.5 Wrap-up
    // -----------------------------------------------------------------------

    fn wrap_up(
        &self,
        state: &mut State,
        report: &mut ValidationReport,
        cert: &Certificate,
        depth: usize,
    ) {
        // (a), (b)
        state.explicit_policy = state.explicit_policy.saturating_sub(1);
        if let Some(pc) =
            extension(report, 0, &known::policy_constraints(), cert.policy_constraints())
        {
            if pc.require_explicit_policy == Some(0) {
                state.explicit_policy = 0;
            }
        }

        // (c) - (e)
        state.working_public_key = cert.public_key().clone();

        // (f)
        self.check_critical_extensions(report, cert, 0);

        // (g)
        if let Some(tree) = state.policy_tree.as_mut() {
            if !tree.intersect(depth, self.params.initial_policies()) {
                state.policy_tree = None;
            }
        }
        if state.explicit_policy == 0 && state.policy_tree.is_none() {
            state.policy_failed = true;
        }

        let purposes = self.params.acceptable_purposes();
        if !purposes.is_empty() {
            if let Some(eku) =
                extension(report, 0, &known::ext_key_usage(), cert.extended_key_usage())
            {
                if !purposes.iter().any(|p| eku.permits(p)) {
                    report.error(0, ValidationErrorKind::KeyPurposeNotAllowed);
                }
            }
        }
    }

    fn check_critical_extensions(&self, report: &mut ValidationReport, cert: &Certificate, index: usize) {
        let processed = processed_extensions();
        let supported = self.params.supported_critical_extensions();
        for ext in cert.extensions().iter().filter(|e| e.critical) {
            if !processed.contains(&ext.oid) && !supported.contains(&ext.oid) {
                report.error(
                    index,
                    ValidationErrorKind::UnsupportedCriticalExtension {
                        oid: ext.oid.clone(),
                    },
                );
            }
        }
    }
}

fn finish(
    report: ValidationReport,
    policy_tree: Option<PolicyTree>,
    working_public_key: Option<SubjectPublicKeyInfo>,
) -> ValidationResult {
    ValidationResult {
        report,
        policy_tree,
        working_public_key,
    }
}

/// Unwrap an extension lookup, recording a parse failure in the report.
fn extension<T>(
    report: &mut ValidationReport,
    index: usize,
    oid: &Oid,
    value: Result<Option<T>, PkiError>,
) -> Option<T> {
    match value {
        Ok(v) => v,
        Err(e) => {
            report.error(
                index,
                ValidationErrorKind::MalformedExtension {
                    oid: oid.clone(),
                    reason: e.to_string(),
                },
            );
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Name constraints
// ---------------------------------------------------------------------------

/// Names of `cert` subject to name constraints: the subject DN, legacy
/// emailAddress attributes, and the directory, DNS and email forms of the
/// subjectAltName.
fn constrained_names(cert: &Certificate) -> Vec<GeneralName> {
    let mut names = Vec::new();
    if !cert.subject().is_empty() {
        names.push(GeneralName::DirectoryName(cert.subject().clone()));
    }
    let email = known::email_address();
    for attr in cert.subject().attributes().filter(|a| a.oid == email) {
        if let Some(addr) = attr.as_str() {
            names.push(GeneralName::Rfc822Name(addr.to_string()));
        }
    }
    if let Ok(Some(san)) = cert.subject_alt_name() {
        names.extend(san.names.into_iter().filter(|n| {
            matches!(
                n,
                GeneralName::DirectoryName(_) | GeneralName::DnsName(_) | GeneralName::Rfc822Name(_)
            )
        }));
    }
    names
}

fn check_name_constraints(
    state: &State,
    report: &mut ValidationReport,
    cert: &Certificate,
    index: usize,
) {
    if state.name_constraints.is_empty() {
        return;
    }
    for name in constrained_names(cert) {
        let violated = state.name_constraints.iter().any(|nc| !permits(nc, &name));
        if violated {
            report.error(
                index,
                ValidationErrorKind::NameConstraintViolation {
                    name: describe(&name),
                },
            );
        }
    }
}

/// Whether `nc` allows `name`. Only subtrees of the same name form apply.
fn permits(nc: &NameConstraints, name: &GeneralName) -> bool {
    if let Some(permitted) = &nc.permitted_subtrees {
        let mut same_form = permitted.iter().filter_map(|s| within(name, &s.base)).peekable();
        if same_form.peek().is_some() && !same_form.any(|inside| inside) {
            return false;
        }
    }
    if let Some(excluded) = &nc.excluded_subtrees {
        if excluded.iter().any(|s| within(name, &s.base) == Some(true)) {
            return false;
        }
    }
    true
}

/// `Some(inside)` when `name` and `base` have the same form, `None` otherwise.
fn within(name: &GeneralName, base: &GeneralName) -> Option<bool> {
    match (name, base) {
        (GeneralName::DirectoryName(n), GeneralName::DirectoryName(b)) => Some(n.is_within(b)),
        (GeneralName::DnsName(n), GeneralName::DnsName(b)) => Some(dns_within(n, b)),
        (GeneralName::Rfc822Name(n), GeneralName::Rfc822Name(b)) => Some(email_within(n, b)),
        _ => None,
    }
}

fn dns_within(name: &str, base: &str) -> bool {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    let base = base.trim_start_matches('.').trim_end_matches('.').to_ascii_lowercase();
    if base.is_empty() {
        return true;
    }
    name == base || name.ends_with(&format!(".{base}"))
}

fn email_within(addr: &str, base: &str) -> bool {
    if base.contains('@') {
        return addr.eq_ignore_ascii_case(base);
    }
    let Some((_, host)) = addr.rsplit_once('@') else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    let base = base.to_ascii_lowercase();
    if base.starts_with('.') {
        host.ends_with(&base)
    } else {
        host == base
    }
}

fn describe(name: &GeneralName) -> String {
    match name {
        GeneralName::DirectoryName(dn) => format!("DirName:{dn}"),
        GeneralName::DnsName(s) => format!("DNS:{s}"),
        GeneralName::Rfc822Name(s) => format!("email:{s}"),
        other => format!("{other:?}"),
    }
}
