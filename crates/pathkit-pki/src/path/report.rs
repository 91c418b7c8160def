//! Validation reports.
//!
//! A validation run never fails with `Err`: every problem it finds becomes a
//! [`ReportEntry`] tied to a path index, or to the path as a whole.

use std::collections::BTreeSet;
use std::fmt;

use pathkit_utils::asn1::Asn1Time;
use pathkit_utils::oid::Oid;

use super::policy::PolicyTree;
use crate::x509::{RevocationReason, SubjectPublicKeyInfo};

fn date(ts: &i64) -> String {
    Asn1Time::generalized(*ts)
        .map(|t| t.to_string())
        .unwrap_or_else(|_| ts.to_string())
}

fn reason_suffix(reason: &Option<RevocationReason>) -> String {
    match reason {
        Some(r) => format!(", reason {r}"),
        None => String::new(),
    }
}

/// What went wrong, with the structured detail a caller may need.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationErrorKind {
    #[error("signature does not verify with the issuer's public key: {reason}")]
    SignatureInvalid { reason: String },
    #[error("certificate is not valid before {}", date(.not_before))]
    CertificateNotYetValid { not_before: i64, at: i64 },
    #[error("certificate expired at {}", date(.not_after))]
    CertificateExpired { not_after: i64, at: i64 },
    #[error("certificate was revoked at {}{}", date(.time), reason_suffix(.reason))]
    CertificateRevoked {
        time: i64,
        reason: Option<RevocationReason>,
    },
    #[error("revocation status could not be determined: {reason}")]
    RevocationStatusUnknown { reason: String },
    #[error("issuer name {found} does not match the working issuer name {expected}")]
    NameChainMismatch { expected: String, found: String },
    #[error("no valid policy tree remains and an explicit policy is required")]
    NoValidPolicyTree,
    #[error("policy mapping to or from anyPolicy")]
    InvalidPolicyMapping,
    #[error("intermediate certificate is not a CA")]
    NotCa,
    #[error("path length constraint exceeded")]
    PathLengthExceeded,
    #[error("key usage does not permit {required}")]
    KeyUsageViolation { required: &'static str },
    #[error("unsupported critical extension {oid}")]
    UnsupportedCriticalExtension { oid: Oid },
    #[error("malformed {oid} extension: {reason}")]
    MalformedExtension { oid: Oid, reason: String },
    #[error("{name} violates the name constraints of an issuing CA")]
    NameConstraintViolation { name: String },
    #[error("extended key usage does not allow any acceptable purpose")]
    KeyPurposeNotAllowed,
    #[error("no trust anchor for issuer {issuer}")]
    NoTrustAnchor { issuer: String },
    #[error("certification path is empty")]
    EmptyPath,
    #[error("validation was cancelled")]
    Cancelled,
}

impl ValidationErrorKind {
    /// Stable identifier suitable as a localization key.
    pub fn id(&self) -> &'static str {
        match self {
            Self::SignatureInvalid { .. } => "certpath.signature-invalid",
            Self::CertificateNotYetValid { .. } => "certpath.not-yet-valid",
            Self::CertificateExpired { .. } => "certpath.expired",
            Self::CertificateRevoked { .. } => "certpath.revoked",
            Self::RevocationStatusUnknown { .. } => "certpath.revocation-unknown",
            Self::NameChainMismatch { .. } => "certpath.name-chain",
            Self::NoValidPolicyTree => "certpath.no-valid-policy-tree",
            Self::InvalidPolicyMapping => "certpath.invalid-policy-mapping",
            Self::NotCa => "certpath.not-ca",
            Self::PathLengthExceeded => "certpath.path-length",
            Self::KeyUsageViolation { .. } => "certpath.key-usage",
            Self::UnsupportedCriticalExtension { .. } => "certpath.unsupported-critical-extension",
            Self::MalformedExtension { .. } => "certpath.malformed-extension",
            Self::NameConstraintViolation { .. } => "certpath.name-constraints",
            Self::KeyPurposeNotAllowed => "certpath.key-purpose",
            Self::NoTrustAnchor { .. } => "certpath.no-trust-anchor",
            Self::EmptyPath => "certpath.empty-path",
            Self::Cancelled => "certpath.cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Makes the path invalid.
    Error,
    /// Recorded for the caller, path stays valid.
    Notification,
}

/// One record of a validation report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// Path index (0 = end entity), `None` for path-wide entries.
    pub index: Option<usize>,
    pub severity: Severity,
    pub kind: ValidationErrorKind,
}

impl ReportEntry {
    pub fn id(&self) -> &'static str {
        self.kind.id()
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Notification => "notice",
        };
        match self.index {
            Some(i) => write!(f, "[{i}] {level} {}: {}", self.id(), self.kind),
            None => write!(f, "[path] {level} {}: {}", self.id(), self.kind),
        }
    }
}

/// Every entry produced while validating one path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    entries: Vec<ReportEntry>,
    path_len: usize,
}

impl ValidationReport {
    pub(crate) fn new(path_len: usize) -> Self {
        ValidationReport {
            entries: Vec::new(),
            path_len,
        }
    }

    pub(crate) fn error(&mut self, index: usize, kind: ValidationErrorKind) {
        self.push(Some(index), Severity::Error, kind);
    }

    pub(crate) fn global_error(&mut self, kind: ValidationErrorKind) {
        self.push(None, Severity::Error, kind);
    }

    pub(crate) fn notify(&mut self, index: usize, kind: ValidationErrorKind) {
        self.push(Some(index), Severity::Notification, kind);
    }

    pub(crate) fn push(&mut self, index: Option<usize>, severity: Severity, kind: ValidationErrorKind) {
        self.entries.push(ReportEntry {
            index,
            severity,
            kind,
        });
    }

    pub fn is_valid(&self) -> bool {
        !self.entries.iter().any(ReportEntry::is_error)
    }

    /// Number of certificates processed, trust anchor excluded.
    pub fn path_len(&self) -> usize {
        self.path_len
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.is_error())
    }

    pub fn notifications(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| !e.is_error())
    }

    /// Entries for the certificate at `index`.
    pub fn at(&self, index: usize) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(move |e| e.index == Some(index))
    }

    pub fn global(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.index.is_none())
    }

    /// Whether some entry carries the identifier `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id() == id)
    }

    /// Human-readable listing, one entry per line, closed by the decision.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!("{entry}\n"));
        }
        if self.is_valid() {
            out.push_str("certification path accepted\n");
        } else {
            let count = self.errors().count();
            out.push_str(&format!("certification path rejected ({count} error(s))\n"));
        }
        out
    }
}

/// Outcome of validating one path.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub report: ValidationReport,
    /// The valid policy tree on success, `None` if it was pruned away.
    pub policy_tree: Option<PolicyTree>,
    /// The end entity's public key on success.
    pub working_public_key: Option<SubjectPublicKeyInfo>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.report.is_valid()
    }

    /// Policies a relying party may rely on, empty when no tree remains.
    pub fn accepted_policies(&self) -> BTreeSet<Oid> {
        self.policy_tree
            .as_ref()
            .map(PolicyTree::authority_constrained_policies)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_valid() {
        let report = ValidationReport::new(2);
        assert!(report.is_valid());
        assert_eq!(report.render(), "certification path accepted\n");
    }

    #[test]
    fn test_notifications_do_not_invalidate() {
        let mut report = ValidationReport::new(1);
        report.notify(
            0,
            ValidationErrorKind::RevocationStatusUnknown {
                reason: "no CRL".into(),
            },
        );
        assert!(report.is_valid());
        assert_eq!(report.notifications().count(), 1);
        assert!(report.contains("certpath.revocation-unknown"));
    }

    #[test]
    fn test_render_lists_entries_and_decision() {
        let mut report = ValidationReport::new(2);
        report.error(
            0,
            ValidationErrorKind::CertificateRevoked {
                time: 0,
                reason: Some(RevocationReason::KeyCompromise),
            },
        );
        report.global_error(ValidationErrorKind::NoValidPolicyTree);
        let text = report.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "[0] error certpath.revoked: certificate was revoked at 1970-01-01T00:00:00Z, reason keyCompromise"
        );
        assert!(lines[1].starts_with("[path] error certpath.no-valid-policy-tree"));
        assert_eq!(lines[2], "certification path rejected (2 error(s))");
        assert_eq!(report.at(0).count(), 1);
        assert_eq!(report.global().count(), 1);
    }

    #[test]
    fn test_ids_are_distinct() {
        let kinds = [
            ValidationErrorKind::NoValidPolicyTree,
            ValidationErrorKind::NotCa,
            ValidationErrorKind::PathLengthExceeded,
            ValidationErrorKind::KeyPurposeNotAllowed,
            ValidationErrorKind::EmptyPath,
            ValidationErrorKind::Cancelled,
            ValidationErrorKind::InvalidPolicyMapping,
        ];
        let mut ids: Vec<_> = kinds.iter().map(|k| k.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), kinds.len());
    }
}
