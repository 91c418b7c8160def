//! Certification path validation (RFC 5280 §6) and path building.

mod builder;
mod params;
mod policy;
mod report;
mod validator;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use builder::{BuiltPath, PathBuilder};
pub use params::{TrustAnchor, ValidationParameters};
pub use policy::{PolicyNode, PolicyTree};
pub use report::{ReportEntry, Severity, ValidationErrorKind, ValidationReport, ValidationResult};
pub use validator::PathValidator;

/// A flag shared between a caller and running validations. Once cancelled,
/// validation stops before the next certificate or candidate path.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
