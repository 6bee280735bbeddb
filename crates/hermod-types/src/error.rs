//! Shared error taxonomy (spec §7)
//!
//! Individual crates define their own `thiserror` boundary error, but the
//! *classification* of a sink/store failure as transient vs. permanent is
//! shared between the runtime, the outbox, and connector implementations,
//! so it lives here rather than being duplicated per crate.

use serde::{Deserialize, Serialize};

/// How a sink or source failure should be handled by the retry pipeline.
///
/// Connector implementations classify their own errors; unknown errors
/// default to [`FailureClass::Transient`] per spec §4.5 ("conservative
/// default: treat unknown as transient").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Network blip, 5xx, auth-expired token: retry with backoff.
    Transient,
    /// Schema violation, 4xx, uniqueness conflict on a non-idempotent sink:
    /// route straight to the DLQ regardless of remaining attempts.
    Permanent,
}

impl FailureClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureClass::Transient)
    }
}

impl Default for FailureClass {
    fn default() -> Self {
        FailureClass::Transient
    }
}

/// Cross-cutting error kinds named in spec §7. Used where a caller needs
/// to match on *kind* rather than on the concrete error enum of whichever
/// crate raised it (e.g. the registry deciding whether to cancel an
/// instance because of `LeaseLost` vs. surface a `NotFound`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    TransientStore,
    TransientNetwork,
    PermanentSink,
    SchemaIncompatible,
    LeaseLost,
    InvalidTopology,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_retryable_permanent_is_not() {
        assert!(FailureClass::Transient.is_retryable());
        assert!(!FailureClass::Permanent.is_retryable());
    }

    #[test]
    fn default_classification_is_transient() {
        assert_eq!(FailureClass::default(), FailureClass::Transient);
    }
}
