//! Stage failure classification.
//!
//! Executors classify their own failures; the engine only ever looks at the
//! kind tag, never at failure internals.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The classification of a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network/timeout-class failure, safe to retry.
    Transient,
    /// Schema mismatch, authorization, or other failure retrying cannot fix.
    Permanent,
    /// The stage exceeded its configured timeout. Treated as transient.
    Timeout,
    /// The executor observed the cancellation signal and stopped.
    Cancelled,
}

impl FailureKind {
    /// Returns true if the retry policy may schedule another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A classified failure reported by a stage executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind} failure: {detail}")]
pub struct StageFailure {
    /// The failure classification.
    pub kind: FailureKind,
    /// Human-readable detail, opaque to the engine.
    pub detail: String,
}

impl StageFailure {
    /// Creates a failure with an explicit kind.
    #[must_use]
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Creates a transient failure.
    #[must_use]
    pub fn transient(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, detail)
    }

    /// Creates a permanent failure.
    #[must_use]
    pub fn permanent(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Permanent, detail)
    }

    /// Creates a timeout failure.
    #[must_use]
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, detail)
    }

    /// Creates a cancellation failure.
    #[must_use]
    pub fn cancelled(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Cancelled, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::Transient.is_retryable());
        assert!(FailureKind::Timeout.is_retryable());
        assert!(!FailureKind::Permanent.is_retryable());
        assert!(!FailureKind::Cancelled.is_retryable());
    }

    #[test]
    fn test_failure_display() {
        let failure = StageFailure::transient("connection reset");
        assert_eq!(failure.to_string(), "transient failure: connection reset");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::Permanent).unwrap();
        assert_eq!(json, r#""permanent""#);
    }
}
