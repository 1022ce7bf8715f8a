//! Stage-run and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle state of a single stage run.
///
/// Legal transitions:
/// `Pending -> Running -> {Succeeded | Failed}`;
/// `Failed -> {Retrying | DeadLettered}`; `Retrying -> Running`;
/// `Pending/Retrying -> Skipped` on upstream dead-letter or run abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRunStatus {
    /// Waiting for dependencies to finish.
    Pending,
    /// An attempt is executing on a worker.
    Running,
    /// The last attempt failed; a retry is scheduled.
    Retrying,
    /// Terminal: the stage completed successfully.
    Succeeded,
    /// The last attempt failed; classification has not happened yet.
    Failed,
    /// Terminal: retries exhausted or the failure was fatal.
    DeadLettered,
    /// Terminal: never ran because an upstream stage dead-lettered or the
    /// run was aborted.
    Skipped,
}

impl Default for StageRunStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Retrying => write!(f, "retrying"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::DeadLettered => write!(f, "dead_lettered"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageRunStatus {
    /// Returns true if the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::DeadLettered | Self::Skipped)
    }

    /// Returns true if a transition from `self` to `next` is legal.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Skipped)
                | (Self::Running, Self::Succeeded | Self::Failed)
                | (Self::Failed, Self::Retrying | Self::DeadLettered)
                | (Self::Retrying, Self::Running | Self::Skipped)
        )
    }
}

/// The overall outcome of a pipeline run.
///
/// Validation failures never reach this type; they surface as
/// [`EngineError::Validation`](crate::errors::EngineError) before a run is
/// created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every stage succeeded.
    Succeeded,
    /// At least one stage was dead-lettered or skipped. Committed watermark
    /// advances for unaffected partitions stand.
    PartialFailure,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::PartialFailure => write!(f, "partial_failure"),
        }
    }
}
