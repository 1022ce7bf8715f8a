//! Error types for the sluice engine.
//!
//! Structural problems (bad graphs, watermark regressions) get dedicated
//! error types with enough detail to act on. Stage-level failures are not
//! errors at this layer: they are [`StageFailure`](crate::core::StageFailure)
//! values contained by the orchestrator.

use thiserror::Error;

use crate::watermark::{Partition, Position};

/// The main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The stage graph or pipeline document failed validation.
    #[error("{0}")]
    Validation(#[from] GraphValidationError),

    /// A watermark was asked to move backwards.
    #[error("{0}")]
    WatermarkRegression(#[from] WatermarkRegressionError),

    /// A checkpoint or watermark backend failed.
    ///
    /// Built-in backends surface `Io`/`Serialization` directly; this variant
    /// exists for custom store implementations.
    #[error("Store error: {0}")]
    Store(String),

    /// A bug in the engine itself (illegal state transition, deadlocked
    /// dispatch loop).
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised when a stage graph fails structural validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GraphValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// The dependency cycle, if one was found.
    pub cycle: Option<Vec<String>>,
}

impl GraphValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            cycle: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Creates a duplicate-name error.
    #[must_use]
    pub fn duplicate_stage(name: &str) -> Self {
        Self::new(format!("Duplicate stage name '{name}'")).with_stages(vec![name.to_string()])
    }

    /// Creates an unknown-dependency error.
    #[must_use]
    pub fn unknown_dependency(stage: &str, dependency: &str) -> Self {
        Self::new(format!(
            "Stage '{stage}' depends on unknown stage '{dependency}'"
        ))
        .with_stages(vec![stage.to_string(), dependency.to_string()])
    }

    /// Creates an unknown-executor error.
    #[must_use]
    pub fn unknown_executor(stage: &str, executor: &str) -> Self {
        Self::new(format!(
            "Stage '{stage}' requires unregistered executor '{executor}'"
        ))
        .with_stages(vec![stage.to_string()])
    }

    /// Creates a cycle error from the offending path.
    ///
    /// The path names at least one stage on the cycle, closing back on the
    /// first element.
    #[must_use]
    pub fn cycle(path: Vec<String>) -> Self {
        let mut err = Self::new(format!(
            "Dependency cycle detected: {}",
            path.join(" -> ")
        ))
        .with_stages(path.clone());
        err.cycle = Some(path);
        err
    }
}

/// Error raised when a watermark advance would move a partition backwards.
///
/// This signals a sequencing or concurrency bug and aborts the run; it is
/// never retried or silently ignored.
#[derive(Debug, Clone, Error)]
#[error(
    "Watermark regression on partition '{partition}': attempted {attempted}, current {current}"
)]
pub struct WatermarkRegressionError {
    /// The affected partition.
    pub partition: Partition,
    /// The committed position at the time of the attempt.
    pub current: Position,
    /// The position the caller tried to advance to.
    pub attempted: Position,
}

impl WatermarkRegressionError {
    /// Creates a new regression error.
    #[must_use]
    pub fn new(partition: Partition, current: Position, attempted: Position) -> Self {
        Self {
            partition,
            current,
            attempted,
        }
    }
}
