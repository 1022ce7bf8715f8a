//! # Sluice
//!
//! A pipeline orchestration engine for incremental transactional-data ETL.
//!
//! Sluice schedules, sequences, and recovers a directed acyclic graph of
//! data-transformation stages operating over continuously arriving records:
//!
//! - **Stage graphs**: validated DAGs of stage definitions with declared
//!   dependencies
//! - **Bounded scheduling**: a configurable worker pool with per-stage
//!   timeouts and cooperative cancellation
//! - **Retry with backoff**: a pure decision engine separating failure
//!   policy from sequencing
//! - **Watermarks**: monotonic per-partition change-stream positions,
//!   advanced only after every covering stage succeeds
//! - **Checkpoints**: per-stage-run resumable state so interrupted work is
//!   never double-applied
//!
//! The engine coordinates pluggable units of work; concrete extraction,
//! transform, and load connectors implement the
//! [`StageExecutor`](executor::StageExecutor) trait.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sluice::prelude::*;
//!
//! let registry = Arc::new(ExecutorRegistry::new());
//! registry.register("noop", Arc::new(NoOpExecutor::new()));
//!
//! let graph = GraphBuilder::new("orders-etl")
//!     .stage(StageDefinition::new("extract", "noop").with_partition("orders"))?
//!     .stage(StageDefinition::new("load", "noop").depends_on("extract"))?
//!     .build()?;
//!
//! let orchestrator = Orchestrator::new(registry);
//! let report = orchestrator.execute(&graph, BatchWindow::continuous()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod definition;
pub mod errors;
pub mod events;
pub mod executor;
pub mod graph;
pub mod retry;
pub mod scheduler;
pub mod testing;
pub mod watermark;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::checkpoint::{
        Checkpoint, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
    };
    pub use crate::config::{EngineConfig, StoreBackend};
    pub use crate::core::{
        BatchWindow, FailureKind, OutputSummary, RunEvent, RunStatus, StageFailure,
        StageRunStatus,
    };
    pub use crate::definition::PipelineDocument;
    pub use crate::errors::{EngineError, GraphValidationError, WatermarkRegressionError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::executor::{
        ExecutorRegistry, FnExecutor, NoOpExecutor, StageContext, StageExecutor,
    };
    pub use crate::graph::{GraphBuilder, StageDefinition, StageGraph};
    pub use crate::retry::{decide, RetryDecision, RetryPolicy};
    pub use crate::scheduler::{Orchestrator, PipelineRun, RunReport, StageRun};
    pub use crate::watermark::{
        FileWatermarkTracker, InMemoryWatermarkTracker, Partition, Position, WatermarkTracker,
    };
}
