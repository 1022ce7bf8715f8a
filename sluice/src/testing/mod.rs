//! Reusable test fixtures: scripted executors and context helpers.
//!
//! Shipped as a public module so downstream connector crates can drive the
//! orchestrator in their own tests without hand-rolling executors.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::checkpoint::InMemoryCheckpointStore;
use crate::core::{BatchWindow, OutputSummary, StageFailure};
use crate::executor::{StageContext, StageExecutor};

/// Builds a minimal stage context for exercising executors directly.
#[must_use]
pub fn test_context(stage: &str) -> StageContext {
    StageContext::new(
        Uuid::new_v4(),
        "test-pipeline",
        stage,
        format!("test:{stage}"),
        1,
        BatchWindow::continuous(),
        HashMap::new(),
        None,
        Arc::new(InMemoryCheckpointStore::new()),
        Arc::new(CancellationToken::new()),
    )
}

/// An executor that fails a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyExecutor {
    failures_remaining: AtomicU32,
    failure: StageFailure,
    summary: OutputSummary,
    calls: AtomicU32,
}

impl FlakyExecutor {
    /// Creates an executor that fails `failures` times with the given
    /// failure before succeeding with the summary.
    #[must_use]
    pub fn new(failures: u32, failure: StageFailure, summary: OutputSummary) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
            failure,
            summary,
            calls: AtomicU32::new(0),
        }
    }

    /// Returns how many times the executor has been invoked.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageExecutor for FlakyExecutor {
    async fn run(&self, _ctx: &StageContext) -> Result<OutputSummary, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(self.failure.clone());
        }
        Ok(self.summary.clone())
    }
}

/// An executor that always fails with a fixed failure.
#[derive(Debug)]
pub struct FailingExecutor {
    failure: StageFailure,
    calls: AtomicU32,
}

impl FailingExecutor {
    /// Creates an always-failing executor.
    #[must_use]
    pub fn new(failure: StageFailure) -> Self {
        Self {
            failure,
            calls: AtomicU32::new(0),
        }
    }

    /// Returns how many times the executor has been invoked.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageExecutor for FailingExecutor {
    async fn run(&self, _ctx: &StageContext) -> Result<OutputSummary, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.failure.clone())
    }
}

/// An executor that succeeds with a fixed summary and counts invocations.
#[derive(Debug)]
pub struct RecordingExecutor {
    summary: OutputSummary,
    calls: AtomicU32,
}

impl RecordingExecutor {
    /// Creates a counting executor around a summary.
    #[must_use]
    pub fn new(summary: OutputSummary) -> Self {
        Self {
            summary,
            calls: AtomicU32::new(0),
        }
    }

    /// Returns how many times the executor has been invoked.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageExecutor for RecordingExecutor {
    async fn run(&self, _ctx: &StageContext) -> Result<OutputSummary, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.summary.clone())
    }
}

/// An executor that runs until cancelled, polling at the given interval.
///
/// Returns a cancellation failure once the token flips, or a transient
/// failure if the deadline passes first (so tests cannot hang).
#[derive(Debug)]
pub struct BlockingExecutor {
    poll_interval: Duration,
    deadline: Duration,
}

impl BlockingExecutor {
    /// Creates a blocking executor with a poll interval and safety deadline.
    #[must_use]
    pub fn new(poll_interval: Duration, deadline: Duration) -> Self {
        Self {
            poll_interval,
            deadline,
        }
    }
}

impl Default for BlockingExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(5), Duration::from_secs(5))
    }
}

#[async_trait]
impl StageExecutor for BlockingExecutor {
    async fn run(&self, ctx: &StageContext) -> Result<OutputSummary, StageFailure> {
        let start = std::time::Instant::now();
        loop {
            if ctx.is_cancelled() {
                return Err(StageFailure::cancelled("observed cancellation signal"));
            }
            if start.elapsed() > self.deadline {
                return Err(StageFailure::transient("blocking executor deadline passed"));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
