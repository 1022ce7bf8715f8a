//! The stage executor interface: the seam where concrete extraction,
//! transform, and load connectors plug into the engine.

mod context;
mod registry;

pub use context::StageContext;
pub use registry::ExecutorRegistry;

use async_trait::async_trait;
use std::fmt::Debug;

use crate::core::{OutputSummary, StageFailure};

/// Trait every concrete connector implements.
///
/// Executors classify their own failures via
/// [`StageFailure`](crate::core::StageFailure); the engine never inspects
/// beyond the kind tag. Long-running executors must poll
/// [`StageContext::is_cancelled`] at safe boundaries and, when cancelled,
/// leave their checkpoint resumable before returning.
#[async_trait]
pub trait StageExecutor: Send + Sync + Debug {
    /// Runs one attempt of a stage.
    async fn run(&self, ctx: &StageContext) -> Result<OutputSummary, StageFailure>;
}

/// An executor wrapping an async closure.
///
/// Mostly useful for wiring small transform steps and tests without a
/// dedicated connector type.
pub struct FnExecutor<F> {
    name: String,
    func: F,
}

impl<F, Fut> FnExecutor<F>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<OutputSummary, StageFailure>> + Send,
{
    /// Creates a new closure-backed executor.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnExecutor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExecutor").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> StageExecutor for FnExecutor<F>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<OutputSummary, StageFailure>> + Send,
{
    async fn run(&self, ctx: &StageContext) -> Result<OutputSummary, StageFailure> {
        (self.func)(ctx.clone()).await
    }
}

/// An executor that succeeds immediately with an empty summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpExecutor;

impl NoOpExecutor {
    /// Creates a no-op executor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageExecutor for NoOpExecutor {
    async fn run(&self, _ctx: &StageContext) -> Result<OutputSummary, StageFailure> {
        Ok(OutputSummary::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    #[tokio::test]
    async fn test_noop_executor() {
        let ctx = test_context("noop");
        let summary = NoOpExecutor::new().run(&ctx).await.unwrap();
        assert_eq!(summary.records, 0);
    }

    #[tokio::test]
    async fn test_fn_executor() {
        let executor = FnExecutor::new("double", |_ctx| async {
            Ok(OutputSummary::new().with_records(2))
        });

        let ctx = test_context("double");
        let summary = executor.run(&ctx).await.unwrap();
        assert_eq!(summary.records, 2);
    }

    #[tokio::test]
    async fn test_fn_executor_failure() {
        let executor = FnExecutor::new("broken", |_ctx| async {
            Err(StageFailure::permanent("schema mismatch"))
        });

        let ctx = test_context("broken");
        let failure = executor.run(&ctx).await.unwrap_err();
        assert_eq!(failure.kind, crate::core::FailureKind::Permanent);
    }
}
