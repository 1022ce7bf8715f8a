//! Execution context handed to stage executors.

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::core::BatchWindow;
use crate::errors::EngineError;
use crate::watermark::{Partition, Position};

/// Everything a stage executor may observe or touch during one attempt.
///
/// Watermark positions are read by the orchestrator immediately before the
/// attempt starts and exposed here as a snapshot; the checkpoint (if any)
/// is the one loaded for this stage run. Saving a checkpoint goes straight
/// to the backing store so a crash mid-attempt leaves resumable state.
#[derive(Debug, Clone)]
pub struct StageContext {
    run_id: Uuid,
    pipeline: String,
    stage: String,
    stage_run_id: String,
    attempt: u32,
    window: BatchWindow,
    watermarks: HashMap<Partition, Position>,
    checkpoint: Option<Checkpoint>,
    checkpoints: Arc<dyn CheckpointStore>,
    cancel: Arc<CancellationToken>,
}

impl StageContext {
    /// Creates a new context for one stage attempt.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        run_id: Uuid,
        pipeline: impl Into<String>,
        stage: impl Into<String>,
        stage_run_id: impl Into<String>,
        attempt: u32,
        window: BatchWindow,
        watermarks: HashMap<Partition, Position>,
        checkpoint: Option<Checkpoint>,
        checkpoints: Arc<dyn CheckpointStore>,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        Self {
            run_id,
            pipeline: pipeline.into(),
            stage: stage.into(),
            stage_run_id: stage_run_id.into(),
            attempt,
            window,
            watermarks,
            checkpoint,
            checkpoints,
            cancel,
        }
    }

    /// Returns the pipeline run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Returns the stable stage-run id used for checkpoint keying.
    #[must_use]
    pub fn stage_run_id(&self) -> &str {
        &self.stage_run_id
    }

    /// Returns the 1-based attempt number.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the batch window of the run.
    #[must_use]
    pub fn window(&self) -> &BatchWindow {
        &self.window
    }

    /// Returns the committed watermark for a partition as of attempt start.
    ///
    /// Partitions the stage did not declare read as
    /// [`Position::BEGINNING`].
    #[must_use]
    pub fn watermark(&self, partition: &Partition) -> Position {
        self.watermarks
            .get(partition)
            .copied()
            .unwrap_or(Position::BEGINNING)
    }

    /// Returns all watermark reads for this attempt.
    #[must_use]
    pub fn watermarks(&self) -> &HashMap<Partition, Position> {
        &self.watermarks
    }

    /// Returns the checkpoint loaded for this stage run, if any.
    ///
    /// Non-idempotent executors must resume from this instead of restarting.
    #[must_use]
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoint.as_ref()
    }

    /// Persists in-progress state for this stage run.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn save_checkpoint(&self, state: serde_json::Value) -> Result<(), EngineError> {
        self.checkpoints.save(&self.stage_run_id, state).await
    }

    /// Returns true if run cancellation has been requested.
    ///
    /// Executors poll this at safe boundaries.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointStore;

    fn context_with(watermarks: HashMap<Partition, Position>) -> StageContext {
        StageContext::new(
            Uuid::new_v4(),
            "etl",
            "extract",
            "run:abc",
            1,
            BatchWindow::continuous(),
            watermarks,
            None,
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(CancellationToken::new()),
        )
    }

    #[test]
    fn test_watermark_defaults_to_beginning() {
        let ctx = context_with(HashMap::new());
        assert_eq!(
            ctx.watermark(&Partition::from("orders")),
            Position::BEGINNING
        );
    }

    #[test]
    fn test_watermark_snapshot_read() {
        let mut watermarks = HashMap::new();
        watermarks.insert(Partition::from("orders"), Position::new(42));
        let ctx = context_with(watermarks);

        assert_eq!(ctx.watermark(&Partition::from("orders")), Position::new(42));
    }

    #[tokio::test]
    async fn test_save_checkpoint_reaches_store() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let ctx = StageContext::new(
            Uuid::new_v4(),
            "etl",
            "load",
            "run:xyz",
            1,
            BatchWindow::continuous(),
            HashMap::new(),
            None,
            store.clone(),
            Arc::new(CancellationToken::new()),
        );

        ctx.save_checkpoint(serde_json::json!({"rows": 10}))
            .await
            .unwrap();

        use crate::checkpoint::CheckpointStore as _;
        let checkpoint = store.load("run:xyz").await.unwrap().unwrap();
        assert_eq!(checkpoint.state["rows"], 10);
    }
}
