//! The execution scheduler: walks the stage graph, dispatches runnable
//! stages to bounded worker capacity, consults the retry policy on failure,
//! and advances checkpoints/watermarks on success.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use futures::FutureExt;
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::{debug, info, warn};

use super::{PipelineRun, RunReport};
use crate::cancellation::CancellationToken;
use crate::checkpoint::{stage_run_key, CheckpointStore, InMemoryCheckpointStore};
use crate::config::EngineConfig;
use crate::core::{BatchWindow, OutputSummary, RunEvent, StageFailure, StageRunStatus};
use crate::errors::{EngineError, GraphValidationError};
use crate::events::{EventSink, NoOpEventSink};
use crate::executor::{ExecutorRegistry, StageContext, StageExecutor};
use crate::graph::{StageDefinition, StageGraph};
use crate::retry::{decide, RetryDecision};
use crate::watermark::{InMemoryWatermarkTracker, Partition, Position, WatermarkTracker};

/// Messages from worker and retry-timer tasks back to the dispatch loop.
enum WorkerSignal {
    /// An attempt finished (executor returned or timed out).
    Finished {
        stage: String,
        result: Result<OutputSummary, StageFailure>,
        duration_ms: f64,
    },
    /// A retry delay elapsed; the stage may be redispatched.
    RetryReady { stage: String },
}

/// The pipeline orchestrator.
///
/// Holds the pluggable backends and drives [`PipelineRun`]s to completion.
/// The graph and in-flight run state are private to each
/// [`execute`](Orchestrator::execute) call; only the checkpoint store and
/// watermark tracker are shared.
pub struct Orchestrator {
    config: EngineConfig,
    registry: Arc<ExecutorRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    watermarks: Arc<dyn WatermarkTracker>,
    events: Arc<dyn EventSink>,
}

impl Orchestrator {
    /// Creates an orchestrator with in-memory backends and no event sink.
    #[must_use]
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            config: EngineConfig::default(),
            registry,
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
            watermarks: Arc::new(InMemoryWatermarkTracker::new()),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the checkpoint store.
    #[must_use]
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = store;
        self
    }

    /// Sets the watermark tracker.
    #[must_use]
    pub fn with_watermark_tracker(mut self, tracker: Arc<dyn WatermarkTracker>) -> Self {
        self.watermarks = tracker;
        self
    }

    /// Sets the monitoring event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns the watermark tracker (for inspection and seeding).
    #[must_use]
    pub fn watermarks(&self) -> Arc<dyn WatermarkTracker> {
        self.watermarks.clone()
    }

    /// Returns the checkpoint store.
    #[must_use]
    pub fn checkpoints(&self) -> Arc<dyn CheckpointStore> {
        self.checkpoints.clone()
    }

    /// Executes a pipeline run to completion.
    ///
    /// # Errors
    ///
    /// Fails with a validation error before any dispatch if a stage names an
    /// unregistered executor; aborts with a watermark-regression or internal
    /// error mid-run. Stage failures are contained and never surface here;
    /// they shape the report's outcome instead.
    pub async fn execute(
        &self,
        graph: &StageGraph,
        window: BatchWindow,
    ) -> Result<RunReport, EngineError> {
        self.execute_cancellable(graph, window, Arc::new(CancellationToken::new()))
            .await
    }

    /// Executes a pipeline run with an externally controlled cancellation
    /// token.
    ///
    /// # Errors
    ///
    /// See [`execute`](Orchestrator::execute).
    pub async fn execute_cancellable(
        &self,
        graph: &StageGraph,
        window: BatchWindow,
        cancel: Arc<CancellationToken>,
    ) -> Result<RunReport, EngineError> {
        let executors = self.resolve_executors(graph)?;

        let mut run = PipelineRun::new(graph, window);
        let run_id = run.run_id.to_string();
        info!(run_id = %run_id, pipeline = %run.pipeline, stages = graph.len(), "Pipeline run started");
        self.events
            .try_emit(RunEvent::run_started(&run_id, &run.pipeline));

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_workers));
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkerSignal>();
        let cancel_notify = Arc::new(Notify::new());
        {
            let notify = cancel_notify.clone();
            cancel.on_cancel(move || notify.notify_waiters());
        }

        // Highest position reported per partition, and partitions already
        // committed this run.
        let mut reported: HashMap<Partition, Position> = HashMap::new();
        let mut advanced: HashSet<Partition> = HashSet::new();
        let mut in_flight: usize = 0;
        let mut skipped_for_abort = false;

        for stage in graph.ready(&run.statuses()) {
            self.dispatch(graph, &mut run, &stage, &executors, &semaphore, &tx, &cancel)?;
            in_flight += 1;
        }

        while !run.is_complete() {
            if cancel.is_cancelled() && !skipped_for_abort {
                self.skip_waiting_stages(&mut run, "run aborted")?;
                skipped_for_abort = true;
                if run.is_complete() {
                    break;
                }
            }

            if in_flight == 0 {
                let waiting = run.stages_in(StageRunStatus::Pending);
                return Err(EngineError::Internal(format!(
                    "Dispatch loop stalled with no work in flight; waiting stages: {waiting:?}"
                )));
            }

            let signal = tokio::select! {
                signal = rx.recv() => match signal {
                    Some(signal) => signal,
                    None => {
                        return Err(EngineError::Internal(
                            "Worker channel closed mid-run".to_string(),
                        ))
                    }
                },
                () = cancel_notify.notified() => continue,
            };
            in_flight -= 1;

            match signal {
                WorkerSignal::RetryReady { stage } => {
                    // A cancel during the delay already moved it to Skipped.
                    if run.status_of(&stage) == Some(StageRunStatus::Retrying) {
                        self.dispatch(graph, &mut run, &stage, &executors, &semaphore, &tx, &cancel)?;
                        in_flight += 1;
                    }
                }
                WorkerSignal::Finished {
                    stage,
                    result,
                    duration_ms,
                } => match result {
                    Ok(summary) => {
                        in_flight += self
                            .handle_success(
                                graph,
                                &mut run,
                                &stage,
                                &summary,
                                duration_ms,
                                &mut reported,
                                &mut advanced,
                                &executors,
                                &semaphore,
                                &tx,
                                &cancel,
                            )
                            .await?;
                    }
                    Err(failure) => {
                        in_flight +=
                            self.handle_failure(graph, &mut run, &stage, failure, &tx)?;
                    }
                },
            }
        }

        let report = RunReport::from_run(&run);
        info!(
            run_id = %run_id,
            status = %report.status,
            dead_lettered = report.dead_lettered.len(),
            skipped = report.skipped.len(),
            "Pipeline run completed"
        );
        self.events
            .try_emit(RunEvent::run_completed(&run_id, &report.status.to_string()));
        Ok(report)
    }

    /// Resolves every stage's executor up front; unknown capabilities fail
    /// the run before any dispatch.
    fn resolve_executors(
        &self,
        graph: &StageGraph,
    ) -> Result<HashMap<String, Arc<dyn StageExecutor>>, EngineError> {
        let mut executors = HashMap::new();
        for def in graph.definitions() {
            let executor = self.registry.get(&def.executor).ok_or_else(|| {
                GraphValidationError::unknown_executor(&def.name, &def.executor)
            })?;
            executors.insert(def.name.clone(), executor);
        }
        Ok(executors)
    }

    /// Moves a stage into `Running` and spawns its worker task.
    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        graph: &StageGraph,
        run: &mut PipelineRun,
        stage: &str,
        executors: &HashMap<String, Arc<dyn StageExecutor>>,
        semaphore: &Arc<Semaphore>,
        tx: &mpsc::UnboundedSender<WorkerSignal>,
        cancel: &Arc<CancellationToken>,
    ) -> Result<(), EngineError> {
        let def = graph
            .definition(stage)
            .ok_or_else(|| EngineError::Internal(format!("Unknown stage '{stage}' dispatched")))?
            .clone();
        let executor = executors
            .get(stage)
            .ok_or_else(|| EngineError::Internal(format!("No executor resolved for '{stage}'")))?
            .clone();

        let stage_run = run
            .stage_run_mut(stage)
            .ok_or_else(|| EngineError::Internal(format!("No stage run for '{stage}'")))?;
        stage_run.transition(StageRunStatus::Running)?;
        let attempt = stage_run.attempts;

        debug!(stage = %stage, attempt, "Dispatching stage attempt");
        self.events.try_emit(RunEvent::stage_started(stage, attempt));

        self.spawn_worker(def, executor, run, attempt, semaphore, tx, cancel);
        Ok(())
    }

    /// Spawns the worker task for one attempt.
    ///
    /// The semaphore permit is held only for the duration of the attempt
    /// itself; retry delays are timed outside any permit.
    fn spawn_worker(
        &self,
        def: StageDefinition,
        executor: Arc<dyn StageExecutor>,
        run: &PipelineRun,
        attempt: u32,
        semaphore: &Arc<Semaphore>,
        tx: &mpsc::UnboundedSender<WorkerSignal>,
        cancel: &Arc<CancellationToken>,
    ) {
        let semaphore = semaphore.clone();
        let tx = tx.clone();
        let cancel = cancel.clone();
        let checkpoints = self.checkpoints.clone();
        let watermarks = self.watermarks.clone();
        let run_id = run.run_id;
        let pipeline = run.pipeline.clone();
        let window = run.window.clone();
        let key = stage_run_key(&pipeline, &def.name, &window.token());

        tokio::spawn(async move {
            let stage = def.name.clone();
            let finish = |result, duration_ms| {
                let _ = tx.send(WorkerSignal::Finished {
                    stage: def.name.clone(),
                    result,
                    duration_ms,
                });
            };

            let Ok(permit) = semaphore.acquire_owned().await else {
                finish(
                    Err(StageFailure::cancelled("worker pool shut down")),
                    0.0,
                );
                return;
            };

            if cancel.is_cancelled() {
                finish(
                    Err(StageFailure::cancelled("run aborted before attempt start")),
                    0.0,
                );
                return;
            }

            let start = Instant::now();

            // Snapshot watermark reads for the declared partitions.
            let read_results = try_join_all(def.partitions.iter().map(|partition| {
                let watermarks = watermarks.clone();
                async move {
                    watermarks
                        .read(partition)
                        .await
                        .map(|position| (partition.clone(), position))
                }
            }))
            .await;
            let reads: HashMap<Partition, Position> = match read_results {
                Ok(pairs) => pairs.into_iter().collect(),
                Err(e) => {
                    finish(
                        Err(StageFailure::transient(format!("watermark read failed: {e}"))),
                        start.elapsed().as_secs_f64() * 1000.0,
                    );
                    return;
                }
            };

            let checkpoint = match checkpoints.load(&key).await {
                Ok(checkpoint) => checkpoint,
                Err(e) => {
                    finish(
                        Err(StageFailure::transient(format!("checkpoint load failed: {e}"))),
                        start.elapsed().as_secs_f64() * 1000.0,
                    );
                    return;
                }
            };

            let ctx = StageContext::new(
                run_id,
                pipeline,
                stage,
                key,
                attempt,
                window,
                reads,
                checkpoint,
                checkpoints,
                cancel,
            );

            // Panics in executors surface as permanent failures instead of
            // stranding the dispatch loop.
            let attempt_future = AssertUnwindSafe(executor.run(&ctx)).catch_unwind();
            let result = match def.timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt_future).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(StageFailure::permanent(format!(
                        "stage '{}' panicked",
                        def.name
                    ))),
                    Err(_) => Err(StageFailure::timeout(format!(
                        "stage '{}' exceeded its {}ms timeout",
                        def.name,
                        limit.as_millis()
                    ))),
                },
                None => match attempt_future.await {
                    Ok(result) => result,
                    Err(_) => Err(StageFailure::permanent(format!(
                        "stage '{}' panicked",
                        def.name
                    ))),
                },
            };

            drop(permit);
            finish(result, start.elapsed().as_secs_f64() * 1000.0);
        });
    }

    /// Handles a successful attempt: commit checkpoint, advance covered
    /// watermarks, dispatch newly ready stages. Returns how many new tasks
    /// went in flight.
    #[allow(clippy::too_many_arguments)]
    async fn handle_success(
        &self,
        graph: &StageGraph,
        run: &mut PipelineRun,
        stage: &str,
        summary: &OutputSummary,
        duration_ms: f64,
        reported: &mut HashMap<Partition, Position>,
        advanced: &mut HashSet<Partition>,
        executors: &HashMap<String, Arc<dyn StageExecutor>>,
        semaphore: &Arc<Semaphore>,
        tx: &mpsc::UnboundedSender<WorkerSignal>,
        cancel: &Arc<CancellationToken>,
    ) -> Result<usize, EngineError> {
        let attempt = {
            let stage_run = run
                .stage_run_mut(stage)
                .ok_or_else(|| EngineError::Internal(format!("No stage run for '{stage}'")))?;
            stage_run.transition(StageRunStatus::Succeeded)?;
            stage_run.attempts
        };

        info!(stage = %stage, attempt, duration_ms, "Stage succeeded");
        self.events
            .try_emit(RunEvent::stage_succeeded(stage, attempt, duration_ms));

        let key = stage_run_key(&run.pipeline, stage, &run.window.token());
        self.checkpoints.complete(&key).await?;

        for (partition, position) in &summary.high_watermarks {
            let entry = reported.entry(partition.clone()).or_insert(*position);
            if *position > *entry {
                *entry = *position;
            }
        }
        self.advance_covered_watermarks(graph, run, reported, advanced)
            .await?;

        let mut dispatched = 0;
        if !cancel.is_cancelled() {
            for next in graph.ready(&run.statuses()) {
                self.dispatch(graph, run, &next, executors, semaphore, tx, cancel)?;
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }

    /// Handles a failed attempt: classify, schedule a retry or dead-letter
    /// and skip the downstream closure. Returns how many new tasks went in
    /// flight (retry timers count).
    fn handle_failure(
        &self,
        graph: &StageGraph,
        run: &mut PipelineRun,
        stage: &str,
        failure: StageFailure,
        tx: &mpsc::UnboundedSender<WorkerSignal>,
    ) -> Result<usize, EngineError> {
        let policy = graph
            .definition(stage)
            .and_then(|def| def.retry.clone())
            .unwrap_or_else(|| self.config.default_retry.clone());

        let attempt = {
            let stage_run = run
                .stage_run_mut(stage)
                .ok_or_else(|| EngineError::Internal(format!("No stage run for '{stage}'")))?;
            stage_run.transition(StageRunStatus::Failed)?;
            stage_run.record_failure(failure.clone());
            stage_run.attempts
        };

        warn!(
            stage = %stage,
            attempt,
            kind = %failure.kind,
            error = %failure.detail,
            "Stage attempt failed"
        );
        self.events
            .try_emit(RunEvent::stage_failed(stage, attempt, failure.kind, &failure.detail));

        match decide(failure.kind, attempt, &policy) {
            RetryDecision::RetryAfter(delay) => {
                run.stage_run_mut(stage)
                    .ok_or_else(|| EngineError::Internal(format!("No stage run for '{stage}'")))?
                    .transition(StageRunStatus::Retrying)?;

                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                debug!(stage = %stage, delay_ms, "Retry scheduled");
                self.events
                    .try_emit(RunEvent::stage_retrying(stage, attempt + 1, delay_ms));

                let tx = tx.clone();
                let stage_name = stage.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(WorkerSignal::RetryReady { stage: stage_name });
                });
                Ok(1)
            }
            RetryDecision::Abandon => {
                run.stage_run_mut(stage)
                    .ok_or_else(|| EngineError::Internal(format!("No stage run for '{stage}'")))?
                    .transition(StageRunStatus::DeadLettered)?;

                warn!(stage = %stage, attempts = attempt, kind = %failure.kind, "Stage dead-lettered");
                self.events
                    .try_emit(RunEvent::stage_dead_lettered(stage, attempt, failure.kind));

                let downstream = graph.downstream_of(stage);
                for name in graph.topo_order() {
                    if !downstream.contains(name) {
                        continue;
                    }
                    if run.status_of(name) == Some(StageRunStatus::Pending) {
                        run.stage_run_mut(name)
                            .ok_or_else(|| {
                                EngineError::Internal(format!("No stage run for '{name}'"))
                            })?
                            .transition(StageRunStatus::Skipped)?;
                        self.events.try_emit(RunEvent::stage_skipped(
                            name,
                            &format!("upstream stage '{stage}' dead-lettered"),
                        ));
                    }
                }
                Ok(0)
            }
        }
    }

    /// Advances the watermark for every partition whose covering stages have
    /// all succeeded, to the highest reported position.
    ///
    /// A regression error here aborts the run: it signals a sequencing bug
    /// and must not be swallowed.
    async fn advance_covered_watermarks(
        &self,
        graph: &StageGraph,
        run: &PipelineRun,
        reported: &HashMap<Partition, Position>,
        advanced: &mut HashSet<Partition>,
    ) -> Result<(), EngineError> {
        for (partition, position) in reported {
            if advanced.contains(partition) {
                continue;
            }
            let fully_covered = graph
                .definitions()
                .filter(|def| def.partitions.contains(partition))
                .all(|def| run.status_of(&def.name) == Some(StageRunStatus::Succeeded));
            if fully_covered {
                self.watermarks.advance(partition, *position).await?;
                advanced.insert(partition.clone());
            }
        }
        Ok(())
    }

    /// Skips every stage that has not started yet (run abort path).
    fn skip_waiting_stages(
        &self,
        run: &mut PipelineRun,
        reason: &str,
    ) -> Result<(), EngineError> {
        let waiting: Vec<String> = run
            .stages_in(StageRunStatus::Pending)
            .into_iter()
            .chain(run.stages_in(StageRunStatus::Retrying))
            .collect();

        for stage in waiting {
            run.stage_run_mut(&stage)
                .ok_or_else(|| EngineError::Internal(format!("No stage run for '{stage}'")))?
                .transition(StageRunStatus::Skipped)?;
            self.events.try_emit(RunEvent::stage_skipped(&stage, reason));
        }
        Ok(())
    }
}
