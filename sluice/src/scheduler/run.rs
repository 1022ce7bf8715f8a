//! Pipeline run and stage run state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::core::{BatchWindow, RunStatus, StageFailure, StageRunStatus};
use crate::errors::EngineError;
use crate::graph::StageGraph;

/// The attempt-series of one stage within a pipeline run.
///
/// Owned exclusively by the orchestrator; the status field is private so
/// every mutation goes through [`transition`](StageRun::transition), which
/// rejects moves the state machine does not allow.
#[derive(Debug, Clone, Serialize)]
pub struct StageRun {
    /// The stage name.
    pub stage: String,
    status: StageRunStatus,
    /// Number of attempts issued so far.
    pub attempts: u32,
    /// The most recent failure, if any.
    pub last_error: Option<StageFailure>,
    /// When the first attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal state.
    pub ended_at: Option<DateTime<Utc>>,
}

impl StageRun {
    /// Creates a pending stage run.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageRunStatus::Pending,
            attempts: 0,
            last_error: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> StageRunStatus {
        self.status
    }

    /// Applies a state transition.
    ///
    /// # Errors
    ///
    /// Returns an internal error for transitions the state machine forbids;
    /// those indicate an orchestrator bug, not a stage failure.
    pub fn transition(&mut self, next: StageRunStatus) -> Result<(), EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::Internal(format!(
                "Illegal transition for stage '{}': {} -> {}",
                self.stage, self.status, next
            )));
        }

        if next == StageRunStatus::Running {
            self.attempts += 1;
            if self.started_at.is_none() {
                self.started_at = Some(Utc::now());
            }
        }
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        self.status = next;
        Ok(())
    }

    /// Records a failure on the run.
    pub fn record_failure(&mut self, failure: StageFailure) {
        self.last_error = Some(failure);
    }
}

/// One execution of a stage graph against a batch window.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// The graph name this run executes.
    pub pipeline: String,
    /// The input scope of the run.
    pub window: BatchWindow,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    stage_runs: HashMap<String, StageRun>,
}

impl PipelineRun {
    /// Instantiates a run with every stage pending.
    #[must_use]
    pub fn new(graph: &StageGraph, window: BatchWindow) -> Self {
        let stage_runs = graph
            .topo_order()
            .iter()
            .map(|name| (name.clone(), StageRun::new(name.clone())))
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            pipeline: graph.name().to_string(),
            window,
            created_at: Utc::now(),
            stage_runs,
        }
    }

    /// Returns the stage run for a name.
    #[must_use]
    pub fn stage_run(&self, stage: &str) -> Option<&StageRun> {
        self.stage_runs.get(stage)
    }

    /// Returns the mutable stage run for a name.
    pub fn stage_run_mut(&mut self, stage: &str) -> Option<&mut StageRun> {
        self.stage_runs.get_mut(stage)
    }

    /// Returns the status of a stage, if it exists.
    #[must_use]
    pub fn status_of(&self, stage: &str) -> Option<StageRunStatus> {
        self.stage_runs.get(stage).map(StageRun::status)
    }

    /// Returns a snapshot of all stage statuses.
    #[must_use]
    pub fn statuses(&self) -> HashMap<String, StageRunStatus> {
        self.stage_runs
            .iter()
            .map(|(name, run)| (name.clone(), run.status()))
            .collect()
    }

    /// Returns all stage runs.
    #[must_use]
    pub fn stage_runs(&self) -> &HashMap<String, StageRun> {
        &self.stage_runs
    }

    /// Returns stages currently in the given status.
    #[must_use]
    pub fn stages_in(&self, status: StageRunStatus) -> Vec<String> {
        let mut stages: Vec<String> = self
            .stage_runs
            .iter()
            .filter(|(_, run)| run.status() == status)
            .map(|(name, _)| name.clone())
            .collect();
        stages.sort();
        stages
    }

    /// Returns true once every stage is terminal.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stage_runs.values().all(|run| run.status().is_terminal())
    }

    /// Computes the overall outcome of a completed run.
    #[must_use]
    pub fn outcome(&self) -> RunStatus {
        if self
            .stage_runs
            .values()
            .all(|run| run.status() == StageRunStatus::Succeeded)
        {
            RunStatus::Succeeded
        } else {
            RunStatus::PartialFailure
        }
    }
}

/// The final, externally reported record of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The run identifier.
    pub run_id: Uuid,
    /// The pipeline name.
    pub pipeline: String,
    /// Overall outcome.
    pub status: RunStatus,
    /// Stages that exhausted retries or failed fatally.
    pub dead_lettered: Vec<String>,
    /// Stages that never ran because of an upstream dead-letter or abort.
    pub skipped: Vec<String>,
    /// Final per-stage records.
    pub stage_runs: HashMap<String, StageRun>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run completed.
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Builds the report for a completed run.
    #[must_use]
    pub fn from_run(run: &PipelineRun) -> Self {
        Self {
            run_id: run.run_id,
            pipeline: run.pipeline.clone(),
            status: run.outcome(),
            dead_lettered: run.stages_in(StageRunStatus::DeadLettered),
            skipped: run.stages_in(StageRunStatus::Skipped),
            stage_runs: run.stage_runs().clone(),
            created_at: run.created_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, StageDefinition};

    fn graph() -> StageGraph {
        GraphBuilder::new("etl")
            .stage(StageDefinition::new("extract", "noop"))
            .unwrap()
            .stage(StageDefinition::new("load", "noop").depends_on("extract"))
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_run_all_pending() {
        let run = PipelineRun::new(&graph(), BatchWindow::continuous());
        assert_eq!(run.status_of("extract"), Some(StageRunStatus::Pending));
        assert_eq!(run.status_of("load"), Some(StageRunStatus::Pending));
        assert!(!run.is_complete());
    }

    #[test]
    fn test_transition_counts_attempts() {
        let mut stage_run = StageRun::new("extract");
        stage_run.transition(StageRunStatus::Running).unwrap();
        stage_run.transition(StageRunStatus::Failed).unwrap();
        stage_run.transition(StageRunStatus::Retrying).unwrap();
        stage_run.transition(StageRunStatus::Running).unwrap();
        stage_run.transition(StageRunStatus::Succeeded).unwrap();

        assert_eq!(stage_run.attempts, 2);
        assert!(stage_run.started_at.is_some());
        assert!(stage_run.ended_at.is_some());
    }

    #[test]
    fn test_illegal_transition_is_internal_error() {
        let mut stage_run = StageRun::new("extract");
        let err = stage_run.transition(StageRunStatus::Succeeded).unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
        assert_eq!(stage_run.status(), StageRunStatus::Pending);
    }

    #[test]
    fn test_outcome_partial_on_dead_letter() {
        let mut run = PipelineRun::new(&graph(), BatchWindow::continuous());

        let extract = run.stage_run_mut("extract").unwrap();
        extract.transition(StageRunStatus::Running).unwrap();
        extract.transition(StageRunStatus::Failed).unwrap();
        extract.transition(StageRunStatus::DeadLettered).unwrap();

        let load = run.stage_run_mut("load").unwrap();
        load.transition(StageRunStatus::Skipped).unwrap();

        assert!(run.is_complete());
        assert_eq!(run.outcome(), RunStatus::PartialFailure);

        let report = RunReport::from_run(&run);
        assert_eq!(report.dead_lettered, vec!["extract".to_string()]);
        assert_eq!(report.skipped, vec!["load".to_string()]);
    }

    #[test]
    fn test_outcome_succeeded() {
        let mut run = PipelineRun::new(&graph(), BatchWindow::continuous());
        for stage in ["extract", "load"] {
            let stage_run = run.stage_run_mut(stage).unwrap();
            stage_run.transition(StageRunStatus::Running).unwrap();
            stage_run.transition(StageRunStatus::Succeeded).unwrap();
        }
        assert_eq!(run.outcome(), RunStatus::Succeeded);
    }
}
