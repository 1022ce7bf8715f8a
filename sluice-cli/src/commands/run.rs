use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use sluice::config::{EngineConfig, StoreBackend};
use sluice::core::{BatchWindow, RunEvent, RunStatus};
use sluice::errors::EngineError;
use sluice::events::{EventSink, LoggingEventSink};
use sluice::scheduler::Orchestrator;

use super::{load_graph, EXIT_CONFIG, EXIT_RUN_FAILED};

/// Arguments for the `run` command.
pub struct RunArgs {
    pub pipeline: PathBuf,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub no_wait: bool,
    pub json: bool,
    pub workers: Option<usize>,
    pub watermarks: Option<PathBuf>,
    pub checkpoints: Option<PathBuf>,
}

/// A sink that prints the run identifier the moment the run starts and
/// forwards everything to the logging sink.
#[derive(Debug, Default)]
struct AnnouncingEventSink {
    inner: LoggingEventSink,
}

impl AnnouncingEventSink {
    fn forward(&self, event: RunEvent) {
        if event.event_type == "run.started" {
            if let Some(run_id) = event.data.get("run_id").and_then(|v| v.as_str()) {
                println!("{run_id}");
            }
        }
        self.inner.try_emit(event);
    }
}

#[async_trait]
impl EventSink for AnnouncingEventSink {
    async fn emit(&self, event: RunEvent) {
        self.forward(event);
    }

    fn try_emit(&self, event: RunEvent) {
        self.forward(event);
    }
}

/// Execute the `run` command: load, validate, and drive a pipeline run.
pub async fn execute(args: RunArgs) -> ExitCode {
    let (registry, graph) = match load_graph(&args.pipeline) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let window = match (args.window_start, args.window_end) {
        (Some(start), Some(end)) if start < end => BatchWindow::bounded(start, end),
        (Some(_), Some(_)) => {
            eprintln!("--window-start must be before --window-end");
            return ExitCode::from(EXIT_CONFIG);
        }
        (None, None) => BatchWindow::continuous(),
        _ => {
            eprintln!("--window-start and --window-end must be given together");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let mut config = EngineConfig::new();
    if let Some(workers) = args.workers {
        config = config.with_max_concurrent_workers(workers);
    }
    if let Some(path) = args.watermarks {
        config = config.with_watermark_backend(StoreBackend::File { path });
    }
    if let Some(path) = args.checkpoints {
        config = config.with_checkpoint_backend(StoreBackend::File { path });
    }

    let orchestrator = Orchestrator::new(registry)
        .with_watermark_tracker(config.build_watermark_tracker())
        .with_checkpoint_store(config.build_checkpoint_store())
        .with_event_sink(Arc::new(AnnouncingEventSink::default()))
        .with_config(config);

    tracing::info!(
        pipeline = graph.name(),
        stages = graph.len(),
        window = %window,
        "Pipeline validated"
    );

    let report = match orchestrator.execute(&graph, window).await {
        Ok(report) => report,
        Err(EngineError::Validation(e)) => {
            eprintln!("Pipeline validation failed: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
        Err(e) => {
            eprintln!("Run aborted: {e}");
            return ExitCode::from(EXIT_RUN_FAILED);
        }
    };

    if args.no_wait {
        // Final status already went out through the event stream.
        return ExitCode::SUCCESS;
    }

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to serialize report: {e}"),
        }
    } else {
        println!("Pipeline '{}' finished: {}", report.pipeline, report.status);
        let mut stages: Vec<_> = report.stage_runs.values().collect();
        stages.sort_by(|a, b| a.stage.cmp(&b.stage));
        for stage_run in stages {
            println!(
                "  {:<24} {:<14} attempts={}",
                stage_run.stage,
                stage_run.status().to_string(),
                stage_run.attempts
            );
        }
        if !report.dead_lettered.is_empty() {
            println!("  Dead-lettered: {}", report.dead_lettered.join(", "));
        }
        if !report.skipped.is_empty() {
            println!("  Skipped:       {}", report.skipped.join(", "));
        }
    }

    match report.status {
        RunStatus::Succeeded => ExitCode::SUCCESS,
        RunStatus::PartialFailure => ExitCode::from(EXIT_RUN_FAILED),
    }
}
