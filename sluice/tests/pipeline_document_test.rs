//! Outside-in test: declarative document to completed run over file-backed
//! stores.

use std::sync::Arc;

use sluice::prelude::*;

const DOCUMENT: &str = r#"{
    "name": "orders-etl",
    "stages": [
        {
            "name": "extract",
            "executor": "extract",
            "partitions": ["orders"],
            "retry": { "max_attempts": 3, "base_delay_ms": 5, "jitter_ms": 0 }
        },
        {
            "name": "load",
            "executor": "load",
            "depends_on": ["extract"],
            "partitions": ["orders"]
        }
    ]
}"#;

fn registry() -> Arc<ExecutorRegistry> {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register(
        "extract",
        Arc::new(FnExecutor::new("extract", |ctx: StageContext| async move {
            let since = ctx.watermark(&Partition::from("orders"));
            Ok(OutputSummary::new()
                .with_records(50)
                .with_high_watermark("orders", Position::new(since.offset() + 50)))
        })),
    );
    registry.register(
        "load",
        Arc::new(FnExecutor::new("load", |_ctx: StageContext| async move {
            Ok(OutputSummary::new().with_records(50))
        })),
    );
    registry
}

#[tokio::test]
async fn document_run_persists_watermarks_across_engine_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let watermark_path = dir.path().join("watermarks.json");
    let checkpoint_dir = dir.path().join("checkpoints");

    let registry = registry();
    let document = PipelineDocument::from_json(DOCUMENT).unwrap();
    let graph = document.compile(&registry).unwrap();

    let config = EngineConfig::new()
        .with_watermark_backend(StoreBackend::File {
            path: watermark_path.clone(),
        })
        .with_checkpoint_backend(StoreBackend::File {
            path: checkpoint_dir.clone(),
        });

    // First engine instance processes the first increment.
    {
        let orchestrator = Orchestrator::new(registry.clone())
            .with_watermark_tracker(config.build_watermark_tracker())
            .with_checkpoint_store(config.build_checkpoint_store())
            .with_config(config.clone());

        let report = orchestrator
            .execute(&graph, BatchWindow::continuous())
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Succeeded);
    }

    // A fresh engine over the same files resumes from the committed
    // watermark instead of the beginning.
    {
        let orchestrator = Orchestrator::new(registry)
            .with_watermark_tracker(config.build_watermark_tracker())
            .with_checkpoint_store(config.build_checkpoint_store())
            .with_config(config);

        let report = orchestrator
            .execute(&graph, BatchWindow::continuous())
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Succeeded);

        let tracker = orchestrator.watermarks();
        assert_eq!(
            tracker.read(&Partition::from("orders")).await.unwrap(),
            Position::new(100)
        );
    }
}

#[tokio::test]
async fn invalid_document_reports_validation_before_dispatch() {
    let registry = registry();
    let raw = r#"{
        "name": "broken",
        "stages": [
            {"name": "a", "executor": "extract", "depends_on": ["b"]},
            {"name": "b", "executor": "load", "depends_on": ["a"]}
        ]
    }"#;

    let document = PipelineDocument::from_json(raw).unwrap();
    let err = document.compile(&registry).unwrap_err();
    assert!(err.cycle.is_some());
}
