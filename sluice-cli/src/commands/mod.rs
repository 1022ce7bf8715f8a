pub mod run;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use sluice::definition::PipelineDocument;
use sluice::executor::{ExecutorRegistry, NoOpExecutor};
use sluice::graph::StageGraph;

/// Exit code for a run that did not fully succeed.
pub const EXIT_RUN_FAILED: u8 = 1;
/// Exit code for configuration or validation errors.
pub const EXIT_CONFIG: u8 = 2;

/// Builds the registry of executors shipped with the CLI.
///
/// Concrete connectors register themselves when the engine is embedded as a
/// library; the standalone binary carries only the structural `noop`
/// executor, enough to validate documents and exercise graph sequencing.
pub fn builtin_registry() -> Arc<ExecutorRegistry> {
    let registry = Arc::new(ExecutorRegistry::new());
    registry.register("noop", Arc::new(NoOpExecutor::new()));
    registry
}

/// Loads and compiles a pipeline document against the built-in registry.
pub fn load_graph(path: &Path) -> anyhow::Result<(Arc<ExecutorRegistry>, StageGraph)> {
    let document = PipelineDocument::from_path(path)
        .with_context(|| format!("Failed to load pipeline '{}'", path.display()))?;

    let registry = builtin_registry();
    let graph = document
        .compile(&registry)
        .with_context(|| format!("Pipeline '{}' failed validation", document.name))?;

    Ok((registry, graph))
}
