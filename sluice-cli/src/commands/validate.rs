use std::path::Path;
use std::process::ExitCode;

use super::{load_graph, EXIT_CONFIG};

/// Execute the `validate` command: load and compile a pipeline document
/// without dispatching anything.
pub fn execute(pipeline: &Path) -> ExitCode {
    match load_graph(pipeline) {
        Ok((_registry, graph)) => {
            println!(
                "Pipeline '{}' is valid: {} stage(s), order: {}",
                graph.name(),
                graph.len(),
                graph.topo_order().join(" -> ")
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}
