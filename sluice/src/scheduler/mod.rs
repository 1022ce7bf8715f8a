//! Pipeline run scheduling and execution.

mod orchestrator;
mod run;

pub use orchestrator::Orchestrator;
pub use run::{PipelineRun, RunReport, StageRun};
