//! Declarative pipeline definitions.
//!
//! A pipeline document is a JSON description of a stage graph. It is loaded
//! once per run and compiled against an executor registry; schema errors and
//! unknown capabilities fail before any stage is dispatched.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::{EngineError, GraphValidationError};
use crate::executor::ExecutorRegistry;
use crate::graph::{GraphBuilder, StageDefinition, StageGraph};
use crate::retry::{BackoffStrategy, JitterStrategy, RetryPolicy};

/// A declarative pipeline document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDocument {
    /// The pipeline name.
    pub name: String,
    /// The stage declarations.
    pub stages: Vec<StageDocument>,
}

/// One stage declaration within a pipeline document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDocument {
    /// Unique stage name.
    pub name: String,
    /// Upstream dependencies.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Executor capability name.
    pub executor: String,
    /// Whether reruns are safe without checkpoint resume.
    #[serde(default)]
    pub idempotent: bool,
    /// Per-attempt timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Retry policy override.
    #[serde(default)]
    pub retry: Option<RetryDocument>,
    /// Partitions whose watermarks this stage covers.
    #[serde(default)]
    pub partitions: Vec<String>,
}

/// Retry policy fields of a stage declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryDocument {
    /// Maximum attempts, including the initial one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on the backoff in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// Jitter bound in milliseconds.
    #[serde(default)]
    pub jitter_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_multiplier() -> u32 {
    2
}

impl From<RetryDocument> for RetryPolicy {
    fn from(doc: RetryDocument) -> Self {
        Self {
            max_attempts: doc.max_attempts,
            base_delay_ms: doc.base_delay_ms,
            max_delay_ms: doc.max_delay_ms,
            multiplier: doc.multiplier,
            jitter_ms: doc.jitter_ms,
            backoff: doc.backoff,
            jitter: doc.jitter,
        }
    }
}

impl PipelineDocument {
    /// Parses a document from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed JSON or schema mismatch.
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Loads a document from a file path.
    ///
    /// # Errors
    ///
    /// Returns IO errors for unreadable files and serialization errors for
    /// malformed content.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Compiles the document into a validated stage graph.
    ///
    /// # Errors
    ///
    /// Returns a validation error for structural problems (duplicates,
    /// unknown dependencies, cycles) or executor capabilities missing from
    /// the registry.
    pub fn compile(&self, registry: &ExecutorRegistry) -> Result<StageGraph, GraphValidationError> {
        let mut builder = GraphBuilder::new(&self.name);

        for stage in &self.stages {
            if !registry.contains(&stage.executor) {
                return Err(GraphValidationError::unknown_executor(
                    &stage.name,
                    &stage.executor,
                ));
            }

            let mut definition = StageDefinition::new(&stage.name, &stage.executor)
                .with_dependencies(stage.depends_on.iter().cloned());
            if stage.idempotent {
                definition = definition.idempotent();
            }
            if let Some(timeout_ms) = stage.timeout_ms {
                definition = definition.with_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(retry) = &stage.retry {
                definition = definition.with_retry(retry.clone().into());
            }
            for partition in &stage.partitions {
                definition = definition.with_partition(partition.as_str());
            }

            builder = builder.stage(definition)?;
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NoOpExecutor;
    use std::sync::Arc;

    fn registry() -> ExecutorRegistry {
        let registry = ExecutorRegistry::new();
        registry.register("noop", Arc::new(NoOpExecutor::new()));
        registry
    }

    const DOC: &str = r#"{
        "name": "orders-etl",
        "stages": [
            {
                "name": "extract",
                "executor": "noop",
                "partitions": ["orders"],
                "retry": { "max_attempts": 5, "base_delay_ms": 200 }
            },
            {
                "name": "transform",
                "executor": "noop",
                "depends_on": ["extract"],
                "idempotent": true
            },
            {
                "name": "load",
                "executor": "noop",
                "depends_on": ["transform"],
                "timeout_ms": 60000
            }
        ]
    }"#;

    #[test]
    fn test_parse_and_compile() {
        let doc = PipelineDocument::from_json(DOC).unwrap();
        assert_eq!(doc.name, "orders-etl");
        assert_eq!(doc.stages.len(), 3);

        let graph = doc.compile(&registry()).unwrap();
        assert_eq!(graph.len(), 3);

        let extract = graph.definition("extract").unwrap();
        assert_eq!(extract.retry.as_ref().unwrap().max_attempts, 5);
        assert_eq!(extract.retry.as_ref().unwrap().base_delay_ms, 200);

        let load = graph.definition("load").unwrap();
        assert_eq!(load.timeout, Some(Duration::from_secs(60)));

        assert!(graph.definition("transform").unwrap().idempotent);
    }

    #[test]
    fn test_malformed_json_fails() {
        let err = PipelineDocument::from_json("{not json").unwrap_err();
        assert!(matches!(err, EngineError::Serialization(_)));
    }

    #[test]
    fn test_missing_required_field_fails() {
        // Stages without an executor are a schema error, caught at parse.
        let raw = r#"{"name": "p", "stages": [{"name": "extract"}]}"#;
        assert!(PipelineDocument::from_json(raw).is_err());
    }

    #[test]
    fn test_unknown_executor_fails_compile() {
        let raw = r#"{"name": "p", "stages": [{"name": "extract", "executor": "postgres"}]}"#;
        let doc = PipelineDocument::from_json(raw).unwrap();
        let err = doc.compile(&registry()).unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }

    #[test]
    fn test_cycle_fails_compile() {
        let raw = r#"{
            "name": "p",
            "stages": [
                {"name": "a", "executor": "noop", "depends_on": ["b"]},
                {"name": "b", "executor": "noop", "depends_on": ["a"]}
            ]
        }"#;
        let doc = PipelineDocument::from_json(raw).unwrap();
        let err = doc.compile(&registry()).unwrap_err();
        assert!(err.cycle.is_some());
    }

    #[test]
    fn test_retry_document_defaults() {
        let retry: RetryDocument = serde_json::from_str("{}").unwrap();
        let policy: RetryPolicy = retry.into();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 1000);
        assert_eq!(policy.multiplier, 2);
    }
}
