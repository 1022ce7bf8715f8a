//! Stage definitions: the immutable description of one unit of pipeline work.

use std::collections::HashSet;
use std::time::Duration;

use crate::errors::GraphValidationError;
use crate::retry::RetryPolicy;
use crate::watermark::Partition;

/// The declaration of a single stage within a graph.
///
/// Immutable once the graph is built. The `executor` field names a
/// capability resolved through the
/// [`ExecutorRegistry`](crate::executor::ExecutorRegistry) at run time.
#[derive(Debug, Clone)]
pub struct StageDefinition {
    /// Unique name within the graph.
    pub name: String,
    /// Names of upstream stages this stage depends on.
    pub dependencies: HashSet<String>,
    /// The executor capability this stage requires.
    pub executor: String,
    /// Whether reruns of this stage are safe without checkpoint resume.
    pub idempotent: bool,
    /// Per-attempt execution timeout.
    pub timeout: Option<Duration>,
    /// Retry policy override; the engine default applies when absent.
    pub retry: Option<RetryPolicy>,
    /// Partitions whose watermarks this stage consumes and covers.
    pub partitions: Vec<Partition>,
}

impl StageDefinition {
    /// Creates a new stage definition.
    #[must_use]
    pub fn new(name: impl Into<String>, executor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: HashSet::new(),
            executor: executor.into(),
            idempotent: false,
            timeout: None,
            retry: None,
            partitions: Vec::new(),
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn depends_on(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    /// Sets all dependencies at once.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Marks reruns of this stage as safe.
    #[must_use]
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry policy override.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Declares a partition this stage covers.
    #[must_use]
    pub fn with_partition(mut self, partition: impl Into<Partition>) -> Self {
        self.partitions.push(partition.into());
        self
    }

    /// Validates the definition in isolation.
    ///
    /// # Errors
    ///
    /// Returns an error for empty names or self-dependencies.
    pub fn validate(&self) -> Result<(), GraphValidationError> {
        if self.name.trim().is_empty() {
            return Err(GraphValidationError::new("Stage name cannot be empty"));
        }
        if self.dependencies.contains(&self.name) {
            return Err(GraphValidationError::new(format!(
                "Stage '{}' cannot depend on itself",
                self.name
            ))
            .with_stages(vec![self.name.clone()]));
        }
        Ok(())
    }
}
