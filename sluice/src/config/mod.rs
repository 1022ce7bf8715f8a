//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
use crate::retry::RetryPolicy;
use crate::watermark::{FileWatermarkTracker, InMemoryWatermarkTracker, WatermarkTracker};

/// Selects a persistence backend for a store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "backend")]
pub enum StoreBackend {
    /// In-process state, lost on exit. The default for tests and one-shot
    /// runs.
    #[default]
    Memory,
    /// JSON documents on the local filesystem, surviving restarts.
    File {
        /// File (watermarks) or directory (checkpoints) path.
        path: PathBuf,
    },
}

/// Named engine options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on concurrently executing stage attempts.
    #[serde(default = "default_max_workers")]
    pub max_concurrent_workers: usize,
    /// Retry policy applied to stages without an override.
    #[serde(default)]
    pub default_retry: RetryPolicy,
    /// Checkpoint persistence backend.
    #[serde(default)]
    pub checkpoint_backend: StoreBackend,
    /// Watermark persistence backend.
    #[serde(default)]
    pub watermark_backend: StoreBackend,
}

fn default_max_workers() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workers: default_max_workers(),
            default_retry: RetryPolicy::default(),
            checkpoint_backend: StoreBackend::Memory,
            watermark_backend: StoreBackend::Memory,
        }
    }
}

impl EngineConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker bound.
    #[must_use]
    pub fn with_max_concurrent_workers(mut self, workers: usize) -> Self {
        self.max_concurrent_workers = workers.max(1);
        self
    }

    /// Sets the default retry policy.
    #[must_use]
    pub fn with_default_retry(mut self, policy: RetryPolicy) -> Self {
        self.default_retry = policy;
        self
    }

    /// Sets the checkpoint backend.
    #[must_use]
    pub fn with_checkpoint_backend(mut self, backend: StoreBackend) -> Self {
        self.checkpoint_backend = backend;
        self
    }

    /// Sets the watermark backend.
    #[must_use]
    pub fn with_watermark_backend(mut self, backend: StoreBackend) -> Self {
        self.watermark_backend = backend;
        self
    }

    /// Instantiates the configured checkpoint store.
    #[must_use]
    pub fn build_checkpoint_store(&self) -> Arc<dyn CheckpointStore> {
        match &self.checkpoint_backend {
            StoreBackend::Memory => Arc::new(InMemoryCheckpointStore::new()),
            StoreBackend::File { path } => Arc::new(FileCheckpointStore::new(path)),
        }
    }

    /// Instantiates the configured watermark tracker.
    #[must_use]
    pub fn build_watermark_tracker(&self) -> Arc<dyn WatermarkTracker> {
        match &self.watermark_backend {
            StoreBackend::Memory => Arc::new(InMemoryWatermarkTracker::new()),
            StoreBackend::File { path } => Arc::new(FileWatermarkTracker::new(path)),
        }
    }
}
