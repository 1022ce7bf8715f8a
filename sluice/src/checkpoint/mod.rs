//! Per-stage-run checkpoint persistence.
//!
//! A checkpoint is an opaque state blob plus a completion flag, keyed by a
//! stage-run id that is stable across attempts and re-runs of the same
//! pipeline/stage/window. Non-idempotent executors load it on every attempt
//! and resume from it instead of restarting, so interrupted work is never
//! double-applied.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::errors::EngineError;

/// Persisted execution state for one stage run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Opaque executor state.
    pub state: serde_json::Value,
    /// Whether the stage run committed all of its work.
    pub complete: bool,
    /// When the checkpoint was last written.
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Creates an in-progress checkpoint around a state blob.
    #[must_use]
    pub fn new(state: serde_json::Value) -> Self {
        Self {
            state,
            complete: false,
            updated_at: Utc::now(),
        }
    }
}

/// Derives the stable checkpoint key for a stage run.
///
/// The key covers pipeline, stage, and batch-window token, not the attempt
/// number, so retries and resumed runs land on the same checkpoint.
#[must_use]
pub fn stage_run_key(pipeline: &str, stage: &str, window_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pipeline.as_bytes());
    hasher.update(b":");
    hasher.update(stage.as_bytes());
    hasher.update(b":");
    hasher.update(window_token.as_bytes());
    let digest = hasher.finalize();
    format!("run:{}", hex::encode(&digest[..16]))
}

/// Trait for checkpoint backends.
#[async_trait]
pub trait CheckpointStore: Send + Sync + std::fmt::Debug {
    /// Saves in-progress state for a stage run, clearing any completion flag.
    async fn save(&self, stage_run_id: &str, state: serde_json::Value) -> Result<(), EngineError>;

    /// Loads the checkpoint for a stage run, if any.
    async fn load(&self, stage_run_id: &str) -> Result<Option<Checkpoint>, EngineError>;

    /// Marks a stage run's work as fully committed.
    async fn complete(&self, stage_run_id: &str) -> Result<(), EngineError>;

    /// Returns true if the stage run has committed all of its work.
    async fn is_complete(&self, stage_run_id: &str) -> Result<bool, EngineError> {
        Ok(self
            .load(stage_run_id)
            .await?
            .is_some_and(|checkpoint| checkpoint.complete))
    }
}

/// In-memory checkpoint store.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    entries: DashMap<String, Checkpoint>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of checkpoints held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, stage_run_id: &str, state: serde_json::Value) -> Result<(), EngineError> {
        self.entries
            .insert(stage_run_id.to_string(), Checkpoint::new(state));
        Ok(())
    }

    async fn load(&self, stage_run_id: &str) -> Result<Option<Checkpoint>, EngineError> {
        Ok(self.entries.get(stage_run_id).map(|entry| entry.clone()))
    }

    async fn complete(&self, stage_run_id: &str) -> Result<(), EngineError> {
        let mut entry = self
            .entries
            .entry(stage_run_id.to_string())
            .or_insert_with(|| Checkpoint::new(serde_json::Value::Null));
        entry.complete = true;
        entry.updated_at = Utc::now();
        Ok(())
    }
}

/// File-backed checkpoint store: one JSON file per stage-run id.
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store rooted at the given directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, stage_run_id: &str) -> PathBuf {
        // The trait accepts arbitrary ids; map them onto safe filenames.
        let safe: String = stage_run_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    fn read(&self, stage_run_id: &str) -> Result<Option<Checkpoint>, EngineError> {
        let path = self.path_for(stage_run_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn write(&self, stage_run_id: &str, checkpoint: &Checkpoint) -> Result<(), EngineError> {
        std::fs::create_dir_all(&self.dir)?;
        let raw = serde_json::to_string_pretty(checkpoint)?;
        std::fs::write(self.path_for(stage_run_id), raw)?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, stage_run_id: &str, state: serde_json::Value) -> Result<(), EngineError> {
        self.write(stage_run_id, &Checkpoint::new(state))
    }

    async fn load(&self, stage_run_id: &str) -> Result<Option<Checkpoint>, EngineError> {
        self.read(stage_run_id)
    }

    async fn complete(&self, stage_run_id: &str) -> Result<(), EngineError> {
        let mut checkpoint = self
            .read(stage_run_id)?
            .unwrap_or_else(|| Checkpoint::new(serde_json::Value::Null));
        checkpoint.complete = true;
        checkpoint.updated_at = Utc::now();
        self.write(stage_run_id, &checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_run_key_stable_across_attempts() {
        let a = stage_run_key("etl", "extract", "window-1");
        let b = stage_run_key("etl", "extract", "window-1");
        assert_eq!(a, b);
        assert!(a.starts_with("run:"));
    }

    #[test]
    fn test_stage_run_key_varies_by_component() {
        let base = stage_run_key("etl", "extract", "window-1");
        assert_ne!(base, stage_run_key("etl", "transform", "window-1"));
        assert_ne!(base, stage_run_key("etl", "extract", "window-2"));
        assert_ne!(base, stage_run_key("other", "extract", "window-1"));
    }

    #[tokio::test]
    async fn test_save_load_complete() {
        let store = InMemoryCheckpointStore::new();
        let key = stage_run_key("etl", "load", "w");

        assert!(store.load(&key).await.unwrap().is_none());
        assert!(!store.is_complete(&key).await.unwrap());

        store
            .save(&key, serde_json::json!({"rows_committed": 500}))
            .await
            .unwrap();
        let checkpoint = store.load(&key).await.unwrap().unwrap();
        assert!(!checkpoint.complete);
        assert_eq!(checkpoint.state["rows_committed"], 500);

        store.complete(&key).await.unwrap();
        assert!(store.is_complete(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_after_complete_resets_flag() {
        let store = InMemoryCheckpointStore::new();
        store.complete("k").await.unwrap();
        store.save("k", serde_json::json!(1)).await.unwrap();
        assert!(!store.is_complete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = FileCheckpointStore::new(dir.path());
            store
                .save("run1", serde_json::json!({"offset": 42}))
                .await
                .unwrap();
            store.complete("run1").await.unwrap();
        }

        let store = FileCheckpointStore::new(dir.path());
        let checkpoint = store.load("run1").await.unwrap().unwrap();
        assert!(checkpoint.complete);
        assert_eq!(checkpoint.state["offset"], 42);
    }
}
