//! Output summary returned by successful stage executors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::watermark::{Partition, Position};

/// What a successful stage attempt reports back to the orchestrator.
///
/// The `high_watermarks` map carries the highest change-stream position the
/// stage fully processed per partition; the orchestrator uses it to decide
/// watermark advancement once every stage covering a partition has
/// succeeded. Everything else is opaque bookkeeping for operators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSummary {
    /// Number of records processed.
    #[serde(default)]
    pub records: u64,
    /// Number of bytes processed.
    #[serde(default)]
    pub bytes: u64,
    /// Highest fully-processed position per partition.
    #[serde(default)]
    pub high_watermarks: HashMap<Partition, Position>,
    /// Connector-specific extras.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl OutputSummary {
    /// Creates an empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the record count.
    #[must_use]
    pub fn with_records(mut self, records: u64) -> Self {
        self.records = records;
        self
    }

    /// Sets the byte count.
    #[must_use]
    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }

    /// Reports the highest processed position for a partition.
    #[must_use]
    pub fn with_high_watermark(mut self, partition: impl Into<Partition>, position: Position) -> Self {
        self.high_watermarks.insert(partition.into(), position);
        self
    }

    /// Attaches a connector-specific data entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}
