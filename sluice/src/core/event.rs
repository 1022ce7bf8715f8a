//! Monitoring events emitted per stage-run transition.
//!
//! Events are the only externally observable record of per-stage progress.
//! They are consumed by [`EventSink`](crate::events::EventSink)
//! implementations for log/metric collectors.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::FailureKind;

/// An event describing one run or stage-run transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// The event type (e.g., "stage.succeeded").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (ISO 8601, UTC).
    pub timestamp: String,

    /// The event payload.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl RunEvent {
    /// Creates a new event stamped with the current time.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            data: HashMap::new(),
        }
    }

    /// Adds a data field.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Creates a "run.started" event.
    #[must_use]
    pub fn run_started(run_id: &str, pipeline: &str) -> Self {
        Self::new("run.started")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("pipeline", serde_json::json!(pipeline))
    }

    /// Creates a "run.completed" event.
    #[must_use]
    pub fn run_completed(run_id: &str, status: &str) -> Self {
        Self::new("run.completed")
            .add_data("run_id", serde_json::json!(run_id))
            .add_data("status", serde_json::json!(status))
    }

    /// Creates a "stage.started" event.
    #[must_use]
    pub fn stage_started(stage: &str, attempt: u32) -> Self {
        Self::new("stage.started")
            .add_data("stage", serde_json::json!(stage))
            .add_data("attempt", serde_json::json!(attempt))
    }

    /// Creates a "stage.succeeded" event.
    #[must_use]
    pub fn stage_succeeded(stage: &str, attempt: u32, duration_ms: f64) -> Self {
        Self::new("stage.succeeded")
            .add_data("stage", serde_json::json!(stage))
            .add_data("attempt", serde_json::json!(attempt))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "stage.failed" event.
    #[must_use]
    pub fn stage_failed(stage: &str, attempt: u32, kind: FailureKind, detail: &str) -> Self {
        Self::new("stage.failed")
            .add_data("stage", serde_json::json!(stage))
            .add_data("attempt", serde_json::json!(attempt))
            .add_data("error_kind", serde_json::json!(kind.to_string()))
            .add_data("error", serde_json::json!(detail))
    }

    /// Creates a "stage.retrying" event.
    #[must_use]
    pub fn stage_retrying(stage: &str, next_attempt: u32, delay_ms: u64) -> Self {
        Self::new("stage.retrying")
            .add_data("stage", serde_json::json!(stage))
            .add_data("next_attempt", serde_json::json!(next_attempt))
            .add_data("delay_ms", serde_json::json!(delay_ms))
    }

    /// Creates a "stage.dead_lettered" event.
    #[must_use]
    pub fn stage_dead_lettered(stage: &str, attempts: u32, kind: FailureKind) -> Self {
        Self::new("stage.dead_lettered")
            .add_data("stage", serde_json::json!(stage))
            .add_data("attempts", serde_json::json!(attempts))
            .add_data("error_kind", serde_json::json!(kind.to_string()))
    }

    /// Creates a "stage.skipped" event.
    #[must_use]
    pub fn stage_skipped(stage: &str, reason: &str) -> Self {
        Self::new("stage.skipped")
            .add_data("stage", serde_json::json!(stage))
            .add_data("reason", serde_json::json!(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = RunEvent::new("run.started");
        assert_eq!(event.event_type, "run.started");
        assert!(event.timestamp.contains('T'));
        assert!(event.data.is_empty());
    }

    #[test]
    fn test_stage_started() {
        let event = RunEvent::stage_started("extract", 2);
        assert_eq!(event.event_type, "stage.started");
        assert_eq!(event.data.get("stage"), Some(&serde_json::json!("extract")));
        assert_eq!(event.data.get("attempt"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn test_stage_failed_carries_kind() {
        let event = RunEvent::stage_failed("load", 1, FailureKind::Permanent, "schema mismatch");
        assert_eq!(
            event.data.get("error_kind"),
            Some(&serde_json::json!("permanent"))
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = RunEvent::stage_skipped("load", "upstream dead-lettered");
        let json = serde_json::to_string(&event).unwrap();
        let back: RunEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type, "stage.skipped");
    }
}
