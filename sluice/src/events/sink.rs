//! Event sink trait and implementations.

use async_trait::async_trait;
use tracing::{debug, info, Level};

use crate::core::RunEvent;

/// Trait for sinks that receive monitoring events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: RunEvent);

    /// Emits an event without awaiting.
    ///
    /// Must never fail loudly; a broken sink cannot be allowed to take the
    /// orchestrator down with it.
    fn try_emit(&self, event: RunEvent);
}

/// A sink that discards all events.
///
/// The default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: RunEvent) {}

    fn try_emit(&self, _event: RunEvent) {}
}

/// A sink that logs events through the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &RunEvent) {
        match self.level {
            Level::DEBUG => {
                debug!(
                    event_type = %event.event_type,
                    event_data = ?event.data,
                    "Event: {}", event.event_type
                );
            }
            _ => {
                info!(
                    event_type = %event.event_type,
                    event_data = ?event.data,
                    "Event: {}", event.event_type
                );
            }
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: RunEvent) {
        self.log_event(&event);
    }

    fn try_emit(&self, event: RunEvent) {
        self.log_event(&event);
    }
}

/// A collecting sink for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<RunEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events whose type matches a prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<RunEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Returns events for a specific stage, in emission order.
    #[must_use]
    pub fn events_for_stage(&self, stage: &str) -> Vec<RunEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.data.get("stage") == Some(&serde_json::json!(stage)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: RunEvent) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: RunEvent) {
        self.events.write().push(event);
    }
}
