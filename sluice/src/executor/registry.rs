//! Registry mapping executor capability names to implementations.

use dashmap::DashMap;
use std::sync::Arc;

use super::StageExecutor;

/// A name -> executor registry.
///
/// Stage definitions reference executors by capability name; resolution
/// happens here before any dispatch, so an unknown capability fails the run
/// at validation time.
#[derive(Debug, Default)]
pub struct ExecutorRegistry {
    executors: DashMap<String, Arc<dyn StageExecutor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor under a capability name.
    ///
    /// Re-registering a name replaces the previous executor.
    pub fn register(&self, name: impl Into<String>, executor: Arc<dyn StageExecutor>) {
        self.executors.insert(name.into(), executor);
    }

    /// Resolves a capability name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn StageExecutor>> {
        self.executors.get(name).map(|entry| entry.value().clone())
    }

    /// Returns true if a capability is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// Returns all registered capability names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .executors
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NoOpExecutor;

    #[test]
    fn test_register_and_resolve() {
        let registry = ExecutorRegistry::new();
        assert!(!registry.contains("noop"));

        registry.register("noop", Arc::new(NoOpExecutor::new()));
        assert!(registry.contains("noop"));
        assert!(registry.get("noop").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_names_sorted() {
        let registry = ExecutorRegistry::new();
        registry.register("b", Arc::new(NoOpExecutor::new()));
        registry.register("a", Arc::new(NoOpExecutor::new()));
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
