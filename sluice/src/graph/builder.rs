//! Graph builder with structural validation.

use std::collections::{HashMap, HashSet};

use super::{StageDefinition, StageGraph};
use crate::errors::GraphValidationError;

/// Builder for validated stage graphs.
///
/// Duplicate names are rejected at insertion; unresolved dependencies and
/// cycles are rejected at [`build`](GraphBuilder::build), so stages may be
/// added in any order (declarative documents do not sort them).
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    name: String,
    stages: HashMap<String, StageDefinition>,
    insertion_order: Vec<String>,
}

impl GraphBuilder {
    /// Creates a builder for a named graph.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: HashMap::new(),
            insertion_order: Vec::new(),
        }
    }

    /// Adds a stage definition.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate names, empty names, or
    /// self-dependencies.
    pub fn stage(mut self, definition: StageDefinition) -> Result<Self, GraphValidationError> {
        definition.validate()?;

        if self.stages.contains_key(&definition.name) {
            return Err(GraphValidationError::duplicate_stage(&definition.name));
        }

        self.insertion_order.push(definition.name.clone());
        self.stages.insert(definition.name.clone(), definition);
        Ok(self)
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Builds the graph, validating dependency resolution and acyclicity.
    ///
    /// # Errors
    ///
    /// Returns an error for empty graphs, unknown dependencies, or cycles
    /// (with a concrete cycle path).
    pub fn build(self) -> Result<StageGraph, GraphValidationError> {
        if self.stages.is_empty() {
            return Err(GraphValidationError::new("Graph has no stages"));
        }

        for name in &self.insertion_order {
            let Some(definition) = self.stages.get(name) else {
                continue;
            };
            for dep in &definition.dependencies {
                if !self.stages.contains_key(dep) {
                    return Err(GraphValidationError::unknown_dependency(name, dep));
                }
            }
        }

        let topo_order = self.topological_sort()?;
        Ok(StageGraph::from_parts(self.name, self.stages, topo_order))
    }

    /// Kahn's algorithm over insertion order; leftover nodes imply a cycle,
    /// which is then traced to a concrete path.
    fn topological_sort(&self) -> Result<Vec<String>, GraphValidationError> {
        let mut in_degree: HashMap<&str, usize> = self
            .stages
            .iter()
            .map(|(name, def)| (name.as_str(), def.dependencies.len()))
            .collect();

        let mut order = Vec::with_capacity(self.stages.len());
        let mut frontier: Vec<&str> = self
            .insertion_order
            .iter()
            .map(String::as_str)
            .filter(|name| in_degree.get(name) == Some(&0))
            .collect();

        while let Some(name) = frontier.first().copied() {
            frontier.remove(0);
            order.push(name.to_string());

            for candidate in &self.insertion_order {
                let Some(def) = self.stages.get(candidate) else {
                    continue;
                };
                if def.dependencies.contains(name) {
                    if let Some(count) = in_degree.get_mut(candidate.as_str()) {
                        *count -= 1;
                        if *count == 0 {
                            frontier.push(candidate.as_str());
                        }
                    }
                }
            }
        }

        if order.len() < self.stages.len() {
            let leftover: HashSet<&str> = self
                .stages
                .keys()
                .map(String::as_str)
                .filter(|name| !order.iter().any(|done| done == *name))
                .collect();
            return Err(GraphValidationError::cycle(self.trace_cycle(&leftover)));
        }

        Ok(order)
    }

    /// Walks dependency edges within the leftover set until a node repeats.
    fn trace_cycle(&self, leftover: &HashSet<&str>) -> Vec<String> {
        let mut path: Vec<String> = Vec::new();
        let Some(start) = self
            .insertion_order
            .iter()
            .find(|name| leftover.contains(name.as_str()))
        else {
            return path;
        };

        let mut current = start.as_str();
        loop {
            if let Some(repeat) = path.iter().position(|seen| seen == current) {
                let mut cycle = path[repeat..].to_vec();
                cycle.push(current.to_string());
                return cycle;
            }
            path.push(current.to_string());

            let next = self.stages.get(current).and_then(|def| {
                def.dependencies
                    .iter()
                    .find(|dep| leftover.contains(dep.as_str()))
            });
            match next {
                Some(dep) => current = dep.as_str(),
                // Every leftover node sits on or above a cycle; the walk
                // cannot dead-end.
                None => return path,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str) -> StageDefinition {
        StageDefinition::new(name, "noop")
    }

    #[test]
    fn test_linear_chain_builds() {
        let graph = GraphBuilder::new("etl")
            .stage(def("extract"))
            .unwrap()
            .stage(def("transform").depends_on("extract"))
            .unwrap()
            .stage(def("load").depends_on("transform"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(
            graph.topo_order(),
            &["extract".to_string(), "transform".to_string(), "load".to_string()]
        );
    }

    #[test]
    fn test_forward_references_allowed() {
        // Declarative documents list stages in arbitrary order.
        let graph = GraphBuilder::new("etl")
            .stage(def("load").depends_on("extract"))
            .unwrap()
            .stage(def("extract"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(graph.topo_order()[0], "extract");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = GraphBuilder::new("etl")
            .stage(def("extract"))
            .unwrap()
            .stage(def("extract"))
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = GraphBuilder::new("etl")
            .stage(def("load").depends_on("transfrm"))
            .unwrap()
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("transfrm"));
    }

    #[test]
    fn test_cycle_rejected_with_path() {
        let err = GraphBuilder::new("etl")
            .stage(def("a").depends_on("c"))
            .unwrap()
            .stage(def("b").depends_on("a"))
            .unwrap()
            .stage(def("c").depends_on("b"))
            .unwrap()
            .build()
            .unwrap_err();

        let cycle = err.cycle.expect("cycle path expected");
        assert!(cycle.len() >= 3);
        assert_eq!(cycle.first(), cycle.last());
        for name in &cycle {
            assert!(["a", "b", "c"].contains(&name.as_str()));
        }
    }

    #[test]
    fn test_empty_graph_rejected() {
        assert!(GraphBuilder::new("empty").build().is_err());
    }

    #[test]
    fn test_diamond_topo_order_respects_dependencies() {
        let graph = GraphBuilder::new("diamond")
            .stage(def("a"))
            .unwrap()
            .stage(def("b").depends_on("a"))
            .unwrap()
            .stage(def("c").depends_on("a"))
            .unwrap()
            .stage(def("d").depends_on("b").depends_on("c"))
            .unwrap()
            .build()
            .unwrap();

        let order = graph.topo_order();
        let pos = |n: &str| order.iter().position(|s| s == n).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }
}
