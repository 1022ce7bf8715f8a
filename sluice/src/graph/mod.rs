//! The stage graph: an immutable, validated DAG of stage definitions.

mod builder;
mod definition;

pub use builder::GraphBuilder;
pub use definition::StageDefinition;

use std::collections::{HashMap, HashSet, VecDeque};

use crate::core::StageRunStatus;

/// A validated directed acyclic graph of stages.
///
/// Built only through [`GraphBuilder`]; invariants (acyclic, every
/// dependency resolves, unique names) hold for the lifetime of the value.
#[derive(Debug, Clone)]
pub struct StageGraph {
    name: String,
    stages: HashMap<String, StageDefinition>,
    topo_order: Vec<String>,
    /// Reverse edges: dependency -> direct dependents.
    dependents: HashMap<String, Vec<String>>,
}

impl StageGraph {
    pub(crate) fn from_parts(
        name: String,
        stages: HashMap<String, StageDefinition>,
        topo_order: Vec<String>,
    ) -> Self {
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for stage_name in &topo_order {
            if let Some(def) = stages.get(stage_name) {
                for dep in &def.dependencies {
                    dependents
                        .entry(dep.clone())
                        .or_default()
                        .push(stage_name.clone());
                }
            }
        }

        Self {
            name,
            stages,
            topo_order,
            dependents,
        }
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the graph has no stages (never true for built graphs).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns a deterministic topological order over stage names.
    #[must_use]
    pub fn topo_order(&self) -> &[String] {
        &self.topo_order
    }

    /// Looks up a stage definition by name.
    #[must_use]
    pub fn definition(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.get(name)
    }

    /// Iterates definitions in topological order.
    pub fn definitions(&self) -> impl Iterator<Item = &StageDefinition> {
        self.topo_order
            .iter()
            .filter_map(move |name| self.stages.get(name))
    }

    /// Returns the stages that are ready to dispatch: still `Pending`, with
    /// every dependency `Succeeded`.
    ///
    /// Output follows topological order for deterministic dispatch.
    #[must_use]
    pub fn ready(&self, states: &HashMap<String, StageRunStatus>) -> Vec<String> {
        self.topo_order
            .iter()
            .filter(|name| {
                states.get(*name).copied() == Some(StageRunStatus::Pending)
                    && self.stages.get(*name).is_some_and(|def| {
                        def.dependencies.iter().all(|dep| {
                            states.get(dep).copied() == Some(StageRunStatus::Succeeded)
                        })
                    })
            })
            .cloned()
            .collect()
    }

    /// Returns the transitive downstream closure of a stage (excluding the
    /// stage itself).
    #[must_use]
    pub fn downstream_of(&self, name: &str) -> HashSet<String> {
        let mut closure = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(name);

        while let Some(current) = queue.pop_front() {
            if let Some(children) = self.dependents.get(current) {
                for child in children {
                    if closure.insert(child.clone()) {
                        queue.push_back(child.as_str());
                    }
                }
            }
        }

        closure
    }
}
