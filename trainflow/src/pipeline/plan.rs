//! Finalized, immutable execution plans.

use super::StageSpec;
use crate::core::{PortRef, SemanticType};
use crate::errors::TrainflowError;
use crate::stages::StageContract;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Pseudo-stage name used to refer to graph inputs in port references.
pub const GRAPH_INPUT: &str = "$input";

/// A typed producer-output to consumer-input binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    /// The producing output port.
    pub producer: PortRef,
    /// The consuming input port.
    pub consumer: PortRef,
    /// The type both ports agree on.
    pub semantic_type: SemanticType,
}

/// A stage input supplied by the caller when the plan is run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalBinding {
    /// Name of the graph input.
    pub name: String,
    /// The consuming input port.
    pub consumer: PortRef,
    /// Declared type of the consuming port.
    pub semantic_type: SemanticType,
}

impl ExternalBinding {
    /// Returns the graph input as a port reference.
    #[must_use]
    pub fn source(&self) -> PortRef {
        PortRef::new(GRAPH_INPUT, &self.name)
    }
}

/// A stage output returned from the graph under its own name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalOutput {
    /// Name of the graph output.
    pub name: String,
    /// The producing output port.
    pub producer: PortRef,
    /// Declared type of the producing port.
    pub semantic_type: SemanticType,
}

/// A validated stage graph, ready for a runner.
///
/// Stages are stored in a deterministic topological order. Stages sharing a
/// level have no path between them and may run concurrently.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    name: String,
    stages: Vec<StageSpec>,
    edges: Vec<Edge>,
    external_inputs: Vec<ExternalBinding>,
    terminal_outputs: Vec<TerminalOutput>,
    levels: Vec<Vec<String>>,
    dead_outputs: Vec<PortRef>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ExecutionPlan {
    pub(crate) fn new(
        name: String,
        stages: Vec<StageSpec>,
        edges: Vec<Edge>,
        external_inputs: Vec<ExternalBinding>,
        terminal_outputs: Vec<TerminalOutput>,
        levels: Vec<Vec<String>>,
        dead_outputs: Vec<PortRef>,
    ) -> Self {
        let index = stages
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name.clone(), i))
            .collect();
        Self {
            name,
            stages,
            edges,
            external_inputs,
            terminal_outputs,
            levels,
            dead_outputs,
            index,
        }
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.index.get(name).map(|&i| &self.stages[i])
    }

    /// Returns stage names in execution order.
    #[must_use]
    pub fn execution_order(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns stages grouped into levels of mutually independent stages.
    #[must_use]
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// Returns all edges.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns the edges feeding a stage.
    pub fn edges_into<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.consumer.stage == stage)
    }

    /// Returns the external bindings feeding a stage.
    pub fn external_into<'a>(
        &'a self,
        stage: &'a str,
    ) -> impl Iterator<Item = &'a ExternalBinding> + 'a {
        self.external_inputs
            .iter()
            .filter(move |b| b.consumer.stage == stage)
    }

    /// Returns the stages a stage directly depends on.
    #[must_use]
    pub fn dependencies(&self, stage: &str) -> BTreeSet<&str> {
        self.edges
            .iter()
            .filter(|e| e.consumer.stage == stage)
            .map(|e| e.producer.stage.as_str())
            .collect()
    }

    /// Returns the stages directly depending on a stage.
    #[must_use]
    pub fn dependents(&self, stage: &str) -> BTreeSet<&str> {
        self.edges
            .iter()
            .filter(|e| e.producer.stage == stage)
            .map(|e| e.consumer.stage.as_str())
            .collect()
    }

    /// Returns every stage reachable downstream of a stage.
    #[must_use]
    pub fn downstream(&self, stage: &str) -> BTreeSet<&str> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = self.dependents(stage).into_iter().collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.dependents(next));
            }
        }
        seen
    }

    /// Returns true if neither stage can reach the other.
    #[must_use]
    pub fn are_independent(&self, a: &str, b: &str) -> bool {
        a != b && !self.downstream(a).contains(b) && !self.downstream(b).contains(a)
    }

    /// Returns the external bindings.
    #[must_use]
    pub fn external_inputs(&self) -> &[ExternalBinding] {
        &self.external_inputs
    }

    /// Returns the contract a caller's graph inputs must satisfy.
    #[must_use]
    pub fn input_contract(&self) -> StageContract {
        self.external_inputs
            .iter()
            .fold(StageContract::new(GRAPH_INPUT), |contract, binding| {
                contract.with_input(&binding.name, binding.semantic_type)
            })
    }

    /// Returns the terminal outputs.
    #[must_use]
    pub fn terminal_outputs(&self) -> &[TerminalOutput] {
        &self.terminal_outputs
    }

    /// Returns outputs that are neither consumed nor exposed.
    #[must_use]
    pub fn dead_outputs(&self) -> &[PortRef] {
        &self.dead_outputs
    }

    /// Serializes the plan for hand-off to an external runner.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the plan cannot be encoded.
    pub fn to_json(&self) -> Result<String, TrainflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::SemanticType;
    use crate::pipeline::{StageGraphBuilder, StageSpec};
    use std::collections::BTreeSet;

    fn diamond() -> super::ExecutionPlan {
        let mut builder = StageGraphBuilder::new("diamond");
        builder
            .define_stage(StageSpec::new("source", "src").with_output("out", SemanticType::Text))
            .unwrap()
            .define_stage(
                StageSpec::new("left", "l")
                    .with_input("in", SemanticType::Text)
                    .with_output("out", SemanticType::Text),
            )
            .unwrap()
            .define_stage(
                StageSpec::new("right", "r")
                    .with_input("in", SemanticType::Text)
                    .with_output("out", SemanticType::Text),
            )
            .unwrap()
            .define_stage(
                StageSpec::new("sink", "s")
                    .with_input("a", SemanticType::Text)
                    .with_input("b", SemanticType::Text),
            )
            .unwrap()
            .connect("source", "out", "left", "in")
            .unwrap()
            .connect("source", "out", "right", "in")
            .unwrap()
            .connect("left", "out", "sink", "a")
            .unwrap()
            .connect("right", "out", "sink", "b")
            .unwrap();
        builder.finalize().unwrap()
    }

    #[test]
    fn test_dependency_queries() {
        let plan = diamond();
        let stage = String::from("sink");
        let deps = plan.dependencies(&stage);
        drop(stage);

        assert_eq!(deps, BTreeSet::from(["left", "right"]));
        assert_eq!(plan.dependents("source"), BTreeSet::from(["left", "right"]));
        assert_eq!(plan.downstream("left"), BTreeSet::from(["sink"]));
        assert!(plan.dependencies("source").is_empty());
        assert!(plan.are_independent("left", "right"));
        assert!(!plan.are_independent("source", "sink"));
    }

    #[test]
    fn test_to_json_lists_stages() {
        let json: serde_json::Value = serde_json::from_str(&diamond().to_json().unwrap()).unwrap();
        assert_eq!(json["name"], "diamond");
    }
}
