//! Stage graph builder with validation.

use super::plan::{Edge, ExecutionPlan, ExternalBinding, TerminalOutput};
use super::{CommandRef, StageSpec};
use crate::core::{PortDirection, PortRef, SemanticType};
use crate::errors::{
    AmbiguousBindingError, CycleDetectedError, DuplicateStageError, GraphError,
    TypeMismatchError, UnboundInputError, UnknownPortError, UnknownStageError,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Builder for stage graphs.
///
/// Stages and bindings are declared explicitly; nothing is registered
/// globally. Per-call checks reject duplicate names, unknown ports and type
/// mismatches; [`finalize`](Self::finalize) checks whole-graph properties and
/// produces an immutable [`ExecutionPlan`].
#[derive(Debug, Clone)]
pub struct StageGraphBuilder {
    /// The graph name.
    name: String,
    /// The stage specifications.
    stages: HashMap<String, StageSpec>,
    /// Insertion order for stages.
    stage_order: Vec<String>,
    edges: Vec<Edge>,
    external_inputs: Vec<ExternalBinding>,
    terminal_outputs: Vec<TerminalOutput>,
}

impl StageGraphBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: HashMap::new(),
            stage_order: Vec::new(),
            edges: Vec::new(),
            external_inputs: Vec::new(),
            terminal_outputs: Vec::new(),
        }
    }

    /// Registers a stage.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateStage` if the name is taken, `InvalidStageName` if the
    /// name is malformed.
    pub fn define_stage(&mut self, spec: StageSpec) -> Result<&mut Self, GraphError> {
        spec.validate()?;
        if self.stages.contains_key(&spec.name) {
            return Err(DuplicateStageError {
                stage: spec.name.clone(),
            }
            .into());
        }

        debug!(graph = %self.name, stage = %spec.name, "Defined stage");
        self.stage_order.push(spec.name.clone());
        self.stages.insert(spec.name.clone(), spec);
        Ok(self)
    }

    /// Registers a stage from its parts.
    ///
    /// # Errors
    ///
    /// See [`define_stage`](Self::define_stage).
    pub fn define<I, O>(
        &mut self,
        name: &str,
        command: impl Into<CommandRef>,
        inputs: I,
        outputs: O,
        cacheable: bool,
    ) -> Result<&mut Self, GraphError>
    where
        I: IntoIterator<Item = (&'static str, SemanticType)>,
        O: IntoIterator<Item = (&'static str, SemanticType)>,
    {
        let spec = inputs
            .into_iter()
            .fold(StageSpec::new(name, command), |spec, (port, ty)| spec.with_input(port, ty));
        let spec = outputs
            .into_iter()
            .fold(spec, |spec, (port, ty)| spec.with_output(port, ty))
            .cacheable(cacheable);
        self.define_stage(spec)
    }

    /// Binds a producer output to a consumer input.
    ///
    /// Both ports are resolved before their types are compared, so a mismatch
    /// is reported the same way whichever side is inspected first.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStage`, `UnknownPort` or `TypeMismatch`.
    pub fn connect(
        &mut self,
        producer: &str,
        output: &str,
        consumer: &str,
        input: &str,
    ) -> Result<&mut Self, GraphError> {
        let produced = self.port_type(producer, output, PortDirection::Output)?;
        let expected = self.port_type(consumer, input, PortDirection::Input)?;

        let producer = PortRef::new(producer, output);
        let consumer = PortRef::new(consumer, input);
        if produced != expected {
            return Err(TypeMismatchError {
                producer,
                consumer,
                produced,
                expected,
            }
            .into());
        }

        debug!(graph = %self.name, %producer, %consumer, "Connected ports");
        self.edges.push(Edge {
            producer,
            consumer,
            semantic_type: produced,
        });
        Ok(self)
    }

    /// Declares that a consumer input is supplied by the caller at run time.
    ///
    /// One graph input may feed several consumers as long as they agree on
    /// its type.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStage`, `UnknownPort` or `TypeMismatch`.
    pub fn bind_external(
        &mut self,
        graph_input: &str,
        consumer: &str,
        input: &str,
    ) -> Result<&mut Self, GraphError> {
        let expected = self.port_type(consumer, input, PortDirection::Input)?;
        let consumer = PortRef::new(consumer, input);

        if let Some(existing) = self
            .external_inputs
            .iter()
            .find(|b| b.name == graph_input && b.semantic_type != expected)
        {
            return Err(TypeMismatchError {
                producer: existing.source(),
                consumer,
                produced: existing.semantic_type,
                expected,
            }
            .into());
        }

        self.external_inputs.push(ExternalBinding {
            name: graph_input.to_string(),
            consumer,
            semantic_type: expected,
        });
        Ok(self)
    }

    /// Exposes a producer output as a named graph output.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStage`, `UnknownPort` or `DuplicateOutput`.
    pub fn expose_output(
        &mut self,
        graph_output: &str,
        producer: &str,
        output: &str,
    ) -> Result<&mut Self, GraphError> {
        let semantic_type = self.port_type(producer, output, PortDirection::Output)?;
        if self.terminal_outputs.iter().any(|t| t.name == graph_output) {
            return Err(GraphError::DuplicateOutput(graph_output.to_string()));
        }

        self.terminal_outputs.push(TerminalOutput {
            name: graph_output.to_string(),
            producer: PortRef::new(producer, output),
            semantic_type,
        });
        Ok(self)
    }

    /// Validates the whole graph and produces an execution plan.
    ///
    /// # Errors
    ///
    /// Returns `EmptyGraph`, `CycleDetected`, `UnboundInput` or
    /// `AmbiguousBinding`. No partial plan is produced.
    pub fn finalize(self) -> Result<ExecutionPlan, GraphError> {
        if self.stages.is_empty() {
            return Err(GraphError::EmptyGraph(self.name));
        }

        self.detect_cycles()?;
        self.check_bindings()?;

        let dead_outputs = self.dead_outputs();
        for port in &dead_outputs {
            warn!(graph = %self.name, %port, "Output is neither consumed nor exposed");
        }

        let levels = self.levels();
        let mut stages = self.stages;
        let ordered: Vec<StageSpec> = levels
            .iter()
            .flatten()
            .filter_map(|name| stages.remove(name))
            .collect();

        debug!(graph = %self.name, stages = ordered.len(), levels = levels.len(), "Finalized graph");
        Ok(ExecutionPlan::new(
            self.name,
            ordered,
            self.edges,
            self.external_inputs,
            self.terminal_outputs,
            levels,
            dead_outputs,
        ))
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    fn port_type(
        &self,
        stage: &str,
        port: &str,
        direction: PortDirection,
    ) -> Result<SemanticType, GraphError> {
        let spec = self.stages.get(stage).ok_or_else(|| UnknownStageError {
            stage: stage.to_string(),
        })?;
        let declared = match direction {
            PortDirection::Input => spec.contract.input_type(port),
            PortDirection::Output => spec.contract.output_type(port),
        };
        declared.ok_or_else(|| {
            UnknownPortError {
                port: PortRef::new(stage, port),
                direction,
            }
            .into()
        })
    }

    fn dependencies(&self, stage: &str) -> BTreeSet<&str> {
        self.edges
            .iter()
            .filter(|e| e.consumer.stage == stage)
            .map(|e| e.producer.stage.as_str())
            .collect()
    }

    /// Detects cycles in the dependency graph.
    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for name in &self.stage_order {
            if !visited.contains(name.as_str()) {
                if let Some(cycle) = self.dfs_cycle(name, &mut visited, &mut rec_stack, &mut path) {
                    return Err(CycleDetectedError::new(cycle));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        for dep in self.dependencies(node) {
            if !visited.contains(dep) {
                if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(dep) {
                // Found a cycle
                let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| (*s).to_string()).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }

    fn check_bindings(&self) -> Result<(), GraphError> {
        for name in &self.stage_order {
            let Some(spec) = self.stages.get(name) else {
                continue;
            };
            for (port, ty) in spec.inputs() {
                let consumer = PortRef::new(name, port);
                let sources: Vec<String> = self
                    .edges
                    .iter()
                    .filter(|e| e.consumer == consumer)
                    .map(|e| e.producer.to_string())
                    .chain(
                        self.external_inputs
                            .iter()
                            .filter(|b| b.consumer == consumer)
                            .map(|b| b.source().to_string()),
                    )
                    .collect();

                match sources.len() {
                    0 => {
                        return Err(UnboundInputError {
                            port: consumer,
                            expected: *ty,
                        }
                        .into())
                    }
                    1 => {}
                    _ => {
                        return Err(AmbiguousBindingError {
                            port: consumer,
                            sources,
                        }
                        .into())
                    }
                }
            }
        }
        Ok(())
    }

    fn dead_outputs(&self) -> Vec<PortRef> {
        let mut dead = Vec::new();
        for name in &self.stage_order {
            let Some(spec) = self.stages.get(name) else {
                continue;
            };
            for port in spec.outputs().keys() {
                let producer = PortRef::new(name, port);
                let used = self.edges.iter().any(|e| e.producer == producer)
                    || self.terminal_outputs.iter().any(|t| t.producer == producer);
                if !used {
                    dead.push(producer);
                }
            }
        }
        dead
    }

    /// Groups stages by longest dependency depth, keeping insertion order
    /// within a level. Requires an acyclic graph.
    fn levels(&self) -> Vec<Vec<String>> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut remaining: Vec<&str> = self.stage_order.iter().map(String::as_str).collect();

        while !remaining.is_empty() {
            let before = remaining.len();
            remaining.retain(|name| {
                let deps = self.dependencies(name);
                if deps.iter().all(|d| depth.contains_key(d)) {
                    let level = deps.iter().map(|d| depth[d] + 1).max().unwrap_or(0);
                    depth.insert(*name, level);
                    false
                } else {
                    true
                }
            });
            if remaining.len() == before {
                break;
            }
        }

        let mut levels: Vec<Vec<String>> = Vec::new();
        for name in &self.stage_order {
            let Some(&level) = depth.get(name.as_str()) else {
                continue;
            };
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(name.clone());
        }
        levels
    }
}
