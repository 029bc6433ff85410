//! Stage graph building and execution.
//!
//! This module provides:
//! - Stage specifications with typed port contracts
//! - A graph builder with per-call and whole-graph validation
//! - Immutable execution plans
//! - The runner seam, an in-process runner and its output cache

mod builder;
mod cache;
mod integration_tests;
mod plan;
mod runner;
mod spec;

pub use builder::StageGraphBuilder;
pub use cache::{CacheStore, CachedOutputs, InMemoryCacheStore};
pub use plan::{Edge, ExecutionPlan, ExternalBinding, TerminalOutput, GRAPH_INPUT};
pub use runner::{JobRunner, LocalRunner, RunReport, StageRun};
pub use spec::{CommandRef, StageSpec};
