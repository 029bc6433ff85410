//! Stage trait, contracts and implementations.
//!
//! Stages are the units of work an in-process runner invokes. The graph
//! itself only knows a stage's [`crate::pipeline::CommandRef`]; runners map
//! command references to [`Stage`] implementations.

mod contract;
mod inputs;

pub use contract::{CacheKey, PortSchema, StageContract};
pub use inputs::StageInputs;

use crate::core::StageOutput;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for executable stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage implementation.
    fn name(&self) -> &str;

    /// Executes the stage.
    ///
    /// # Arguments
    ///
    /// * `inputs` - Resolved artifacts for every declared input port
    ///
    /// # Returns
    ///
    /// The stage output indicating success, failure or cancellation.
    async fn execute(&self, inputs: &StageInputs) -> StageOutput;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageInputs) -> StageOutput + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageInputs) -> StageOutput + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageInputs) -> StageOutput + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageInputs) -> StageOutput + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, inputs: &StageInputs) -> StageOutput {
        (self.func)(inputs)
    }
}

/// A stage that succeeds without producing outputs.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _inputs: &StageInputs) -> StageOutput {
        StageOutput::ok_empty()
    }
}
