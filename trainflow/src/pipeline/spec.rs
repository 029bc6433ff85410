//! Stage specifications.

use crate::core::SemanticType;
use crate::errors::InvalidStageNameError;
use crate::stages::{PortSchema, StageContract};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static STAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("stage name pattern is valid")
});

/// Opaque reference to the operation a stage runs.
///
/// The graph never interprets it; runners use it to locate the work to do,
/// e.g. a command line or a registered handler name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandRef(String);

impl CommandRef {
    /// Creates a new command reference.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self(command.into())
    }

    /// Returns the command as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommandRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CommandRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Specification for a single stage in a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// What the runner invokes.
    pub command: CommandRef,
    /// Declared input and output ports.
    pub contract: StageContract,
    /// Whether identical resolved inputs may reuse a previous output.
    #[serde(default)]
    pub cacheable: bool,
}

impl StageSpec {
    /// Creates a new stage specification without ports.
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<CommandRef>) -> Self {
        let name = name.into();
        Self {
            contract: StageContract::new(name.clone()),
            name,
            command: command.into(),
            cacheable: false,
        }
    }

    /// Declares an input port.
    #[must_use]
    pub fn with_input(mut self, port: impl Into<String>, ty: SemanticType) -> Self {
        self.contract = self.contract.with_input(port, ty);
        self
    }

    /// Declares an output port.
    #[must_use]
    pub fn with_output(mut self, port: impl Into<String>, ty: SemanticType) -> Self {
        self.contract = self.contract.with_output(port, ty);
        self
    }

    /// Sets whether the stage may be served from cache.
    #[must_use]
    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Returns the declared inputs.
    #[must_use]
    pub fn inputs(&self) -> &PortSchema {
        self.contract.inputs()
    }

    /// Returns the declared outputs.
    #[must_use]
    pub fn outputs(&self) -> &PortSchema {
        self.contract.outputs()
    }

    /// Validates the stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or contains characters outside
    /// letters, digits, `_` and `-`.
    pub fn validate(&self) -> Result<(), InvalidStageNameError> {
        if self.name.trim().is_empty() {
            return Err(InvalidStageNameError {
                stage: self.name.clone(),
                reason: "name cannot be empty or whitespace-only".to_string(),
            });
        }
        if !STAGE_NAME.is_match(&self.name) {
            return Err(InvalidStageNameError {
                stage: self.name.clone(),
                reason: "only letters, digits, '_' and '-' are allowed".to_string(),
            });
        }
        Ok(())
    }
}
