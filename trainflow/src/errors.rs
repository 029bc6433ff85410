//! Error types for trainflow.
//!
//! Graph construction errors are fatal for the definition being built and are
//! never retried. Comparison errors fail the comparison stage and therefore the
//! run; they never degrade into a partial report.

use crate::core::{PortDirection, PortRef, SemanticType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The top-level error type for trainflow operations.
#[derive(Debug, Error)]
pub enum TrainflowError {
    /// The stage graph definition is invalid.
    #[error("{0}")]
    Graph(#[from] GraphError),

    /// Result comparison failed.
    #[error("{0}")]
    Compare(#[from] CompareError),

    /// A binding set did not satisfy a stage contract.
    #[error("{0}")]
    Schema(#[from] SchemaViolationError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A stage execution error.
    #[error("Stage execution error: {0}")]
    StageExecution(String),

    /// A run was cancelled.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-006-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a stage name is registered twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stage '{stage}' is already defined")]
pub struct DuplicateStageError {
    /// The duplicated stage name.
    pub stage: String,
}

/// Error raised when a referenced stage does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown stage '{stage}'")]
pub struct UnknownStageError {
    /// The unknown stage name.
    pub stage: String,
}

/// Error raised when a port is not declared on its stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stage '{}' declares no {direction} port '{}'", .port.stage, .port.port)]
pub struct UnknownPortError {
    /// The missing port.
    pub port: PortRef,
    /// Whether an input or an output was expected.
    pub direction: PortDirection,
}

/// Error raised when a producer and consumer disagree on a port type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Type mismatch: {producer} produces {produced} but {consumer} expects {expected}"
)]
pub struct TypeMismatchError {
    /// The producing port.
    pub producer: PortRef,
    /// The consuming port.
    pub consumer: PortRef,
    /// Type declared on the producer output.
    pub produced: SemanticType,
    /// Type declared on the consumer input.
    pub expected: SemanticType,
}

/// Error raised when a cycle is detected in the stage graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cycle detected in stage graph: {}", .cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle, first stage repeated at the end.
    pub cycle_path: Vec<String>,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        Self { cycle_path }
    }
}

/// Error raised when a declared input has no binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Input {port} ({expected}) is not bound by any edge or graph input")]
pub struct UnboundInputError {
    /// The unbound input port.
    pub port: PortRef,
    /// Declared type of the input.
    pub expected: SemanticType,
}

/// Error raised when a declared input has more than one binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Input {port} is bound more than once: {}", .sources.join(", "))]
pub struct AmbiguousBindingError {
    /// The over-bound input port.
    pub port: PortRef,
    /// Descriptions of every binding source.
    pub sources: Vec<String>,
}

/// Error raised when a stage name is not usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid stage name '{stage}': {reason}")]
pub struct InvalidStageNameError {
    /// The rejected name.
    pub stage: String,
    /// Why it was rejected.
    pub reason: String,
}

/// Errors raised while defining or finalizing a stage graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A stage name was registered twice.
    #[error("{0}")]
    DuplicateStage(#[from] DuplicateStageError),

    /// A stage name is malformed.
    #[error("{0}")]
    InvalidStageName(#[from] InvalidStageNameError),

    /// A referenced stage does not exist.
    #[error("{0}")]
    UnknownStage(#[from] UnknownStageError),

    /// A referenced port does not exist.
    #[error("{0}")]
    UnknownPort(#[from] UnknownPortError),

    /// Port types disagree.
    #[error("{0}")]
    TypeMismatch(#[from] TypeMismatchError),

    /// The graph is not acyclic.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// An input has no binding.
    #[error("{0}")]
    UnboundInput(#[from] UnboundInputError),

    /// An input has several bindings.
    #[error("{0}")]
    AmbiguousBinding(#[from] AmbiguousBindingError),

    /// The graph has no stages.
    #[error("Stage graph '{0}' has no stages")]
    EmptyGraph(String),

    /// A graph output name is exposed twice.
    #[error("Graph output '{0}' is already exposed")]
    DuplicateOutput(String),
}

impl GraphError {
    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateStage(_) => "GRAPH-001-DUPLICATE",
            Self::InvalidStageName(_) => "GRAPH-002-INVALID_NAME",
            Self::UnknownStage(_) => "GRAPH-003-UNKNOWN_STAGE",
            Self::UnknownPort(_) => "GRAPH-004-UNKNOWN_PORT",
            Self::TypeMismatch(_) => "GRAPH-005-TYPE_MISMATCH",
            Self::CycleDetected(_) => "GRAPH-006-CYCLE",
            Self::UnboundInput(_) => "GRAPH-007-UNBOUND",
            Self::AmbiguousBinding(_) => "GRAPH-008-AMBIGUOUS",
            Self::EmptyGraph(_) => "GRAPH-009-EMPTY",
            Self::DuplicateOutput(_) => "GRAPH-010-DUPLICATE_OUTPUT",
        }
    }

    /// Returns diagnostics for the error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        let hint = match self {
            Self::DuplicateStage(_) => "Give every stage a unique name.",
            Self::InvalidStageName(_) => {
                "Stage names start with a letter or digit and contain only letters, digits, '_' or '-'."
            }
            Self::UnknownStage(_) => "Define the stage before connecting it.",
            Self::UnknownPort(_) => "Check the port name against the stage's declared inputs and outputs.",
            Self::TypeMismatch(_) => {
                "Declare the same semantic type on both ports, or insert a stage that converts between them."
            }
            Self::CycleDetected(_) => "Remove one of the edges in the cycle to break it.",
            Self::UnboundInput(_) => "Connect the input to a producer output or bind it as a graph input.",
            Self::AmbiguousBinding(_) => "Keep exactly one edge or graph input per consumer input.",
            Self::EmptyGraph(_) => "Define at least one stage before finalizing.",
            Self::DuplicateOutput(_) => "Expose each graph output under its own name.",
        };
        let info = ContractErrorInfo::new(self.code(), self.to_string()).with_fix_hint(hint);
        match self {
            Self::UnknownPort(e) => info.with_context_entry("port", e.port.to_string()),
            Self::TypeMismatch(e) => info
                .with_context_entry("producer", e.producer.to_string())
                .with_context_entry("consumer", e.consumer.to_string()),
            Self::UnboundInput(e) => info.with_context_entry("port", e.port.to_string()),
            Self::AmbiguousBinding(e) => info.with_context_entry("port", e.port.to_string()),
            _ => info,
        }
    }
}

/// Error raised when a binding set does not satisfy a stage contract.
///
/// `expected` is `None` for an undeclared port; `actual` is `None` for a
/// declared port that has no binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolationError {
    /// Stage whose contract was violated.
    pub stage: String,
    /// Offending port.
    pub port: String,
    /// Declared type, if the port is declared.
    pub expected: Option<SemanticType>,
    /// Supplied type, if a value was supplied.
    pub actual: Option<SemanticType>,
}

impl fmt::Display for SchemaViolationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schema violation on {}.{}: ", self.stage, self.port)?;
        match (self.expected, self.actual) {
            (Some(expected), Some(actual)) => write!(f, "expected {expected}, got {actual}"),
            (Some(expected), None) => write!(f, "expected {expected}, got nothing"),
            (None, Some(actual)) => write!(f, "port is not declared (got {actual})"),
            (None, None) => write!(f, "port is not declared"),
        }
    }
}

impl std::error::Error for SchemaViolationError {}

/// Why a trainer result could not provide the comparison metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingMetricReason {
    /// The metric key is absent.
    Absent,
    /// The value under the key is not a number.
    NotNumeric,
    /// The value is NaN or infinite.
    NotFinite,
}

impl fmt::Display for MissingMetricReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::NotNumeric => write!(f, "not numeric"),
            Self::NotFinite => write!(f, "not finite"),
        }
    }
}

/// Error raised when comparing an empty result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot compare an empty result set")]
pub struct EmptyResultSetError;

/// Error raised when a trainer result lacks a usable comparison metric.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Trainer '{trainer}' has no usable metric '{metric}' ({reason})")]
pub struct MissingMetricError {
    /// The trainer whose result is malformed.
    pub trainer: String,
    /// The comparison metric key.
    pub metric: String,
    /// What was wrong with the metric.
    pub reason: MissingMetricReason,
}

/// Errors raised while consolidating trainer results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompareError {
    /// No results were supplied.
    #[error("{0}")]
    EmptyResultSet(#[from] EmptyResultSetError),

    /// A result lacks the comparison metric.
    #[error("{0}")]
    MissingMetric(#[from] MissingMetricError),

    /// A result arrived with the wrong semantic type.
    #[error("{0}")]
    SchemaViolation(#[from] SchemaViolationError),

    /// Two results share a trainer name.
    #[error("Trainer '{0}' reported more than one result")]
    DuplicateTrainer(String),

    /// A trainer name collides with a report field.
    #[error("Trainer name '{0}' is reserved by the consolidated report")]
    ReservedTrainerName(String),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        /// Path of the file.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The configuration text is not valid JSON for the schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration parsed but is not usable.
    #[error("Invalid config: {0}")]
    Invalid(String),
}
