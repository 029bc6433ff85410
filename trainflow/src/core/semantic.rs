//! Semantic port types.
//!
//! Every stage port declares the kind of value it carries. Wiring is checked
//! against these types when the graph is built, so a bare string can never
//! stand in for a file handle or a structured record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The semantic type of a value carried by a stage port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    /// A bare string.
    Text,
    /// A single numeric value.
    Scalar,
    /// A path to a file or directory.
    FilePath,
    /// A handle to a materialized file, optionally pinned by content digest.
    FileHandle,
    /// A structured key/value record.
    StructuredRecord,
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "str"),
            Self::Scalar => write!(f, "scalar"),
            Self::FilePath => write!(f, "FilePath"),
            Self::FileHandle => write!(f, "FileHandle"),
            Self::StructuredRecord => write!(f, "StructuredRecord"),
        }
    }
}

/// Direction of a port on a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    /// A consumed port.
    Input,
    /// A produced port.
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// A reference to a named port on a named stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRef {
    /// Stage name.
    pub stage: String,
    /// Port name.
    pub port: String,
}

impl PortRef {
    /// Creates a new port reference.
    #[must_use]
    pub fn new(stage: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stage, self.port)
    }
}
