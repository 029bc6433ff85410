//! Stage output type with factory methods.

use super::{ArtifactValue, StageStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The output of a single stage execution.
///
/// Successful outputs carry one artifact per declared output port. Failed and
/// cancelled outputs carry no artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// The status of the stage execution.
    pub status: StageStatus,

    /// Artifacts keyed by output port name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, ArtifactValue>,

    /// Additional metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Error message (for failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Cancel reason (for cancelled executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl Default for StageOutput {
    fn default() -> Self {
        Self::ok_empty()
    }
}

impl StageOutput {
    fn with_status(status: StageStatus) -> Self {
        Self {
            status,
            outputs: BTreeMap::new(),
            metadata: HashMap::new(),
            error: None,
            cancel_reason: None,
        }
    }

    /// Creates a successful output with artifacts.
    #[must_use]
    pub fn ok(outputs: BTreeMap<String, ArtifactValue>) -> Self {
        Self {
            outputs,
            ..Self::with_status(StageStatus::Ok)
        }
    }

    /// Creates a successful output with no artifacts.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::with_status(StageStatus::Ok)
    }

    /// Creates a successful output with a single artifact.
    #[must_use]
    pub fn ok_value(port: impl Into<String>, value: ArtifactValue) -> Self {
        Self::ok_empty().with_output(port, value)
    }

    /// Creates a failure output with an error message.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_status(StageStatus::Fail)
        }
    }

    /// Creates a cancel output with a reason.
    #[must_use]
    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            cancel_reason: Some(reason.into()),
            ..Self::with_status(StageStatus::Cancel)
        }
    }

    /// Adds an artifact on an output port.
    #[must_use]
    pub fn with_output(mut self, port: impl Into<String>, value: ArtifactValue) -> Self {
        self.outputs.insert(port.into(), value);
        self
    }

    /// Adds a single metadata entry.
    #[must_use]
    pub fn add_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if the stage completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the artifact on a given output port.
    #[must_use]
    pub fn get(&self, port: &str) -> Option<&ArtifactValue> {
        self.outputs.get(port)
    }

    /// Returns a human-readable reason for a non-successful output.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.error.as_deref().or(self.cancel_reason.as_deref())
    }
}
