//! Resolved stage inputs.

use crate::core::{ArtifactValue, SemanticType};
use crate::errors::SchemaViolationError;
use std::collections::BTreeMap;
use std::path::Path;

/// An immutable view of the artifacts bound to a stage's input ports.
///
/// Stages only see what their declared inputs resolve to; there is no access
/// to other stages' state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageInputs {
    stage_name: String,
    values: BTreeMap<String, ArtifactValue>,
}

impl StageInputs {
    /// Creates new stage inputs.
    #[must_use]
    pub fn new(stage_name: impl Into<String>, values: BTreeMap<String, ArtifactValue>) -> Self {
        Self {
            stage_name: stage_name.into(),
            values,
        }
    }

    /// Creates inputs for a stage without input ports.
    #[must_use]
    pub fn empty(stage_name: impl Into<String>) -> Self {
        Self::new(stage_name, BTreeMap::new())
    }

    /// Returns the name of the stage these inputs belong to.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the artifact bound to a port.
    #[must_use]
    pub fn get(&self, port: &str) -> Option<&ArtifactValue> {
        self.values.get(port)
    }

    /// Returns the artifact bound to a port, checking its type.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolationError` if the port is unbound or holds a value
    /// of another type.
    pub fn require(
        &self,
        port: &str,
        expected: SemanticType,
    ) -> Result<&ArtifactValue, SchemaViolationError> {
        match self.values.get(port) {
            Some(value) if value.semantic_type() == expected => Ok(value),
            other => Err(SchemaViolationError {
                stage: self.stage_name.clone(),
                port: port.to_string(),
                expected: Some(expected),
                actual: other.map(ArtifactValue::semantic_type),
            }),
        }
    }

    /// Returns the path bound to a port, accepting file paths and file handles.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolationError` if the port holds no path.
    pub fn path(&self, port: &str) -> Result<&Path, SchemaViolationError> {
        let value = self.values.get(port);
        value.and_then(ArtifactValue::as_path).ok_or_else(|| SchemaViolationError {
            stage: self.stage_name.clone(),
            port: port.to_string(),
            expected: Some(SemanticType::FilePath),
            actual: value.map(ArtifactValue::semantic_type),
        })
    }

    /// Returns the structured record bound to a port.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolationError` if the port holds no record.
    pub fn record(
        &self,
        port: &str,
    ) -> Result<&serde_json::Map<String, serde_json::Value>, SchemaViolationError> {
        let value = self.require(port, SemanticType::StructuredRecord)?;
        value.as_record().ok_or_else(|| SchemaViolationError {
            stage: self.stage_name.clone(),
            port: port.to_string(),
            expected: Some(SemanticType::StructuredRecord),
            actual: Some(value.semantic_type()),
        })
    }

    /// Iterates over bound ports in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArtifactValue)> {
        self.values.iter()
    }

    /// Returns the number of bound ports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no port is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the underlying bindings.
    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, ArtifactValue> {
        &self.values
    }
}
