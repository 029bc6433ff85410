//! Per-stage input/output contracts.

use crate::core::{ArtifactValue, SemanticType};
use crate::errors::SchemaViolationError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Port name to semantic type.
pub type PortSchema = BTreeMap<String, SemanticType>;

/// Content-based identity of a stage invocation.
///
/// Two invocations of the same stage and command with artifacts of identical
/// content on every input port share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The declared input and output schema of a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageContract {
    stage: String,
    #[serde(default)]
    inputs: PortSchema,
    #[serde(default)]
    outputs: PortSchema,
}

impl StageContract {
    /// Creates an empty contract for a stage.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            inputs: PortSchema::new(),
            outputs: PortSchema::new(),
        }
    }

    /// Declares an input port.
    #[must_use]
    pub fn with_input(mut self, port: impl Into<String>, ty: SemanticType) -> Self {
        self.inputs.insert(port.into(), ty);
        self
    }

    /// Declares an output port.
    #[must_use]
    pub fn with_output(mut self, port: impl Into<String>, ty: SemanticType) -> Self {
        self.outputs.insert(port.into(), ty);
        self
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Returns the declared inputs.
    #[must_use]
    pub fn inputs(&self) -> &PortSchema {
        &self.inputs
    }

    /// Returns the declared outputs.
    #[must_use]
    pub fn outputs(&self) -> &PortSchema {
        &self.outputs
    }

    /// Returns the declared type of an input port.
    #[must_use]
    pub fn input_type(&self, port: &str) -> Option<SemanticType> {
        self.inputs.get(port).copied()
    }

    /// Returns the declared type of an output port.
    #[must_use]
    pub fn output_type(&self, port: &str) -> Option<SemanticType> {
        self.outputs.get(port).copied()
    }

    /// Validates a candidate binding set against the declared inputs.
    ///
    /// Every declared input must be bound to an artifact of its declared type,
    /// and no undeclared port may be bound.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolationError` naming the first offending port.
    pub fn validate(
        &self,
        bindings: &BTreeMap<String, ArtifactValue>,
    ) -> Result<(), SchemaViolationError> {
        check_ports(&self.stage, &self.inputs, bindings)
    }

    /// Validates produced artifacts against the declared outputs.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolationError` naming the first offending port.
    pub fn validate_outputs(
        &self,
        outputs: &BTreeMap<String, ArtifactValue>,
    ) -> Result<(), SchemaViolationError> {
        check_ports(&self.stage, &self.outputs, outputs)
    }

    /// Derives the cache key for invoking `command` with `bindings`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolationError` if the bindings do not satisfy the
    /// contract; an invalid binding set has no identity.
    pub fn cache_key(
        &self,
        command: &str,
        bindings: &BTreeMap<String, ArtifactValue>,
    ) -> Result<CacheKey, SchemaViolationError> {
        self.validate(bindings)?;

        let mut hasher = Sha256::new();
        hasher.update(self.stage.as_bytes());
        hasher.update([0]);
        hasher.update(command.as_bytes());
        for (port, value) in bindings {
            hasher.update([0]);
            hasher.update(port.as_bytes());
            hasher.update(b"=");
            hasher.update(value.content_hash().as_bytes());
        }
        let digest = hasher.finalize();
        Ok(CacheKey(format!("cache:{}", hex::encode(&digest[..16]))))
    }
}

fn check_ports(
    stage: &str,
    schema: &PortSchema,
    values: &BTreeMap<String, ArtifactValue>,
) -> Result<(), SchemaViolationError> {
    for (port, expected) in schema {
        let actual = values.get(port).map(ArtifactValue::semantic_type);
        if actual != Some(*expected) {
            return Err(SchemaViolationError {
                stage: stage.to_string(),
                port: port.clone(),
                expected: Some(*expected),
                actual,
            });
        }
    }

    if let Some((port, value)) = values.iter().find(|(port, _)| !schema.contains_key(*port)) {
        return Err(SchemaViolationError {
            stage: stage.to_string(),
            port: port.clone(),
            expected: None,
            actual: Some(value.semantic_type()),
        });
    }

    Ok(())
}
