//! Artifact values passed between stages.

use super::SemanticType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A typed value produced on a stage output port and consumed on an input port.
///
/// Every artifact has a stable content hash so that identical inputs always
/// lead to the same cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArtifactValue {
    /// A bare string.
    Text(String),
    /// A single numeric value.
    Scalar(f64),
    /// A path to a file or directory.
    FilePath(PathBuf),
    /// A materialized file, optionally pinned by the SHA-256 of its contents.
    FileHandle {
        /// Location of the file.
        path: PathBuf,
        /// Hex-encoded SHA-256 of the file contents.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        digest: Option<String>,
    },
    /// A structured key/value record.
    StructuredRecord(serde_json::Map<String, serde_json::Value>),
}

impl ArtifactValue {
    /// Creates a file path artifact.
    #[must_use]
    pub fn file_path(path: impl Into<PathBuf>) -> Self {
        Self::FilePath(path.into())
    }

    /// Creates a file handle artifact without a content digest.
    #[must_use]
    pub fn file_handle(path: impl Into<PathBuf>) -> Self {
        Self::FileHandle {
            path: path.into(),
            digest: None,
        }
    }

    /// Creates a file handle pinned to the current contents of the file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read.
    pub fn pinned_file_handle(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Ok(Self::FileHandle {
            path: path.to_path_buf(),
            digest: Some(hex::encode(Sha256::digest(&bytes))),
        })
    }

    /// Creates a structured record from a JSON value.
    ///
    /// Returns `None` if the value is not a JSON object.
    #[must_use]
    pub fn record(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Object(map) => Some(Self::StructuredRecord(map)),
            _ => None,
        }
    }

    /// Returns the semantic type of this artifact.
    #[must_use]
    pub fn semantic_type(&self) -> SemanticType {
        match self {
            Self::Text(_) => SemanticType::Text,
            Self::Scalar(_) => SemanticType::Scalar,
            Self::FilePath(_) => SemanticType::FilePath,
            Self::FileHandle { .. } => SemanticType::FileHandle,
            Self::StructuredRecord(_) => SemanticType::StructuredRecord,
        }
    }

    /// Returns the string if this is a text artifact.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the scalar if this is a scalar artifact.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the path of a file path or file handle artifact.
    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::FilePath(path) | Self::FileHandle { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Returns the record if this is a structured record artifact.
    #[must_use]
    pub fn as_record(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            Self::StructuredRecord(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the hex-encoded SHA-256 of the artifact's canonical JSON form.
    ///
    /// Record keys are ordered, so two records with the same entries hash
    /// identically regardless of construction order. JSON has no encoding for
    /// non-finite numbers, so those scalars are hashed by their bit pattern.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let bytes = match self {
            Self::Scalar(v) if !v.is_finite() => {
                format!("scalar:bits:{:016x}", v.to_bits()).into_bytes()
            }
            _ => serde_json::to_vec(self).unwrap_or_default(),
        };
        hex::encode(Sha256::digest(&bytes))
    }
}

impl From<String> for ArtifactValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ArtifactValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for ArtifactValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<PathBuf> for ArtifactValue {
    fn from(value: PathBuf) -> Self {
        Self::FilePath(value)
    }
}
