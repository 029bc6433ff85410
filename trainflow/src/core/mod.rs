//! Core domain model types for trainflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Semantic port types and port references
//! - Artifact values that cross stage boundaries
//! - Stage status and stage output

mod artifact;
mod output;
mod semantic;
mod status;

pub use artifact::ArtifactValue;
pub use output::StageOutput;
pub use semantic::{PortDirection, PortRef, SemanticType};
pub use status::StageStatus;
