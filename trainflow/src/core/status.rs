//! Stage status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not been dispatched yet.
    #[default]
    Pending,
    /// Stage is currently running.
    Running,
    /// Stage completed successfully.
    Ok,
    /// Stage outputs were reused from a previous run with identical inputs.
    Cached,
    /// Stage failed.
    Fail,
    /// Stage was cancelled and produced no outputs.
    Cancel,
    /// Stage never ran because an upstream stage did not succeed.
    Blocked,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Ok => write!(f, "ok"),
            Self::Cached => write!(f, "cached"),
            Self::Fail => write!(f, "fail"),
            Self::Cancel => write!(f, "cancel"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Returns true if the stage produced its outputs.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Cached)
    }

    /// Returns true if the status makes the whole run fail.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail | Self::Cancel | Self::Blocked)
    }
}
