//! Log output setup.
//!
//! Library code only emits `tracing` events; applications call
//! [`init_tracing`] once to install a formatter.

use crate::errors::TrainflowError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,trainflow=info";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Builds the filter from `RUST_LOG`, falling back to `default_filter`.
#[must_use]
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Installs a global `tracing` subscriber.
///
/// # Errors
///
/// Returns `Internal` if a global subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> Result<(), TrainflowError> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(DEFAULT_LOG_FILTER));
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| TrainflowError::Internal(format!("Failed to install subscriber: {e}")))
}
