//! Lifecycle events for observability.
//!
//! Sinks are passed explicitly to the runner that emits into them; there is no
//! process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by runners.
pub mod event_types {
    /// A run started.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// Every stage of a run succeeded.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A run ended without full success.
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    /// A stage was dispatched.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage executed and produced valid outputs.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage's outputs were served from the cache.
    pub const STAGE_CACHED: &str = "stage.cached";
    /// A stage failed.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A stage cancelled itself.
    pub const STAGE_CANCELLED: &str = "stage.cancelled";
    /// A stage never started because an upstream stage did not succeed.
    pub const STAGE_BLOCKED: &str = "stage.blocked";
}
