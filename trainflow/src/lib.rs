//! # Trainflow
//!
//! Typed stage graphs for model training and comparison pipelines.
//!
//! Trainflow describes the shape of a multi-step training pipeline and
//! leaves execution to a runner:
//!
//! - **Stage graphs**: stages with typed input/output ports, connected
//!   port-to-port and validated once into an immutable [`pipeline::ExecutionPlan`]
//! - **Stage contracts**: binding validation and content-based cache keys
//! - **Comparison**: reduction of N trainer results to one ranked report
//! - **Local runner**: in-process execution with parallel dispatch, caching
//!   and no partial success
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trainflow::prelude::*;
//!
//! let config = PipelineConfig::default();
//! let plan = build_training_plan(&config)?;
//!
//! let runner = LocalRunner::new()
//!     .register(config.provider_command(), Arc::new(MyProvider))
//!     .register(trainer_command(&config, "ada").unwrap(), Arc::new(MyTrainer))
//!     .register(config.script_command(&config.compare_script), Arc::new(comparator_stage(&config)));
//!
//! let report = runner.run(&plan, BTreeMap::new()).await?;
//! report.ensure_success()?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod compare;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod utils;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::compare::{
        compare, Comparator, ComparatorStage, ConsolidatedReport, TrainerResult,
    };
    pub use crate::config::{PipelineConfig, TrainerConfig};
    pub use crate::core::{ArtifactValue, PortRef, SemanticType, StageOutput, StageStatus};
    pub use crate::errors::{
        CompareError, ConfigError, ContractErrorInfo, GraphError, SchemaViolationError,
        TrainflowError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        CacheStore, CommandRef, ExecutionPlan, InMemoryCacheStore, JobRunner, LocalRunner,
        RunReport, StageGraphBuilder, StageSpec,
    };
    pub use crate::stages::{FnStage, Stage, StageContract, StageInputs};
    pub use crate::workflow::{build_training_plan, comparator_stage, trainer_command};
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn test_prelude_builds_default_plan() {
        let plan = build_training_plan(&PipelineConfig::default()).unwrap();
        assert_eq!(plan.stage_count(), 5);
    }
}
