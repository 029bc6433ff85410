//! The training-and-comparison workflow.
//!
//! A provisioning stage yields the dataset path, every configured trainer
//! consumes it independently, and a comparator consolidates their results:
//!
//! ```text
//! provide-transformed-file -> train-<name> (one per trainer) -> compare-results
//! ```

use crate::compare::{Comparator, ComparatorStage};
use crate::config::PipelineConfig;
use crate::core::SemanticType;
use crate::errors::TrainflowError;
use crate::pipeline::{CommandRef, ExecutionPlan, StageGraphBuilder, StageSpec};
use tracing::info;

/// Name of the dataset provisioning stage.
pub const PROVIDE_STAGE: &str = "provide-transformed-file";
/// Name of the comparison stage.
pub const COMPARE_STAGE: &str = "compare-results";
/// Port carrying the dataset path.
pub const DATASET_PORT: &str = "transformed_filename";
/// Port carrying a trainer's result record.
pub const RESULTS_PORT: &str = "results";
/// Graph output carrying the consolidated report.
pub const COMPARISON_OUTPUT: &str = "comparison";

/// Returns the stage name of a trainer.
#[must_use]
pub fn trainer_stage(trainer: &str) -> String {
    format!("train-{trainer}")
}

/// Returns the command that runs a trainer.
#[must_use]
pub fn trainer_command(config: &PipelineConfig, trainer: &str) -> Option<CommandRef> {
    config
        .trainers
        .iter()
        .find(|t| t.name == trainer)
        .map(|t| config.script_command(&t.script))
}

/// Builds the comparator stage matching the configured trainers and metric.
#[must_use]
pub fn comparator_stage(config: &PipelineConfig) -> ComparatorStage {
    ComparatorStage::for_trainers(
        Comparator::new(&config.metric),
        config.trainers.iter().map(|t| t.name.as_str()),
    )
}

/// Declares and finalizes the training-and-comparison graph.
///
/// # Errors
///
/// Returns `Config` if the configuration fails
/// [`PipelineConfig::validate`], otherwise `Graph` if the graph is rejected.
pub fn build_training_plan(config: &PipelineConfig) -> Result<ExecutionPlan, TrainflowError> {
    config.validate()?;
    let mut builder = StageGraphBuilder::new(&config.name);

    builder.define_stage(
        StageSpec::new(PROVIDE_STAGE, config.provider_command())
            .with_output(DATASET_PORT, SemanticType::FilePath)
            .cacheable(false),
    )?;

    let mut compare = StageSpec::new(COMPARE_STAGE, config.script_command(&config.compare_script))
        .with_output(ComparatorStage::OUTPUT_PORT, SemanticType::StructuredRecord)
        .cacheable(false);
    for trainer in &config.trainers {
        builder.define_stage(
            StageSpec::new(trainer_stage(&trainer.name), config.script_command(&trainer.script))
                .with_input(DATASET_PORT, SemanticType::FilePath)
                .with_output(RESULTS_PORT, SemanticType::StructuredRecord)
                .cacheable(true),
        )?;
        compare = compare.with_input(
            ComparatorStage::input_port(&trainer.name),
            SemanticType::StructuredRecord,
        );
    }
    builder.define_stage(compare)?;

    for trainer in &config.trainers {
        let stage = trainer_stage(&trainer.name);
        builder
            .connect(PROVIDE_STAGE, DATASET_PORT, &stage, DATASET_PORT)?
            .connect(
                &stage,
                RESULTS_PORT,
                COMPARE_STAGE,
                &ComparatorStage::input_port(&trainer.name),
            )?;
    }
    builder.expose_output(COMPARISON_OUTPUT, COMPARE_STAGE, ComparatorStage::OUTPUT_PORT)?;

    let plan = builder.finalize()?;
    info!(
        pipeline = %plan.name(),
        trainers = config.trainers.len(),
        metric = %config.metric,
        "Built training plan"
    );
    Ok(plan)
}
