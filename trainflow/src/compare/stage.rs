//! The comparator as a pipeline stage.

use super::{Comparator, ConsolidatedReport, TrainerResult};
use crate::core::{ArtifactValue, StageOutput};
use crate::errors::{CompareError, SchemaViolationError};
use crate::stages::{Stage, StageInputs};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Stage consolidating trainer result records.
///
/// Each input port carries one trainer's `StructuredRecord`; the report is
/// emitted as a `StructuredRecord` on [`ComparatorStage::OUTPUT_PORT`].
#[derive(Debug, Clone, Default)]
pub struct ComparatorStage {
    comparator: Comparator,
    /// Input port to trainer name.
    ports: BTreeMap<String, String>,
}

impl ComparatorStage {
    /// Output port carrying the consolidated report.
    pub const OUTPUT_PORT: &'static str = "consolidated";

    /// Creates a stage with no trainers.
    #[must_use]
    pub fn new(comparator: Comparator) -> Self {
        Self {
            comparator,
            ports: BTreeMap::new(),
        }
    }

    /// Creates a stage reading `<trainer>_results` for each trainer.
    #[must_use]
    pub fn for_trainers<I, S>(comparator: Comparator, trainers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        trainers
            .into_iter()
            .fold(Self::new(comparator), |stage, trainer| {
                let trainer = trainer.as_ref();
                stage.with_trainer(Self::input_port(trainer), trainer)
            })
    }

    /// Maps an input port to a trainer name.
    #[must_use]
    pub fn with_trainer(mut self, port: impl Into<String>, trainer: impl Into<String>) -> Self {
        self.ports.insert(port.into(), trainer.into());
        self
    }

    /// Returns the conventional input port for a trainer.
    #[must_use]
    pub fn input_port(trainer: &str) -> String {
        format!("{trainer}_results")
    }

    /// Consolidates the records bound to the mapped ports.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolation` if a port holds no record or an input is
    /// bound to a port no trainer is mapped to, otherwise any error of
    /// [`Comparator::compare`].
    pub fn consolidate(&self, inputs: &StageInputs) -> Result<ConsolidatedReport, CompareError> {
        let unmapped = inputs
            .iter()
            .find(|(port, _)| !self.ports.contains_key(*port));
        if let Some((port, value)) = unmapped {
            return Err(SchemaViolationError {
                stage: inputs.stage_name().to_string(),
                port: port.clone(),
                expected: None,
                actual: Some(value.semantic_type()),
            }
            .into());
        }

        let mut results = Vec::with_capacity(self.ports.len());
        for (port, trainer) in &self.ports {
            let record = inputs.record(port)?;
            results.push((trainer.clone(), TrainerResult::from_record(record)));
        }
        self.comparator.compare(results)
    }
}

#[async_trait]
impl Stage for ComparatorStage {
    fn name(&self) -> &str {
        "comparator"
    }

    async fn execute(&self, inputs: &StageInputs) -> StageOutput {
        match self.consolidate(inputs) {
            Ok(report) => {
                info!(
                    stage = %inputs.stage_name(),
                    best_model = %report.best_model(),
                    trainers = report.len(),
                    "Consolidated trainer results"
                );
                StageOutput::ok_value(
                    Self::OUTPUT_PORT,
                    ArtifactValue::StructuredRecord(report.to_record()),
                )
            }
            Err(e) => {
                warn!(stage = %inputs.stage_name(), error = %e, "Comparison failed");
                StageOutput::fail(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;
    use serde_json::json;

    fn inputs(entries: &[(&str, ArtifactValue)]) -> StageInputs {
        StageInputs::new(
            "compare-results",
            entries
                .iter()
                .map(|(port, value)| ((*port).to_string(), value.clone()))
                .collect(),
        )
    }

    fn record(value: serde_json::Value) -> ArtifactValue {
        ArtifactValue::record(value).unwrap()
    }

    #[tokio::test]
    async fn test_emits_consolidated_record() {
        let stage = ComparatorStage::for_trainers(Comparator::default(), ["ada", "gnb", "xgb"]);
        let output = stage
            .execute(&inputs(&[
                ("ada_results", record(json!({"f1": 0.82, "model": "AdaBoost"}))),
                ("gnb_results", record(json!({"f1": 0.77}))),
                ("xgb_results", record(json!({"f1": 0.91}))),
            ]))
            .await;

        assert_eq!(output.status, StageStatus::Ok);
        let consolidated = output.get(ComparatorStage::OUTPUT_PORT).unwrap();
        let report = ConsolidatedReport::from_record(consolidated.as_record().unwrap()).unwrap();
        assert_eq!(report.ranking(), &["xgb", "ada", "gnb"]);
        assert_eq!(report.best_model(), "xgb");
    }

    #[tokio::test]
    async fn test_custom_port_mapping() {
        let stage = ComparatorStage::new(Comparator::default())
            .with_trainer("left", "ada")
            .with_trainer("right", "xgb");
        let report = stage
            .consolidate(&inputs(&[
                ("left", record(json!({"f1": 0.5}))),
                ("right", record(json!({"f1": 0.4}))),
            ]))
            .unwrap();
        assert_eq!(report.best_model(), "ada");
    }

    #[tokio::test]
    async fn test_wrong_artifact_type_is_schema_violation() {
        let stage = ComparatorStage::for_trainers(Comparator::default(), ["ada"]);
        let err = stage
            .consolidate(&inputs(&[("ada_results", ArtifactValue::from("results.yaml"))]))
            .unwrap_err();
        assert!(matches!(err, CompareError::SchemaViolation(_)));
    }

    #[tokio::test]
    async fn test_unmapped_result_fails_stage() {
        let stage = ComparatorStage::for_trainers(Comparator::default(), ["ada", "xgb"]);
        let output = stage
            .execute(&inputs(&[
                ("ada_results", record(json!({"f1": 0.82}))),
                ("gnb_results", record(json!({"f1": 0.99}))),
                ("xgb_results", record(json!({"f1": 0.91}))),
            ]))
            .await;

        assert_eq!(output.status, StageStatus::Fail);
        assert!(output.outputs.is_empty());
        assert!(output.error.unwrap().contains("gnb_results"));
    }

    #[tokio::test]
    async fn test_missing_metric_fails_stage() {
        let stage = ComparatorStage::for_trainers(Comparator::default(), ["ada", "gnb"]);
        let output = stage
            .execute(&inputs(&[
                ("ada_results", record(json!({"f1": 0.82}))),
                ("gnb_results", record(json!({"accuracy": 0.7}))),
            ]))
            .await;

        assert_eq!(output.status, StageStatus::Fail);
        assert!(output.outputs.is_empty());
        assert!(output.error.unwrap().contains("Trainer 'gnb'"));
    }
}
