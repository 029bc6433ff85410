//! The consolidated comparison report.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Per-trainer metric snapshots plus the ranking derived from them.
///
/// Serializes flat, with one key per trainer next to `ranking` and
/// `best_model`:
///
/// ```json
/// {"ada": {"f1": 0.82}, "xgb": {"f1": 0.91}, "ranking": ["xgb", "ada"], "best_model": "xgb"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedReport {
    /// Metric snapshot of every trainer.
    #[serde(flatten)]
    trainers: BTreeMap<String, BTreeMap<String, f64>>,
    /// Trainer names, best first.
    ranking: Vec<String>,
    /// The first entry of the ranking.
    best_model: String,
}

impl ConsolidatedReport {
    pub(crate) fn new(
        trainers: BTreeMap<String, BTreeMap<String, f64>>,
        ranking: Vec<String>,
    ) -> Self {
        let best_model = ranking.first().cloned().unwrap_or_default();
        Self {
            trainers,
            ranking,
            best_model,
        }
    }

    /// Returns trainer names, best first.
    #[must_use]
    pub fn ranking(&self) -> &[String] {
        &self.ranking
    }

    /// Returns the best trainer.
    #[must_use]
    pub fn best_model(&self) -> &str {
        &self.best_model
    }

    /// Returns the metric snapshot of a trainer.
    #[must_use]
    pub fn trainer(&self, name: &str) -> Option<&BTreeMap<String, f64>> {
        self.trainers.get(name)
    }

    /// Returns one metric of one trainer.
    #[must_use]
    pub fn score(&self, trainer: &str, metric: &str) -> Option<f64> {
        self.trainers.get(trainer)?.get(metric).copied()
    }

    /// Returns the number of trainers compared.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trainers.len()
    }

    /// Returns true if no trainers were compared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trainers.is_empty()
    }

    /// Renders the report as a structured record.
    ///
    /// Non-finite metric values become `null`.
    #[must_use]
    pub fn to_record(&self) -> Map<String, Value> {
        let mut record: Map<String, Value> = self
            .trainers
            .iter()
            .map(|(name, metrics)| {
                let snapshot: Map<String, Value> = metrics
                    .iter()
                    .map(|(metric, value)| (metric.clone(), json!(value)))
                    .collect();
                (name.clone(), Value::Object(snapshot))
            })
            .collect();
        record.insert("ranking".to_string(), json!(self.ranking));
        record.insert("best_model".to_string(), json!(self.best_model));
        record
    }

    /// Parses a report from a structured record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not have the report shape.
    pub fn from_record(record: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{compare, TrainerResult};
    use pretty_assertions::assert_eq;

    fn report() -> ConsolidatedReport {
        compare([
            ("ada", TrainerResult::new().with_metric("f1", 0.82)),
            ("gnb", TrainerResult::new().with_metric("f1", 0.77)),
            ("xgb", TrainerResult::new().with_metric("f1", 0.91).with_metric("accuracy", 0.97)),
        ])
        .unwrap()
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(report()).unwrap();
        assert_eq!(
            value,
            json!({
                "ada": {"f1": 0.82},
                "gnb": {"f1": 0.77},
                "xgb": {"accuracy": 0.97, "f1": 0.91},
                "ranking": ["xgb", "ada", "gnb"],
                "best_model": "xgb",
            })
        );
    }

    #[test]
    fn test_record_matches_serialized_shape() {
        let report = report();
        let record = report.to_record();
        assert_eq!(Value::Object(record.clone()), serde_json::to_value(&report).unwrap());
        assert_eq!(ConsolidatedReport::from_record(&record).unwrap(), report);
    }

    #[test]
    fn test_accessors() {
        let report = report();
        assert_eq!(report.len(), 3);
        assert!(!report.is_empty());
        assert_eq!(report.trainer("xgb").map(BTreeMap::len), Some(2));
        assert_eq!(report.score("ada", "accuracy"), None);
        assert!(report.trainer("rf").is_none());
    }

    #[test]
    fn test_from_record_rejects_other_shapes() {
        let record = json!({"ada": 0.82});
        assert!(ConsolidatedReport::from_record(record.as_object().unwrap()).is_err());
    }
}
