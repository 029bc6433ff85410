//! Comparison and consolidation of trainer results.
//!
//! [`Comparator::compare`] reduces the results of N trainers to one
//! [`ConsolidatedReport`]: a per-trainer metric snapshot, a ranking by the
//! comparison metric, and the best model. The reduction is a pure function of
//! its input set. It fails fast and never drops a trainer.

mod report;
mod stage;

pub use report::ConsolidatedReport;
pub use stage::ComparatorStage;

use crate::errors::{
    CompareError, EmptyResultSetError, MissingMetricError, MissingMetricReason,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Metric used for ranking when none is configured.
pub const DEFAULT_METRIC: &str = "f1";

/// Report keys that cannot be used as trainer names.
pub const RESERVED_KEYS: [&str; 2] = ["ranking", "best_model"];

/// The evaluation result of one trainer.
///
/// Every numeric top-level field of a result record is a metric; everything
/// else is kept as metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainerResult {
    /// Metric values by name.
    pub metrics: BTreeMap<String, f64>,
    /// Non-numeric fields of the record.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl TrainerResult {
    /// Creates an empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a metric.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Splits a result record into metrics and metadata.
    #[must_use]
    pub fn from_record(record: &Map<String, Value>) -> Self {
        let mut result = Self::default();
        for (key, value) in record {
            match value.as_f64() {
                Some(number) => {
                    result.metrics.insert(key.clone(), number);
                }
                None => {
                    result.metadata.insert(key.clone(), value.clone());
                }
            }
        }
        result
    }

    /// Returns a metric value.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    fn score(&self, trainer: &str, metric: &str) -> Result<f64, MissingMetricError> {
        let reason = match self.metrics.get(metric) {
            Some(value) if value.is_finite() => return Ok(*value),
            Some(_) => MissingMetricReason::NotFinite,
            None if self.metadata.contains_key(metric) => MissingMetricReason::NotNumeric,
            None => MissingMetricReason::Absent,
        };
        Err(MissingMetricError {
            trainer: trainer.to_string(),
            metric: metric.to_string(),
            reason,
        })
    }
}

/// Ranks trainer results by one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparator {
    metric: String,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(DEFAULT_METRIC)
    }
}

impl Comparator {
    /// Creates a comparator ranking by `metric`, higher being better.
    #[must_use]
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
        }
    }

    /// Returns the comparison metric.
    #[must_use]
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Consolidates trainer results into a report.
    ///
    /// The ranking is descending by metric with ties broken by ascending
    /// trainer name, so the outcome does not depend on input order.
    ///
    /// # Errors
    ///
    /// Returns `EmptyResultSet` for no results, `MissingMetric` naming the
    /// first offending trainer (by name), `DuplicateTrainer` or
    /// `ReservedTrainerName`. No partial report is produced.
    pub fn compare<I, K>(&self, results: I) -> Result<ConsolidatedReport, CompareError>
    where
        I: IntoIterator<Item = (K, TrainerResult)>,
        K: Into<String>,
    {
        let mut by_trainer: BTreeMap<String, TrainerResult> = BTreeMap::new();
        for (trainer, result) in results {
            let trainer = trainer.into();
            if RESERVED_KEYS.contains(&trainer.as_str()) {
                return Err(CompareError::ReservedTrainerName(trainer));
            }
            if by_trainer.contains_key(&trainer) {
                return Err(CompareError::DuplicateTrainer(trainer));
            }
            by_trainer.insert(trainer, result);
        }
        if by_trainer.is_empty() {
            return Err(EmptyResultSetError.into());
        }

        let mut scored = Vec::with_capacity(by_trainer.len());
        for (trainer, result) in &by_trainer {
            scored.push((trainer.as_str(), result.score(trainer, &self.metric)?));
        }
        // by_trainer iterates in name order and the sort is stable; scores are
        // finite, so -0.0 and 0.0 compare equal
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        let ranking: Vec<String> = scored.iter().map(|(name, _)| (*name).to_string()).collect();

        debug!(metric = %self.metric, ranking = ?ranking, "Compared trainer results");
        let trainers = by_trainer
            .into_iter()
            .map(|(name, result)| (name, result.metrics))
            .collect();
        Ok(ConsolidatedReport::new(trainers, ranking))
    }
}

/// Consolidates trainer results, ranking by [`DEFAULT_METRIC`].
///
/// # Errors
///
/// See [`Comparator::compare`].
pub fn compare<I, K>(results: I) -> Result<ConsolidatedReport, CompareError>
where
    I: IntoIterator<Item = (K, TrainerResult)>,
    K: Into<String>,
{
    Comparator::default().compare(results)
}
