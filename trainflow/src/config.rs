//! Pipeline configuration.
//!
//! All paths are explicit configuration values; nothing is read from the
//! environment.

use crate::compare::{DEFAULT_METRIC, RESERVED_KEYS};
use crate::errors::ConfigError;
use crate::pipeline::CommandRef;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One classifier trainer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Short name, used in stage and port names (e.g. `ada`).
    pub name: String,
    /// Human-readable model name (e.g. `AdaBoost`).
    pub model: String,
    /// Training script, relative to the scripts directory.
    pub script: String,
}

impl TrainerConfig {
    /// Creates a trainer configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, model: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            script: script.into(),
        }
    }
}

/// Configuration of the training-and-comparison pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Project root the scripts directory is resolved against.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Scripts directory, relative to the working directory.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,
    /// Interpreter used to run scripts.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Path of the preprocessed dataset.
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,
    /// Trainers to run in parallel.
    #[serde(default = "default_trainers")]
    pub trainers: Vec<TrainerConfig>,
    /// Comparison script, relative to the scripts directory.
    #[serde(default = "default_compare_script")]
    pub compare_script: String,
    /// Metric the comparison ranks by.
    #[serde(default = "default_metric")]
    pub metric: String,
}

fn default_name() -> String {
    "credit-card-fraud-detection".to_string()
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("exercises/d_TrainingAndEvaluation")
}

fn default_interpreter() -> String {
    "python".to_string()
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("/mnt/data/Fraud-Detection-Workshop/transformed_cc_transactions.csv")
}

fn default_trainers() -> Vec<TrainerConfig> {
    vec![
        TrainerConfig::new("ada", "AdaBoost", "trainer_ada.py"),
        TrainerConfig::new("gnb", "GaussianNB", "trainer_gnb.py"),
        TrainerConfig::new("xgb", "XGBoost", "trainer_xgb.py"),
    ]
}

fn default_compare_script() -> String {
    "compare.py".to_string()
}

fn default_metric() -> String {
    DEFAULT_METRIC.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            working_dir: default_working_dir(),
            scripts_dir: default_scripts_dir(),
            interpreter: default_interpreter(),
            dataset_path: default_dataset_path(),
            trainers: default_trainers(),
            compare_script: default_compare_script(),
            metric: default_metric(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Sets the dataset path.
    #[must_use]
    pub fn with_dataset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dataset_path = path.into();
        self
    }

    /// Replaces the trainer list.
    #[must_use]
    pub fn with_trainers(mut self, trainers: Vec<TrainerConfig>) -> Self {
        self.trainers = trainers;
        self
    }

    /// Sets the comparison metric.
    #[must_use]
    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = metric.into();
        self
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `Parse` for malformed JSON and `Invalid` for unusable values.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `Read` if the file cannot be read, otherwise see
    /// [`from_json_str`](Self::from_json_str).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Checks that the configuration describes a buildable pipeline.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("pipeline name is empty".to_string()));
        }
        if self.metric.trim().is_empty() {
            return Err(ConfigError::Invalid("comparison metric is empty".to_string()));
        }
        if self.trainers.is_empty() {
            return Err(ConfigError::Invalid("at least one trainer is required".to_string()));
        }

        let mut seen = HashSet::new();
        for trainer in &self.trainers {
            let valid = !trainer.name.is_empty()
                && trainer
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(ConfigError::Invalid(format!(
                    "trainer name '{}' must be non-empty and contain only letters, digits, '_' or '-'",
                    trainer.name
                )));
            }
            if RESERVED_KEYS.contains(&trainer.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "trainer name '{}' is reserved",
                    trainer.name
                )));
            }
            if !seen.insert(trainer.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "trainer '{}' is configured twice",
                    trainer.name
                )));
            }
            if trainer.script.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "trainer '{}' has no script",
                    trainer.name
                )));
            }
        }
        Ok(())
    }

    /// Resolves a script against the working and scripts directories.
    #[must_use]
    pub fn script_path(&self, script: &str) -> PathBuf {
        self.working_dir.join(&self.scripts_dir).join(script)
    }

    /// Renders the command running a script.
    #[must_use]
    pub fn script_command(&self, script: &str) -> CommandRef {
        CommandRef::new(format!(
            "{} {}",
            self.interpreter,
            self.script_path(script).display()
        ))
    }

    /// Renders the command providing the dataset path.
    #[must_use]
    pub fn provider_command(&self) -> CommandRef {
        CommandRef::new(format!("echo {}", self.dataset_path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.metric, "f1");
        let names: Vec<&str> = config.trainers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["ada", "gnb", "xgb"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = PipelineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_json_round_trip() {
        let config = PipelineConfig::new()
            .with_working_dir("/mnt/code")
            .with_metric("roc_auc")
            .with_trainers(vec![TrainerConfig::new("rf", "RandomForest", "trainer_rf.py")]);
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(PipelineConfig::from_json_str(&text).unwrap(), config);
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"working_dir": "/mnt/code", "dataset_path": "/data/cc.csv", "metric": "accuracy"}}"#
        )
        .unwrap();

        let config = PipelineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.working_dir, PathBuf::from("/mnt/code"));
        assert_eq!(config.dataset_path, PathBuf::from("/data/cc.csv"));
        assert_eq!(config.metric, "accuracy");
        assert_eq!(config.trainers.len(), 3);
    }

    #[test]
    fn test_from_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelineConfig::from_path(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_parse_error() {
        let err = PipelineConfig::from_json_str(r#"{"trainers": 3}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            PipelineConfig::new().with_trainers(vec![]),
            PipelineConfig::new().with_metric(" "),
            PipelineConfig::new().with_trainers(vec![
                TrainerConfig::new("ada", "AdaBoost", "a.py"),
                TrainerConfig::new("ada", "AdaBoost", "b.py"),
            ]),
            PipelineConfig::new().with_trainers(vec![TrainerConfig::new("best_model", "X", "x.py")]),
            PipelineConfig::new().with_trainers(vec![TrainerConfig::new("a b", "X", "x.py")]),
            PipelineConfig::new().with_trainers(vec![TrainerConfig::new("ada", "AdaBoost", "")]),
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "{config:?}");
        }
    }

    #[test]
    fn test_commands() {
        let config = PipelineConfig::new().with_working_dir("/mnt/code");
        assert_eq!(
            config.script_command("trainer_ada.py").as_str(),
            "python /mnt/code/exercises/d_TrainingAndEvaluation/trainer_ada.py"
        );
        assert_eq!(
            config.provider_command().as_str(),
            "echo /mnt/data/Fraud-Detection-Workshop/transformed_cc_transactions.csv"
        );
    }
}
