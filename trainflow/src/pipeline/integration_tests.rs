//! End-to-end tests for building and running training plans.

#[cfg(test)]
mod tests {
    use crate::compare::ConsolidatedReport;
    use crate::config::PipelineConfig;
    use crate::core::{ArtifactValue, SemanticType, StageOutput, StageStatus};
    use crate::errors::{GraphError, TrainflowError};
    use crate::events::{event_types, CollectingEventSink};
    use crate::pipeline::{
        CacheStore, InMemoryCacheStore, JobRunner, LocalRunner, RunReport, StageGraphBuilder,
        StageSpec,
    };
    use crate::stages::{FnStage, Stage, StageInputs};
    use crate::workflow::{
        build_training_plan, comparator_stage, trainer_command, COMPARE_STAGE, COMPARISON_OUTPUT,
        DATASET_PORT, PROVIDE_STAGE, RESULTS_PORT,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Barrier;

    #[derive(Debug)]
    struct DatasetProvider {
        path: PathBuf,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Stage for DatasetProvider {
        fn name(&self) -> &str {
            "dataset-provider"
        }

        async fn execute(&self, _inputs: &StageInputs) -> StageOutput {
            self.calls.fetch_add(1, Ordering::SeqCst);
            StageOutput::ok_value(DATASET_PORT, ArtifactValue::file_path(self.path.clone()))
        }
    }

    #[derive(Debug)]
    struct ScoringTrainer {
        model: String,
        /// `None` makes the trainer fail.
        f1: Option<f64>,
        calls: Arc<AtomicUsize>,
        barrier: Option<Arc<Barrier>>,
    }

    #[async_trait]
    impl Stage for ScoringTrainer {
        fn name(&self) -> &str {
            &self.model
        }

        async fn execute(&self, inputs: &StageInputs) -> StageOutput {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            let dataset = match inputs.path(DATASET_PORT) {
                Ok(path) => path.display().to_string(),
                Err(e) => return StageOutput::fail(e.to_string()),
            };
            match self.f1 {
                Some(f1) => {
                    let results = json!({"f1": f1, "model": self.model, "dataset": dataset});
                    match ArtifactValue::record(results) {
                        Some(record) => StageOutput::ok_value(RESULTS_PORT, record),
                        None => StageOutput::fail("results are not a record"),
                    }
                }
                None => StageOutput::fail(format!("{} training crashed", self.model)),
            }
        }
    }

    #[derive(Default)]
    struct Harness {
        provider_calls: Arc<AtomicUsize>,
        trainer_calls: Arc<AtomicUsize>,
        barrier: Option<Arc<Barrier>>,
    }

    impl Harness {
        fn runner(&self, config: &PipelineConfig, scores: &[(&str, Option<f64>)]) -> LocalRunner {
            let provider = DatasetProvider {
                path: config.dataset_path.clone(),
                calls: Arc::clone(&self.provider_calls),
            };
            let mut runner = LocalRunner::new()
                .register(config.provider_command(), Arc::new(provider))
                .register(
                    config.script_command(&config.compare_script),
                    Arc::new(comparator_stage(config)),
                );
            for (name, f1) in scores {
                let trainer = ScoringTrainer {
                    model: (*name).to_string(),
                    f1: *f1,
                    calls: Arc::clone(&self.trainer_calls),
                    barrier: self.barrier.clone(),
                };
                runner = runner.register(trainer_command(config, name).unwrap(), Arc::new(trainer));
            }
            runner
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::new()
            .with_working_dir("/mnt/code")
            .with_dataset_path("/data/transformed_cc_transactions.csv")
    }

    fn consolidated(report: &RunReport) -> ConsolidatedReport {
        let record = report
            .output(COMPARISON_OUTPUT)
            .and_then(ArtifactValue::as_record)
            .unwrap();
        ConsolidatedReport::from_record(record).unwrap()
    }

    const SCORES: [(&str, Option<f64>); 3] =
        [("ada", Some(0.82)), ("gnb", Some(0.77)), ("xgb", Some(0.91))];

    #[tokio::test]
    async fn test_training_workflow_end_to_end() {
        let config = config();
        let plan = build_training_plan(&config).unwrap();
        let sink = Arc::new(CollectingEventSink::new());
        let harness = Harness::default();
        let runner = harness.runner(&config, &SCORES).with_event_sink(sink.clone());

        let report = runner.run(&plan, BTreeMap::new()).await.unwrap();

        assert!(report.success, "{:?}", report.error);
        assert!(report.stages.values().all(|run| run.status == StageStatus::Ok));
        let comparison = consolidated(&report);
        assert_eq!(comparison.ranking(), &["xgb", "ada", "gnb"]);
        assert_eq!(comparison.best_model(), "xgb");
        assert_eq!(comparison.score("ada", "f1"), Some(0.82));

        assert_eq!(harness.provider_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.trainer_calls.load(Ordering::SeqCst), 3);

        let started = sink.stages_with(event_types::STAGE_STARTED);
        assert_eq!(started.len(), 5);
        assert_eq!(started.first().map(String::as_str), Some(PROVIDE_STAGE));
        assert_eq!(started.last().map(String::as_str), Some(COMPARE_STAGE));
        assert_eq!(sink.events_of_type(event_types::PIPELINE_COMPLETED).len(), 1);
    }

    #[tokio::test]
    async fn test_dataset_path_reaches_every_trainer_unchanged() {
        let config = config();
        let plan = build_training_plan(&config).unwrap();
        let runner = Harness::default().runner(&config, &SCORES);

        let report = runner.run(&plan, BTreeMap::new()).await.unwrap();

        for trainer in ["train-ada", "train-gnb", "train-xgb"] {
            let results = report.stage(trainer).unwrap().outputs[RESULTS_PORT]
                .as_record()
                .unwrap();
            assert_eq!(results["dataset"], "/data/transformed_cc_transactions.csv");
        }
    }

    #[tokio::test]
    async fn test_failing_trainer_blocks_comparator() {
        let config = config();
        let plan = build_training_plan(&config).unwrap();
        let sink = Arc::new(CollectingEventSink::new());
        let runner = Harness::default()
            .runner(&config, &[("ada", Some(0.82)), ("gnb", None), ("xgb", Some(0.91))])
            .with_event_sink(sink.clone());

        let report = runner.run(&plan, BTreeMap::new()).await.unwrap();

        assert!(!report.success);
        assert!(report.outputs.is_empty());
        assert_eq!(report.stage("train-gnb").unwrap().status, StageStatus::Fail);
        assert_eq!(report.stage(COMPARE_STAGE).unwrap().status, StageStatus::Blocked);
        assert!(report.error.as_deref().unwrap().contains("train-gnb"));
        assert_eq!(sink.stages_with(event_types::STAGE_BLOCKED), vec![COMPARE_STAGE]);
        assert!(!sink
            .stages_with(event_types::STAGE_STARTED)
            .contains(&COMPARE_STAGE.to_string()));
        assert!(matches!(
            report.ensure_success(),
            Err(TrainflowError::StageExecution(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_result_fails_comparison() {
        let config = config();
        let plan = build_training_plan(&config).unwrap();
        let runner = Harness::default()
            .runner(&config, &[("ada", Some(0.82)), ("xgb", Some(0.91))])
            .register(
                trainer_command(&config, "gnb").unwrap(),
                Arc::new(FnStage::new("gnb", |_: &StageInputs| {
                    StageOutput::ok_value(
                        RESULTS_PORT,
                        ArtifactValue::record(json!({"accuracy": 0.7})).unwrap(),
                    )
                })),
            );

        let report = runner.run(&plan, BTreeMap::new()).await.unwrap();

        assert!(!report.success);
        let compare = report.stage(COMPARE_STAGE).unwrap();
        assert_eq!(compare.status, StageStatus::Fail);
        assert!(compare.error.as_deref().unwrap().contains("Trainer 'gnb'"));
        assert!(report.output(COMPARISON_OUTPUT).is_none());
    }

    #[tokio::test]
    async fn test_cached_trainers_are_not_reexecuted() {
        let config = config();
        let plan = build_training_plan(&config).unwrap();
        let cache = Arc::new(InMemoryCacheStore::new());
        let harness = Harness::default();
        let runner = harness.runner(&config, &SCORES).with_cache(cache.clone());

        let first = runner.run(&plan, BTreeMap::new()).await.unwrap();
        let second = runner.run(&plan, BTreeMap::new()).await.unwrap();

        assert!(first.success && second.success);
        assert_eq!(harness.trainer_calls.load(Ordering::SeqCst), 3);
        // The provider is not cacheable and runs every time
        assert_eq!(harness.provider_calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 3);

        for trainer in ["train-ada", "train-gnb", "train-xgb"] {
            let (a, b) = (first.stage(trainer).unwrap(), second.stage(trainer).unwrap());
            assert_eq!(a.status, StageStatus::Ok);
            assert_eq!(b.status, StageStatus::Cached);
            assert!(a.cache_key.is_some());
            assert_eq!(a.cache_key, b.cache_key);
            assert_eq!(a.outputs, b.outputs);
        }
        assert_eq!(second.stage(COMPARE_STAGE).unwrap().status, StageStatus::Ok);
        assert_eq!(consolidated(&first), consolidated(&second));
    }

    #[tokio::test]
    async fn test_changed_dataset_misses_cache() {
        let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
        let harness = Harness::default();

        for dataset in ["/data/v1.csv", "/data/v2.csv"] {
            let config = config().with_dataset_path(dataset);
            let plan = build_training_plan(&config).unwrap();
            let runner = harness.runner(&config, &SCORES).with_cache(Arc::clone(&cache));
            let report = runner.run(&plan, BTreeMap::new()).await.unwrap();
            assert_eq!(report.stage("train-ada").unwrap().status, StageStatus::Ok);
        }
        assert_eq!(harness.trainer_calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_sibling_trainers_run_concurrently() {
        let config = config();
        let plan = build_training_plan(&config).unwrap();
        assert!(plan.are_independent("train-ada", "train-gnb"));

        // Each trainer waits until all three have started
        let harness = Harness {
            barrier: Some(Arc::new(Barrier::new(3))),
            ..Harness::default()
        };
        let runner = harness.runner(&config, &SCORES);

        let report = tokio::time::timeout(Duration::from_secs(5), runner.run(&plan, BTreeMap::new()))
            .await
            .expect("trainers were not dispatched concurrently")
            .unwrap();
        assert!(report.success);
    }

    #[tokio::test]
    async fn test_external_dataset_binding() {
        let mut builder = StageGraphBuilder::new("external");
        builder
            .define_stage(
                StageSpec::new("train-ada", "python trainer_ada.py")
                    .with_input(DATASET_PORT, SemanticType::FilePath)
                    .with_output(RESULTS_PORT, SemanticType::StructuredRecord)
                    .cacheable(true),
            )
            .unwrap()
            .bind_external("dataset", "train-ada", DATASET_PORT)
            .unwrap()
            .expose_output("ada", "train-ada", RESULTS_PORT)
            .unwrap();
        let plan = builder.finalize().unwrap();

        let harness = Harness::default();
        let runner = LocalRunner::new().register(
            "python trainer_ada.py",
            Arc::new(ScoringTrainer {
                model: "ada".to_string(),
                f1: Some(0.82),
                calls: Arc::clone(&harness.trainer_calls),
                barrier: None,
            }),
        );

        let mut inputs = BTreeMap::new();
        inputs.insert("dataset".to_string(), ArtifactValue::file_path("/data/cc.csv"));
        let report = runner.run(&plan, inputs).await.unwrap();

        let results = report.output("ada").and_then(ArtifactValue::as_record).unwrap();
        assert_eq!(results["dataset"], "/data/cc.csv");
    }

    #[test]
    fn test_string_consumer_rejects_file_handle_producer() {
        let mut builder = StageGraphBuilder::new("mismatch");
        builder
            .define_stage(
                StageSpec::new("provide", "echo").with_output("dataset_path", SemanticType::FileHandle),
            )
            .unwrap()
            .define_stage(
                StageSpec::new("train", "python train.py")
                    .with_input("dataset_path", SemanticType::Text)
                    .with_output(RESULTS_PORT, SemanticType::StructuredRecord),
            )
            .unwrap();

        let err = builder
            .connect("provide", "dataset_path", "train", "dataset_path")
            .unwrap_err();
        assert_eq!(err.code(), "GRAPH-005-TYPE_MISMATCH");
        assert_eq!(
            err.to_string(),
            "Type mismatch: provide.dataset_path produces FileHandle but train.dataset_path expects str"
        );

        // The rejected edge leaves the input unbound
        assert!(matches!(builder.finalize(), Err(GraphError::UnboundInput(_))));
    }
}
