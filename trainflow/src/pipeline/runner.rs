//! Runner seam and the in-process reference runner.
//!
//! [`LocalRunner`] executes stages as soon as their producers have completed,
//! allowing for maximum parallelism between independent stages. Artifacts
//! travel only along declared edges and external bindings.

use super::cache::{CacheStore, CachedOutputs, InMemoryCacheStore};
use super::plan::ExecutionPlan;
use super::{CommandRef, StageSpec};
use crate::core::{ArtifactValue, StageStatus};
use crate::errors::TrainflowError;
use crate::events::{event_types, EventSink, NoOpEventSink};
use crate::stages::{CacheKey, Stage, StageInputs};
use crate::utils::{format_timestamp, generate_uuid};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Executes finalized plans.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Runs a plan with the given graph inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the run cannot start, for example when the graph
    /// inputs do not satisfy the plan's input contract. Stage failures are
    /// reported in the returned [`RunReport`].
    async fn run(
        &self,
        plan: &ExecutionPlan,
        inputs: BTreeMap<String, ArtifactValue>,
    ) -> Result<RunReport, TrainflowError>;
}

/// Outcome of a single stage within a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRun {
    /// The stage name.
    pub stage: String,
    /// Final status.
    pub status: StageStatus,
    /// Produced artifacts, by port.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, ArtifactValue>,
    /// Failure, cancellation or blocking reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Cache key, for cacheable stages with valid inputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<CacheKey>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl StageRun {
    fn new(stage: impl Into<String>, status: StageStatus) -> Self {
        Self {
            stage: stage.into(),
            status,
            outputs: BTreeMap::new(),
            error: None,
            cache_key: None,
            duration_ms: 0.0,
        }
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    fn blocked(stage: &str) -> Self {
        Self::new(stage, StageStatus::Blocked).with_error("Upstream stage did not succeed")
    }
}

/// Result of running a plan.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// The plan name.
    pub pipeline: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Total execution time in milliseconds.
    pub duration_ms: f64,
    /// True only if every stage succeeded.
    pub success: bool,
    /// Per-stage outcomes.
    pub stages: BTreeMap<String, StageRun>,
    /// Terminal outputs, present only on success.
    pub outputs: BTreeMap<String, ArtifactValue>,
    /// Error message if the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    /// Returns the outcome of a stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageRun> {
        self.stages.get(name)
    }

    /// Returns the stages that did not succeed.
    #[must_use]
    pub fn failed_stages(&self) -> Vec<&StageRun> {
        self.stages
            .values()
            .filter(|run| run.status.is_failure())
            .collect()
    }

    /// Returns a terminal output.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&ArtifactValue> {
        self.outputs.get(name)
    }

    /// Converts a failed run into an error.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if a stage cancelled the run, `StageExecution`
    /// otherwise.
    pub fn ensure_success(&self) -> Result<(), TrainflowError> {
        if self.success {
            return Ok(());
        }
        let message = self
            .error
            .clone()
            .unwrap_or_else(|| format!("Run of '{}' failed", self.pipeline));
        if self.stages.values().any(|run| run.status == StageStatus::Cancel) {
            Err(TrainflowError::Cancelled(message))
        } else {
            Err(TrainflowError::StageExecution(message))
        }
    }
}

/// Everything a spawned stage task owns.
struct StageJob {
    spec: StageSpec,
    stage: Arc<dyn Stage>,
    inputs: BTreeMap<String, ArtifactValue>,
    cache: Arc<dyn CacheStore>,
    cache_ttl: Option<Duration>,
    event_sink: Arc<dyn EventSink>,
}

/// In-process runner mapping command references to [`Stage`] implementations.
pub struct LocalRunner {
    stages: HashMap<CommandRef, Arc<dyn Stage>>,
    cache: Arc<dyn CacheStore>,
    cache_ttl: Option<Duration>,
    event_sink: Arc<dyn EventSink>,
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self {
            stages: HashMap::new(),
            cache: Arc::new(InMemoryCacheStore::new()),
            cache_ttl: None,
            event_sink: Arc::new(NoOpEventSink),
        }
    }
}

impl fmt::Debug for LocalRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut commands: Vec<&str> = self.stages.keys().map(CommandRef::as_str).collect();
        commands.sort_unstable();
        f.debug_struct("LocalRunner")
            .field("commands", &commands)
            .field("cache", &self.cache)
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

impl LocalRunner {
    /// Creates a runner with an in-memory cache and no event sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the implementation invoked for a command.
    #[must_use]
    pub fn register(mut self, command: impl Into<CommandRef>, stage: Arc<dyn Stage>) -> Self {
        self.stages.insert(command.into(), stage);
        self
    }

    /// Sets the cache store.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the lifetime of new cache entries.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    fn resolve(
        plan: &ExecutionPlan,
        spec: &StageSpec,
        graph_inputs: &BTreeMap<String, ArtifactValue>,
        artifacts: &HashMap<String, BTreeMap<String, ArtifactValue>>,
    ) -> BTreeMap<String, ArtifactValue> {
        let mut resolved = BTreeMap::new();
        for edge in plan.edges_into(&spec.name) {
            if let Some(value) = artifacts
                .get(&edge.producer.stage)
                .and_then(|outputs| outputs.get(&edge.producer.port))
            {
                resolved.insert(edge.consumer.port.clone(), value.clone());
            }
        }
        for binding in plan.external_into(&spec.name) {
            if let Some(value) = graph_inputs.get(&binding.name) {
                resolved.insert(binding.consumer.port.clone(), value.clone());
            }
        }
        resolved
    }

    /// Spawns a stage task, pairing its join result with the stage name.
    fn spawn_stage(
        &self,
        spec: &StageSpec,
        stage: Arc<dyn Stage>,
        inputs: BTreeMap<String, ArtifactValue>,
    ) -> impl Future<Output = (String, Result<StageRun, tokio::task::JoinError>)> {
        let name = spec.name.clone();
        let job = StageJob {
            spec: spec.clone(),
            stage,
            inputs,
            cache: Arc::clone(&self.cache),
            cache_ttl: self.cache_ttl,
            event_sink: Arc::clone(&self.event_sink),
        };
        let handle = tokio::spawn(execute_stage(job));
        async move { (name, handle.await) }
    }
}

#[async_trait]
impl JobRunner for LocalRunner {
    async fn run(
        &self,
        plan: &ExecutionPlan,
        inputs: BTreeMap<String, ArtifactValue>,
    ) -> Result<RunReport, TrainflowError> {
        plan.input_contract().validate(&inputs)?;

        let mut implementations: HashMap<&str, Arc<dyn Stage>> = HashMap::new();
        for spec in plan.stages() {
            let stage = self.stages.get(&spec.command).ok_or_else(|| {
                TrainflowError::StageExecution(format!(
                    "No implementation registered for command '{}' of stage '{}'",
                    spec.command, spec.name
                ))
            })?;
            implementations.insert(spec.name.as_str(), Arc::clone(stage));
        }

        let run_id = generate_uuid();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(pipeline = %plan.name(), %run_id, stages = plan.stage_count(), "Starting run");
        self.event_sink
            .emit(
                event_types::PIPELINE_STARTED,
                Some(json!({
                    "pipeline": plan.name(),
                    "run_id": run_id.to_string(),
                    "started_at": format_timestamp(started_at),
                    "stages": plan.execution_order(),
                })),
            )
            .await;

        // Track in-degree (number of unfinished producers) for each stage
        let mut in_degree: HashMap<&str, usize> = plan
            .stages()
            .iter()
            .map(|spec| (spec.name.as_str(), plan.dependencies(&spec.name).len()))
            .collect();
        let mut artifacts: HashMap<String, BTreeMap<String, ArtifactValue>> = HashMap::new();
        let mut runs: BTreeMap<String, StageRun> = BTreeMap::new();
        let mut failure: Option<String> = None;
        let mut active = FuturesUnordered::new();

        for spec in plan.stages() {
            if in_degree.get(spec.name.as_str()) == Some(&0) {
                let stage = Arc::clone(&implementations[spec.name.as_str()]);
                let resolved = Self::resolve(plan, spec, &inputs, &artifacts);
                active.push(self.spawn_stage(spec, stage, resolved));
            }
        }

        while let Some((name, joined)) = active.next().await {
            let run = joined.unwrap_or_else(|e| {
                StageRun::new(&name, StageStatus::Fail).with_error(format!("Stage task panicked: {e}"))
            });

            if !run.status.is_success() {
                warn!(pipeline = %plan.name(), stage = %name, status = %run.status, "Stage did not succeed");
                failure.get_or_insert_with(|| match run.error.as_deref() {
                    Some(error) => format!("Stage '{name}' ended with status {}: {error}", run.status),
                    None => format!("Stage '{name}' ended with status {}", run.status),
                });
                runs.insert(name, run);
                continue;
            }

            artifacts.insert(name.clone(), run.outputs.clone());
            runs.insert(name.clone(), run);

            // Stop dispatching once any stage has failed; in-flight stages drain
            if failure.is_some() {
                continue;
            }
            for dependent in plan.dependents(&name) {
                let Some(count) = in_degree.get_mut(dependent) else {
                    continue;
                };
                *count = count.saturating_sub(1);
                if *count == 0 {
                    if let Some(spec) = plan.stage(dependent) {
                        let stage = Arc::clone(&implementations[dependent]);
                        let resolved = Self::resolve(plan, spec, &inputs, &artifacts);
                        active.push(self.spawn_stage(spec, stage, resolved));
                    }
                }
            }
        }

        for spec in plan.stages() {
            if !runs.contains_key(&spec.name) {
                debug!(pipeline = %plan.name(), stage = %spec.name, "Stage blocked");
                self.event_sink.try_emit(event_types::STAGE_BLOCKED, Some(json!({ "stage": &spec.name })));
                runs.insert(spec.name.clone(), StageRun::blocked(&spec.name));
            }
        }

        let success = failure.is_none() && runs.values().all(|run| run.status.is_success());
        let mut outputs = BTreeMap::new();
        if success {
            for terminal in plan.terminal_outputs() {
                if let Some(value) = artifacts
                    .get(&terminal.producer.stage)
                    .and_then(|produced| produced.get(&terminal.producer.port))
                {
                    outputs.insert(terminal.name.clone(), value.clone());
                }
            }
        }

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        if success {
            info!(pipeline = %plan.name(), %run_id, duration_ms, "Run completed");
            self.event_sink
                .emit(
                    event_types::PIPELINE_COMPLETED,
                    Some(json!({
                        "pipeline": plan.name(),
                        "run_id": run_id.to_string(),
                        "duration_ms": duration_ms,
                    })),
                )
                .await;
        } else {
            warn!(pipeline = %plan.name(), %run_id, error = ?failure, "Run failed");
            self.event_sink
                .emit(
                    event_types::PIPELINE_FAILED,
                    Some(json!({
                        "pipeline": plan.name(),
                        "run_id": run_id.to_string(),
                        "error": &failure,
                        "duration_ms": duration_ms,
                    })),
                )
                .await;
        }

        Ok(RunReport {
            run_id,
            pipeline: plan.name().to_string(),
            started_at,
            duration_ms,
            success,
            stages: runs,
            outputs,
            error: failure,
        })
    }
}

/// Executes a single stage: contract checks, cache lookup, invocation.
async fn execute_stage(job: StageJob) -> StageRun {
    let StageJob {
        spec,
        stage,
        inputs,
        cache,
        cache_ttl,
        event_sink,
    } = job;
    let start = Instant::now();
    event_sink.try_emit(event_types::STAGE_STARTED, Some(json!({ "stage": &spec.name })));

    let mut run = match run_stage(&spec, stage.as_ref(), inputs, cache.as_ref(), cache_ttl).await {
        Ok(run) => run,
        Err(error) => StageRun::new(&spec.name, StageStatus::Fail).with_error(error),
    };
    run.duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    let data = json!({
        "stage": &spec.name,
        "duration_ms": run.duration_ms,
        "error": &run.error,
    });
    match run.status {
        StageStatus::Ok => event_sink.try_emit(event_types::STAGE_COMPLETED, Some(data)),
        StageStatus::Cached => event_sink.try_emit(event_types::STAGE_CACHED, Some(data)),
        StageStatus::Cancel => event_sink.try_emit(event_types::STAGE_CANCELLED, Some(data)),
        _ => event_sink.try_emit(event_types::STAGE_FAILED, Some(data)),
    }
    run
}

async fn run_stage(
    spec: &StageSpec,
    stage: &dyn Stage,
    inputs: BTreeMap<String, ArtifactValue>,
    cache: &dyn CacheStore,
    cache_ttl: Option<Duration>,
) -> Result<StageRun, String> {
    spec.contract.validate(&inputs).map_err(|e| e.to_string())?;

    let cache_key = if spec.cacheable {
        let key = spec
            .contract
            .cache_key(spec.command.as_str(), &inputs)
            .map_err(|e| e.to_string())?;
        if let Some(hit) = cache.get(&key).await {
            debug!(stage = %spec.name, cache_key = %key, "Cache hit");
            let mut run = StageRun::new(&spec.name, StageStatus::Cached);
            run.outputs = hit.outputs;
            run.cache_key = Some(key);
            return Ok(run);
        }
        Some(key)
    } else {
        None
    };

    debug!(stage = %spec.name, implementation = %stage.name(), "Executing stage");
    let output = stage.execute(&StageInputs::new(&spec.name, inputs)).await;

    let mut run = StageRun::new(&spec.name, output.status);
    run.cache_key = cache_key;
    match output.status {
        StageStatus::Ok => {
            spec.contract
                .validate_outputs(&output.outputs)
                .map_err(|e| e.to_string())?;
            if let Some(key) = &run.cache_key {
                let mut entry = CachedOutputs::new(&spec.name, output.outputs.clone());
                if let Some(ttl) = cache_ttl {
                    entry = entry.with_ttl(ttl);
                }
                cache.set(key, entry).await;
            }
            run.outputs = output.outputs;
        }
        StageStatus::Fail | StageStatus::Cancel => {
            run.error = output.reason().map(str::to_string);
        }
        other => {
            return Err(format!("Stage returned unexpected status '{other}'"));
        }
    }
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SemanticType, StageOutput};
    use crate::events::CollectingEventSink;
    use crate::pipeline::StageGraphBuilder;
    use crate::stages::{FnStage, NoOpStage};

    fn echo_plan() -> ExecutionPlan {
        let mut builder = StageGraphBuilder::new("echo");
        builder
            .define_stage(
                StageSpec::new("echo", "echo")
                    .with_input("text", SemanticType::Text)
                    .with_output("text", SemanticType::Text),
            )
            .unwrap()
            .bind_external("text", "echo", "text")
            .unwrap()
            .expose_output("echoed", "echo", "text")
            .unwrap();
        builder.finalize().unwrap()
    }

    fn echo_stage() -> Arc<dyn Stage> {
        Arc::new(FnStage::new("echo", |inputs: &StageInputs| {
            match inputs.require("text", SemanticType::Text) {
                Ok(value) => StageOutput::ok_value("text", value.clone()),
                Err(e) => StageOutput::fail(e.to_string()),
            }
        }))
    }

    fn text_input(text: &str) -> BTreeMap<String, ArtifactValue> {
        let mut inputs = BTreeMap::new();
        inputs.insert("text".to_string(), ArtifactValue::from(text));
        inputs
    }

    #[tokio::test]
    async fn test_single_stage_run() {
        let sink = Arc::new(CollectingEventSink::new());
        let runner = LocalRunner::new()
            .register("echo", echo_stage())
            .with_event_sink(sink.clone());

        let report = runner.run(&echo_plan(), text_input("hello")).await.unwrap();

        assert!(report.success);
        assert!(report.ensure_success().is_ok());
        assert_eq!(report.output("echoed"), Some(&ArtifactValue::from("hello")));
        assert_eq!(report.stage("echo").unwrap().status, StageStatus::Ok);

        let events: Vec<String> = sink.events().into_iter().map(|(name, _)| name).collect();
        assert_eq!(
            events,
            vec!["pipeline.started", "stage.started", "stage.completed", "pipeline.completed"]
        );
    }

    #[tokio::test]
    async fn test_rejects_bad_graph_inputs() {
        let runner = LocalRunner::new().register("echo", echo_stage());

        let err = runner.run(&echo_plan(), BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, TrainflowError::Schema(_)));

        let mut wrong = BTreeMap::new();
        wrong.insert("text".to_string(), ArtifactValue::Scalar(1.0));
        let err = runner.run(&echo_plan(), wrong).await.unwrap_err();
        assert!(matches!(err, TrainflowError::Schema(_)));
    }

    #[tokio::test]
    async fn test_rejects_unregistered_command() {
        let err = LocalRunner::new()
            .run(&echo_plan(), text_input("hello"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No implementation registered for command 'echo'"));
    }

    #[tokio::test]
    async fn test_output_contract_violation_fails_stage() {
        let runner = LocalRunner::new().register(
            "echo",
            Arc::new(FnStage::new("bad", |_: &StageInputs| {
                StageOutput::ok_value("text", ArtifactValue::Scalar(1.0))
            })),
        );

        let report = runner.run(&echo_plan(), text_input("hello")).await.unwrap();
        assert!(!report.success);
        assert!(report.outputs.is_empty());
        let run = report.stage("echo").unwrap();
        assert_eq!(run.status, StageStatus::Fail);
        assert!(run.error.as_deref().unwrap().contains("Schema violation on echo.text"));
    }

    #[tokio::test]
    async fn test_cancelled_stage_fails_run() {
        let runner = LocalRunner::new().register(
            "echo",
            Arc::new(FnStage::new("cancel", |_: &StageInputs| StageOutput::cancel("user abort"))),
        );

        let report = runner.run(&echo_plan(), text_input("hello")).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.failed_stages().len(), 1);
        assert!(matches!(report.ensure_success(), Err(TrainflowError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_output_free_stage_downstream() {
        let mut builder = StageGraphBuilder::new("notify");
        builder
            .define_stage(
                StageSpec::new("echo", "echo")
                    .with_input("text", SemanticType::Text)
                    .with_output("text", SemanticType::Text),
            )
            .unwrap()
            .define_stage(StageSpec::new("notify", "notify").with_input("text", SemanticType::Text))
            .unwrap()
            .bind_external("text", "echo", "text")
            .unwrap()
            .connect("echo", "text", "notify", "text")
            .unwrap();
        let plan = builder.finalize().unwrap();
        let runner = LocalRunner::new()
            .register("echo", echo_stage())
            .register("notify", Arc::new(NoOpStage::new("notify")));

        let report = runner.run(&plan, text_input("done")).await.unwrap();
        assert!(report.success);
        assert!(report.outputs.is_empty());
        assert_eq!(report.stage("notify").unwrap().status, StageStatus::Ok);
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let runner = LocalRunner::new().register("echo", echo_stage());
        let report = runner.run(&echo_plan(), text_input("hi")).await.unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pipeline"], "echo");
        assert_eq!(json["success"], true);
        assert_eq!(json["stages"]["echo"]["status"], "ok");
        assert_eq!(json["outputs"]["echoed"]["type"], "text");
    }
}
