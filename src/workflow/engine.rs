//! Workflow execution: sequential/parallel waves, retry with
//! backoff, per-attempt timeout, optional-step semantics, data-path input
//! mapping, and cancellation.

use super::path::resolve as resolve_path;
use super::{ExecutionMode, WorkflowDefinition, WorkflowStep, into_waves, plan};
use crate::aggregator::{AggregatedResult, StepOutcome, aggregate};
use crate::breaker::CircuitBreakerRegistry;
use crate::decision_sink::{DecisionRecord, DecisionSink, record_best_effort};
use crate::errors::AgentHubError;
use crate::registry::ToolRegistry;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

/// Cooperative cancellation signal shared between a workflow run's coordinator
/// and its in-flight step attempts. Tools are expected to observe cancellation
/// promptly; the engine does not wait for stragglers past their timeout.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Mutable run-scoped context: the workflow's raw input plus every completed
/// step's output, addressable by step id for data-path resolution.
struct ExecutionContext {
    input: Value,
    results_by_step: Mutex<Map<String, Value>>,
}

impl ExecutionContext {
    fn new(input: Value) -> Self {
        Self {
            input,
            results_by_step: Mutex::new(Map::new()),
        }
    }

    async fn snapshot(&self) -> Value {
        json!({
            "input": self.input,
            "results": Value::Object(self.results_by_step.lock().await.clone()),
        })
    }

    async fn record(&self, step_id: &str, value: Value) {
        self.results_by_step
            .lock()
            .await
            .insert(step_id.to_string(), value);
    }
}

fn build_step_input(step: &WorkflowStep, context_snapshot: &Value) -> Value {
    let mut input = Map::new();
    for (field, path) in &step.input_mapping {
        if let Some(value) = resolve_path(path, context_snapshot) {
            input.insert(field.clone(), value.clone());
        }
    }
    Value::Object(input)
}

/// Classify a tool failure into a taxonomy error, honoring an `AgentHubError`
/// carried inside the `anyhow` chain when present, defaulting to the
/// non-retryable `ToolError` kind otherwise.
fn classify_tool_error(tool: &str, error: anyhow::Error) -> AgentHubError {
    match error.downcast::<AgentHubError>() {
        Ok(typed) => typed,
        Err(e) => AgentHubError::ToolError {
            tool: tool.to_string(),
            message: e.to_string(),
        },
    }
}

struct AttemptOutcome {
    output: Value,
    duration_ms: u64,
}

/// Run a single attempt: breaker gate, spawned call with panic isolation,
/// per-attempt timeout.
async fn run_attempt(
    registry: &ToolRegistry,
    breakers: &CircuitBreakerRegistry,
    tool_name: &str,
    input: Value,
    timeout: Duration,
) -> Result<AttemptOutcome, AgentHubError> {
    if !breakers.should_allow(tool_name).await {
        return Err(AgentHubError::CircuitOpen(tool_name.to_string()));
    }

    let (descriptor, instance) = registry.get(tool_name).await?;
    let started = Instant::now();

    let task = tokio::spawn(async move { instance.execute(input).await });
    let outcome = tokio::time::timeout(timeout, task).await;

    let result = match outcome {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(classify_tool_error(tool_name, e)),
        Ok(Err(join_err)) if join_err.is_panic() => Err(AgentHubError::Internal(anyhow::anyhow!(
            "tool {tool_name} panicked"
        ))),
        Ok(Err(_)) => Err(AgentHubError::Cancelled),
        Err(_) => Err(AgentHubError::Timeout(tool_name.to_string())),
    };

    match &result {
        Ok(value) => {
            breakers.record_success(tool_name).await;
            crate::schema::validate_output_non_fatal(tool_name, &descriptor.output_schema, value);
        }
        Err(AgentHubError::CircuitOpen(_)) => {}
        Err(_) => breakers.record_failure(tool_name).await,
    }

    result.map(|output| AttemptOutcome {
        output,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

/// Execute one step end to end, including retries and optional-step absorption.
/// Returns `Ok(StepOutcome)` even for an absorbed optional failure; returns
/// `Err` only when the workflow must abort.
async fn execute_step(
    registry: &ToolRegistry,
    breakers: &CircuitBreakerRegistry,
    sink: &dyn DecisionSink,
    step: &WorkflowStep,
    workflow_config: &super::WorkflowConfig,
    context: &ExecutionContext,
    cancel: &CancellationToken,
) -> Result<StepOutcome, AgentHubError> {
    if cancel.is_cancelled() {
        return Err(AgentHubError::Cancelled);
    }

    let snapshot = context.snapshot().await;
    let input = build_step_input(step, &snapshot);
    let timeout = Duration::from_millis(workflow_config.timeout_ms);

    let mut attempt = 0u32;
    let mut last_error;
    loop {
        let race = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AgentHubError::Cancelled),
            r = run_attempt(registry, breakers, &step.tool_name, input.clone(), timeout) => r,
        };

        match race {
            Ok(attempt_outcome) => {
                context
                    .record(&step.id, attempt_outcome.output.clone())
                    .await;
                let decision_id = format!("{}-{}", step.id, uuid::Uuid::new_v4());
                record_best_effort(
                    sink,
                    DecisionRecord {
                        tool_name: step.tool_name.clone(),
                        input: input.clone(),
                        output: attempt_outcome.output.clone(),
                        decision_id: decision_id.clone(),
                    },
                )
                .await;
                return Ok(StepOutcome {
                    tool_name: step.tool_name.clone(),
                    output: attempt_outcome.output,
                    decision_id: Some(decision_id),
                    duration_ms: attempt_outcome.duration_ms,
                    ab_test_group: None,
                    shadow_mode_active: false,
                    skipped: false,
                });
            }
            Err(AgentHubError::Cancelled) => return Err(AgentHubError::Cancelled),
            Err(e) => {
                let retryable = e.is_retryable();
                last_error = e;
                if retryable && attempt < workflow_config.retry.max_retries {
                    attempt += 1;
                    debug!(
                        step = %step.id,
                        attempt,
                        error = %last_error,
                        "retrying step after backoff"
                    );
                    tokio::time::sleep(Duration::from_millis(workflow_config.retry.backoff_ms))
                        .await;
                    continue;
                }
                break;
            }
        }
    }

    if step.optional {
        warn!(step = %step.id, error = %last_error, "optional step failed, skipping");
        let skipped_value = json!({"error": last_error.to_string(), "skipped": true});
        context.record(&step.id, skipped_value.clone()).await;
        Ok(StepOutcome {
            tool_name: step.tool_name.clone(),
            output: skipped_value,
            decision_id: None,
            duration_ms: 0,
            ab_test_group: None,
            shadow_mode_active: false,
            skipped: true,
        })
    } else {
        Err(AgentHubError::StepFailed {
            step_id: step.id.clone(),
            cause: Box::new(last_error),
        })
    }
}

pub struct WorkflowRunResult {
    pub aggregated: AggregatedResult,
    pub workflow_id: String,
    pub mode: ExecutionMode,
    pub total_duration_ms: u64,
    pub steps_executed: usize,
    pub steps_total: usize,
}

impl WorkflowRunResult {
    /// Serialize to the wire shape adapters expose: aggregated fields plus the
    /// `_workflow` block.
    pub fn to_json(&self) -> Value {
        json!({
            "workflow": self.aggregated.workflow,
            "executed_at": self.aggregated.executed_at,
            "results": self.aggregated.results,
            "confidence": self.aggregated.confidence,
            "metadata": self.aggregated.metadata,
            "_workflow": {
                "id": self.workflow_id,
                "name": self.aggregated.workflow,
                "mode": self.mode,
                "total_duration_ms": self.total_duration_ms,
                "steps_executed": self.steps_executed,
                "steps_total": self.steps_total,
            },
        })
    }
}

/// Execute a workflow definition against `input`.
pub async fn execute(
    registry: &ToolRegistry,
    breakers: &CircuitBreakerRegistry,
    sink: &dyn DecisionSink,
    def: &WorkflowDefinition,
    input: Value,
    cancel: CancellationToken,
) -> Result<WorkflowRunResult, AgentHubError> {
    let started = Instant::now();
    let workflow_id = uuid::Uuid::new_v4().to_string();
    let planned = plan(def)?;
    let steps_total = planned.len();
    let context = ExecutionContext::new(input);

    let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(steps_total);

    match def.config.mode {
        ExecutionMode::Sequential => {
            for step in &planned {
                if cancel.is_cancelled() {
                    return Err(AgentHubError::Cancelled);
                }
                let outcome =
                    execute_step(registry, breakers, sink, step, &def.config, &context, &cancel)
                        .await?;
                outcomes.push(outcome);
            }
        }
        ExecutionMode::Parallel => {
            let waves = into_waves(planned);
            for wave in waves {
                if cancel.is_cancelled() {
                    return Err(AgentHubError::Cancelled);
                }
                let mut handles = Vec::with_capacity(wave.len());
                for step in wave {
                    let registry = registry;
                    let breakers = breakers;
                    let sink_ref = sink;
                    let context_ref = &context;
                    let cancel_ref = cancel.clone();
                    let config = &def.config;
                    handles.push(async move {
                        execute_step(registry, breakers, sink_ref, &step, config, context_ref, &cancel_ref)
                            .await
                    });
                }
                let results = futures_util::future::join_all(handles).await;
                for result in results {
                    outcomes.push(result?);
                }
            }
        }
    }

    info!(
        workflow = %def.name,
        workflow_id = %workflow_id,
        steps = outcomes.len(),
        "workflow run completed"
    );

    let aggregated = aggregate(&def.name, &def.version, &outcomes);
    Ok(WorkflowRunResult {
        aggregated,
        workflow_id,
        mode: def.config.mode,
        total_duration_ms: started.elapsed().as_millis() as u64,
        steps_executed: outcomes.len(),
        steps_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::decision_sink::LoggingSink;
    use crate::registry::{Classification, Sla, Tool, ToolCapabilities, ToolDescriptor};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            display_name: name.to_string(),
            version: "1.0.0".into(),
            classification: Classification::Strict,
            input_schema: json!({"type": "object"}),
            output_schema: json!({"type": "object"}),
            sla: Sla { p50_ms: 10, p95_ms: 20, error_rate_threshold: 0.1 },
            capabilities: ToolCapabilities::default(),
            dependencies: vec![],
        }
    }

    struct ConstTool(Value);

    #[async_trait]
    impl Tool for ConstTool {
        async fn execute(&self, _input: Value) -> anyhow::Result<Value> {
            Ok(self.0.clone())
        }
    }

    struct AlwaysFailTool;

    #[async_trait]
    impl Tool for AlwaysFailTool {
        async fn execute(&self, _input: Value) -> anyhow::Result<Value> {
            anyhow::bail!("always fails")
        }
    }

    struct FlakyTool {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        async fn execute(&self, _input: Value) -> anyhow::Result<Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(json!({"confidence": 0.9}))
        }
    }

    fn seq_step(id: &str, tool: &str, deps: &[&str], optional: bool) -> WorkflowStep {
        WorkflowStep {
            id: id.to_string(),
            tool_name: tool.to_string(),
            input_mapping: HashMap::new(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            optional,
        }
    }

    async fn harness() -> (ToolRegistry, CircuitBreakerRegistry) {
        (
            ToolRegistry::new(),
            CircuitBreakerRegistry::new(BreakerConfig::default()),
        )
    }

    #[tokio::test]
    async fn sequential_four_step_workflow_fuses_confidence() {
        let (registry, breakers) = harness().await;
        registry.register(descriptor("A"), Arc::new(ConstTool(json!({"confidence": 0.92})))).await.unwrap();
        registry.register(descriptor("B"), Arc::new(ConstTool(json!({"confidence": 0.95})))).await.unwrap();
        registry.register(descriptor("C"), Arc::new(ConstTool(json!({"confidence": 0.88})))).await.unwrap();
        registry.register(descriptor("D"), Arc::new(ConstTool(json!({"confidence": 0.90})))).await.unwrap();

        let def = WorkflowDefinition {
            name: "pipeline".into(),
            version: "1.0".into(),
            description: String::new(),
            steps: vec![
                seq_step("step_1", "A", &[], false),
                seq_step("step_2", "B", &["step_1"], false),
                seq_step("step_3", "C", &["step_2"], false),
                seq_step("step_4", "D", &["step_1"], false),
            ],
            config: super::super::WorkflowConfig {
                mode: ExecutionMode::Sequential,
                timeout_ms: 1000,
                retry: Default::default(),
            },
        };

        let result = execute(&registry, &breakers, &LoggingSink, &def, json!({}), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.steps_executed, 4);
        assert_eq!(result.aggregated.confidence, 0.91);
    }

    #[tokio::test]
    async fn optional_step_failure_is_absorbed() {
        let (registry, breakers) = harness().await;
        registry.register(descriptor("A"), Arc::new(ConstTool(json!({"confidence": 0.92})))).await.unwrap();
        registry.register(descriptor("Flaky"), Arc::new(AlwaysFailTool)).await.unwrap();

        let def = WorkflowDefinition {
            name: "wf".into(),
            version: "1.0".into(),
            description: String::new(),
            steps: vec![
                seq_step("step_1", "A", &[], false),
                seq_step("step_2", "Flaky", &[], true),
            ],
            config: super::super::WorkflowConfig {
                mode: ExecutionMode::Sequential,
                timeout_ms: 200,
                retry: Default::default(),
            },
        };

        let result = execute(&registry, &breakers, &LoggingSink, &def, json!({}), CancellationToken::new())
            .await
            .unwrap();
        assert!(result.aggregated.results["Flaky"]["skipped"].as_bool().unwrap());
        assert_eq!(result.aggregated.confidence, 0.92);
    }

    #[tokio::test]
    async fn non_optional_step_failure_aborts_workflow() {
        let (registry, breakers) = harness().await;
        registry.register(descriptor("Flaky"), Arc::new(AlwaysFailTool)).await.unwrap();

        let def = WorkflowDefinition {
            name: "wf".into(),
            version: "1.0".into(),
            description: String::new(),
            steps: vec![seq_step("step_1", "Flaky", &[], false)],
            config: super::super::WorkflowConfig {
                mode: ExecutionMode::Sequential,
                timeout_ms: 200,
                retry: Default::default(),
            },
        };

        let err = execute(&registry, &breakers, &LoggingSink, &def, json!({}), CancellationToken::new())
            .await
            .err()
            .expect("expected error");
        assert_eq!(err.code(), "STEP_FAILED");
    }

    #[tokio::test]
    async fn retries_and_succeeds_on_second_attempt() {
        let (registry, breakers) = harness().await;
        registry
            .register(
                descriptor("Flaky"),
                Arc::new(FlakyTool { calls: AtomicU32::new(0) }),
            )
            .await
            .unwrap();

        let def = WorkflowDefinition {
            name: "wf".into(),
            version: "1.0".into(),
            description: String::new(),
            steps: vec![seq_step("step_1", "Flaky", &[], false)],
            config: super::super::WorkflowConfig {
                mode: ExecutionMode::Sequential,
                timeout_ms: 100,
                retry: super::super::RetryConfig { max_retries: 1, backoff_ms: 10 },
            },
        };

        let started = Instant::now();
        let result = execute(&registry, &breakers, &LoggingSink, &def, json!({}), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.steps_executed, 1);
        assert!(started.elapsed() >= Duration::from_millis(110));
    }

    #[tokio::test]
    async fn empty_workflow_returns_default_confidence() {
        let (registry, breakers) = harness().await;
        let def = WorkflowDefinition {
            name: "empty".into(),
            version: "1.0".into(),
            description: String::new(),
            steps: vec![],
            config: super::super::WorkflowConfig {
                mode: ExecutionMode::Sequential,
                timeout_ms: 100,
                retry: Default::default(),
            },
        };
        let result = execute(&registry, &breakers, &LoggingSink, &def, json!({}), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.aggregated.confidence, 0.5);
        assert!(result.aggregated.results.is_empty());
    }

    #[tokio::test]
    async fn cancellation_aborts_before_further_steps() {
        let (registry, breakers) = harness().await;
        registry.register(descriptor("A"), Arc::new(ConstTool(json!({"confidence": 0.9})))).await.unwrap();

        let def = WorkflowDefinition {
            name: "wf".into(),
            version: "1.0".into(),
            description: String::new(),
            steps: vec![seq_step("step_1", "A", &[], false)],
            config: super::super::WorkflowConfig {
                mode: ExecutionMode::Sequential,
                timeout_ms: 100,
                retry: Default::default(),
            },
        };

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = execute(&registry, &breakers, &LoggingSink, &def, json!({}), cancel)
            .await
            .err()
            .expect("expected error");
        assert_eq!(err.code(), "CANCELLED");
    }

    #[tokio::test]
    async fn data_path_mapping_feeds_dependent_step() {
        let (registry, breakers) = harness().await;
        registry.register(descriptor("A"), Arc::new(ConstTool(json!({"quality_score": 85, "confidence": 0.9})))).await.unwrap();

        struct EchoInputTool;
        #[async_trait]
        impl Tool for EchoInputTool {
            async fn execute(&self, input: Value) -> anyhow::Result<Value> {
                Ok(json!({"received": input, "confidence": 0.9}))
            }
        }
        registry.register(descriptor("B"), Arc::new(EchoInputTool)).await.unwrap();

        let mut mapping = HashMap::new();
        mapping.insert(
            "upstream_score".to_string(),
            "$.results.step_1.quality_score".to_string(),
        );
        let step_b = WorkflowStep {
            id: "step_2".into(),
            tool_name: "B".into(),
            input_mapping: mapping,
            dependencies: vec!["step_1".into()],
            optional: false,
        };

        let def = WorkflowDefinition {
            name: "wf".into(),
            version: "1.0".into(),
            description: String::new(),
            steps: vec![seq_step("step_1", "A", &[], false), step_b],
            config: super::super::WorkflowConfig {
                mode: ExecutionMode::Sequential,
                timeout_ms: 200,
                retry: Default::default(),
            },
        };

        let result = execute(&registry, &breakers, &LoggingSink, &def, json!({}), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.aggregated.results["B"]["received"]["upstream_score"], json!(85));
    }
}
