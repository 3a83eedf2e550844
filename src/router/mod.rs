//! Envelope validation and dispatch to the single-tool or workflow path.

use crate::breaker::CircuitBreakerRegistry;
use crate::decision_sink::{DecisionRecord, DecisionSink, record_best_effort};
use crate::errors::AgentHubError;
use crate::registry::ToolRegistry;
use crate::workflow::engine::{self, CancellationToken};
use crate::workflow::WorkflowDefinition;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RouteRequest {
    SingleTool {
        tool_name: String,
        input: Value,
    },
    Workflow {
        workflow_name: String,
        input: Value,
    },
}

/// Owns the workflow definition catalog and fans single-tool calls and
/// workflow runs out to the registry/engine. One instance is shared across
/// both the HTTP adapter and the MCP server.
pub struct Router {
    pub registry: Arc<ToolRegistry>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub sink: Arc<dyn DecisionSink>,
    workflows: RwLock<HashMap<String, WorkflowDefinition>>,
}

impl Router {
    pub fn new(
        registry: Arc<ToolRegistry>,
        breakers: Arc<CircuitBreakerRegistry>,
        sink: Arc<dyn DecisionSink>,
    ) -> Self {
        Self {
            registry,
            breakers,
            sink,
            workflows: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register_workflow(&self, def: WorkflowDefinition) -> Result<(), AgentHubError> {
        def.validate()?;
        crate::workflow::plan(&def)?;
        let mut workflows = self.workflows.write().await;
        workflows.insert(def.name.clone(), def);
        Ok(())
    }

    pub async fn list_workflows(&self) -> Vec<WorkflowDefinition> {
        let workflows = self.workflows.read().await;
        let mut list: Vec<_> = workflows.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    pub async fn route(&self, request: RouteRequest) -> Result<Value, AgentHubError> {
        let started = Instant::now();
        match request {
            RouteRequest::SingleTool { tool_name, input } => {
                let output = self.route_single_tool(&tool_name, input.clone()).await?;
                let mut response = match output {
                    Value::Object(map) => map,
                    other => {
                        let mut m = serde_json::Map::new();
                        m.insert("result".to_string(), other);
                        m
                    }
                };
                response.insert(
                    "_routing".to_string(),
                    json!({
                        "type": "single-tool",
                        "duration_ms": started.elapsed().as_millis() as u64,
                        "routed_at": chrono::Utc::now(),
                    }),
                );
                Ok(Value::Object(response))
            }
            RouteRequest::Workflow { workflow_name, input } => {
                let def = {
                    let workflows = self.workflows.read().await;
                    workflows
                        .get(&workflow_name)
                        .cloned()
                        .ok_or_else(|| AgentHubError::WorkflowNotFound(workflow_name.clone()))?
                };
                let result = engine::execute(
                    &self.registry,
                    &self.breakers,
                    self.sink.as_ref(),
                    &def,
                    input,
                    CancellationToken::new(),
                )
                .await?;
                let mut response = match result.to_json() {
                    Value::Object(map) => map,
                    _ => unreachable!("to_json always returns an object"),
                };
                response.insert(
                    "_routing".to_string(),
                    json!({
                        "type": "workflow",
                        "duration_ms": started.elapsed().as_millis() as u64,
                        "routed_at": chrono::Utc::now(),
                    }),
                );
                Ok(Value::Object(response))
            }
        }
    }

    async fn route_single_tool(&self, tool_name: &str, input: Value) -> Result<Value, AgentHubError> {
        debug!(tool = %tool_name, "routing single-tool call");
        let (descriptor, instance) = self.registry.get(tool_name).await?;

        if let Ok(Err(errors)) = crate::schema::validate(&descriptor.input_schema, &input) {
            return Err(AgentHubError::InvalidInput {
                tool: tool_name.to_string(),
                details: errors.join("; "),
            });
        }

        if !self.breakers.should_allow(tool_name).await {
            return Err(AgentHubError::CircuitOpen(tool_name.to_string()));
        }

        let timeout = descriptor.sla.timeout();
        let owned_input = input.clone();
        let task = tokio::spawn(async move { instance.execute(owned_input).await });
        let outcome = tokio::time::timeout(timeout, task).await;

        let result = match outcome {
            Ok(Ok(Ok(value))) => {
                self.breakers.record_success(tool_name).await;
                Ok(value)
            }
            Ok(Ok(Err(e))) => {
                self.breakers.record_failure(tool_name).await;
                Err(AgentHubError::ToolError {
                    tool: tool_name.to_string(),
                    message: e.to_string(),
                })
            }
            Ok(Err(join_err)) if join_err.is_panic() => {
                self.breakers.record_failure(tool_name).await;
                Err(AgentHubError::Internal(anyhow::anyhow!(
                    "tool {tool_name} panicked"
                )))
            }
            Ok(Err(_)) => Err(AgentHubError::Cancelled),
            Err(_) => {
                self.breakers.record_failure(tool_name).await;
                Err(AgentHubError::Timeout(tool_name.to_string()))
            }
        }?;

        crate::schema::validate_output_non_fatal(tool_name, &descriptor.output_schema, &result);

        record_best_effort(
            self.sink.as_ref(),
            DecisionRecord {
                tool_name: tool_name.to_string(),
                input,
                output: result.clone(),
                decision_id: uuid::Uuid::new_v4().to_string(),
            },
        )
        .await;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::decision_sink::LoggingSink;
    use crate::registry::{Classification, Sla, Tool, ToolCapabilities, ToolDescriptor};
    use async_trait::async_trait;

    struct QualityTool;

    #[async_trait]
    impl Tool for QualityTool {
        async fn execute(&self, _input: Value) -> anyhow::Result<Value> {
            Ok(json!({
                "quality_score": 85,
                "quality_tier": "High-Value",
                "confidence": 0.92,
                "key_factors": ["UAE_VERIFIED", "HIGH_SALARY"]
            }))
        }
    }

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            display_name: name.to_string(),
            version: "1.0.0".into(),
            classification: Classification::Strict,
            input_schema: json!({"type": "object", "required": ["company_name"]}),
            output_schema: json!({"type": "object"}),
            sla: Sla { p50_ms: 50, p95_ms: 100, error_rate_threshold: 0.05 },
            capabilities: ToolCapabilities::default(),
            dependencies: vec![],
        }
    }

    async fn router() -> Router {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(descriptor("CompanyQualityTool"), Arc::new(QualityTool))
            .await
            .unwrap();
        Router::new(
            registry,
            Arc::new(CircuitBreakerRegistry::new(BreakerConfig::default())),
            Arc::new(LoggingSink),
        )
    }

    #[tokio::test]
    async fn single_tool_happy_path() {
        let r = router().await;
        let response = r
            .route(RouteRequest::SingleTool {
                tool_name: "CompanyQualityTool".into(),
                input: json!({"company_name": "TechCorp UAE", "size": 150}),
            })
            .await
            .unwrap();
        assert_eq!(response["quality_score"], json!(85));
        assert_eq!(response["_routing"]["type"], json!("single-tool"));
    }

    #[tokio::test]
    async fn invalid_input_rejected_before_tool_runs() {
        let r = router().await;
        let err = r
            .route(RouteRequest::SingleTool {
                tool_name: "CompanyQualityTool".into(),
                input: json!({}),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let r = router().await;
        let err = r
            .route(RouteRequest::SingleTool {
                tool_name: "Ghost".into(),
                input: json!({}),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TOOL_NOT_FOUND");
    }

    #[tokio::test]
    async fn unknown_workflow_is_not_found() {
        let r = router().await;
        let err = r
            .route(RouteRequest::Workflow {
                workflow_name: "ghost".into(),
                input: json!({}),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "WORKFLOW_NOT_FOUND");
    }
}
