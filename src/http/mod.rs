//! HTTP/JSON adapter around the router.

use crate::errors::AgentHubError;
use crate::router::{RouteRequest, Router};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct HttpState {
    pub router: Arc<Router>,
}

pub fn build_router(state: HttpState) -> AxumRouter {
    AxumRouter::new()
        .route("/v1/execute-tool", post(execute_tool))
        .route("/v1/execute-workflow", post(execute_workflow))
        .route("/v1/tools", get(list_tools))
        .route("/v1/workflows", get(list_workflows))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
}

pub async fn start(bind_addr: &str, state: HttpState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = bind_addr, "HTTP adapter listening");
    let app = build_router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "HTTP server exited with error");
        }
    });
    Ok(())
}

impl IntoResponse for AgentHubError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
                "details": Value::Null,
                "timestamp": chrono::Utc::now(),
                "request_id": uuid::Uuid::new_v4().to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[derive(serde::Deserialize)]
struct ExecuteToolBody {
    tool_name: String,
    input: Value,
}

async fn execute_tool(
    State(state): State<HttpState>,
    raw: Bytes,
) -> Result<Json<Value>, AgentHubError> {
    let body: ExecuteToolBody = serde_json::from_slice(&raw)
        .map_err(|e| AgentHubError::InvalidRequest(e.to_string()))?;
    debug!(tool = %body.tool_name, "POST /v1/execute-tool");
    let result = state
        .router
        .route(RouteRequest::SingleTool {
            tool_name: body.tool_name,
            input: body.input,
        })
        .await?;
    Ok(Json(result))
}

#[derive(serde::Deserialize)]
struct ExecuteWorkflowBody {
    workflow_name: String,
    input: Value,
}

async fn execute_workflow(
    State(state): State<HttpState>,
    raw: Bytes,
) -> Result<Json<Value>, AgentHubError> {
    let body: ExecuteWorkflowBody = serde_json::from_slice(&raw)
        .map_err(|e| AgentHubError::InvalidRequest(e.to_string()))?;
    debug!(workflow = %body.workflow_name, "POST /v1/execute-workflow");
    let result = state
        .router
        .route(RouteRequest::Workflow {
            workflow_name: body.workflow_name,
            input: body.input,
        })
        .await?;
    Ok(Json(result))
}

async fn list_tools(State(state): State<HttpState>) -> Json<Value> {
    let tools = state.router.registry.list().await;
    Json(json!({ "tools": tools }))
}

async fn list_workflows(State(state): State<HttpState>) -> Json<Value> {
    let workflows = state.router.list_workflows().await;
    Json(json!({ "workflows": workflows }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Ready iff the registry has completed at least one health sweep and at
/// least one tool is healthy.
async fn ready(State(state): State<HttpState>) -> Response {
    let tools = state.router.registry.list().await;
    let swept = tools.iter().any(|t| t.last_health_at.is_some());
    let any_healthy = tools
        .iter()
        .any(|t| t.status == crate::registry::ToolStatus::Healthy);
    if swept && any_healthy {
        (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not-ready" })),
        )
            .into_response()
    }
}

#[allow(dead_code)]
const DEFAULT_READY_POLL: Duration = Duration::from_secs(1);
