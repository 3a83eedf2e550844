//! Tool capability contract and the live tool registry.

use crate::errors::AgentHubError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A tool is any object exposing a single operation: take a structured input,
/// return a structured output or a classified failure.
///
/// The core never introspects tool internals beyond this contract. Implementations
/// must be safe to invoke concurrently and must respect task cancellation — the
/// registry and engine will abandon a call once its timeout elapses.
#[async_trait]
pub trait Tool: Send + Sync {
    async fn execute(&self, input: Value) -> anyhow::Result<Value>;

    /// Optional benign input used by the health probe. Tools that return `None`
    /// are never probed and default to `healthy` forever.
    fn health_input(&self) -> Option<Value> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Strict,
    Delegated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sla {
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub error_rate_threshold: f64,
}

impl Sla {
    /// Per-call timeout derived from the descriptor: `2 * p95Ms`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.p95_ms.saturating_mul(2))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCapabilities {
    /// Declared but not enforced by the engine: all tools are assumed reentrant
    /// regardless of this flag's value.
    #[serde(default = "default_true")]
    pub batch_execution: bool,
}

fn default_true() -> bool {
    true
}

/// Immutable metadata about a tool, created at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub classification: Classification,
    pub input_schema: Value,
    pub output_schema: Value,
    pub sla: Sla,
    #[serde(default)]
    pub capabilities: ToolCapabilities,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Healthy,
    Degraded,
    Offline,
}

/// Snapshot of a registry entry, safe to hand out to callers (no tool instance).
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    #[serde(flatten)]
    pub descriptor: ToolDescriptor,
    pub status: ToolStatus,
    pub last_health_at: Option<chrono::DateTime<chrono::Utc>>,
    pub registered_at: chrono::DateTime<chrono::Utc>,
}

struct ToolRecord {
    descriptor: ToolDescriptor,
    instance: Arc<dyn Tool>,
    status: ToolStatus,
    last_health_at: Option<chrono::DateTime<chrono::Utc>>,
    registered_at: chrono::DateTime<chrono::Utc>,
}

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Keeps every registered tool's descriptor and live instance, and owns the
/// periodic health probe. Registration/status updates take the write lock;
/// lookup and listing take a read lock — registration is rare, lookups are
/// on the hot path of every request.
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, ToolRecord>>>,
    probe_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
            probe_handle: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn register(
        &self,
        descriptor: ToolDescriptor,
        instance: Arc<dyn Tool>,
    ) -> Result<(), AgentHubError> {
        if descriptor.name.trim().is_empty() {
            return Err(AgentHubError::InvalidDescriptor(
                "tool descriptor name must not be empty".into(),
            ));
        }
        if crate::schema::CompiledSchema::compile(&descriptor.input_schema).is_err() {
            return Err(AgentHubError::InvalidDescriptor(format!(
                "{}: input schema does not compile",
                descriptor.name
            )));
        }
        if crate::schema::CompiledSchema::compile(&descriptor.output_schema).is_err() {
            return Err(AgentHubError::InvalidDescriptor(format!(
                "{}: output schema does not compile",
                descriptor.name
            )));
        }
        if descriptor.sla.p50_ms == 0
            || descriptor.sla.p95_ms == 0
            || descriptor.sla.error_rate_threshold <= 0.0
        {
            return Err(AgentHubError::InvalidDescriptor(format!(
                "{}: sla values must be positive (p50_ms, p95_ms, error_rate_threshold)",
                descriptor.name
            )));
        }
        let mut tools = self.tools.write().await;
        if tools.contains_key(&descriptor.name) {
            return Err(AgentHubError::DuplicateTool(descriptor.name));
        }
        info!(tool = %descriptor.name, "registering tool");
        tools.insert(
            descriptor.name.clone(),
            ToolRecord {
                descriptor,
                instance,
                status: ToolStatus::Healthy,
                last_health_at: None,
                registered_at: chrono::Utc::now(),
            },
        );
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<(ToolDescriptor, Arc<dyn Tool>), AgentHubError> {
        let tools = self.tools.read().await;
        let record = tools
            .get(name)
            .ok_or_else(|| AgentHubError::ToolNotFound(name.to_string()))?;
        if record.status == ToolStatus::Offline {
            return Err(AgentHubError::ToolOffline(name.to_string()));
        }
        debug!(tool = %name, "registry lookup");
        Ok((record.descriptor.clone(), Arc::clone(&record.instance)))
    }

    pub async fn list(&self) -> Vec<ToolSummary> {
        let tools = self.tools.read().await;
        let mut summaries: Vec<ToolSummary> = tools
            .values()
            .map(|r| ToolSummary {
                descriptor: r.descriptor.clone(),
                status: r.status,
                last_health_at: r.last_health_at,
                registered_at: r.registered_at,
            })
            .collect();
        summaries.sort_by(|a, b| a.descriptor.name.cmp(&b.descriptor.name));
        summaries
    }

    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Run one probe sweep immediately, synchronously. Used by `/ready` and tests
    /// that don't want to wait on the background interval.
    pub async fn probe_once(&self) {
        let names: Vec<String> = {
            let tools = self.tools.read().await;
            tools.keys().cloned().collect()
        };
        for name in names {
            self.probe_one(&name).await;
        }
    }

    async fn probe_one(&self, name: &str) {
        let (instance, health_input) = {
            let tools = self.tools.read().await;
            let Some(record) = tools.get(name) else {
                return;
            };
            let Some(input) = record.instance.health_input() else {
                return;
            };
            (Arc::clone(&record.instance), input)
        };

        let outcome = tokio::time::timeout(HEALTH_PROBE_TIMEOUT, instance.execute(health_input)).await;
        let mut tools = self.tools.write().await;
        let Some(record) = tools.get_mut(name) else {
            return;
        };
        record.last_health_at = Some(chrono::Utc::now());
        let new_status = match outcome {
            Ok(Ok(_)) => ToolStatus::Healthy,
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "health probe failed");
                ToolStatus::Offline
            }
            Err(_) => {
                warn!(tool = %name, "health probe timed out");
                ToolStatus::Offline
            }
        };
        if new_status != record.status {
            info!(tool = %name, from = ?record.status, to = ?new_status, "tool health changed");
        }
        record.status = new_status;
    }

    /// Start the background health-probe loop at `interval`. Replaces any
    /// previously running probe task.
    pub async fn start_health_probe(self: &Arc<Self>, interval: Duration) {
        self.stop_health_probe().await;
        let registry = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.probe_once().await;
            }
        });
        *self.probe_handle.lock().await = Some(handle);
    }

    /// Stop the health probe and guarantee no probe is in flight on return.
    pub async fn stop_health_probe(&self) {
        if let Some(handle) = self.probe_handle.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}
