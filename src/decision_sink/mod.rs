//! Write-only sink for decision logging, shadow-mode comparisons, and A/B
//! distribution metadata.
//!
//! The router and engine call this fire-and-forget: a sink failure is logged
//! and never affects the request path.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct DecisionRecord {
    pub tool_name: String,
    pub input: Value,
    pub output: Value,
    pub decision_id: String,
}

#[async_trait]
pub trait DecisionSink: Send + Sync {
    async fn record(&self, record: DecisionRecord) -> anyhow::Result<()>;
}

/// Default sink: emits a structured log line and nothing else. Suitable until a
/// durable store is wired up externally.
pub struct LoggingSink;

#[async_trait]
impl DecisionSink for LoggingSink {
    async fn record(&self, record: DecisionRecord) -> anyhow::Result<()> {
        tracing::info!(
            tool = %record.tool_name,
            decision_id = %record.decision_id,
            "decision recorded"
        );
        Ok(())
    }
}

/// Calls `sink.record`, logging (not propagating) any failure.
pub async fn record_best_effort(sink: &dyn DecisionSink, record: DecisionRecord) {
    if let Err(e) = sink.record(record).await {
        warn!(error = %e, "decision sink failed");
    }
}
