//! Response aggregation: key-field extraction, confidence fusion, metadata merge.

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

/// Per-step outcome fed into the aggregator. `skipped` marks an optional step
/// that exhausted its retries without succeeding.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub tool_name: String,
    pub output: Value,
    pub decision_id: Option<String>,
    pub duration_ms: u64,
    pub ab_test_group: Option<String>,
    pub shadow_mode_active: bool,
    pub skipped: bool,
}

#[derive(Debug, Clone)]
pub struct AggregatedResult {
    pub workflow: String,
    pub executed_at: chrono::DateTime<chrono::Utc>,
    pub results: IndexMap<String, Value>,
    pub confidence: f64,
    pub metadata: Value,
}

/// Well-known key fields to lift out of a tool's raw output, by tool name. Tools
/// outside this table are passed through verbatim.
fn extract_key_fields(tool_name: &str, output: &Value) -> Value {
    let known_fields: &[&str] = match tool_name {
        "CompanyQualityTool" => &["quality_score", "quality_tier", "confidence", "key_factors"],
        "ContactTierTool" => &["tier", "confidence", "reasons"],
        "TimingScoreTool" => &["timing_score", "confidence", "optimal_window"],
        "BankingProductMatchTool" => &["matched_products", "confidence", "match_score"],
        _ => return output.clone(),
    };
    let Some(obj) = output.as_object() else {
        return output.clone();
    };
    let mut extracted = Map::new();
    for field in known_fields {
        if let Some(v) = obj.get(*field) {
            extracted.insert((*field).to_string(), v.clone());
        }
    }
    if extracted.is_empty() {
        output.clone()
    } else {
        Value::Object(extracted)
    }
}

fn confidence_of(output: &Value) -> Option<f64> {
    let direct = output.get("confidence").and_then(Value::as_f64);
    direct.or_else(|| {
        output
            .get("metadata")
            .and_then(|m| m.get("confidence"))
            .and_then(Value::as_f64)
    })
}

/// Geometric mean of the positive confidence values present in `outcomes`;
/// `0.5` when none are present.
fn fuse_confidence(outcomes: &[StepOutcome]) -> f64 {
    let values: Vec<f64> = outcomes
        .iter()
        .filter(|o| !o.skipped)
        .filter_map(|o| confidence_of(&o.output))
        .filter(|v| *v > 0.0)
        .collect();
    if values.is_empty() {
        return 0.5;
    }
    let product: f64 = values.iter().product();
    let geomean = product.powf(1.0 / values.len() as f64);
    (geomean * 100.0).round() / 100.0
}

fn build_metadata(workflow: &str, workflow_version: &str, outcomes: &[StepOutcome]) -> Value {
    let tools_executed: Vec<String> = outcomes.iter().map(|o| o.tool_name.clone()).collect();

    let mut decision_ids = Map::new();
    let mut execution_times_ms = Map::new();
    let mut ab_test_groups = Map::new();
    let mut shadow_mode_active = Map::new();

    for outcome in outcomes {
        if let Some(id) = &outcome.decision_id {
            decision_ids.insert(outcome.tool_name.clone(), json!(id));
        }
        execution_times_ms.insert(outcome.tool_name.clone(), json!(outcome.duration_ms));
        if let Some(group) = &outcome.ab_test_group {
            ab_test_groups.insert(outcome.tool_name.clone(), json!(group));
        }
        shadow_mode_active.insert(outcome.tool_name.clone(), json!(outcome.shadow_mode_active));
    }

    json!({
        "workflow_id": workflow,
        "workflow_version": workflow_version,
        "tools_executed": tools_executed,
        "decision_ids": decision_ids,
        "execution_times_ms": execution_times_ms,
        "ab_test_groups": ab_test_groups,
        "shadow_mode_active": shadow_mode_active,
    })
}

/// Fold a workflow's step outcomes into an [`AggregatedResult`]. `outcomes` must
/// already be in planner order — the aggregator preserves it rather than
/// re-sorting.
pub fn aggregate(workflow: &str, workflow_version: &str, outcomes: &[StepOutcome]) -> AggregatedResult {
    let mut results = IndexMap::new();
    for outcome in outcomes {
        let value = if outcome.skipped {
            outcome.output.clone()
        } else {
            extract_key_fields(&outcome.tool_name, &outcome.output)
        };
        // Last-writer-wins when two steps bind the same tool name (open question #2).
        results.insert(outcome.tool_name.clone(), value);
    }

    AggregatedResult {
        workflow: workflow.to_string(),
        executed_at: chrono::Utc::now(),
        confidence: fuse_confidence(outcomes),
        metadata: build_metadata(workflow, workflow_version, outcomes),
        results,
    }
}
