//! Workflow definitions and the dependency planner.

pub mod engine;
pub mod path;

use crate::errors::AgentHubError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub mode: ExecutionMode,
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub tool_name: String,
    #[serde(default)]
    pub input_mapping: HashMap<String, String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    pub config: WorkflowConfig,
}

impl WorkflowDefinition {
    /// Structural validation performed at registration time: unique step ids,
    /// dependencies that resolve to a step within the same workflow.
    pub fn validate(&self) -> Result<(), AgentHubError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(AgentHubError::InvalidWorkflow(format!(
                    "duplicate step id: {}",
                    step.id
                )));
            }
        }
        for step in &self.steps {
            for dep in &step.dependencies {
                if !seen.contains(dep.as_str()) {
                    return Err(AgentHubError::InvalidWorkflow(format!(
                        "step {} depends on unknown step {}",
                        step.id, dep
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    Visiting,
    Visited,
}

/// Depth-first topological sort with three-color cycle detection.
/// The returned order is deterministic for a given input step order.
pub fn plan(def: &WorkflowDefinition) -> Result<Vec<WorkflowStep>, AgentHubError> {
    def.validate()?;

    let by_id: HashMap<&str, &WorkflowStep> =
        def.steps.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut color: HashMap<&str, Color> =
        def.steps.iter().map(|s| (s.id.as_str(), Color::Unvisited)).collect();
    let mut order: Vec<String> = Vec::with_capacity(def.steps.len());

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a WorkflowStep>,
        color: &mut HashMap<&'a str, Color>,
        order: &mut Vec<String>,
    ) -> Result<(), AgentHubError> {
        match color.get(id) {
            Some(Color::Visited) => return Ok(()),
            Some(Color::Visiting) => {
                return Err(AgentHubError::CircularDependency(id.to_string()));
            }
            _ => {}
        }
        color.insert(id, Color::Visiting);
        let step = by_id[id];
        for dep in &step.dependencies {
            visit(dep.as_str(), by_id, color, order)?;
        }
        color.insert(id, Color::Visited);
        order.push(id.to_string());
        Ok(())
    }

    for step in &def.steps {
        visit(step.id.as_str(), &by_id, &mut color, &mut order)?;
    }

    Ok(order.into_iter().map(|id| by_id[id.as_str()].clone()).collect())
}

/// Partition an already-planned (topologically sorted) step list into waves by
/// dependency depth, for parallel execution.
pub fn into_waves(planned: Vec<WorkflowStep>) -> Vec<Vec<WorkflowStep>> {
    let mut depth: HashMap<String, usize> = HashMap::new();
    for step in &planned {
        let d = step
            .dependencies
            .iter()
            .map(|dep| depth.get(dep).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        depth.insert(step.id.clone(), d);
    }
    let max_depth = depth.values().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<WorkflowStep>> = (0..=max_depth).map(|_| Vec::new()).collect();
    for step in planned {
        let d = depth[&step.id];
        waves[d].push(step);
    }
    waves.retain(|w| !w.is_empty());
    waves
}
