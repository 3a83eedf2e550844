use thiserror::Error;

/// Typed error hierarchy for the dispatch core.
///
/// Use at module boundaries (router, engine, registry, adapters). Internal/leaf
/// functions can continue using `anyhow::Result` — the `Internal` variant allows
/// seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum AgentHubError {
    #[error("invalid request envelope: {0}")]
    InvalidRequest(String),

    #[error("invalid input for tool {tool}: {details}")]
    InvalidInput { tool: String, details: String },

    #[error("invalid tool descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("duplicate tool: {0}")]
    DuplicateTool(String),

    #[error("invalid workflow {0}")]
    InvalidWorkflow(String),

    #[error("circular dependency detected in workflow: {0}")]
    CircularDependency(String),

    #[error("tool offline: {0}")]
    ToolOffline(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("circuit open for tool: {0}")]
    CircuitOpen(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("tool {tool} failed: {message}")]
    ToolError { tool: String, message: String },

    #[error("step {step_id} failed: {cause}")]
    StepFailed {
        step_id: String,
        #[source]
        cause: Box<AgentHubError>,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AgentHubError {
    /// Whether the engine should retry an attempt that failed with this error.
    ///
    /// `CIRCUIT_OPEN` is deliberately excluded — the breaker already throttles,
    /// retrying inside the same call would just spin against an open breaker.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transient(_))
    }

    /// Stable machine-readable taxonomy tag, used in the HTTP error envelope and
    /// as MCP error data.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidDescriptor(_) => "INVALID_DESCRIPTOR",
            Self::ToolNotFound(_) => "TOOL_NOT_FOUND",
            Self::WorkflowNotFound(_) => "WORKFLOW_NOT_FOUND",
            Self::DuplicateTool(_) => "DUPLICATE_TOOL",
            Self::InvalidWorkflow(_) => "INVALID_WORKFLOW",
            Self::CircularDependency(_) => "CIRCULAR_DEPENDENCY",
            Self::ToolOffline(_) => "TOOL_OFFLINE",
            Self::Timeout(_) => "TIMEOUT",
            Self::CircuitOpen(_) => "CIRCUIT_OPEN",
            Self::Transient(_) => "TRANSIENT",
            Self::ToolError { .. } => "TOOL_ERROR",
            Self::StepFailed { .. } => "STEP_FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP status code this error maps to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) | Self::InvalidInput { .. } | Self::InvalidDescriptor(_)
            | Self::InvalidWorkflow(_) | Self::CircularDependency(_) => 400,
            Self::ToolNotFound(_) | Self::WorkflowNotFound(_) => 404,
            Self::Timeout(_) => 408,
            Self::CircuitOpen(_) | Self::ToolOffline(_) => 503,
            Self::DuplicateTool(_) => 409,
            Self::Transient(_) | Self::ToolError { .. } | Self::StepFailed { .. }
            | Self::Cancelled | Self::Internal(_) => 500,
        }
    }
}
