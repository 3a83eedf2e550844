//! Per-tool circuit breaker state machine.

use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
enum CircuitState {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open { .. } => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout: std::time::Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: std::time::Duration::from_secs(60),
        }
    }
}

struct Breaker {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
        }
    }
}

/// Keyed collection of per-tool circuit breakers, created lazily on first call.
/// Each breaker's counters live behind their own lock so unrelated tools never
/// contend with each other.
pub struct CircuitBreakerRegistry {
    breakers: Mutex<HashMap<String, Breaker>>,
    config: BreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Returns `true` if a call to `tool` should proceed, transitioning
    /// OPEN -> HALF_OPEN when the open window has elapsed.
    pub async fn should_allow(&self, tool: &str) -> bool {
        let mut breakers = self.breakers.lock().await;
        let breaker = breakers.entry(tool.to_string()).or_insert_with(Breaker::new);
        match breaker.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open { since } => {
                if since.elapsed() > self.config.open_timeout {
                    info!(tool, "circuit breaker half-opening after timeout");
                    breaker.state = CircuitState::HalfOpen;
                    breaker.success_count = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self, tool: &str) {
        let mut breakers = self.breakers.lock().await;
        let breaker = breakers.entry(tool.to_string()).or_insert_with(Breaker::new);
        match breaker.state {
            CircuitState::Closed => {
                breaker.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                breaker.success_count += 1;
                if breaker.success_count >= self.config.success_threshold {
                    info!(tool, "circuit breaker closing after recovery");
                    breaker.state = CircuitState::Closed;
                    breaker.failure_count = 0;
                    breaker.success_count = 0;
                }
            }
            CircuitState::Open { .. } => {}
        }
    }

    pub async fn record_failure(&self, tool: &str) {
        let mut breakers = self.breakers.lock().await;
        let breaker = breakers.entry(tool.to_string()).or_insert_with(Breaker::new);
        match breaker.state {
            CircuitState::Closed => {
                breaker.failure_count += 1;
                if breaker.failure_count >= self.config.failure_threshold {
                    warn!(tool, "circuit breaker opening");
                    breaker.state = CircuitState::Open {
                        since: Instant::now(),
                    };
                }
            }
            CircuitState::HalfOpen => {
                warn!(tool, "circuit breaker reopening after probe failure");
                breaker.state = CircuitState::Open {
                    since: Instant::now(),
                };
                breaker.success_count = 0;
            }
            CircuitState::Open { .. } => {}
        }
    }
}
