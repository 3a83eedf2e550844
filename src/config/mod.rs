//! Startup configuration: server bind address, health-probe interval, circuit
//! breaker defaults, and the enterprise-size passthrough knob.

pub mod loader;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http_host: String,
    pub http_port: u16,
    pub health_probe_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_host: "127.0.0.1".to_string(),
            http_port: 8080,
            health_probe_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub breaker: BreakerSettings,
    /// Opaque passthrough; the core never reads this itself.
    pub enterprise_size_threshold: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            breaker: BreakerSettings::default(),
            enterprise_size_threshold: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.server.http_port > 0, "server.http_port must be non-zero");
        anyhow::ensure!(
            self.server.health_probe_interval_ms > 0,
            "server.health_probe_interval_ms must be positive"
        );
        anyhow::ensure!(
            self.breaker.failure_threshold >= 1,
            "breaker.failure_threshold must be >= 1"
        );
        anyhow::ensure!(
            self.breaker.success_threshold >= 1,
            "breaker.success_threshold must be >= 1"
        );
        anyhow::ensure!(
            self.breaker.open_timeout_ms > 0,
            "breaker.open_timeout_ms must be positive"
        );
        Ok(())
    }

    pub fn breaker_config(&self) -> crate::breaker::BreakerConfig {
        crate::breaker::BreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            success_threshold: self.breaker.success_threshold,
            open_timeout: std::time::Duration::from_millis(self.breaker.open_timeout_ms),
        }
    }
}
