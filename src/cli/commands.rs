use crate::breaker::CircuitBreakerRegistry;
use crate::config::{Config, loader};
use crate::decision_sink::LoggingSink;
use crate::http::{self, HttpState};
use crate::mcp::{self, ToolNameTable};
use crate::registry::ToolRegistry;
use crate::router::Router;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "agent-hub")]
#[command(about = "Centralized dispatch and orchestration core for decision tools")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP adapter and the MCP stdio server
    Serve,
    /// List every registered tool and its status
    ListTools,
    /// List every registered workflow definition
    ListWorkflows,
    /// Check the config file parses and passes validation
    ValidateConfig,
    /// Run startup diagnostics
    Doctor,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => serve().await,
        Commands::ListTools => list_tools().await,
        Commands::ListWorkflows => list_workflows().await,
        Commands::ValidateConfig => validate_config(),
        Commands::Doctor => crate::cli::doctor::doctor_command().await,
    }
}

fn validate_config() -> Result<()> {
    let path = loader::get_config_path()?;
    loader::load_config(None)?;
    println!("{} is valid", path.display());
    Ok(())
}

/// Wires up the registry, breaker, and router that both front doors share.
///
/// Real deployments link this crate as a library and call
/// [`crate::registry::ToolRegistry::register`] for their own tools before
/// calling [`serve`]; the binary on its own starts with an empty catalog,
/// since tool implementations are outside this core.
pub async fn build_core(config: &Config) -> Result<Arc<Router>> {
    let registry = Arc::new(ToolRegistry::new());
    registry
        .start_health_probe(Duration::from_millis(config.server.health_probe_interval_ms))
        .await;
    let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker_config()));
    let router = Arc::new(Router::new(registry, breakers, Arc::new(LoggingSink)));
    Ok(router)
}

async fn serve() -> Result<()> {
    let config = loader::load_config(None)?;
    info!(
        host = %config.server.http_host,
        port = config.server.http_port,
        "starting agent hub"
    );
    let router = build_core(&config).await?;

    if router.registry.len().await == 0 {
        tracing::warn!("no tools registered; this process is a bare scaffold until a caller registers tools");
    }

    let bind_addr = format!("{}:{}", config.server.http_host, config.server.http_port);
    http::start(&bind_addr, HttpState { router: router.clone() }).await?;

    let mcp_router = router.clone();
    let mcp_task = tokio::spawn(async move { mcp::serve_stdio(mcp_router, ToolNameTable::default()).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        result = mcp_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "mcp server exited with error"),
                Err(join_err) => tracing::error!(error = %join_err, "mcp server task panicked"),
            }
        }
    }

    router.registry.stop_health_probe().await;
    Ok(())
}

async fn list_tools() -> Result<()> {
    let config = loader::load_config(None)?;
    let router = build_core(&config).await?;
    router.registry.probe_once().await;
    let tools = router.registry.list().await;
    if tools.is_empty() {
        println!("no tools registered");
        return Ok(());
    }
    for t in tools {
        println!(
            "{:<30} v{:<10} {:<10?} p95={}ms",
            t.descriptor.name, t.descriptor.version, t.status, t.descriptor.sla.p95_ms
        );
    }
    Ok(())
}

async fn list_workflows() -> Result<()> {
    let config = loader::load_config(None)?;
    let router = build_core(&config).await?;
    let workflows = router.list_workflows().await;
    if workflows.is_empty() {
        println!("no workflows registered");
        return Ok(());
    }
    for w in workflows {
        println!(
            "{:<30} v{:<10} steps={:<3} mode={:?}",
            w.name,
            w.version,
            w.steps.len(),
            w.config.mode
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_core_starts_with_empty_registry() {
        let router = build_core(&Config::default()).await.unwrap();
        assert_eq!(router.registry.len().await, 0);
        router.registry.stop_health_probe().await;
    }
}
