//! Read-only startup diagnostics, modeled on the project's usual doctor report:
//! a labeled checklist rather than a single pass/fail verdict.

use crate::config::loader;
use crate::registry::ToolStatus;
use anyhow::Result;

#[derive(Debug)]
enum CheckResult {
    Pass(String),
    Fail(String),
    Skip(String),
}

impl CheckResult {
    fn label(&self) -> &'static str {
        match self {
            Self::Pass(_) => "PASS",
            Self::Fail(_) => "FAIL",
            Self::Skip(_) => "SKIP",
        }
    }

    fn detail(&self) -> &str {
        match self {
            Self::Pass(s) | Self::Fail(s) | Self::Skip(s) => s,
        }
    }
}

fn print_check(name: &str, result: &CheckResult) {
    println!("  {:<6} {:<28} {}", result.label(), name, result.detail());
}

fn check_config_path() -> CheckResult {
    match loader::get_config_path() {
        Ok(path) if path.exists() => CheckResult::Pass(format!("{}", path.display())),
        Ok(path) => CheckResult::Skip(format!("not found at {} (defaults will be used)", path.display())),
        Err(e) => CheckResult::Fail(format!("cannot determine path: {e}")),
    }
}

fn check_config_loads() -> CheckResult {
    match loader::load_config(None) {
        Ok(_) => CheckResult::Pass("parsed and validated".to_string()),
        Err(e) => CheckResult::Fail(format!("{e}")),
    }
}

fn check_home_dir_writable() -> CheckResult {
    match loader::get_agent_hub_home() {
        Ok(home) => {
            if std::fs::create_dir_all(&home).is_ok() {
                let probe = home.join(".doctor_probe");
                match std::fs::write(&probe, b"ok") {
                    Ok(()) => {
                        let _ = std::fs::remove_file(&probe);
                        CheckResult::Pass(format!("{} (writable)", home.display()))
                    }
                    Err(e) => CheckResult::Fail(format!("{} (not writable: {e})", home.display())),
                }
            } else {
                CheckResult::Fail(format!("cannot create {}", home.display()))
            }
        }
        Err(e) => CheckResult::Fail(format!("cannot determine home: {e}")),
    }
}

pub async fn doctor_command() -> Result<()> {
    println!("agent-hub doctor\n{}", "=".repeat(60));

    let mut pass = 0u32;
    let mut fail = 0u32;
    let mut skip = 0u32;
    let mut record = |name: &str, result: CheckResult| {
        print_check(name, &result);
        match result {
            CheckResult::Pass(_) => pass += 1,
            CheckResult::Fail(_) => fail += 1,
            CheckResult::Skip(_) => skip += 1,
        }
    };

    println!("\n  Configuration");
    println!("  {}", "-".repeat(56));
    record("Config file", check_config_path());
    record("Config loads", check_config_loads());
    record("Home directory", check_home_dir_writable());

    println!("\n  Registry");
    println!("  {}", "-".repeat(56));
    let config = loader::load_config(None).unwrap_or_default();
    let router = super::commands::build_core(&config).await?;
    router.registry.probe_once().await;
    let tools = router.registry.list().await;
    let healthy = tools.iter().filter(|t| t.status == ToolStatus::Healthy).count();
    let offline = tools.iter().filter(|t| t.status == ToolStatus::Offline).count();
    record(
        "Registered tools",
        if tools.is_empty() {
            CheckResult::Skip("none registered".to_string())
        } else {
            CheckResult::Pass(format!("{} total, {} healthy, {} offline", tools.len(), healthy, offline))
        },
    );

    let workflows = router.list_workflows().await;
    record(
        "Registered workflows",
        if workflows.is_empty() {
            CheckResult::Skip("none registered".to_string())
        } else {
            CheckResult::Pass(format!("{} total", workflows.len()))
        },
    );
    router.registry.stop_health_probe().await;

    println!("\n{}", "=".repeat(60));
    println!("{pass} passed, {fail} failed, {skip} skipped");

    if fail > 0 {
        anyhow::bail!("{fail} check(s) failed");
    }
    Ok(())
}
