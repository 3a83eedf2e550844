//! Locate, load, and persist the on-disk config, following the
//! home-dir-plus-locked-file pattern used throughout this codebase for any
//! config that may be read and written concurrently.

use super::Config;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs;
use std::path::{Path, PathBuf};

#[allow(unused_imports)]
use tracing::warn;

pub fn get_agent_hub_home() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("AGENT_HUB_HOME") {
        return Ok(PathBuf::from(home));
    }
    Ok(dirs::home_dir()
        .context("could not determine home directory")?
        .join(".agent-hub"))
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_agent_hub_home()?.join("config.toml"))
}

pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.toml"));
    let path = config_path.unwrap_or(default_path.as_path());

    let mut config = if path.exists() {
        let file = fs::File::open(path)
            .with_context(|| format!("failed to open config at {}", path.display()))?;
        file.lock_shared()
            .context("failed to acquire shared lock on config file")?;
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        // Lock released when `file` drops at end of scope.
        toml::from_str(&content).with_context(|| "failed to parse config TOML")?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);
    check_file_permissions(path);
    config.validate().context("configuration validation failed")?;
    Ok(config)
}

/// Applies the four startup knobs as environment overrides, layered on top of
/// whatever the file (or the default) already set.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(raw) = std::env::var("ENTERPRISE_SIZE_THRESHOLD")
        && let Ok(value) = raw.parse()
    {
        config.enterprise_size_threshold = Some(value);
    }
    if let Ok(raw) = std::env::var("HEALTH_PROBE_INTERVAL_MS")
        && let Ok(value) = raw.parse()
    {
        config.server.health_probe_interval_ms = value;
    }
    if let Ok(raw) = std::env::var("BREAKER_FAILURE_THRESHOLD")
        && let Ok(value) = raw.parse()
    {
        config.breaker.failure_threshold = value;
    }
    if let Ok(raw) = std::env::var("BREAKER_SUCCESS_THRESHOLD")
        && let Ok(value) = raw.parse()
    {
        config.breaker.success_threshold = value;
    }
    if let Ok(raw) = std::env::var("BREAKER_OPEN_TIMEOUT_MS")
        && let Ok(value) = raw.parse()
    {
        config.breaker.open_timeout_ms = value;
    }
}

#[cfg(unix)]
fn check_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Once;

    static WARNED: Once = Once::new();
    WARNED.call_once(|| {
        if let Ok(meta) = std::fs::metadata(path) {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "config file {} has permissions {:o} — recommend 0600",
                    path.display(),
                    mode & 0o777
                );
            }
        }
    });
}

#[cfg(not(unix))]
fn check_file_permissions(_path: &Path) {}

pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<()> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.toml"));
    let path = config_path.unwrap_or(default_path.as_path());

    let parent = path.parent().context("config path has no parent")?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create directory: {}", parent.display()))?;

    // A separate lockfile is needed because the atomic write below uses
    // rename(), which invalidates flock on the original inode.
    let lock_path = path.with_extension("toml.lock");
    let lock_file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("failed to create lock file at {}", lock_path.display()))?;
    lock_file
        .lock_exclusive()
        .context("failed to acquire exclusive lock on config lock file")?;

    let content = toml::to_string_pretty(config)?;
    atomic_write(path, &content)
        .with_context(|| format!("failed to write config to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }

    Ok(())
}

fn atomic_write(path: &Path, content: &str) -> Result<()> {
    use std::io::Write;

    let parent = path.parent().context("path has no parent directory")?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = tmp.as_file().set_permissions(fs::Permissions::from_mode(0o600));
    }
    tmp.write_all(content.as_bytes())
        .context("failed to write to temp file")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("failed to atomically rename to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.http_port, 8080);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.server.http_port = 9090;
        save_config(&config, Some(&path)).unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.server.http_port, 9090);
    }

    #[test]
    fn env_override_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        save_config(&Config::default(), Some(&path)).unwrap();
        // SAFETY: test runs single-threaded within this process for this var.
        unsafe { std::env::set_var("BREAKER_FAILURE_THRESHOLD", "9") };
        let config = load_config(Some(&path)).unwrap();
        unsafe { std::env::remove_var("BREAKER_FAILURE_THRESHOLD") };
        assert_eq!(config.breaker.failure_threshold, 9);
    }
}
