//! Daemon configuration

use anyhow::Context;
use pyrunner_core::SandboxConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an optional JSON configuration file
pub const CONFIG_ENV: &str = "PYRUNNER_CONFIG";

/// Configuration for the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to Unix socket
    pub socket_path: PathBuf,

    /// Executions allowed to run at once
    pub gate_capacity: usize,

    /// Sandbox configuration for every execution
    pub sandbox: SandboxConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: pyrunner_core::config::default_socket_path(),
            gate_capacity: 1,
            sandbox: SandboxConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Defaults, then the file named by `PYRUNNER_CONFIG`, then `RUNNER__*`
    /// variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.sandbox = config
            .sandbox
            .with_overrides(|key| std::env::var(key).ok())
            .context("invalid RUNNER__ settings")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn default_runs_one_at_a_time() {
        assert_eq!(DaemonConfig::default().gate_capacity, 1);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pyrunner.json");
        std::fs::write(
            &path,
            r#"{"socket_path": "/tmp/test.sock", "sandbox": {"timeout": {"secs": 5, "nanos": 0}}}"#,
        )
        .unwrap();

        let config = DaemonConfig::from_file(&path).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/test.sock"));
        assert_eq!(config.gate_capacity, 1);
        assert_eq!(config.sandbox.timeout, Duration::from_secs(5));
        assert_eq!(config.sandbox.max_stdout_bytes, 1000);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        assert!(DaemonConfig::from_file(Path::new("/nonexistent/pyrunner.json")).is_err());
    }
}
