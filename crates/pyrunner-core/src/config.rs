//! Sandbox configuration

use crate::{Result, SandboxError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the sandbox executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Path to Python interpreter
    pub python_path: PathBuf,

    /// Root under which per-run working directories are created
    pub workdir_root: PathBuf,

    /// Shared reference data linked into every working directory as `datasets`
    pub datasets_dir: Option<PathBuf>,

    /// Unprivileged account submissions run as. `None` keeps the service
    /// identity and disables identity-wide cleanup.
    pub run_as: Option<String>,

    /// Hard wall-clock limit
    pub timeout: Duration,

    /// Captured stdout is truncated beyond this many bytes
    pub max_stdout_bytes: usize,

    /// Captured stderr is truncated beyond this many bytes
    pub max_stderr_bytes: usize,

    /// Address space limit in bytes
    pub memory_limit: u64,

    /// Maximum number of processes owned by the restricted identity
    pub max_pids: u32,

    /// Largest file the submission may write, in bytes
    pub max_file_size: u64,

    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python_path: PathBuf::from("/usr/bin/python3"),
            workdir_root: PathBuf::from("/home/student"),
            datasets_dir: None,
            run_as: None,
            timeout: Duration::from_secs(30),
            max_stdout_bytes: 1000,
            max_stderr_bytes: 1000,
            memory_limit: 2 * 1024 * 1024 * 1024, // 2GB of address space
            max_pids: 64,
            max_file_size: 16 * 1024 * 1024, // 16MB
            env: vec![
                ("PATH".into(), "/usr/local/bin:/usr/bin:/bin".into()),
                ("LANG".into(), "C.UTF-8".into()),
                // BLAS thread pools count against max_pids
                ("OPENBLAS_NUM_THREADS".into(), "1".into()),
                ("OMP_NUM_THREADS".into(), "1".into()),
            ],
        }
    }
}

impl SandboxConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }

    /// Defaults overlaid with `RUNNER__*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay settings looked up through `lookup`, keyed by `RUNNER__*` names
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(secs) = lookup("RUNNER__TIMEOUT") {
            self.timeout = Duration::from_secs(parse_var("RUNNER__TIMEOUT", &secs)?);
        }
        if let Some(bytes) = lookup("RUNNER__MAX_STDOUT_SIZE") {
            self.max_stdout_bytes = parse_var("RUNNER__MAX_STDOUT_SIZE", &bytes)?;
        }
        if let Some(bytes) = lookup("RUNNER__MAX_STDERR_SIZE") {
            self.max_stderr_bytes = parse_var("RUNNER__MAX_STDERR_SIZE", &bytes)?;
        }
        if let Some(bytes) = lookup("RUNNER__MEMORY_LIMIT") {
            self.memory_limit = parse_var("RUNNER__MEMORY_LIMIT", &bytes)?;
        }
        if let Some(user) = lookup("RUNNER__USER") {
            self.run_as = Some(user).filter(|u| !u.is_empty());
        }
        if let Some(path) = lookup("RUNNER__WORKDIR_ROOT") {
            self.workdir_root = PathBuf::from(path);
        }
        if let Some(path) = lookup("RUNNER__DATASETS") {
            self.datasets_dir = Some(PathBuf::from(path)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(path) = lookup("RUNNER__PYTHON") {
            self.python_path = PathBuf::from(path);
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings the executor cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(SandboxError::Config("timeout must be positive".into()));
        }
        if self.max_pids == 0 {
            return Err(SandboxError::Config("max_pids must be positive".into()));
        }
        if self.memory_limit == 0 {
            return Err(SandboxError::Config("memory_limit must be positive".into()));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| SandboxError::Config(format!("invalid {key}={value:?}: {e}")))
}

/// Builder for SandboxConfig
#[derive(Debug, Default)]
pub struct SandboxConfigBuilder {
    config: SandboxConfig,
}

impl SandboxConfigBuilder {
    #[must_use]
    pub fn python_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.python_path = path.into();
        self
    }

    #[must_use]
    pub fn workdir_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.workdir_root = path.into();
        self
    }

    #[must_use]
    pub fn datasets_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.datasets_dir = Some(path.into());
        self
    }

    #[must_use]
    pub fn run_as(mut self, user: impl Into<String>) -> Self {
        self.config.run_as = Some(user.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.config.timeout = duration;
        self
    }

    #[must_use]
    pub fn timeout_secs(self, secs: u64) -> Self {
        self.timeout(Duration::from_secs(secs))
    }

    #[must_use]
    pub fn max_stdout_bytes(mut self, bytes: usize) -> Self {
        self.config.max_stdout_bytes = bytes;
        self
    }

    #[must_use]
    pub fn max_stderr_bytes(mut self, bytes: usize) -> Self {
        self.config.max_stderr_bytes = bytes;
        self
    }

    #[must_use]
    pub fn memory_limit(mut self, bytes: u64) -> Self {
        self.config.memory_limit = bytes;
        self
    }

    #[must_use]
    pub fn memory_limit_mb(self, mb: u64) -> Self {
        self.memory_limit(mb * 1024 * 1024)
    }

    #[must_use]
    pub fn max_pids(mut self, pids: u32) -> Self {
        self.config.max_pids = pids;
        self
    }

    #[must_use]
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn build(self) -> SandboxConfig {
        self.config
    }
}

/// Get default socket path from PYRUNNER_SOCKET env var or system default
///
/// Returns:
/// - `$PYRUNNER_SOCKET` if set (for development)
/// - `/run/pyrunner/pyrunner.sock` otherwise (production)
pub fn default_socket_path() -> PathBuf {
    std::env::var("PYRUNNER_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/run/pyrunner/pyrunner.sock"))
}
