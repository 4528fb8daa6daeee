//! Error types for pyrunner-core

use thiserror::Error;

/// Faults of the execution harness itself.
///
/// A submission that crashes, exits non-zero or runs out of time is not an
/// error: those outcomes are reported through [`crate::ExecutionResult`].
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("working directory error: {0}")]
    Workdir(String),

    #[error("identity error: {0}")]
    Identity(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),

    #[error("configuration error: {0}")]
    Config(String),
}
