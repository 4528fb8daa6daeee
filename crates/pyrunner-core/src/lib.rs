//! # pyrunner-core
//!
//! Execution of untrusted Python submissions in throwaway working
//! directories.
//!
//! This crate provides:
//! - [`SandboxExecutor`]: one run per call, restricted identity, rlimits,
//!   wall-clock timeout and capped output
//! - [`AdmissionGate`] / [`GatedExecutor`]: FIFO admission in front of it
//! - the length-prefixed msgpack protocol and a Unix socket [`Client`]

#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod gate;
pub mod protocol;
pub mod result;

pub use client::Client;
pub use config::SandboxConfig;
pub use error::SandboxError;
pub use executor::SandboxExecutor;
pub use gate::{AdmissionGate, GateStatus, GatedExecutor};
pub use result::ExecutionResult;

/// Crate-level result type
pub type Result<T> = std::result::Result<T, SandboxError>;
