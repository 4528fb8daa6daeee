//! # pyrunner-checker
//!
//! Grades a submission against an ordered list of declarative checks by
//! inspecting its syntax tree, its raw source and its captured stdout. The
//! submission is never executed here.

#![allow(clippy::module_name_repetitions)]

pub mod checks;
pub mod engine;
pub mod error;
pub mod loader;
pub mod rules;
pub mod syntax;
pub mod value;

pub use engine::{evaluate, Submission, Verdict};
pub use error::LoadError;
pub use loader::load_task;
pub use rules::{CheckSpec, TaskRuleSet};
pub use syntax::SyntaxError;
pub use value::Value;

/// Crate-level result type
pub type Result<T> = std::result::Result<T, LoadError>;
