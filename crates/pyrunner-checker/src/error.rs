//! Error types for pyrunner-checker

use std::path::PathBuf;
use thiserror::Error;

/// A rule document could not be loaded
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no rule document for module {module} task {task} under {}", root.display())]
    NotFound {
        root: PathBuf,
        module: String,
        task: String,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML rule document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON rule document: {0}")]
    Json(#[from] serde_json::Error),
}
