//! Loading rule documents from an exercises tree
//!
//! Layout: `<root>/modules/module_<m>/tasks/task_<t>.yaml`, with `.json`
//! accepted when no YAML file exists.

use crate::{error::LoadError, rules::TaskRuleSet, Result};
use std::path::{Path, PathBuf};

/// Parse a YAML rule document
pub fn from_yaml_str(doc: &str) -> Result<TaskRuleSet> {
    Ok(serde_yaml::from_str(doc)?)
}

/// Parse a JSON rule document
pub fn from_json_str(doc: &str) -> Result<TaskRuleSet> {
    Ok(serde_json::from_str(doc)?)
}

/// Load a rule document, choosing the format by extension. Anything that
/// is not `.json` is read as YAML.
pub fn load_file(path: &Path) -> Result<TaskRuleSet> {
    let doc = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let rules = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => from_json_str(&doc)?,
        _ => from_yaml_str(&doc)?,
    };
    tracing::debug!(path = ?path, checks = rules.checks.len(), "rule document loaded");
    Ok(rules)
}

/// Path of the YAML document for a task
#[must_use]
pub fn task_path(root: &Path, module: &str, task: &str) -> PathBuf {
    root.join("modules")
        .join(format!("module_{module}"))
        .join("tasks")
        .join(format!("task_{task}.yaml"))
}

/// Load the rules of `task` in `module`
pub fn load_task(root: &Path, module: &str, task: &str) -> Result<TaskRuleSet> {
    let yaml = task_path(root, module, task);
    let json = yaml.with_extension("json");

    [yaml, json]
        .into_iter()
        .find(|path| path.is_file())
        .map_or_else(
            || {
                Err(LoadError::NotFound {
                    root: root.to_path_buf(),
                    module: module.to_owned(),
                    task: task.to_owned(),
                })
            },
            |path| load_file(&path),
        )
}
