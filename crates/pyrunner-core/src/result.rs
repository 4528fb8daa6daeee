//! Execution result types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stderr reported for a run that hit the wall-clock limit
pub const TIMEOUT_MESSAGE: &str = "Execution timed out";

/// Result of a sandboxed code execution
///
/// Field names on the wire follow the runner service contract:
/// `{stdout, stderr, return_code, timeout}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured standard output, truncated to the configured cap
    pub stdout: String,

    /// Captured standard error, truncated to the configured cap
    pub stderr: String,

    /// Exit status, or the negated signal number when the process was killed.
    /// `None` when the run timed out or never started.
    #[serde(rename = "return_code")]
    pub exit_code: Option<i32>,

    /// Whether the run was killed because of the wall-clock limit
    #[serde(rename = "timeout")]
    pub timed_out: bool,

    /// Wall-clock duration of the run
    #[serde(skip)]
    pub duration: Duration,
}

impl ExecutionResult {
    /// Result for a run that exceeded its time budget
    #[must_use]
    pub fn timed_out(duration: Duration) -> Self {
        Self {
            stdout: String::new(),
            stderr: TIMEOUT_MESSAGE.to_string(),
            exit_code: None,
            timed_out: true,
            duration,
        }
    }

    /// Result for a run whose interpreter could not be started
    #[must_use]
    pub fn spawn_failed(diagnostic: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: diagnostic.into(),
            exit_code: None,
            timed_out: false,
            duration: Duration::ZERO,
        }
    }

    /// Check if execution was successful (exit code 0, no timeout)
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Whether the submission wrote anything to stderr
    #[must_use]
    pub fn has_stderr(&self) -> bool {
        !self.stderr.is_empty()
    }
}

/// Decode captured bytes, dropping an incomplete UTF-8 sequence left at the
/// end by truncation. Invalid bytes elsewhere are replaced.
#[must_use]
pub fn decode_output(mut bytes: Vec<u8>) -> String {
    if let Err(e) = std::str::from_utf8(&bytes) {
        if e.error_len().is_none() {
            bytes.truncate(e.valid_up_to());
        }
    }
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_result_has_empty_stdout_and_message() {
        let result = ExecutionResult::timed_out(Duration::from_secs(3));
        assert!(result.timed_out);
        assert!(result.stdout.is_empty());
        assert_eq!(result.stderr, TIMEOUT_MESSAGE);
        assert_eq!(result.exit_code, None);
        assert!(!result.is_success());
    }

    #[test]
    fn serializes_with_runner_field_names() {
        let result = ExecutionResult {
            stdout: "hi\n".into(),
            stderr: String::new(),
            exit_code: Some(0),
            timed_out: false,
            duration: Duration::from_millis(12),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "stdout": "hi\n",
                "stderr": "",
                "return_code": 0,
                "timeout": false,
            })
        );
    }

    #[test]
    fn decode_drops_split_multibyte_tail() {
        // "é" is 0xC3 0xA9; keep only the first byte
        let bytes = vec![b'a', 0xC3];
        assert_eq!(decode_output(bytes), "a");
    }

    #[test]
    fn decode_replaces_invalid_bytes_in_the_middle() {
        let bytes = vec![b'a', 0xFF, b'b'];
        assert_eq!(decode_output(bytes), "a\u{FFFD}b");
    }
}
