//! Rule documents

use crate::value::Value;
use serde::Deserialize;

/// Ordered checks for one task
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskRuleSet {
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
}

/// One declared check. `message` replaces the generated diagnostic when the
/// check fails.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckSpec {
    Var {
        expected: VarExpectation,
        #[serde(default)]
        message: Option<String>,
    },
    Call {
        expected: CallExpectation,
        #[serde(default)]
        message: Option<String>,
    },
    Output {
        expected: OutputExpectation,
        #[serde(default)]
        message: Option<String>,
    },
    Contains {
        expected: ContainsExpectation,
        #[serde(default)]
        message: Option<String>,
    },
}

impl CheckSpec {
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Var { message, .. }
            | Self::Call { message, .. }
            | Self::Output { message, .. }
            | Self::Contains { message, .. } => message.as_deref(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Var { .. } => "var",
            Self::Call { .. } => "call",
            Self::Output { .. } => "output",
            Self::Contains { .. } => "contains",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VarExpectation {
    pub var: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallExpectation {
    pub func: String,
    /// Bare entries are positional, `[name, value]` entries are keywords.
    /// `None` only requires the call to exist.
    #[serde(default)]
    pub args: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputExpectation {
    pub stdout: String,
    #[serde(default)]
    pub include: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainsExpectation {
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_check_type() {
        let doc = r#"
checks:
  - type: var
    expected: { var: total, value: 15 }
  - type: call
    expected:
      func: print
      args: [123, ["sep", "\t"]]
    message: Use print with sep
  - type: call
    expected: { func: sum }
  - type: output
    expected: { stdout: "15", include: true }
  - type: contains
    expected: { code: "for x in items" }
"#;
        let rules: TaskRuleSet = serde_yaml::from_str(doc).unwrap();
        assert_eq!(rules.checks.len(), 5);
        assert_eq!(rules.checks[0].kind(), "var");
        assert_eq!(rules.checks[1].message(), Some("Use print with sep"));
        assert!(matches!(
            &rules.checks[2],
            CheckSpec::Call { expected: CallExpectation { args: None, .. }, .. }
        ));
        assert!(matches!(
            &rules.checks[3],
            CheckSpec::Output { expected: OutputExpectation { include: true, .. }, .. }
        ));
    }

    #[test]
    fn include_defaults_to_exact_match() {
        let check: CheckSpec =
            serde_json::from_str(r#"{"type": "output", "expected": {"stdout": "hi"}}"#).unwrap();
        assert!(matches!(
            check,
            CheckSpec::Output { expected: OutputExpectation { include: false, .. }, message: None }
        ));
    }

    #[test]
    fn unknown_check_type_is_rejected() {
        let result: Result<CheckSpec, _> =
            serde_json::from_str(r#"{"type": "regex", "expected": {}}"#);
        assert!(result.is_err());
    }
}
