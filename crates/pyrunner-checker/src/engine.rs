//! Ordered evaluation of a rule set against one submission

use crate::{
    checks,
    rules::{CheckSpec, TaskRuleSet},
    syntax::{self, SyntaxError},
};
use rustpython_parser::ast;
use std::cell::OnceCell;
use std::fmt;

/// Outcome of a check or of a whole rule set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Failure(String),
    ParseError(SyntaxError),
}

impl Verdict {
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Replace the diagnostic of a failure. Passes and parse errors are
    /// returned unchanged.
    #[must_use]
    pub fn with_message(self, message: Option<&str>) -> Self {
        match (self, message) {
            (Self::Failure(_), Some(message)) => Self::Failure(message.to_owned()),
            (verdict, _) => verdict,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::Failure(message) => f.write_str(message),
            Self::ParseError(err) => write!(f, "{err}"),
        }
    }
}

/// Source and captured stdout of one run. The syntax tree is built on first
/// use and shared by every check.
pub struct Submission<'a> {
    code: &'a str,
    stdout: &'a str,
    tree: OnceCell<Result<ast::Suite, SyntaxError>>,
}

impl<'a> Submission<'a> {
    #[must_use]
    pub const fn new(code: &'a str, stdout: &'a str) -> Self {
        Self {
            code,
            stdout,
            tree: OnceCell::new(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'a str {
        self.code
    }

    #[must_use]
    pub const fn stdout(&self) -> &'a str {
        self.stdout
    }

    pub fn tree(&self) -> Result<&ast::Suite, SyntaxError> {
        self.tree
            .get_or_init(|| syntax::parse(self.code))
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl fmt::Debug for Submission<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("code_len", &self.code.len())
            .field("stdout_len", &self.stdout.len())
            .field("parsed", &self.tree.get().is_some())
            .finish()
    }
}

/// Run a single check
#[must_use]
pub fn run_check(submission: &Submission<'_>, check: &CheckSpec) -> Verdict {
    let verdict = match check {
        CheckSpec::Var { expected, .. } => checks::var(submission, &expected.var, &expected.value),
        CheckSpec::Call { expected, .. } => {
            checks::call(submission, &expected.func, expected.args.as_deref())
        }
        CheckSpec::Output { expected, .. } => {
            checks::output(submission.stdout(), &expected.stdout, expected.include)
        }
        CheckSpec::Contains { expected, .. } => checks::contains(submission.code(), &expected.code),
    };
    verdict.with_message(check.message())
}

/// Evaluate `rules` in order. The first verdict that is not a pass ends the
/// evaluation.
#[must_use]
pub fn evaluate(code: &str, stdout: &str, rules: &TaskRuleSet) -> Verdict {
    let submission = Submission::new(code, stdout);

    for (index, check) in rules.checks.iter().enumerate() {
        let verdict = run_check(&submission, check);
        if !verdict.is_pass() {
            tracing::debug!(index, kind = check.kind(), %verdict, "check did not pass");
            return verdict;
        }
    }

    tracing::debug!(checks = rules.checks.len(), "all checks passed");
    Verdict::Pass
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(yaml: &str) -> TaskRuleSet {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn empty_rule_set_passes() {
        assert_eq!(evaluate("", "", &TaskRuleSet { checks: vec![] }), Verdict::Pass);
    }

    #[test]
    fn all_checks_must_pass() {
        let rules = rules(
            r"
checks:
  - { type: var, expected: { var: total, value: 6 } }
  - { type: call, expected: { func: print, args: [total] } }
  - { type: output, expected: { stdout: '6' } }
  - { type: contains, expected: { code: 'total = 1 + 2 + 3' } }
",
        );
        let code = "total = 1 + 2 + 3\ntotal = 6\nprint(total)\n";
        assert_eq!(evaluate(code, "6\n", &rules), Verdict::Pass);
    }

    #[test]
    fn first_failure_stops_evaluation() {
        let rules = rules(
            r"
checks:
  - { type: output, expected: { stdout: 'nope' }, message: first }
  - { type: var, expected: { var: x, value: 1 }, message: second }
",
        );
        // the second check would be a parse error
        let verdict = evaluate("x = (", "out", &rules);
        assert_eq!(verdict, Verdict::Failure("first".into()));
    }

    #[test]
    fn custom_message_replaces_failure_only() {
        let rules = rules(
            r"
checks:
  - { type: var, expected: { var: x, value: 1 }, message: 'Set x to 1' }
",
        );
        assert_eq!(evaluate("x = 2", "", &rules), Verdict::Failure("Set x to 1".into()));
        assert!(matches!(evaluate("x = = 1", "", &rules), Verdict::ParseError(_)));
        assert_eq!(evaluate("x = 1", "", &rules), Verdict::Pass);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let rules = rules(
            r"
checks:
  - { type: call, expected: { func: print, args: [1] } }
  - { type: var, expected: { var: y, value: 5 } }
",
        );
        let first = evaluate("print(1)", "1", &rules);
        let second = evaluate("print(1)", "1", &rules);
        assert_eq!(first, second);
        assert!(first.is_failure());
    }

    #[test]
    fn tree_is_parsed_once_and_shared() {
        let submission = Submission::new("x = 1", "");
        let first: *const ast::Suite = submission.tree().unwrap();
        let second: *const ast::Suite = submission.tree().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn output_and_contains_ignore_syntax_errors() {
        let rules = rules(
            r"
checks:
  - { type: output, expected: { stdout: 'ok' } }
  - { type: contains, expected: { code: 'print(' } }
",
        );
        assert_eq!(evaluate("print(", "ok", &rules), Verdict::Pass);
    }
}
