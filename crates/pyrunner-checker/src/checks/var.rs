//! Variable assignment check

use crate::{
    engine::{Submission, Verdict},
    syntax::{self, Visitor},
    value::Value,
};
use rustpython_parser::ast::{self, Expr, Stmt};

/// Check the value last assigned to `name` anywhere in the submission.
///
/// "Last" is by source position: a reassignment inside a branch that never
/// runs still counts.
#[must_use]
pub fn var(submission: &Submission<'_>, name: &str, expected: &Value) -> Verdict {
    let suite = match submission.tree() {
        Ok(suite) => suite,
        Err(err) => return Verdict::ParseError(err),
    };

    let mut finder = LastAssignment { name, found: None };
    syntax::walk_suite(&mut finder, suite);

    let Some((_, value)) = finder.found else {
        return Verdict::Failure(format!("variable `{name}` is not declared"));
    };

    let actual = syntax::value_of(value, submission.code()).normalized();
    if actual == expected.clone().normalized() {
        Verdict::Pass
    } else {
        Verdict::Failure(format!(
            "variable `{name}` was assigned {actual}, expected {expected}"
        ))
    }
}

struct LastAssignment<'a, 'n> {
    name: &'n str,
    /// Statement offset and right-hand side
    found: Option<(usize, &'a Expr)>,
}

impl LastAssignment<'_, '_> {
    fn is_target(&self, target: &Expr) -> bool {
        matches!(target, Expr::Name(ast::ExprName { id, .. }) if id.as_str() == self.name)
    }
}

impl<'a> Visitor<'a> for LastAssignment<'a, '_> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        let value = match stmt {
            Stmt::Assign(ast::StmtAssign { targets, value, .. })
                if targets.iter().any(|t| self.is_target(t)) =>
            {
                &**value
            }
            Stmt::AnnAssign(ast::StmtAnnAssign {
                target,
                value: Some(value),
                ..
            }) if self.is_target(target) => &**value,
            _ => return,
        };

        let offset = syntax::offset_of(stmt);
        if self.found.is_none_or(|(last, _)| offset >= last) {
            self.found = Some((offset, value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(code: &str, name: &str, expected: Value) -> Verdict {
        var(&Submission::new(code, ""), name, &expected)
    }

    #[test]
    fn simple_assignment_passes() {
        assert_eq!(check("x = 10", "x", Value::Int(10)), Verdict::Pass);
        assert_eq!(check("x = 10", "x", Value::Float(10.0)), Verdict::Pass);
    }

    #[test]
    fn last_assignment_wins() {
        let Verdict::Failure(message) = check("x = 1\nx = 2", "x", Value::Int(1)) else {
            panic!("expected failure");
        };
        assert!(message.contains('2'));
    }

    #[test]
    fn undeclared_variable_fails() {
        let Verdict::Failure(message) = check("x = 1", "y", Value::Int(5)) else {
            panic!("expected failure");
        };
        assert!(message.contains("not declared"));
    }

    #[test]
    fn strings_ignore_whitespace() {
        assert_eq!(check("s = 'a b  c'", "s", Value::Str("abc".into())), Verdict::Pass);
        assert_eq!(check("s = 'abc'", "s", Value::Str(" a b c ".into())), Verdict::Pass);
    }

    #[test]
    fn non_literal_compares_by_source() {
        let code = "import pandas as pd\nx = pd.DataFrame([1, 2, 3])";
        assert_eq!(
            check(code, "x", Value::Str("pd.DataFrame([1,2,3])".into())),
            Verdict::Pass
        );
    }

    #[test]
    fn nested_and_chained_assignments_are_found() {
        let code = "\
def f():
    for i in range(3):
        if i:
            a = b = [1, 2]
";
        let expected = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(check(code, "a", expected.clone()), Verdict::Pass);
        assert_eq!(check(code, "b", expected), Verdict::Pass);
    }

    #[test]
    fn annotated_assignment_counts() {
        assert_eq!(check("n: int = 3", "n", Value::Int(3)), Verdict::Pass);
        assert!(check("n: int", "n", Value::Int(3)).is_failure());
    }

    #[test]
    fn attribute_and_augmented_targets_are_ignored() {
        assert!(check("obj.x = 1\nx += 1", "x", Value::Int(1)).is_failure());
    }

    #[test]
    fn parse_error_is_reported() {
        assert!(matches!(check("x = = 1", "x", Value::Int(1)), Verdict::ParseError(_)));
    }
}
