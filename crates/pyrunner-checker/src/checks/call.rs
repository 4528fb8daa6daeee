//! Function call check

use crate::{
    engine::{Submission, Verdict},
    syntax::{self, Visitor},
    value::{Value, ValueList},
};
use rustpython_parser::ast::{self, Expr};

/// Check the last call of `func`, either as a bare name or as a method.
///
/// Without `expected_args` the call only has to exist. Otherwise every
/// expected argument must be among the actual ones; extra actual arguments
/// are fine.
#[must_use]
pub fn call(submission: &Submission<'_>, func: &str, expected_args: Option<&[Value]>) -> Verdict {
    let suite = match submission.tree() {
        Ok(suite) => suite,
        Err(err) => return Verdict::ParseError(err),
    };

    let mut finder = LastCall { func, found: None };
    syntax::walk_suite(&mut finder, suite);

    let Some((_, found)) = finder.found else {
        return Verdict::Failure(format!("call to function `{func}` not found"));
    };
    let Some(expected_args) = expected_args else {
        return Verdict::Pass;
    };

    let actual = actual_args(found, submission.code());
    let expected: Vec<Value> = expected_args
        .iter()
        .cloned()
        .map(|arg| arg.into_expected_arg().normalized())
        .collect();

    if expected.iter().all(|arg| actual.contains(arg)) {
        Verdict::Pass
    } else {
        Verdict::Failure(format!(
            "function `{func}` called with arguments {}, expected {}",
            ValueList(&actual),
            ValueList(expected_args)
        ))
    }
}

/// Positional arguments as values, keyword arguments as pairs
fn actual_args(call: &ast::ExprCall, source: &str) -> Vec<Value> {
    let positional = call.args.iter().map(|arg| syntax::value_of(arg, source));
    let keywords = call.keywords.iter().map(|keyword| {
        let value = syntax::value_of(&keyword.value, source);
        match &keyword.arg {
            Some(name) => Value::Pair(name.as_str().to_owned(), Box::new(value)),
            None => Value::SourceFallback(format!("**{value}")),
        }
    });
    positional.chain(keywords).map(Value::normalized).collect()
}

struct LastCall<'a, 'n> {
    func: &'n str,
    found: Option<(usize, &'a ast::ExprCall)>,
}

impl<'a> Visitor<'a> for LastCall<'a, '_> {
    fn visit_expr(&mut self, expr: &'a Expr) {
        let Expr::Call(call) = expr else {
            return;
        };
        let name = match call.func.as_ref() {
            Expr::Name(ast::ExprName { id, .. }) => id.as_str(),
            Expr::Attribute(ast::ExprAttribute { attr, .. }) => attr.as_str(),
            _ => return,
        };
        if name != self.func {
            return;
        }

        let offset = syntax::offset_of(expr);
        if self.found.is_none_or(|(last, _)| offset >= last) {
            self.found = Some((offset, call));
        }
    }
}
