//! Parsing and traversal of submission syntax trees

use crate::value::Value;
use rustpython_parser::ast::{self, Constant, Expr, Ranged, Stmt};
use rustpython_parser::Parse;
use std::fmt;

/// Name reported for the submission in parser diagnostics
const SOURCE_PATH: &str = "<submission>";

/// The submission could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    /// Byte offset into the source
    pub offset: usize,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyntaxError: {} (at byte {})", self.message, self.offset)
    }
}

impl std::error::Error for SyntaxError {}

pub fn parse(source: &str) -> Result<ast::Suite, SyntaxError> {
    ast::Suite::parse(source, SOURCE_PATH).map_err(|e| SyntaxError {
        message: e.error.to_string(),
        offset: usize::from(e.offset),
    })
}

/// Callbacks for [`walk_suite`]
pub trait Visitor<'a> {
    fn visit_stmt(&mut self, _stmt: &'a Stmt) {}
    fn visit_expr(&mut self, _expr: &'a Expr) {}
}

/// Visit every statement and expression of `body`, at any depth
pub fn walk_suite<'a, V: Visitor<'a>>(visitor: &mut V, body: &'a [Stmt]) {
    for stmt in body {
        walk_stmt(visitor, stmt);
    }
}

fn walk_stmt<'a, V: Visitor<'a>>(v: &mut V, stmt: &'a Stmt) {
    v.visit_stmt(stmt);

    match stmt {
        Stmt::FunctionDef(ast::StmtFunctionDef { decorator_list, args, returns, body, .. })
        | Stmt::AsyncFunctionDef(ast::StmtAsyncFunctionDef { decorator_list, args, returns, body, .. }) => {
            walk_exprs(v, decorator_list);
            walk_arguments(v, args);
            if let Some(returns) = returns {
                walk_expr(v, returns);
            }
            walk_suite(v, body);
        }
        Stmt::ClassDef(ast::StmtClassDef { bases, keywords, decorator_list, body, .. }) => {
            walk_exprs(v, decorator_list);
            walk_exprs(v, bases);
            for keyword in keywords {
                walk_expr(v, &keyword.value);
            }
            walk_suite(v, body);
        }
        Stmt::Return(ast::StmtReturn { value, .. }) => walk_opt(v, value.as_deref()),
        Stmt::Delete(ast::StmtDelete { targets, .. }) => walk_exprs(v, targets),
        Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
            walk_exprs(v, targets);
            walk_expr(v, value);
        }
        Stmt::AugAssign(ast::StmtAugAssign { target, value, .. }) => {
            walk_expr(v, target);
            walk_expr(v, value);
        }
        Stmt::AnnAssign(ast::StmtAnnAssign { target, annotation, value, .. }) => {
            walk_expr(v, target);
            walk_expr(v, annotation);
            walk_opt(v, value.as_deref());
        }
        Stmt::For(ast::StmtFor { target, iter, body, orelse, .. })
        | Stmt::AsyncFor(ast::StmtAsyncFor { target, iter, body, orelse, .. }) => {
            walk_expr(v, target);
            walk_expr(v, iter);
            walk_suite(v, body);
            walk_suite(v, orelse);
        }
        Stmt::While(ast::StmtWhile { test, body, orelse, .. })
        | Stmt::If(ast::StmtIf { test, body, orelse, .. }) => {
            walk_expr(v, test);
            walk_suite(v, body);
            walk_suite(v, orelse);
        }
        Stmt::With(ast::StmtWith { items, body, .. })
        | Stmt::AsyncWith(ast::StmtAsyncWith { items, body, .. }) => {
            for item in items {
                walk_expr(v, &item.context_expr);
                walk_opt(v, item.optional_vars.as_deref());
            }
            walk_suite(v, body);
        }
        Stmt::Match(ast::StmtMatch { subject, cases, .. }) => {
            walk_expr(v, subject);
            for case in cases {
                walk_opt(v, case.guard.as_deref());
                walk_suite(v, &case.body);
            }
        }
        Stmt::Raise(ast::StmtRaise { exc, cause, .. }) => {
            walk_opt(v, exc.as_deref());
            walk_opt(v, cause.as_deref());
        }
        Stmt::Try(ast::StmtTry { body, handlers, orelse, finalbody, .. })
        | Stmt::TryStar(ast::StmtTryStar { body, handlers, orelse, finalbody, .. }) => {
            walk_suite(v, body);
            for ast::ExceptHandler::ExceptHandler(handler) in handlers {
                walk_opt(v, handler.type_.as_deref());
                walk_suite(v, &handler.body);
            }
            walk_suite(v, orelse);
            walk_suite(v, finalbody);
        }
        Stmt::Assert(ast::StmtAssert { test, msg, .. }) => {
            walk_expr(v, test);
            walk_opt(v, msg.as_deref());
        }
        Stmt::Expr(ast::StmtExpr { value, .. }) => walk_expr(v, value),
        _ => {}
    }
}

fn walk_exprs<'a, V: Visitor<'a>>(v: &mut V, exprs: &'a [Expr]) {
    for expr in exprs {
        walk_expr(v, expr);
    }
}

fn walk_opt<'a, V: Visitor<'a>>(v: &mut V, expr: Option<&'a Expr>) {
    if let Some(expr) = expr {
        walk_expr(v, expr);
    }
}

/// Parameter defaults and annotations
fn walk_arguments<'a, V: Visitor<'a>>(v: &mut V, args: &'a ast::Arguments) {
    for param in args.posonlyargs.iter().chain(&args.args).chain(&args.kwonlyargs) {
        walk_opt(v, param.def.annotation.as_deref());
        walk_opt(v, param.default.as_deref());
    }
    for param in args.vararg.iter().chain(&args.kwarg) {
        walk_opt(v, param.annotation.as_deref());
    }
}

fn walk_comprehensions<'a, V: Visitor<'a>>(v: &mut V, generators: &'a [ast::Comprehension]) {
    for generator in generators {
        walk_expr(v, &generator.target);
        walk_expr(v, &generator.iter);
        walk_exprs(v, &generator.ifs);
    }
}

fn walk_expr<'a, V: Visitor<'a>>(v: &mut V, expr: &'a Expr) {
    v.visit_expr(expr);

    match expr {
        Expr::BoolOp(ast::ExprBoolOp { values, .. }) => walk_exprs(v, values),
        Expr::NamedExpr(ast::ExprNamedExpr { target, value, .. }) => {
            walk_expr(v, target);
            walk_expr(v, value);
        }
        Expr::BinOp(ast::ExprBinOp { left, right, .. }) => {
            walk_expr(v, left);
            walk_expr(v, right);
        }
        Expr::UnaryOp(ast::ExprUnaryOp { operand, .. }) => walk_expr(v, operand),
        Expr::Lambda(ast::ExprLambda { args, body, .. }) => {
            walk_arguments(v, args);
            walk_expr(v, body);
        }
        Expr::IfExp(ast::ExprIfExp { test, body, orelse, .. }) => {
            walk_expr(v, test);
            walk_expr(v, body);
            walk_expr(v, orelse);
        }
        Expr::Dict(ast::ExprDict { keys, values, .. }) => {
            for key in keys.iter().flatten() {
                walk_expr(v, key);
            }
            walk_exprs(v, values);
        }
        Expr::Set(ast::ExprSet { elts, .. })
        | Expr::List(ast::ExprList { elts, .. })
        | Expr::Tuple(ast::ExprTuple { elts, .. }) => walk_exprs(v, elts),
        Expr::ListComp(ast::ExprListComp { elt, generators, .. })
        | Expr::SetComp(ast::ExprSetComp { elt, generators, .. })
        | Expr::GeneratorExp(ast::ExprGeneratorExp { elt, generators, .. }) => {
            walk_expr(v, elt);
            walk_comprehensions(v, generators);
        }
        Expr::DictComp(ast::ExprDictComp { key, value, generators, .. }) => {
            walk_expr(v, key);
            walk_expr(v, value);
            walk_comprehensions(v, generators);
        }
        Expr::Await(ast::ExprAwait { value, .. })
        | Expr::YieldFrom(ast::ExprYieldFrom { value, .. })
        | Expr::Attribute(ast::ExprAttribute { value, .. })
        | Expr::Starred(ast::ExprStarred { value, .. }) => walk_expr(v, value),
        Expr::Yield(ast::ExprYield { value, .. }) => walk_opt(v, value.as_deref()),
        Expr::Compare(ast::ExprCompare { left, comparators, .. }) => {
            walk_expr(v, left);
            walk_exprs(v, comparators);
        }
        Expr::Call(ast::ExprCall { func, args, keywords, .. }) => {
            walk_expr(v, func);
            walk_exprs(v, args);
            for keyword in keywords {
                walk_expr(v, &keyword.value);
            }
        }
        Expr::FormattedValue(ast::ExprFormattedValue { value, format_spec, .. }) => {
            walk_expr(v, value);
            walk_opt(v, format_spec.as_deref());
        }
        Expr::JoinedStr(ast::ExprJoinedStr { values, .. }) => walk_exprs(v, values),
        Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
            walk_expr(v, value);
            walk_expr(v, slice);
        }
        Expr::Slice(ast::ExprSlice { lower, upper, step, .. }) => {
            walk_opt(v, lower.as_deref());
            walk_opt(v, upper.as_deref());
            walk_opt(v, step.as_deref());
        }
        _ => {}
    }
}

/// Byte offset where `node` starts
pub fn offset_of<T: Ranged>(node: &T) -> usize {
    usize::from(node.range().start())
}

/// Literal value of `expr`, or its source text when it is not a literal
pub fn value_of(expr: &Expr, source: &str) -> Value {
    literal(expr).unwrap_or_else(|| Value::SourceFallback(source_text(expr, source).to_owned()))
}

fn source_text<'s>(expr: &Expr, source: &'s str) -> &'s str {
    let range = expr.range();
    source
        .get(usize::from(range.start())..usize::from(range.end()))
        .unwrap_or_default()
}

/// Evaluate `expr` if it is built only from literals: numbers, strings,
/// bools, None, +/- on numbers, and lists, tuples, sets and dicts of those.
pub fn literal(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Constant(ast::ExprConstant { value, .. }) => constant(value),
        Expr::UnaryOp(ast::ExprUnaryOp { op, operand, .. }) => match (op, literal(operand)?) {
            (ast::UnaryOp::UAdd, value @ (Value::Int(_) | Value::Float(_))) => Some(value),
            (ast::UnaryOp::USub, Value::Int(i)) => i.checked_neg().map(Value::Int),
            (ast::UnaryOp::USub, Value::Float(f)) => Some(Value::Float(-f)),
            _ => None,
        },
        Expr::List(ast::ExprList { elts, .. })
        | Expr::Tuple(ast::ExprTuple { elts, .. })
        | Expr::Set(ast::ExprSet { elts, .. }) => {
            elts.iter().map(literal).collect::<Option<Vec<_>>>().map(Value::List)
        }
        Expr::Dict(ast::ExprDict { keys, values, .. }) => keys
            .iter()
            .zip(values)
            .map(|(key, value)| Some((literal(key.as_ref()?)?, literal(value)?)))
            .collect::<Option<Vec<_>>>()
            .map(Value::Dict),
        _ => None,
    }
}

fn constant(value: &Constant) -> Option<Value> {
    match value {
        Constant::None => Some(Value::None),
        Constant::Bool(b) => Some(Value::Bool(*b)),
        Constant::Str(s) => Some(Value::Str(s.clone())),
        // arbitrary precision; anything past i64 keeps its source text
        Constant::Int(i) => i.to_string().parse().ok().map(Value::Int),
        Constant::Float(f) => Some(Value::Float(*f)),
        Constant::Tuple(items) => items
            .iter()
            .map(constant)
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_value(source: &str) -> Value {
        let suite = parse(source).unwrap();
        let Some(Stmt::Assign(assign)) = suite.first() else {
            panic!("expected an assignment");
        };
        value_of(&assign.value, source)
    }

    struct CountNames(usize);

    impl<'a> Visitor<'a> for CountNames {
        fn visit_expr(&mut self, expr: &'a Expr) {
            if matches!(expr, Expr::Name(_)) {
                self.0 += 1;
            }
        }
    }

    #[test]
    fn syntax_errors_carry_an_offset() {
        let err = parse("x = (1,\n").unwrap_err();
        assert!(!err.message.is_empty());
        assert!(err.to_string().starts_with("SyntaxError"));
    }

    #[test]
    fn literals_are_evaluated() {
        assert_eq!(first_value("x = -3"), Value::Int(-3));
        assert_eq!(first_value("x = 2.5"), Value::Float(2.5));
        assert_eq!(first_value("x = 'hi'"), Value::Str("hi".into()));
        assert_eq!(
            first_value("x = [1, (2, 3), None]"),
            Value::List(vec![
                Value::Int(1),
                Value::List(vec![Value::Int(2), Value::Int(3)]),
                Value::None,
            ])
        );
        assert_eq!(
            first_value("x = {'a': True}"),
            Value::Dict(vec![(Value::Str("a".into()), Value::Bool(true))])
        );
    }

    #[test]
    fn non_literals_fall_back_to_source() {
        let value = first_value("x = pd.DataFrame([1, 2, 3])");
        assert!(matches!(value, Value::SourceFallback(ref s) if s == "pd.DataFrame([1, 2, 3])"));
        assert!(matches!(first_value("x = y + 1"), Value::SourceFallback(_)));
        assert!(matches!(first_value("x = [a, 1]"), Value::SourceFallback(_)));
    }

    #[test]
    fn huge_integers_keep_their_text() {
        let value = first_value("x = 123456789012345678901234567890");
        assert!(matches!(value, Value::SourceFallback(ref s) if s == "123456789012345678901234567890"));
    }

    #[test]
    fn walker_reaches_nested_bodies() {
        let source = "\
def f(a):
    with open(a) as fh:
        try:
            return [b for b in fh if c]
        except OSError:
            d
class K:
    while e:
        g = lambda: h
";
        let suite = parse(source).unwrap();
        let mut counter = CountNames(0);
        walk_suite(&mut counter, &suite);
        // open a fh b b fh c OSError d e g h
        assert_eq!(counter.0, 12);
    }

    #[test]
    fn walker_reaches_parameters() {
        let source = "\
def f(a: A, /, b=B, *c: C, d=D, **e: E) -> R:
    pass
g = lambda x=X, *, y=Y: x
";
        let suite = parse(source).unwrap();
        let mut counter = CountNames(0);
        walk_suite(&mut counter, &suite);
        // A B C D E R g X Y x
        assert_eq!(counter.0, 10);
    }
}
