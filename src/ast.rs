//! This module defines [`Expr`], the single tagged type that is both the syntax tree
//! produced by the reader and the runtime value produced by the evaluator. It covers
//! numbers, symbols, strings, error values, lambdas (native builtins and user closures)
//! and the two compound forms: evaluable S-expressions and literal Q-expressions.
//! Ergonomic helper functions such as [`val`], [`sym`], [`sexpr`] and [`nil`] are
//! provided for building trees in code and tests. Display produces the surface
//! syntax back (strings quoted and escaped), so rendered data re-reads to an equal tree.

use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::evaluator::Environment;

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// Allowed non-alphanumeric characters in symbol names
/// `\` is included so that the lambda constructor is an ordinary symbol
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "_+-*/\\=<>!&";

/// Check if a character may appear in a symbol (or integer) token
pub(crate) fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c)
}

/// Erased signature of every native operation.
///
/// Builtins receive the environment they are called from and take ownership of
/// their evaluated arguments, so they can move elements out without copying.
pub type BuiltinFn = dyn Fn(&Environment, Vec<Expr>) -> Expr;

/// A native operation bound under a symbol name
#[derive(Clone)]
pub struct Builtin {
    id: String,
    func: Rc<BuiltinFn>,
}

impl Builtin {
    pub fn new(
        id: impl Into<String>,
        func: impl Fn(&Environment, Vec<Expr>) -> Expr + 'static,
    ) -> Self {
        Builtin {
            id: id.into(),
            func: Rc::new(func),
        }
    }

    /// Name the builtin was registered under
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn call(&self, env: &Environment, args: Vec<Expr>) -> Expr {
        (self.func)(env, args)
    }
}

/// A user-defined lambda: formals, body and the frame it owns.
///
/// The frame is created empty when the lambda expression is evaluated, with the
/// defining environment as parent. Formals are bound into it as arguments arrive,
/// which is what makes partial application possible.
pub struct Closure {
    pub(crate) formals: Vec<String>,
    pub(crate) body: Vec<Expr>,
    pub(crate) env: Environment,
}

impl Closure {
    pub fn formals(&self) -> &[String] {
        &self.formals
    }

    pub fn body(&self) -> &[Expr] {
        &self.body
    }
}

// Copies of a closure never share a frame: the frame is duplicated, its parent is not.
impl Clone for Closure {
    fn clone(&self) -> Self {
        Closure {
            formals: self.formals.clone(),
            body: self.body.clone(),
            env: self.env.deep_copy(),
        }
    }
}

#[derive(Clone)]
pub enum Lambda {
    Builtin(Builtin),
    Closure(Closure),
}

/// Core expression type in interpreter
///
/// To build a tree, use the ergonomic helper functions:
/// - `val(42)` for numbers, `val("text")` for strings, `sym("name")` for symbols
/// - `val([1, 2, 3])` for Q-expressions of homogeneous values
/// - `sexpr(vec![sym("+"), val(1), val(2)])` for S-expressions
#[derive(Clone)]
pub enum Expr {
    /// Error value, propagated through evaluation like any other result
    Error(String),
    Number(NumberType),
    Symbol(String),
    /// String literal
    Str(String),
    Lambda(Lambda),
    /// Evaluable form: operator followed by operands
    SExpr(Vec<Expr>),
    /// Literal, unevaluated list
    QExpr(Vec<Expr>),
}

impl Expr {
    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Expr::Error(_) => "Error",
            Expr::Number(_) => "Number",
            Expr::Symbol(_) => "Symbol",
            Expr::Str(_) => "String",
            Expr::Lambda(_) => "Lambda",
            Expr::SExpr(_) => "S-Expr",
            Expr::QExpr(_) => "Q-Expr",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Expr::Error(_))
    }

    /// Wrap a builtin operation as a lambda value
    pub fn builtin(
        id: impl Into<String>,
        func: impl Fn(&Environment, Vec<Expr>) -> Expr + 'static,
    ) -> Self {
        Expr::Lambda(Lambda::Builtin(Builtin::new(id, func)))
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Error(msg) => write!(f, "Error({msg:?})"),
            Expr::Number(n) => write!(f, "Number({n})"),
            Expr::Symbol(s) => write!(f, "Symbol({s})"),
            Expr::Str(s) => write!(f, "Str({s:?})"),
            Expr::Lambda(Lambda::Builtin(builtin)) => write!(f, "Builtin({})", builtin.id),
            Expr::Lambda(Lambda::Closure(closure)) => write!(
                f,
                "Closure(formals={:?}, body={:?})",
                closure.formals, closure.body
            ),
            Expr::SExpr(cells) => write!(f, "SExpr({cells:?})"),
            Expr::QExpr(cells) => write!(f, "QExpr({cells:?})"),
        }
    }
}

// From trait implementations for Expr - enables .into() conversion
impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Str(s.to_owned())
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Str(s)
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Number(NumberType::from(b))
    }
}

impl From<Error> for Expr {
    fn from(err: Error) -> Self {
        Expr::Error(err.to_string())
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Expr {
            fn from(n: $int_type) -> Self {
                Expr::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Expr>> From<Vec<T>> for Expr {
    fn from(v: Vec<T>) -> Self {
        Expr::QExpr(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Expr>, const N: usize> From<[T; N]> for Expr {
    fn from(arr: [T; N]) -> Self {
        Expr::QExpr(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper function for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Expr {
    Expr::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating expressions from Rust values.
/// Sequences become Q-expressions, the language's list type.
pub fn val<T: Into<Expr>>(value: T) -> Expr {
    value.into()
}

/// Helper function for creating S-expressions
pub fn sexpr<T: Into<Expr>>(cells: Vec<T>) -> Expr {
    Expr::SExpr(cells.into_iter().map(Into::into).collect())
}

/// The empty Q-expression `{}`
pub fn nil() -> Expr {
    Expr::QExpr(vec![])
}

/// Write `cells` separated by single spaces between `open` and `close`
fn write_cells(
    f: &mut fmt::Formatter<'_>,
    open: char,
    cells: &[Expr],
    close: char,
) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{cell}")?;
    }
    write!(f, "{close}")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Error(msg) => write!(f, "Error: {msg}"),
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Symbol(s) => write!(f, "{s}"),
            Expr::Str(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\'' => write!(f, "\\'")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Expr::Lambda(Lambda::Builtin(_)) => write!(f, "<builtin>"),
            Expr::Lambda(Lambda::Closure(closure)) => {
                write!(f, "(\\ {{")?;
                for (i, formal) in closure.formals.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{formal}")?;
                }
                write!(f, "}} ")?;
                write_cells(f, '{', &closure.body, '}')?;
                write!(f, ")")
            }
            Expr::SExpr(cells) => write_cells(f, '(', cells, ')'),
            Expr::QExpr(cells) => write_cells(f, '{', cells, '}'),
        }
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expr::Error(a), Expr::Error(b)) => a == b,
            (Expr::Number(a), Expr::Number(b)) => a == b,
            (Expr::Symbol(a), Expr::Symbol(b)) => a == b,
            (Expr::Str(a), Expr::Str(b)) => a == b,
            (Expr::Lambda(Lambda::Builtin(a)), Expr::Lambda(Lambda::Builtin(b))) => {
                // Same registration: copies share the function
                a.id == b.id && Rc::ptr_eq(&a.func, &b.func)
            }
            (Expr::Lambda(Lambda::Closure(a)), Expr::Lambda(Lambda::Closure(b))) => {
                // The captured frame takes no part in equality
                a.formals == b.formals && a.body == b.body
            }
            (Expr::SExpr(a), Expr::SExpr(b)) | (Expr::QExpr(a), Expr::QExpr(b)) => a == b,
            _ => false, // Different variants are never equal
        }
    }
}

#[cfg(test)]
mod helper_function_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_helper_functions_data_driven() {
        // Test cases as (Expr, Expr) tuples: (helper_result, expected_value)
        let test_cases = vec![
            (val(42), Expr::Number(42)),
            (val(-17), Expr::Number(-17)),
            (val(255u8), Expr::Number(255)),
            (val(-32768i16), Expr::Number(-32768)),
            (val(4294967295u32), Expr::Number(4294967295)),
            (val(NumberType::MAX), Expr::Number(NumberType::MAX)),
            (val(NumberType::MIN), Expr::Number(NumberType::MIN)),
            (val(true), Expr::Number(1)),
            (val(false), Expr::Number(0)),
            (val("hello"), Expr::Str("hello".to_owned())),
            (val(String::new()), Expr::Str(String::new())),
            (sym("head"), Expr::Symbol("head".to_owned())),
            (sym(String::from("&")), Expr::Symbol("&".to_owned())),
            (nil(), Expr::QExpr(vec![])),
            (
                val([1, 2, 3]),
                Expr::QExpr(vec![Expr::Number(1), Expr::Number(2), Expr::Number(3)]),
            ),
            (
                sexpr(vec![sym("+"), val(1), val(2)]),
                Expr::SExpr(vec![
                    Expr::Symbol("+".to_owned()),
                    Expr::Number(1),
                    Expr::Number(2),
                ]),
            ),
            (
                val(vec![sym("x"), val("y"), nil()]),
                Expr::QExpr(vec![
                    Expr::Symbol("x".to_owned()),
                    Expr::Str("y".to_owned()),
                    Expr::QExpr(vec![]),
                ]),
            ),
            (
                val(Error::DivisionByZero),
                Expr::Error("Division by zero".to_owned()),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_display() {
        let closure = Expr::Lambda(Lambda::Closure(Closure {
            formals: vec!["x".to_owned(), "y".to_owned()],
            body: vec![sym("+"), sym("x"), sym("y")],
            env: Environment::new(),
        }));

        let test_cases = vec![
            (Expr::Error("Division by zero".to_owned()), "Error: Division by zero"),
            (val(-42), "-42"),
            (sym("def"), "def"),
            (val("plain"), "\"plain\""),
            (val("a\"b'c\\d"), r#""a\"b\'c\\d""#),
            (val("line\nfeed\ttab\rret"), r#""line\nfeed\ttab\rret""#),
            (Expr::builtin("head", |_, _| nil()), "<builtin>"),
            (closure, r"(\ {x y} {+ x y})"),
            (sexpr(vec![sym("+"), val(1), val(2)]), "(+ 1 2)"),
            (val(vec![val(1), nil(), val("s")]), "{1 {} \"s\"}"),
            (sexpr::<Expr>(vec![]), "()"),
        ];

        for (expr, expected) in test_cases {
            assert_eq!(expr.to_string(), expected);
        }
    }

    #[test]
    fn test_structural_equality() {
        let head = Expr::builtin("head", |_, _| nil());
        let tail = Expr::builtin("tail", |_, _| nil());

        assert_eq!(head, head.clone());
        assert_ne!(head, tail);

        // A different function registered under an existing name is a different builtin
        let other_head = Expr::builtin("head", |_, args| Expr::QExpr(args));
        assert_ne!(head, other_head);

        // Same cells under different tags are different values
        assert_ne!(sexpr(vec![1, 2]), val([1, 2]));
        assert_ne!(val(1), val("1"));
        assert_ne!(sym("x"), val("x"));
        assert_ne!(Expr::Error("x".to_owned()), val("x"));
        assert_eq!(val([val([1]), nil()]), val([val([1]), nil()]));
    }

    #[test]
    fn test_closure_equality_ignores_environment() {
        let make = |bound: i64| {
            let env = Environment::new();
            env.assign("x", val(bound));
            Expr::Lambda(Lambda::Closure(Closure {
                formals: vec!["y".to_owned()],
                body: vec![sym("+"), sym("x"), sym("y")],
                env,
            }))
        };

        assert_eq!(make(1), make(2));
    }

    #[test]
    fn test_closure_copy_has_independent_frame() {
        let env = Environment::new();
        env.assign("x", val(1));
        let original = Closure {
            formals: vec![],
            body: vec![sym("x")],
            env,
        };

        let copy = original.clone();
        copy.env.assign("x", val(2));

        assert_eq!(original.env.lookup("x"), val(1));
        assert_eq!(copy.env.lookup("x"), val(2));
    }

    #[test]
    fn test_type_names() {
        let test_cases = vec![
            (Expr::Error(String::new()), "Error"),
            (val(1), "Number"),
            (sym("a"), "Symbol"),
            (val("a"), "String"),
            (Expr::builtin("f", |_, _| nil()), "Lambda"),
            (sexpr::<Expr>(vec![]), "S-Expr"),
            (nil(), "Q-Expr"),
        ];

        for (expr, expected) in test_cases {
            assert_eq!(expr.type_name(), expected);
        }
    }
}
