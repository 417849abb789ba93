//! Built-in operations registry.
//!
//! Every native operation of the language is described once in a static table of
//! [`BuiltinOp`] entries: its symbol, how many arguments it accepts and the Rust
//! function implementing it. [`crate::create_global_env`] walks the table and binds
//! each entry into the global frame.
//!
//! ```text
//! (list 1 2 3)                  ; {1 2 3}
//! (join {1} {2 3})              ; {1 2 3}
//! (if (> x 0) {x} {- x})        ; only the chosen branch is evaluated
//! (def {add} (\ {a b} {+ a b})) ; closures
//! ```
//!
//! ## Pure vs Host Operations
//!
//! - **Functions**: see only the calling environment and the evaluated arguments
//! - **Host functions**: additionally talk to the [`Host`] (`print`, `load`)
//!
//! ## Error Handling
//!
//! Implementations return `Result<Expr, Error>` so validation can use `?`. The
//! registry adapter checks arity before the call and turns any `Err` into an
//! [`Expr::Error`] value, so failures propagate like any other result:
//!
//! - **Arity**: checked against [`Arity`] before the function runs
//! - **Types**: reported with the zero-based position of the offending argument
//! - **Overflow Detection**: arithmetic is checked, never wraps
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the signature of [`OpKind::Function`] or
//!    [`OpKind::HostFunction`]
//! 2. **Add it to `BUILTIN_OPS`** with its symbol and arity
//! 3. **Add tests** covering the error cases

use std::fmt;

use crate::ast::{Closure, Expr, Lambda, NumberType};
use crate::evaluator::{Environment, eval};
use crate::host::Host;
use crate::reader::read_program;
use crate::{Error, Operation};

/// Number of arguments an operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    /// Check `got` arguments passed to the operation `name`
    pub fn validate(self, name: &str, got: usize) -> Result<(), Error> {
        let accepted = match self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Any => true,
        };

        if accepted {
            Ok(())
        } else {
            Err(Error::Arity {
                name: name.to_owned(),
                got,
                expected: self,
            })
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "Expected {n}"),
            Arity::AtLeast(n) => write!(f, "Expected at least {n}"),
            Arity::Any => write!(f, "Expected any number"),
        }
    }
}

/// Represents the implementation of a built-in operation
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Operation over the calling environment and the evaluated arguments
    Function(fn(&Environment, Vec<Expr>) -> Result<Expr, Error>),
    /// Operation that also needs the host for input or output
    HostFunction(fn(&Environment, Vec<Expr>, &dyn Host) -> Result<Expr, Error>),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::HostFunction(_) => write!(f, "HostFunction(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone, Copy)]
pub struct BuiltinOp {
    /// The symbol the operation is bound to
    pub id: &'static str,
    /// The implementation of this operation
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Compare operations by their id, which uniquely identifies them
        self.id == other.id
    }
}

//
// Argument helpers
//

fn type_error(name: &str, index: usize, got: &Expr, expected: &'static str) -> Error {
    Error::Type {
        name: name.to_owned(),
        index,
        got: got.type_name(),
        expected,
    }
}

/// Move the arguments of a fixed-arity operation into an array
fn take_args<const N: usize>(name: &str, args: Vec<Expr>) -> Result<[Expr; N], Error> {
    let got = args.len();
    args.try_into().map_err(|_| Error::Arity {
        name: name.to_owned(),
        got,
        expected: Arity::Exact(N),
    })
}

fn expect_number(name: &str, index: usize, arg: &Expr) -> Result<NumberType, Error> {
    match arg {
        Expr::Number(n) => Ok(*n),
        other => Err(type_error(name, index, other, "Number")),
    }
}

fn expect_qexpr(name: &str, index: usize, arg: Expr) -> Result<Vec<Expr>, Error> {
    match arg {
        Expr::QExpr(cells) => Ok(cells),
        other => Err(type_error(name, index, &other, "Q-Expr")),
    }
}

fn expect_string(name: &str, index: usize, arg: Expr) -> Result<String, Error> {
    match arg {
        Expr::Str(s) => Ok(s),
        other => Err(type_error(name, index, &other, "String")),
    }
}

fn expect_non_empty(name: &str, index: usize, arg: Expr) -> Result<Vec<Expr>, Error> {
    let cells = expect_qexpr(name, index, arg)?;
    if cells.is_empty() {
        return Err(Error::EmptyList {
            name: name.to_owned(),
            index,
        });
    }
    Ok(cells)
}

/// Names of a formals list; fails with the type of the first non-symbol
fn symbol_names(formals: Vec<Expr>) -> Result<Vec<String>, &'static str> {
    formals
        .into_iter()
        .map(|formal| match formal {
            Expr::Symbol(symbol) => Ok(symbol),
            other => Err(other.type_name()),
        })
        .collect()
}

/// The value of forms evaluated only for their effect
fn unit() -> Expr {
    Expr::SExpr(vec![])
}

//
// Builtin Function Implementations
//

fn builtin_list(_env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    Ok(Expr::QExpr(args))
}

fn builtin_head(_env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    let [list] = take_args::<1>("head", args)?;
    let mut cells = expect_non_empty("head", 0, list)?;
    cells.truncate(1);
    Ok(Expr::QExpr(cells))
}

fn builtin_tail(_env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    let [list] = take_args::<1>("tail", args)?;
    let mut cells = expect_non_empty("tail", 0, list)?;
    cells.remove(0);
    Ok(Expr::QExpr(cells))
}

fn builtin_eval(env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    let [list] = take_args::<1>("eval", args)?;
    let cells = expect_qexpr("eval", 0, list)?;
    Ok(eval(env, Expr::SExpr(cells)))
}

fn builtin_join(_env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    let mut joined = Vec::new();
    for (i, arg) in args.into_iter().enumerate() {
        joined.extend(expect_qexpr("join", i, arg)?);
    }
    Ok(Expr::QExpr(joined))
}

/// Fold numeric operands left to right; every operand is type-checked first
fn fold_numbers(
    name: &str,
    args: &[Expr],
    step: impl Fn(NumberType, NumberType) -> Result<NumberType, Error>,
) -> Result<Expr, Error> {
    let numbers = args
        .iter()
        .enumerate()
        .map(|(i, arg)| expect_number(name, i, arg))
        .collect::<Result<Vec<_>, _>>()?;

    let Some((&first, rest)) = numbers.split_first() else {
        return Err(Error::Arity {
            name: name.to_owned(),
            got: 0,
            expected: Arity::AtLeast(1),
        });
    };

    rest.iter()
        .try_fold(first, |acc, &n| step(acc, n))
        .map(Expr::Number)
}

fn builtin_add(_env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    fold_numbers("+", &args, |x, y| {
        x.checked_add(y).ok_or(Error::Overflow(Operation::Addition))
    })
}

fn builtin_sub(_env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    if let [operand] = args.as_slice() {
        return expect_number("-", 0, operand)?
            .checked_neg()
            .map(Expr::Number)
            .ok_or(Error::Overflow(Operation::Negation));
    }

    fold_numbers("-", &args, |x, y| {
        x.checked_sub(y).ok_or(Error::Overflow(Operation::Subtraction))
    })
}

fn builtin_mul(_env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    fold_numbers("*", &args, |x, y| {
        x.checked_mul(y).ok_or(Error::Overflow(Operation::Multiplication))
    })
}

fn builtin_div(_env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    fold_numbers("/", &args, |x, y| {
        if y == 0 {
            return Err(Error::DivisionByZero);
        }
        x.checked_div(y).ok_or(Error::Overflow(Operation::Division))
    })
}

/// Bind each symbol of the leading Q-expression to the matching trailing argument
fn bind_symbols(
    name: &str,
    args: Vec<Expr>,
    mut bind: impl FnMut(String, Expr),
) -> Result<Expr, Error> {
    let mut args = args.into_iter();
    let Some(symbols) = args.next() else {
        return Err(Error::Arity {
            name: name.to_owned(),
            got: 0,
            expected: Arity::AtLeast(1),
        });
    };

    let symbols =
        symbol_names(expect_qexpr(name, 0, symbols)?).map_err(|got| Error::NonSymbol {
            name: name.to_owned(),
            got,
        })?;
    let values: Vec<Expr> = args.collect();

    if symbols.len() != values.len() {
        return Err(Error::SymbolCount {
            name: name.to_owned(),
            symbols: symbols.len(),
            values: values.len(),
        });
    }

    for (symbol, value) in symbols.into_iter().zip(values) {
        bind(symbol, value);
    }
    Ok(unit())
}

fn builtin_def(env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    bind_symbols("def", args, |symbol, value| env.define(symbol, value))
}

fn builtin_put(env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    bind_symbols("=", args, |symbol, value| env.assign(symbol, value))
}

// Macro to generate numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(_env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
            let [lhs, rhs] = take_args::<2>($op_str, args)?;
            let lhs = expect_number($op_str, 0, &lhs)?;
            let rhs = expect_number($op_str, 1, &rhs)?;
            Ok(Expr::from(lhs $op rhs))
        }
    };
}

numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_ge, >=, ">=");
numeric_comparison!(builtin_le, <=, "<=");

fn builtin_eq(_env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    let [lhs, rhs] = take_args::<2>("==", args)?;
    Ok(Expr::from(lhs == rhs))
}

fn builtin_ne(_env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    let [lhs, rhs] = take_args::<2>("!=", args)?;
    Ok(Expr::from(lhs != rhs))
}

fn builtin_if(env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    let [condition, then_branch, else_branch] = take_args::<3>("if", args)?;
    let condition = expect_number("if", 0, &condition)?;
    let then_branch = expect_qexpr("if", 1, then_branch)?;
    let else_branch = expect_qexpr("if", 2, else_branch)?;

    let chosen = if condition != 0 {
        then_branch
    } else {
        else_branch
    };
    Ok(eval(env, Expr::SExpr(chosen)))
}

fn builtin_lambda(env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    let [formals, body] = take_args::<2>("\\", args)?;
    let formals = expect_qexpr("\\", 0, formals)?;
    let body = expect_qexpr("\\", 1, body)?;

    Ok(Expr::Lambda(Lambda::Closure(Closure {
        formals: symbol_names(formals).map_err(Error::NonSymbolFormal)?,
        body,
        env: Environment::with_parent(env),
    })))
}

fn builtin_error(_env: &Environment, args: Vec<Expr>) -> Result<Expr, Error> {
    let [message] = take_args::<1>("error", args)?;
    Ok(Expr::Error(expect_string("error", 0, message)?))
}

fn builtin_print(_env: &Environment, args: Vec<Expr>, host: &dyn Host) -> Result<Expr, Error> {
    let line: String = args.iter().map(|arg| format!("{arg} ")).collect();
    host.display(&line);
    Ok(unit())
}

/// Evaluate every top-level form of a named source; failing forms are displayed
/// and do not stop the remaining ones
fn builtin_load(env: &Environment, args: Vec<Expr>, host: &dyn Host) -> Result<Expr, Error> {
    let [path] = take_args::<1>("load", args)?;
    let path = expect_string("load", 0, path)?;

    let source = host.read_source(&path).map_err(|source| Error::Load {
        path: path.clone(),
        source,
    })?;
    let forms = read_program(&source)?;

    let total = forms.len();
    let mut failed = 0;
    for form in forms {
        let result = eval(env, form);
        if result.is_error() {
            failed += 1;
            host.display(&result.to_string());
        }
    }

    tracing::debug!(path = %path, forms = total, failed, "loaded source");
    Ok(unit())
}

/// Global registry of all built-in operations.
static BUILTIN_OPS: &[BuiltinOp] = &[
    // List operations
    BuiltinOp {
        id: "list",
        op_kind: OpKind::Function(builtin_list),
        arity: Arity::Any,
    },
    BuiltinOp {
        id: "head",
        op_kind: OpKind::Function(builtin_head),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "tail",
        op_kind: OpKind::Function(builtin_tail),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "eval",
        op_kind: OpKind::Function(builtin_eval),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "join",
        op_kind: OpKind::Function(builtin_join),
        arity: Arity::AtLeast(1),
    },
    // Arithmetic operations
    BuiltinOp {
        id: "+",
        op_kind: OpKind::Function(builtin_add),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        id: "-",
        op_kind: OpKind::Function(builtin_sub),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        id: "*",
        op_kind: OpKind::Function(builtin_mul),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        id: "/",
        op_kind: OpKind::Function(builtin_div),
        arity: Arity::AtLeast(1),
    },
    // Variable bindings
    BuiltinOp {
        id: "def",
        op_kind: OpKind::Function(builtin_def),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        id: "=",
        op_kind: OpKind::Function(builtin_put),
        arity: Arity::AtLeast(1),
    },
    // Comparison operations
    BuiltinOp {
        id: ">",
        op_kind: OpKind::Function(builtin_gt),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "<",
        op_kind: OpKind::Function(builtin_lt),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: ">=",
        op_kind: OpKind::Function(builtin_ge),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "<=",
        op_kind: OpKind::Function(builtin_le),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "==",
        op_kind: OpKind::Function(builtin_eq),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "!=",
        op_kind: OpKind::Function(builtin_ne),
        arity: Arity::Exact(2),
    },
    // Control flow
    BuiltinOp {
        id: "if",
        op_kind: OpKind::Function(builtin_if),
        arity: Arity::Exact(3),
    },
    BuiltinOp {
        id: "\\",
        op_kind: OpKind::Function(builtin_lambda),
        arity: Arity::Exact(2),
    },
    // Error handling
    BuiltinOp {
        id: "error",
        op_kind: OpKind::Function(builtin_error),
        arity: Arity::Exact(1),
    },
    // Host interaction
    BuiltinOp {
        id: "print",
        op_kind: OpKind::HostFunction(builtin_print),
        arity: Arity::Any,
    },
    BuiltinOp {
        id: "load",
        op_kind: OpKind::HostFunction(builtin_load),
        arity: Arity::Exact(1),
    },
];

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}

/// Find a builtin operation by the symbol it is bound to
pub fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_OPS.iter().find(|op| op.id == id)
}
