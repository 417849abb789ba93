use std::collections::VecDeque;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Closure, Expr, Lambda};
use crate::builtinops::{OpKind, get_builtin_ops};
use crate::host::Host;

mod environment;

pub use environment::Environment;

/// Formal that collects the remaining arguments into a Q-expression
const VARIADIC_MARKER: &str = "&";

/// Evaluate an expression to its normal form (public API)
///
/// Symbols are looked up, S-expressions are reduced, every other tag
/// evaluates to itself. Failures come back as [`Expr::Error`] values.
pub fn eval(env: &Environment, expr: Expr) -> Expr {
    match expr {
        Expr::Symbol(name) => env.lookup(&name),
        Expr::SExpr(cells) => eval_sexpr(env, cells),

        // Self-evaluating forms
        Expr::Error(_) | Expr::Number(_) | Expr::Str(_) | Expr::QExpr(_) | Expr::Lambda(_) => expr,
    }
}

/// Evaluate an S-expression (function application)
///
/// Cells are evaluated left to right and the first error stops evaluation of
/// the rest. An empty form evaluates to itself and a single cell is evaluated
/// once more on its own; otherwise the first cell must be a lambda, applied to
/// the remaining cells.
fn eval_sexpr(env: &Environment, cells: Vec<Expr>) -> Expr {
    let mut evaluated = Vec::with_capacity(cells.len());
    for cell in cells {
        let value = eval(env, cell);
        if value.is_error() {
            return value;
        }
        evaluated.push(value);
    }

    let mut evaluated = evaluated.into_iter();
    match (evaluated.next(), evaluated.len()) {
        (None, _) => Expr::SExpr(vec![]),
        (Some(single), 0) => eval(env, single),
        (Some(Expr::Lambda(lambda)), _) => call_value(env, lambda, evaluated.collect()),
        (Some(other), _) => Error::NotCallable(other.type_name()).into(),
    }
}

/// Apply a lambda to already evaluated arguments
///
/// Builtins are handed the arguments untouched. Closures bind formals to
/// arguments in order; when every formal is bound the body runs in the
/// closure's frame, otherwise the partially bound closure is returned.
pub fn call_value(env: &Environment, lambda: Lambda, args: Vec<Expr>) -> Expr {
    match lambda {
        Lambda::Builtin(builtin) => builtin.call(env, args),
        Lambda::Closure(closure) => call_closure(env, closure, args),
    }
}

fn call_closure(env: &Environment, closure: Closure, args: Vec<Expr>) -> Expr {
    let Closure {
        formals,
        body,
        env: frame,
    } = closure;

    let given = args.len();
    let total = formals.len();
    let mut formals = VecDeque::from(formals);
    let mut args = VecDeque::from(args);

    while !args.is_empty() {
        let Some(formal) = formals.pop_front() else {
            return Error::TooManyArguments { given, total }.into();
        };

        if formal == VARIADIC_MARKER {
            let (Some(rest), true) = (formals.pop_front(), formals.is_empty()) else {
                return Error::InvalidVariadic.into();
            };
            frame.assign(rest, Expr::QExpr(args.drain(..).collect()));
            break;
        }

        if let Some(arg) = args.pop_front() {
            frame.assign(formal, arg);
        }
    }

    // Arguments ran out right before the variadic marker: bind an empty list
    if formals.front().is_some_and(|formal| formal == VARIADIC_MARKER) {
        if formals.len() != 2 {
            return Error::InvalidVariadic.into();
        }
        formals.pop_front();
        if let Some(rest) = formals.pop_front() {
            frame.assign(rest, Expr::QExpr(vec![]));
        }
    }

    if !formals.is_empty() {
        tracing::trace!(given, total, remaining = formals.len(), "partial application");
        return Expr::Lambda(Lambda::Closure(Closure {
            formals: formals.into(),
            body,
            env: frame,
        }));
    }

    tracing::trace!(given, total, "applying closure");
    frame.set_caller(Some(env));
    let result = eval(&frame, Expr::SExpr(body));
    frame.set_caller(None);
    result
}

/// Create a global environment with built-in functions
///
/// `host` backs the builtins that talk to the outside world (`print`, `load`).
pub fn create_global_env(host: Rc<dyn Host>) -> Environment {
    let env = Environment::new();

    for builtin_op in get_builtin_ops() {
        let arity = builtin_op.arity;
        let id = builtin_op.id;
        match builtin_op.op_kind {
            OpKind::Function(func) => env.register_builtin(id, move |env, args| {
                match arity.validate(id, args.len()).and_then(|()| func(env, args)) {
                    Ok(value) => value,
                    Err(err) => err.into(),
                }
            }),
            OpKind::HostFunction(func) => {
                let host = Rc::clone(&host);
                env.register_builtin(id, move |env, args| {
                    match arity
                        .validate(id, args.len())
                        .and_then(|()| func(env, args, host.as_ref()))
                    {
                        Ok(value) => value,
                        Err(err) => err.into(),
                    }
                });
            }
        }
    }

    env
}
