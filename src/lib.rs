//! qlisp - a small Lisp with S-expressions, Q-expressions and closures
//!
//! This crate provides the reader and the evaluator of a tiny Lisp dialect in the
//! spirit of "Build Your Own Lisp". Programs are made of two kinds of compound
//! forms: evaluable S-expressions and literal Q-expressions.
//!
//! ```text
//! (+ 1 2 3)                         ; arithmetic
//! (head {1 2 3})                    ; list operations on Q-expressions
//! (def {add} (\ {x y} {+ x y}))     ; closures
//! (def {pack} (\ {f & xs} {f xs}))  ; variadic formals
//! ```
//!
//! ## Errors are values
//!
//! Nothing in the core panics or returns a Rust error for a malformed program.
//! Parse failures, unbound symbols, type and arity mismatches all come back as
//! [`ast::Expr::Error`] values that propagate through evaluation like any other
//! result. Internally they are built from the [`Error`] enum below, whose
//! display text is the message the resulting error value carries.
//!
//! ## Modules
//!
//! - `ast`: the [`ast::Expr`] data model, rendering and structural equality
//! - `reader`: text to [`ast::Expr`] conversion
//! - `evaluator`: evaluation, lambda application and the [`evaluator::Environment`]
//! - `builtinops`: the builtin operation registry
//! - `host`: the collaborator interface used by `print` and `load`
//!
//! ## Example
//!
//! ```
//! use std::rc::Rc;
//! use qlisp::host::MemoryHost;
//! use qlisp::{create_global_env, eval, parse};
//!
//! let env = create_global_env(Rc::new(MemoryHost::new()));
//! let defined = eval(&env, parse(r"def {sq} (\ {x} {* x x})"));
//! assert_eq!(defined.to_string(), "()");
//! assert_eq!(eval(&env, parse("sq 7")).to_string(), "49");
//! ```

use std::fmt;

/// Maximum nesting depth accepted by the reader
/// Deeper input is rejected with an error value instead of exhausting the stack
pub const MAX_PARSE_DEPTH: usize = 256;

/// Every failure the core can report.
///
/// The `Display` text of each variant is the exact message of the
/// [`ast::Expr::Error`] value produced from it (see the `From` impl in `ast`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Reader
    #[error("Unexpected end of input")]
    UnexpectedEnd,
    #[error("Unexpected character {found} at index {index}")]
    UnexpectedCharacter { found: char, index: usize },
    #[error("Invalid escape sequence \\{0}")]
    InvalidEscape(char),
    #[error("Invalid number {0}")]
    InvalidNumber(String),
    #[error("Expression nested too deeply (max depth: {MAX_PARSE_DEPTH})")]
    TooDeeplyNested,

    // Evaluator
    #[error("Unbound symbol {0}")]
    UnboundSymbol(String),
    #[error("S-Expression starts with incorrect type. Got {0}, expected Lambda")]
    NotCallable(&'static str),
    #[error("Function passed too many arguments. Got {given}, expected {total}")]
    TooManyArguments { given: usize, total: usize },
    #[error("Function format invalid. Symbol '&' not followed by single symbol.")]
    InvalidVariadic,

    // Builtins
    #[error("Function '{name}' passed incorrect number of arguments. Got {got}, {expected}.")]
    Arity {
        name: String,
        got: usize,
        expected: builtinops::Arity,
    },
    #[error("Function '{name}' passed incorrect type for argument {index}. Got {got}, expected {expected}")]
    Type {
        name: String,
        index: usize,
        got: &'static str,
        expected: &'static str,
    },
    #[error("Function '{name}' passed {{}} for argument {index}.")]
    EmptyList { name: String, index: usize },
    #[error("'{name}' cannot define a non-symbol. Got {got}")]
    NonSymbol { name: String, got: &'static str },
    /// A lambda formal that is not a symbol
    #[error("Cannot define a non-symbol. Got {0}")]
    NonSymbolFormal(&'static str),
    #[error("'{name}' was passed with too many arguments. Wanted {symbols}, got {values}")]
    SymbolCount {
        name: String,
        symbols: usize,
        values: usize,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow in {0}")]
    Overflow(Operation),

    // Host
    #[error("Could not load library {path}")]
    Load {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Arithmetic operation named in overflow errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Negation,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Addition => "addition",
            Operation::Subtraction => "subtraction",
            Operation::Multiplication => "multiplication",
            Operation::Division => "division",
            Operation::Negation => "negation",
        };
        f.write_str(name)
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod host;
pub mod reader;

pub use evaluator::{Environment, create_global_env, eval};
pub use reader::parse;
