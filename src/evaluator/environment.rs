use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::Error;
use crate::ast::{Expr, Lambda};

/// One level of symbol bindings.
#[derive(Default)]
struct Frame {
    bindings: HashMap<String, Expr>,
    /// Lexical parent: the environment the frame was created in
    parent: Option<Environment>,
    /// Call site, linked only while a closure body runs in this frame
    caller: Option<Environment>,
}

/// Environment for symbol bindings
///
/// A handle to a frame in a chain of frames. Cloning the handle shares the
/// frame; [`Environment::deep_copy`] duplicates it. Lookup walks the frame's
/// own bindings, then its lexical parents, then the call site of a running
/// closure body. The frame with no parent is the global frame.
#[derive(Clone, Default)]
pub struct Environment(Rc<RefCell<Frame>>);

impl Environment {
    /// Create a new global (parentless) environment
    pub fn new() -> Self {
        Environment::default()
    }

    /// Create an empty frame whose parent is `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            parent: Some(parent.clone()),
            ..Frame::default()
        })))
    }

    /// Copy this frame's bindings into a new frame sharing the same parent
    pub(crate) fn deep_copy(&self) -> Self {
        let frame = self.0.borrow();
        Environment(Rc::new(RefCell::new(Frame {
            bindings: frame.bindings.clone(),
            parent: frame.parent.clone(),
            caller: None,
        })))
    }

    /// Look `name` up, returning a copy of the bound value or an
    /// `Unbound symbol` error value
    pub fn lookup(&self, name: &str) -> Expr {
        self.find(name)
            .unwrap_or_else(|| Error::UnboundSymbol(name.to_owned()).into())
    }

    /// Depth-first search over parent then caller links. A frame reached
    /// twice (a closure called from the frame it was created in has the same
    /// parent and caller) is only searched once.
    fn find(&self, name: &str) -> Option<Expr> {
        let mut visited: HashSet<*const RefCell<Frame>> = HashSet::new();
        let mut pending = vec![self.clone()];

        while let Some(env) = pending.pop() {
            if !visited.insert(Rc::as_ptr(&env.0)) {
                continue;
            }
            let frame = env.0.borrow();
            if let Some(value) = frame.bindings.get(name) {
                return Some(value.clone());
            }
            // Pushed in reverse so the lexical parent is searched first
            pending.extend(frame.caller.iter().cloned());
            pending.extend(frame.parent.iter().cloned());
        }
        None
    }

    /// Bind `name` in this frame
    pub fn assign(&self, name: impl Into<String>, value: Expr) {
        self.0.borrow_mut().bindings.insert(name.into(), value);
    }

    /// Bind `name` in the global frame at the root of the parent chain
    pub fn define(&self, name: impl Into<String>, value: Expr) {
        self.global().assign(name, value);
    }

    fn global(&self) -> Environment {
        let mut current = self.clone();
        loop {
            let parent = current.0.borrow().parent.clone();
            match parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// Register a native operation in this frame.
    ///
    /// This is the low-level API: the function sees the calling environment
    /// and the evaluated arguments and is responsible for its own validation.
    /// See [`crate::builtinops`] for the registry that adds arity checking
    /// and error conversion on top.
    ///
    /// # Example
    /// ```
    /// use qlisp::ast::Expr;
    /// use qlisp::{Environment, eval, parse};
    ///
    /// let env = Environment::new();
    /// env.register_builtin("count", |_env, args| Expr::Number(args.len() as i64));
    /// assert_eq!(eval(&env, parse("count 1 2 3")), Expr::Number(3));
    /// ```
    pub fn register_builtin(
        &self,
        name: &str,
        func: impl Fn(&Environment, Vec<Expr>) -> Expr + 'static,
    ) {
        tracing::trace!(name, "registering builtin");
        self.assign(name, Expr::builtin(name, func));
    }

    /// Link the call site for the duration of a closure body
    pub(crate) fn set_caller(&self, caller: Option<&Environment>) {
        self.0.borrow_mut().caller = caller.cloned();
    }

    /// Get all bindings visible from this environment through its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn bindings(&self) -> Vec<(String, Expr)> {
        let frame = self.0.borrow();
        let mut bindings: HashMap<String, Expr> = frame
            .parent
            .as_ref()
            .map(|parent| parent.bindings().into_iter().collect())
            .unwrap_or_default();

        // Local bindings shadow the parent's
        for (name, value) in &frame.bindings {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Whether `name` is bound to a native operation
    pub fn is_builtin(&self, name: &str) -> bool {
        matches!(self.find(name), Some(Expr::Lambda(Lambda::Builtin(_))))
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let frame = self.0.borrow();
        let mut names: Vec<_> = frame.bindings.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_parent", &frame.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{nil, val};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lookup_walks_parent_chain() {
        let global = Environment::new();
        global.assign("x", val(1));
        global.assign("y", val(2));

        let inner = Environment::with_parent(&global);
        inner.assign("x", val(10));

        assert_eq!(inner.lookup("x"), val(10));
        assert_eq!(inner.lookup("y"), val(2));
        assert_eq!(global.lookup("x"), val(1));
    }

    #[test]
    fn test_unbound_symbol_is_error_value() {
        let env = Environment::new();
        assert_eq!(
            env.lookup("zzz"),
            Expr::Error("Unbound symbol zzz".to_owned())
        );
    }

    #[test]
    fn test_assign_writes_current_frame_only() {
        let global = Environment::new();
        let inner = Environment::with_parent(&global);

        inner.assign("local", val(1));

        assert_eq!(inner.lookup("local"), val(1));
        assert!(global.lookup("local").is_error());
    }

    #[test]
    fn test_define_writes_global_frame() {
        let global = Environment::new();
        let middle = Environment::with_parent(&global);
        let inner = Environment::with_parent(&middle);

        inner.define("answer", val(42));

        assert_eq!(global.lookup("answer"), val(42));
        assert_eq!(middle.lookup("answer"), val(42));
    }

    #[test]
    fn test_bound_value_is_a_copy() {
        let env = Environment::new();
        let mut list = val([1, 2]);
        env.assign("l", list.clone());

        if let Expr::QExpr(cells) = &mut list {
            cells.push(val(3));
        }

        assert_eq!(env.lookup("l"), val([1, 2]));
    }

    #[test]
    fn test_caller_is_searched_after_lexical_chain() {
        let global = Environment::new();
        global.assign("shared", val("global"));

        let call_site = Environment::with_parent(&global);
        call_site.assign("shared", val("call site"));
        call_site.assign("only_caller", val(7));

        let frame = Environment::with_parent(&global);
        frame.set_caller(Some(&call_site));

        assert_eq!(frame.lookup("shared"), val("global"));
        assert_eq!(frame.lookup("only_caller"), val(7));

        frame.set_caller(None);
        assert!(frame.lookup("only_caller").is_error());
    }

    #[test]
    fn test_lookup_through_shared_parent_and_caller() {
        let global = Environment::new();
        let outer = Environment::with_parent(&global);
        outer.assign("found", val(1));

        // Every frame's parent is also its caller
        let mut frame = outer.clone();
        for _ in 0..80 {
            let next = Environment::with_parent(&frame);
            next.set_caller(Some(&frame));
            frame = next;
        }

        assert_eq!(frame.lookup("found"), val(1));
        assert!(frame.lookup("missing").is_error());
    }

    #[test]
    fn test_deep_copy_keeps_parent_and_splits_bindings() {
        let global = Environment::new();
        global.assign("g", val(1));
        let frame = Environment::with_parent(&global);
        frame.assign("x", nil());

        let copy = frame.deep_copy();
        copy.assign("x", val(5));
        global.assign("g", val(2));

        assert_eq!(frame.lookup("x"), nil());
        assert_eq!(copy.lookup("x"), val(5));
        assert_eq!(copy.lookup("g"), val(2));
    }

    #[test]
    fn test_bindings_sorted_and_shadowed() {
        let global = Environment::new();
        global.assign("b", val(1));
        global.assign("a", val(2));
        let inner = Environment::with_parent(&global);
        inner.assign("b", val(3));

        let names: Vec<_> = inner.bindings();
        assert_eq!(
            names,
            vec![("a".to_owned(), val(2)), ("b".to_owned(), val(3))]
        );
    }

    #[test]
    fn test_register_builtin() {
        let env = Environment::new();
        env.register_builtin("first", |_, mut args| {
            if args.is_empty() { nil() } else { args.remove(0) }
        });

        assert!(env.is_builtin("first"));
        assert!(!env.is_builtin("missing"));
    }

    #[test]
    fn test_defined_closures_hold_the_global_frame() {
        use crate::ast::{Closure, Lambda, sym};

        let global = Environment::new();
        for name in ["f", "g", "h"] {
            let closure = Closure {
                formals: vec![],
                body: vec![sym(name)],
                env: Environment::with_parent(&global),
            };
            global.define(name, Expr::Lambda(Lambda::Closure(closure)));
        }

        // One strong reference from this handle, one per bound closure frame
        assert_eq!(Rc::strong_count(&global.0), 4);

        global.assign("g", nil());
        assert_eq!(Rc::strong_count(&global.0), 3);
    }

    #[test]
    fn test_reregistered_builtin_is_a_new_value() {
        let env = Environment::new();
        env.register_builtin("pick", |_, _| val(1));
        let before = env.lookup("pick");
        assert_eq!(before, env.lookup("pick"));

        env.register_builtin("pick", |_, _| val(2));
        assert_ne!(before, env.lookup("pick"));
    }
}
