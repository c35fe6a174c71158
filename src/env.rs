use rustc_hash::FxHashMap;

use crate::error::ScriptError;
use crate::value::Value;

/// The persistent global frame plus a stack of local frames, one per
/// active function call. Only the *global* frame and the *current* local
/// frame (the top of `locals`) are ever consulted — a function call never
/// sees an outer call's locals, matching spec.md §1's "functions capture
/// by reference to the enclosing global bot scope only, no closures with
/// free variables". If/While/For bodies don't push a frame at all, so
/// they naturally share whatever frame is already active (spec.md §3).
pub struct Environment {
    global: FxHashMap<String, Value>,
    locals: Vec<FxHashMap<String, Value>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            global: FxHashMap::default(),
            locals: vec![],
        }
    }

    /// Pushes a fresh local frame for a function call.
    pub fn push(&mut self) {
        self.locals.push(FxHashMap::default());
    }

    /// Pops the innermost local frame when a function call returns.
    pub fn pop(&mut self) {
        self.locals.pop().expect("pop() without a matching push()");
    }

    /// Defines `name` in the current frame: the active local frame if a
    /// function call is in progress, otherwise the global frame.
    pub fn define(&mut self, name: &str, value: Value) {
        match self.locals.last_mut() {
            Some(frame) => frame.insert(name.to_string(), value),
            None => self.global.insert(name.to_string(), value),
        };
    }

    /// Defines `name` in the global frame regardless of current depth —
    /// used to seed special variables before every turn (spec.md §3
    /// invariant 4).
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.global.insert(name.to_string(), value);
    }

    pub fn lookup(&self, name: &str, line: usize) -> Result<Value, ScriptError> {
        if let Some(frame) = self.locals.last() {
            if let Some(v) = frame.get(name) {
                return Ok(v.clone());
            }
        }
        self.global
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::runtime(line, format!("undefined variable '{name}'")))
    }

    /// Updates the active frame's binding if it already holds `name`;
    /// otherwise falls through to the global frame (creating it there if
    /// needed). This is the "global-by-default" `set` semantics spec.md
    /// §3/§9 call out explicitly (NOT "always write globally").
    pub fn assign(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.locals.last_mut() {
            if frame.contains_key(name) {
                frame.insert(name.to_string(), value);
                return;
            }
        }
        self.global.insert(name.to_string(), value);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_then_lookup() {
        let mut env = Environment::new();
        env.define("x", Value::Int(1));
        assert!(matches!(env.lookup("x", 1), Ok(Value::Int(1))));
    }

    #[test]
    fn lookup_missing_is_runtime_error() {
        let env = Environment::new();
        assert!(env.lookup("missing", 7).is_err());
    }

    #[test]
    fn assign_updates_innermost_holder() {
        let mut env = Environment::new();
        env.define("x", Value::Int(1));
        env.push();
        env.define("x", Value::Int(2));
        env.assign("x", Value::Int(3));
        assert!(matches!(env.lookup("x", 1), Ok(Value::Int(3))));
        env.pop();
        assert!(matches!(env.lookup("x", 1), Ok(Value::Int(1))));
    }

    #[test]
    fn assign_to_new_name_inside_frame_writes_global() {
        let mut env = Environment::new();
        env.push();
        env.assign("y", Value::Int(5));
        env.pop();
        assert!(matches!(env.lookup("y", 1), Ok(Value::Int(5))));
    }

    #[test]
    fn nested_calls_cannot_see_an_outer_calls_locals() {
        let mut env = Environment::new();
        env.push();
        env.define("a", Value::Int(1));
        env.push();
        env.define("b", Value::Int(2));
        assert!(env.lookup("a", 1).is_err());
        assert!(matches!(env.lookup("b", 1), Ok(Value::Int(2))));
        env.pop();
        assert!(matches!(env.lookup("a", 1), Ok(Value::Int(1))));
        env.pop();
    }
}
