//! Lexically-scoped environments.
//!
//! Frames form a tree, not a stack: a closure keeps an `Rc` to the frame that
//! was active at its declaration, so frames stay alive for as long as any
//! live closure references them and are mass-released when the execution's
//! last reference drops.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;

use crate::value::Value;

/// A single named slot in a frame.
#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
}

/// Why an assignment through the frame chain was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    /// No frame in the chain owns a binding with this name.
    Unbound,
    /// The owning binding was declared with `const`.
    Immutable,
}

/// One frame in the environment chain.
#[derive(Debug, Default)]
pub struct Frame {
    bindings: AHashMap<String, Binding>,
    parent: Option<Rc<RefCell<Frame>>>,
}

impl Frame {
    /// Creates a root (module) frame.
    #[must_use]
    pub fn root() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Creates a child frame whose lookups fall back to `parent`.
    #[must_use]
    pub fn child(parent: &Rc<RefCell<Self>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            bindings: AHashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    /// Declares a name in this frame.
    ///
    /// Fails when the innermost frame already has a binding with this name;
    /// shadowing an *outer* binding is fine.
    pub fn declare(&mut self, name: &str, value: Value, mutable: bool) -> Result<(), ()> {
        if self.bindings.contains_key(name) {
            return Err(());
        }
        self.bindings.insert(name.to_owned(), Binding { value, mutable });
        Ok(())
    }

    /// Resolves a name, walking from this frame outwards.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.bindings.get(name) {
            return Some(binding.value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.borrow().lookup(name))
    }

    /// Assigns to an existing binding, mutating the frame that owns it.
    pub fn assign(&mut self, name: &str, value: &Value) -> Result<(), AssignError> {
        if let Some(binding) = self.bindings.get_mut(name) {
            if !binding.mutable {
                return Err(AssignError::Immutable);
            }
            binding.value = value.clone();
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().assign(name, value),
            None => Err(AssignError::Unbound),
        }
    }

    /// Names bound directly in this frame, in no particular order.
    #[must_use]
    pub fn local_names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowing_is_scoped_to_the_inner_frame() {
        let root = Frame::root();
        root.borrow_mut().declare("x", Value::Int(1), true).unwrap();
        let inner = Frame::child(&root);
        inner.borrow_mut().declare("x", Value::Int(2), true).unwrap();
        assert!(matches!(inner.borrow().lookup("x"), Some(Value::Int(2))));
        assert!(matches!(root.borrow().lookup("x"), Some(Value::Int(1))));
    }

    #[test]
    fn assignment_mutates_the_owning_frame() {
        let root = Frame::root();
        root.borrow_mut().declare("x", Value::Int(1), true).unwrap();
        let inner = Frame::child(&root);
        inner.borrow_mut().assign("x", &Value::Int(9)).unwrap();
        assert!(matches!(root.borrow().lookup("x"), Some(Value::Int(9))));
    }

    #[test]
    fn const_bindings_reject_assignment() {
        let root = Frame::root();
        root.borrow_mut().declare("k", Value::Int(1), false).unwrap();
        assert_eq!(
            root.borrow_mut().assign("k", &Value::Int(2)),
            Err(AssignError::Immutable)
        );
    }

    #[test]
    fn redeclaration_in_same_frame_fails() {
        let root = Frame::root();
        root.borrow_mut().declare("x", Value::Int(1), true).unwrap();
        assert!(root.borrow_mut().declare("x", Value::Int(2), true).is_err());
    }
}
