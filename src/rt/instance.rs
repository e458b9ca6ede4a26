//! Instances: attribute store, dispatch, and the single-shot construction
//! protocol.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{RtErrorKind, RtResult, err};
use crate::rt::method::Slot;
use crate::rt::{Class, ClassId, Runtime};
use crate::value::{Callable, Value};

/// An instance of a runtime-declared class. `Rc`-backed: clones share the
/// attribute map and construction state.
#[derive(Clone)]
pub struct Instance {
    cell: Rc<InstanceCell>,
}

struct InstanceCell {
    rt: Runtime,
    class: ClassId,
    attrs: RefCell<HashMap<String, Value>>,
    constructed: Cell<bool>,
}

impl Instance {
    pub(crate) fn allocate(rt: Runtime, class: ClassId) -> Instance {
        Instance {
            cell: Rc::new(InstanceCell {
                rt,
                class,
                attrs: RefCell::new(HashMap::new()),
                constructed: Cell::new(false),
            }),
        }
    }

    pub fn class_id(&self) -> ClassId {
        self.cell.class
    }

    pub fn class(&self) -> Class {
        self.cell.rt.class(self.cell.class)
    }

    pub fn class_name(&self) -> String {
        self.cell.rt.class_display_name(self.cell.class)
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// Run the constructor hook. Locks before dispatching, so a second
    /// explicit invocation (or re-entry from a forwarding subclass
    /// initializer) is a silent no-op.
    pub fn construct(&self, args: &[Value]) -> RtResult<Value> {
        if self.cell.constructed.replace(true) {
            return Ok(Value::None);
        }
        self.call("initialize", args)
    }

    /// Read an attribute. Falls back to ancestor-chain plain slots, and binds
    /// method slots so `get` mirrors property access on a dynamic receiver.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.cell.attrs.borrow().get(name) {
            return Some(v.clone());
        }
        match self.cell.rt.instance_lookup(self.cell.class, name)? {
            Slot::Value(v) => Some(v),
            Slot::Method(_) => self.method(name).ok().map(Value::Function),
        }
    }

    /// Write an attribute on this instance. Never touches class tables.
    pub fn set(&self, name: &str, value: Value) {
        self.cell.attrs.borrow_mut().insert(name.to_string(), value);
    }

    /// Invoke an instance method, resolving through the ancestor chain.
    pub fn call(&self, name: &str, args: &[Value]) -> RtResult<Value> {
        match self.cell.rt.instance_lookup(self.cell.class, name) {
            Some(Slot::Method(entry)) => {
                entry.dispatch.call(&Value::Instance(self.clone()), args)
            }
            Some(Slot::Value(_)) => Err(err(
                RtErrorKind::NotCallable,
                format!("{}.{} is not callable", self.class_name(), name),
            )),
            None => Err(err(
                RtErrorKind::MissingMethod,
                format!("{} has no method {}", self.class_name(), name),
            )),
        }
    }

    /// A callable with this instance pre-bound as receiver.
    pub fn method(&self, name: &str) -> RtResult<Callable> {
        match self.cell.rt.instance_lookup(self.cell.class, name) {
            Some(Slot::Method(entry)) => {
                let receiver = Value::Instance(self.clone());
                let dispatch = entry.dispatch;
                Ok(Callable::new(move |args| dispatch.call(&receiver, args)))
            }
            Some(Slot::Value(_)) => Err(err(
                RtErrorKind::NotCallable,
                format!("{}.{} is not callable", self.class_name(), name),
            )),
            None => Err(err(
                RtErrorKind::MissingMethod,
                format!("{} has no method {}", self.class_name(), name),
            )),
        }
    }

    /// Whether dispatch would find a method for `name`.
    pub fn responds_to(&self, name: &str) -> bool {
        matches!(
            self.cell.rt.instance_lookup(self.cell.class, name),
            Some(Slot::Method(_))
        )
    }

    /// Ancestor-chain membership test.
    pub fn is_a(&self, klass: &Class) -> bool {
        self.cell.rt.same_arena(klass.runtime()) && self.cell.rt.is_kind(self.cell.class, klass.id())
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<instance of {}>", self.class_name())
    }
}
