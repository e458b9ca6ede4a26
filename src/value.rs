//! The dynamic value universe the runtime dispatches over.
//!
//! Everything a method body can receive or return is a [`Value`]. Primitives
//! are inline; strings, lists, instances and callables are reference-counted
//! so that cloning a `Value` is always cheap.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::RtResult;
use crate::rt::Class;
use crate::rt::instance::Instance;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    /// A class reference: the class handle is itself a value, so class-level
    /// dispatch can use the same receiver position as instances.
    Class(Class),
    Instance(Instance),
    Function(Callable),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Class(_) | Value::Instance(_) | Value::Function(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
            Value::Function(_) => "function",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) => *a as f64 == *b,
            (Value::Float(a), Value::Int(b)) => *a == *b as f64,
            (Value::Str(a), Value::Str(b)) => a == b,
            // Lists and instances compare by identity, not contents.
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => a.ptr_eq(b),
            (Value::Class(a), Value::Class(b)) => a.same_as(b),
            // Callables are never equal to anything, themselves included.
            _ => false,
        }
    }
}

/// A callable with its receiver (and any bound state) already captured.
///
/// This is what `instance.method(name)` hands back: invoking it dispatches to
/// the underlying implementation with the receiver pre-bound.
#[derive(Clone)]
pub struct Callable(Rc<dyn Fn(&[Value]) -> RtResult<Value>>);

impl Callable {
    pub fn new(f: impl Fn(&[Value]) -> RtResult<Value> + 'static) -> Self {
        Callable(Rc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> RtResult<Value> {
        (self.0)(args)
    }
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<function>")
    }
}

/// Value display, for diagnostics and formatted reports.
pub fn display_value(v: &Value) -> String {
    match v {
        Value::None => "none".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Str(s) => s.to_string(),
        Value::List(items) => {
            let items = items.borrow();
            let contents: Vec<String> = items.iter().map(display_value).collect();
            format!("[{}]", contents.join(", "))
        }
        Value::Class(klass) => format!("<class {}>", klass.display_name()),
        Value::Instance(inst) => format!("<instance of {}>", inst.class_name()),
        Value::Function(_) => "<function>".to_string(),
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", display_value(self))
    }
}
