//! Method table engine.
//!
//! Shared by instance-method and class-method tables: a slot is either a
//! plain value (non-callable class attributes ride through the same path) or
//! a method entry. Method bodies are tagged at definition time: a
//! [`MethodBody::Plain`] body never chains to an ancestor, a
//! [`MethodBody::Chained`] body always receives a [`SuperCall`] capability.
//! The capability carries a snapshot of the ancestor implementation resolved
//! when the override is defined, not per call.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::error::{RtErrorKind, RtResult, err};
use crate::value::Value;

/// Insertion-ordered slot table. Ordering matters when a table is copied into
/// a subclass or iterated during module composition.
pub type Table = IndexMap<String, Slot, ahash::RandomState>;

pub type PlainFn = Rc<dyn Fn(&Value, &[Value]) -> RtResult<Value>>;
pub type ChainFn = Rc<dyn Fn(&Value, &[Value], &SuperCall) -> RtResult<Value>>;

/// A user-supplied method body, tagged by whether it chains to the
/// implementation it overrides.
#[derive(Clone)]
pub enum MethodBody {
    Plain(PlainFn),
    Chained(ChainFn),
}

impl MethodBody {
    pub fn plain(f: impl Fn(&Value, &[Value]) -> RtResult<Value> + 'static) -> Self {
        MethodBody::Plain(Rc::new(f))
    }

    pub fn chained(f: impl Fn(&Value, &[Value], &SuperCall) -> RtResult<Value> + 'static) -> Self {
        MethodBody::Chained(Rc::new(f))
    }

    pub fn chains(&self) -> bool {
        matches!(self, MethodBody::Chained(_))
    }
}

/// The callable actually invoked at dispatch time.
#[derive(Clone)]
pub struct Dispatch(Rc<dyn Fn(&Value, &[Value]) -> RtResult<Value>>);

impl Dispatch {
    pub fn call(&self, receiver: &Value, args: &[Value]) -> RtResult<Value> {
        (self.0)(receiver, args)
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<dispatch>")
    }
}

/// A defined method: the body as supplied, plus the wrapped dispatch form.
#[derive(Clone)]
pub struct MethodEntry {
    pub body: MethodBody,
    pub dispatch: Dispatch,
}

impl MethodEntry {
    /// Wrap `body` for dispatch. `ancestor` is the implementation this entry
    /// overrides, resolved by the caller through the owner's superclass chain
    /// at definition time; it is captured here once and never re-resolved.
    fn new(body: MethodBody, ancestor: Option<Dispatch>) -> Self {
        let dispatch = match &body {
            MethodBody::Plain(f) => {
                let f = f.clone();
                Dispatch(Rc::new(move |recv, args| f(recv, args)))
            }
            MethodBody::Chained(f) => {
                let f = f.clone();
                Dispatch(Rc::new(move |recv, args| {
                    let sup = SuperCall::new(recv.clone(), args, ancestor.clone());
                    f(recv, args, &sup)
                }))
            }
        };
        MethodEntry { body, dispatch }
    }
}

/// Table slot: plain value or method.
#[derive(Clone)]
pub enum Slot {
    Value(Value),
    Method(MethodEntry),
}

/// What a definition call contributes before wrapping.
#[derive(Clone)]
pub enum Contribution {
    Value(Value),
    Method(MethodBody),
}

impl Contribution {
    /// Re-contribute an existing slot, e.g. when a subclass copies its
    /// parent's class-method table. Chained bodies are re-wrapped against the
    /// new owner's ancestry by the definition path.
    pub fn of_slot(slot: &Slot) -> Contribution {
        match slot {
            Slot::Value(v) => Contribution::Value(v.clone()),
            Slot::Method(entry) => Contribution::Method(entry.body.clone()),
        }
    }
}

/// The conditional-define-with-super-wrapping core.
///
/// - non-callable contributions are stored as plain values, no wrapping
/// - an existing name with `overwrite == false` is left alone (first
///   definition wins, silently)
/// - chained bodies are wrapped against `ancestor`, the definition-time
///   snapshot of the implementation being overridden
pub(crate) fn define_slot(
    table: &mut Table,
    name: &str,
    contribution: Contribution,
    overwrite: bool,
    ancestor: Option<Dispatch>,
) {
    if !overwrite && table.contains_key(name) {
        return;
    }
    let slot = match contribution {
        Contribution::Value(v) => Slot::Value(v),
        Contribution::Method(body) => Slot::Method(MethodEntry::new(body, ancestor)),
    };
    table.insert(name.to_string(), slot);
}

/// The super-call capability handed to chained method bodies.
///
/// Replaces the transient per-receiver "super" slot of classic dynamic
/// designs with a per-activation value: nothing is stored on the receiver, so
/// reentrant and nested super calls need no save/restore discipline.
///
/// Argument forwarding keeps the original merge semantics: the capability
/// starts with the activation's arguments, and each call positionally
/// overrides the first k of them. The merge persists across successive calls
/// within one activation.
pub struct SuperCall {
    receiver: Value,
    merged: RefCell<SmallVec<[Value; 4]>>,
    ancestor: Option<Dispatch>,
}

impl SuperCall {
    fn new(receiver: Value, args: &[Value], ancestor: Option<Dispatch>) -> Self {
        SuperCall {
            receiver,
            merged: RefCell::new(SmallVec::from(args)),
            ancestor,
        }
    }

    /// Whether an ancestor implementation exists. Bodies that chain
    /// conditionally can check this instead of eating a `MissingSuper`.
    pub fn exists(&self) -> bool {
        self.ancestor.is_some()
    }

    /// Invoke the overridden implementation. `args` positionally override the
    /// merged argument buffer; omitted positions keep their current values.
    pub fn call(&self, args: &[Value]) -> RtResult<Value> {
        let ancestor = self.ancestor.as_ref().ok_or_else(|| {
            err(
                RtErrorKind::MissingSuper,
                "no ancestor implementation to call".to_string(),
            )
        })?;
        let forwarded: SmallVec<[Value; 4]> = {
            let mut merged = self.merged.borrow_mut();
            for (i, arg) in args.iter().enumerate() {
                if i < merged.len() {
                    merged[i] = arg.clone();
                } else {
                    merged.push(arg.clone());
                }
            }
            merged.clone()
        };
        ancestor.call(&self.receiver, &forwarded)
    }
}
