//! The class runtime: an arena of class descriptors plus the public handles
//! that operate on it.
//!
//! Classes live in a [`Runtime`]-owned arena and are addressed by stable
//! [`ClassId`]s; subclass edges are id lists, so class-method propagation is a
//! traversal over the arena rather than pointer-chasing through shared
//! objects. All definition and dispatch paths clone what they need out of the
//! arena before running user code, so no borrow is ever held across a user
//! method body.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{RtErrorKind, RtResult, err};
use crate::value::{Value, display_value};

pub mod instance;
pub mod method;
pub mod module_def;

#[cfg(test)]
mod tests;

use instance::Instance;
use method::{Contribution, Dispatch, MethodBody, Slot, Table, define_slot};
use module_def::{Module, ModuleDef, ModuleId};

// ========== arena ==========

/// Stable identifier of a class descriptor in the runtime arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(u32);

impl ClassId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A class descriptor: ancestry link, subclass edges, and the two method
/// tables. Descriptors are never removed; the runtime has process-wide
/// lifetime.
pub struct ClassDef {
    pub name: Option<String>,
    pub superclass: Option<ClassId>,
    /// Every id whose descriptor names this class as superclass, in creation
    /// order. Append-only.
    pub subclasses: Vec<ClassId>,
    pub instance_methods: Table,
    pub class_methods: Table,
}

pub(crate) struct Arena {
    pub(crate) classes: Vec<ClassDef>,
    pub(crate) modules: Vec<ModuleDef>,
}

/// The shared runtime. Cloning is cheap and yields a handle onto the same
/// arena. Single-threaded by construction (`Rc`-based, not `Send`).
#[derive(Clone)]
pub struct Runtime {
    arena: Rc<RefCell<Arena>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Runtime {
            arena: Rc::new(RefCell::new(Arena {
                classes: Vec::new(),
                modules: Vec::new(),
            })),
        }
    }

    /// Create a class, optionally subclassing `parent`, then include the
    /// given modules in order.
    pub fn create_class(&self, parent: Option<&Class>, modules: &[&Module]) -> Class {
        let id = {
            let mut arena = self.arena.borrow_mut();
            let id = ClassId(arena.classes.len() as u32);
            arena.classes.push(ClassDef {
                name: None,
                superclass: parent.map(|p| p.id),
                subclasses: Vec::new(),
                instance_methods: Table::default(),
                class_methods: Table::default(),
            });
            if let Some(p) = parent {
                arena.classes[p.id.index()].subclasses.push(id);
            }
            id
        };
        // Class-level capabilities inherit by copying the parent's table as
        // own entries; chained bodies re-wrap against the new ancestry.
        if let Some(p) = parent {
            self.extend_from_class(id, p.id, true);
        } else {
            // Roots carry the baseline instance capabilities; subclasses see
            // them through the ancestor chain and must not shadow overrides
            // made anywhere along it.
            self.seed_baseline(id);
        }
        let klass = Class {
            rt: self.clone(),
            id,
        };
        for module in modules {
            klass.include(module);
        }
        klass
    }

    /// Rebuild a handle from a stable id.
    pub fn class(&self, id: ClassId) -> Class {
        Class {
            rt: self.clone(),
            id,
        }
    }

    pub(crate) fn same_arena(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.arena, &other.arena)
    }

    // ========== definition paths ==========

    pub(crate) fn define_instance_method(
        &self,
        class: ClassId,
        name: &str,
        contribution: Contribution,
        overwrite: bool,
    ) {
        let ancestor = {
            let arena = self.arena.borrow();
            let parent = arena.classes[class.index()].superclass;
            arena.chain_method_dispatch(parent, name, TableSide::Instance)
        };
        let mut arena = self.arena.borrow_mut();
        let def = &mut arena.classes[class.index()];
        define_slot(&mut def.instance_methods, name, contribution, overwrite, ancestor);
    }

    /// Class-method definition with subclass propagation: every subclass is
    /// visited first with `overwrite=false`, so a newly declared ancestor
    /// capability reaches subclasses that never defined the name while
    /// existing subclass entries are never clobbered.
    pub(crate) fn define_class_method(
        &self,
        class: ClassId,
        name: &str,
        contribution: Contribution,
        overwrite: bool,
    ) {
        let subclasses = self.arena.borrow().classes[class.index()].subclasses.clone();
        for sub in subclasses {
            self.define_class_method(sub, name, contribution.clone(), false);
        }
        let ancestor = {
            let arena = self.arena.borrow();
            let parent = arena.classes[class.index()].superclass;
            arena.chain_method_dispatch(parent, name, TableSide::Class)
        };
        let mut arena = self.arena.borrow_mut();
        let def = &mut arena.classes[class.index()];
        define_slot(&mut def.class_methods, name, contribution, overwrite, ancestor);
    }

    /// Apply a module's instance contributions: nested includes first, then
    /// nested extends, then the module's own contributions in order.
    pub(crate) fn include_module(&self, class: ClassId, module: ModuleId, overwrite: bool) {
        let (includes, extends, contributions) = {
            let arena = self.arena.borrow();
            let def = &arena.modules[module.index()];
            (
                def.includes.clone(),
                def.extends.clone(),
                def.instance.clone(),
            )
        };
        for nested in includes {
            self.include_module(class, nested, true);
        }
        for nested in extends {
            self.extend_with_module(class, nested, true);
        }
        for (name, contribution) in contributions {
            self.define_instance_method(class, &name, contribution, overwrite);
        }
    }

    /// Apply a module's class-level contributions, nested extends first.
    pub(crate) fn extend_with_module(&self, class: ClassId, module: ModuleId, overwrite: bool) {
        let (extends, contributions) = {
            let arena = self.arena.borrow();
            let def = &arena.modules[module.index()];
            (def.extends.clone(), def.class_level.clone())
        };
        for nested in extends {
            self.extend_with_module(class, nested, true);
        }
        for (name, contribution) in contributions {
            self.define_class_method(class, &name, contribution, overwrite);
        }
    }

    /// Extend `class` with another class's own class-method table. Baseline
    /// machinery never lives in tables, so nothing baseline re-propagates.
    pub(crate) fn extend_from_class(&self, class: ClassId, source: ClassId, overwrite: bool) {
        let entries: Vec<(String, Contribution)> = {
            let arena = self.arena.borrow();
            arena.classes[source.index()]
                .class_methods
                .iter()
                .map(|(name, slot)| (name.clone(), Contribution::of_slot(slot)))
                .collect()
        };
        for (name, contribution) in entries {
            self.define_class_method(class, &name, contribution, overwrite);
        }
    }

    /// Seed the baseline instance capabilities every hierarchy carries: a
    /// no-op constructor hook, the bound-method accessor, and the ancestry
    /// test. Seeded on root descriptors only; subclasses resolve them through
    /// the chain.
    fn seed_baseline(&self, class: ClassId) {
        self.define_instance_method(
            class,
            "initialize",
            Contribution::Method(MethodBody::plain(|_, _| Ok(Value::None))),
            false,
        );
        self.define_instance_method(
            class,
            "method",
            Contribution::Method(MethodBody::plain(|recv, args| {
                let inst = expect_instance(recv)?;
                let name = match args.first() {
                    Some(v) => expect_str(v)?,
                    None => {
                        return Err(err(
                            RtErrorKind::ArityError {
                                expected: 1,
                                got: 0,
                            },
                            "method() takes a method name".to_string(),
                        ));
                    }
                };
                Ok(Value::Function(inst.method(&name)?))
            })),
            false,
        );
        self.define_instance_method(
            class,
            "isA",
            Contribution::Method(MethodBody::plain(|recv, args| {
                let inst = expect_instance(recv)?;
                match args.first() {
                    Some(Value::Class(klass)) => Ok(Value::Bool(inst.is_a(klass))),
                    Some(other) => Err(err(
                        RtErrorKind::TypeError("class"),
                        format!("isA() expects a class, got {}", other.type_name()),
                    )),
                    None => Err(err(
                        RtErrorKind::ArityError {
                            expected: 1,
                            got: 0,
                        },
                        "isA() takes a class".to_string(),
                    )),
                }
            })),
            false,
        );
    }

    // ========== lookup ==========

    /// Resolve an instance-side slot through the ancestor chain.
    pub(crate) fn instance_lookup(&self, start: ClassId, name: &str) -> Option<Slot> {
        let arena = self.arena.borrow();
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            let def = &arena.classes[id.index()];
            if let Some(slot) = def.instance_methods.get(name) {
                return Some(slot.clone());
            }
            cursor = def.superclass;
        }
        None
    }

    /// Own-table class-side slot. Class methods are complete per descriptor
    /// (copied at creation, propagated on later definitions), so there is no
    /// chain walk here.
    pub(crate) fn class_lookup(&self, class: ClassId, name: &str) -> Option<Slot> {
        self.arena.borrow().classes[class.index()]
            .class_methods
            .get(name)
            .cloned()
    }

    /// Ancestry membership: identity walk up the superclass links.
    pub(crate) fn is_kind(&self, start: ClassId, target: ClassId) -> bool {
        let arena = self.arena.borrow();
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            if id == target {
                return true;
            }
            cursor = arena.classes[id.index()].superclass;
        }
        false
    }

    pub(crate) fn class_display_name(&self, class: ClassId) -> String {
        let arena = self.arena.borrow();
        match &arena.classes[class.index()].name {
            Some(name) => name.clone(),
            None => format!("#{}", class.index()),
        }
    }

    pub(crate) fn register_module(&self, def: ModuleDef) -> ModuleId {
        let mut arena = self.arena.borrow_mut();
        let id = ModuleId::new(arena.modules.len() as u32);
        arena.modules.push(def);
        id
    }
}

/// Which method table a chain walk consults.
#[derive(Clone, Copy)]
enum TableSide {
    Instance,
    Class,
}

impl Arena {
    /// First slot for `name` walking the chain from `start`, mapped to its
    /// dispatch form. A plain-value slot shadows anything above it and is not
    /// callable, so it resolves to no dispatch.
    fn chain_method_dispatch(
        &self,
        start: Option<ClassId>,
        name: &str,
        side: TableSide,
    ) -> Option<Dispatch> {
        let mut cursor = start;
        while let Some(id) = cursor {
            let def = &self.classes[id.index()];
            let table = match side {
                TableSide::Instance => &def.instance_methods,
                TableSide::Class => &def.class_methods,
            };
            if let Some(slot) = table.get(name) {
                return match slot {
                    Slot::Method(entry) => Some(entry.dispatch.clone()),
                    Slot::Value(_) => None,
                };
            }
            cursor = def.superclass;
        }
        None
    }
}

// ========== class handle ==========

/// Public handle onto one class descriptor. Cheap to clone; all mutation goes
/// through the runtime arena.
#[derive(Clone)]
pub struct Class {
    rt: Runtime,
    id: ClassId,
}

impl Class {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    pub fn same_as(&self, other: &Class) -> bool {
        self.id == other.id && self.rt.same_arena(&other.rt)
    }

    /// Attach a diagnostics name.
    pub fn named(self, name: &str) -> Self {
        self.rt.arena.borrow_mut().classes[self.id.index()].name = Some(name.to_string());
        self
    }

    pub fn display_name(&self) -> String {
        self.rt.class_display_name(self.id)
    }

    pub fn superclass(&self) -> Option<Class> {
        let parent = self.rt.arena.borrow().classes[self.id.index()].superclass;
        parent.map(|id| self.rt.class(id))
    }

    /// Whether this class is `ancestor` or descends from it.
    pub fn descends_from(&self, ancestor: &Class) -> bool {
        self.rt.is_kind(self.id, ancestor.id)
    }

    // ----- definition surface -----

    /// Full-control definition of an instance-side slot.
    pub fn define(&self, name: &str, contribution: Contribution, overwrite: bool) -> &Self {
        self.rt
            .define_instance_method(self.id, name, contribution, overwrite);
        self
    }

    /// Full-control definition of a class-side slot, with subclass
    /// propagation.
    pub fn define_class(&self, name: &str, contribution: Contribution, overwrite: bool) -> &Self {
        self.rt
            .define_class_method(self.id, name, contribution, overwrite);
        self
    }

    /// Define (or overwrite) an instance method.
    pub fn method(
        &self,
        name: &str,
        f: impl Fn(&Value, &[Value]) -> RtResult<Value> + 'static,
    ) -> &Self {
        self.define(name, Contribution::Method(MethodBody::plain(f)), true)
    }

    /// Define an instance method that chains to the implementation it
    /// overrides via the supplied super capability.
    pub fn chained(
        &self,
        name: &str,
        f: impl Fn(&Value, &[Value], &method::SuperCall) -> RtResult<Value> + 'static,
    ) -> &Self {
        self.define(name, Contribution::Method(MethodBody::chained(f)), true)
    }

    /// Store a plain (non-callable) value on the instance side.
    pub fn attr(&self, name: &str, value: Value) -> &Self {
        self.define(name, Contribution::Value(value), true)
    }

    pub fn class_method(
        &self,
        name: &str,
        f: impl Fn(&Value, &[Value]) -> RtResult<Value> + 'static,
    ) -> &Self {
        self.define_class(name, Contribution::Method(MethodBody::plain(f)), true)
    }

    pub fn class_chained(
        &self,
        name: &str,
        f: impl Fn(&Value, &[Value], &method::SuperCall) -> RtResult<Value> + 'static,
    ) -> &Self {
        self.define_class(name, Contribution::Method(MethodBody::chained(f)), true)
    }

    pub fn class_attr(&self, name: &str, value: Value) -> &Self {
        self.define_class(name, Contribution::Value(value), true)
    }

    // ----- composition surface -----

    pub fn include(&self, module: &Module) -> &Self {
        self.include_with(module, true)
    }

    pub fn include_with(&self, module: &Module, overwrite: bool) -> &Self {
        self.rt.include_module(self.id, module.id(), overwrite);
        self
    }

    /// Include several modules in order.
    pub fn include_all(&self, modules: &[&Module]) -> &Self {
        for module in modules {
            self.include(module);
        }
        self
    }

    pub fn extend(&self, module: &Module) -> &Self {
        self.extend_with(module, true)
    }

    /// Extend with several modules in order.
    pub fn extend_all(&self, modules: &[&Module]) -> &Self {
        for module in modules {
            self.extend(module);
        }
        self
    }

    pub fn extend_with(&self, module: &Module, overwrite: bool) -> &Self {
        self.rt.extend_with_module(self.id, module.id(), overwrite);
        self
    }

    /// Take another class's own class-level capabilities.
    pub fn extend_class(&self, source: &Class) -> &Self {
        self.extend_class_with(source, true)
    }

    pub fn extend_class_with(&self, source: &Class, overwrite: bool) -> &Self {
        self.rt.extend_from_class(self.id, source.id, overwrite);
        self
    }

    // ----- instances & dispatch -----

    /// Instantiate: allocates the instance and runs the constructor hook
    /// exactly once with `args`.
    pub fn new_instance(&self, args: &[Value]) -> RtResult<Instance> {
        let inst = Instance::allocate(self.rt.clone(), self.id);
        inst.construct(args)?;
        Ok(inst)
    }

    /// Invoke a class method. Resolution is against this descriptor's own
    /// table only.
    pub fn call(&self, name: &str, args: &[Value]) -> RtResult<Value> {
        let slot = self.rt.class_lookup(self.id, name);
        match slot {
            Some(Slot::Method(entry)) => entry.dispatch.call(&Value::Class(self.clone()), args),
            Some(Slot::Value(_)) => Err(err(
                RtErrorKind::NotCallable,
                format!("{}.{} is not callable", self.display_name(), name),
            )),
            None => Err(err(
                RtErrorKind::MissingMethod,
                format!("class {} has no method {}", self.display_name(), name),
            )),
        }
    }

    /// Read a class-level slot: plain values come back as-is, methods come
    /// back bound to this class.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self.rt.class_lookup(self.id, name)? {
            Slot::Value(v) => Some(v),
            Slot::Method(entry) => {
                let receiver = Value::Class(self.clone());
                let dispatch = entry.dispatch;
                Some(Value::Function(crate::value::Callable::new(move |args| {
                    dispatch.call(&receiver, args)
                })))
            }
        }
    }

    /// Resolve the dispatch form of an instance method through the ancestor
    /// chain, without binding a receiver.
    pub fn resolve_method(&self, name: &str) -> Option<Dispatch> {
        match self.rt.instance_lookup(self.id, name)? {
            Slot::Method(entry) => Some(entry.dispatch),
            Slot::Value(_) => None,
        }
    }
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<class {}>", self.display_name())
    }
}

// ========== uniform dispatch & helpers ==========

/// Dispatch `name` on any receiver value that can receive methods.
pub fn send(receiver: &Value, name: &str, args: &[Value]) -> RtResult<Value> {
    match receiver {
        Value::Instance(inst) => inst.call(name, args),
        Value::Class(klass) => klass.call(name, args),
        other => Err(err(
            RtErrorKind::TypeError("receiver"),
            format!("cannot dispatch {} on {}", name, other.type_name()),
        )),
    }
}

pub(crate) fn expect_instance(v: &Value) -> RtResult<&Instance> {
    match v {
        Value::Instance(inst) => Ok(inst),
        other => Err(err(
            RtErrorKind::TypeError("instance"),
            format!("expected an instance, got {}", display_value(other)),
        )),
    }
}

pub(crate) fn expect_str(v: &Value) -> RtResult<String> {
    match v {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(err(
            RtErrorKind::TypeError("str"),
            format!("expected a string, got {}", other.type_name()),
        )),
    }
}
