//! Mixin modules: immutable bundles of method contributions that can be
//! included into (or extended onto) any number of classes.
//!
//! A module carries ordered instance contributions, ordered class-level
//! contributions, and nested include/extend lists. Nesting is structural
//! here; there are no reserved contribution names.

use crate::error::RtResult;
use crate::rt::Runtime;
use crate::rt::method::{Contribution, MethodBody, SuperCall};
use crate::value::Value;

/// Stable identifier of a module descriptor in the runtime arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(u32);

impl ModuleId {
    pub(crate) fn new(raw: u32) -> Self {
        ModuleId(raw)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// The arena-resident module descriptor. Immutable once registered.
pub(crate) struct ModuleDef {
    #[allow(dead_code)]
    pub(crate) name: Option<String>,
    pub(crate) instance: Vec<(String, Contribution)>,
    pub(crate) class_level: Vec<(String, Contribution)>,
    pub(crate) includes: Vec<ModuleId>,
    pub(crate) extends: Vec<ModuleId>,
}

/// Public handle onto a registered module.
#[derive(Clone)]
pub struct Module {
    rt: Runtime,
    id: ModuleId,
    name: Option<String>,
}

impl Module {
    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "<module {name}>"),
            None => write!(f, "<module #{}>", self.id.index()),
        }
    }
}

/// Builder for module descriptors. Contribution order is preserved: when the
/// same name is contributed twice, the later one wins on application (with
/// `overwrite=true`), matching the definition-order guarantee of `include`.
pub struct ModuleBuilder {
    name: Option<String>,
    instance: Vec<(String, Contribution)>,
    class_level: Vec<(String, Contribution)>,
    includes: Vec<ModuleId>,
    extends: Vec<ModuleId>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        ModuleBuilder {
            name: None,
            instance: Vec::new(),
            class_level: Vec::new(),
            includes: Vec::new(),
            extends: Vec::new(),
        }
    }

    pub fn named(name: &str) -> Self {
        let mut builder = Self::new();
        builder.name = Some(name.to_string());
        builder
    }

    /// Contribute an instance method.
    pub fn method(
        mut self,
        name: &str,
        f: impl Fn(&Value, &[Value]) -> RtResult<Value> + 'static,
    ) -> Self {
        self.instance
            .push((name.to_string(), Contribution::Method(MethodBody::plain(f))));
        self
    }

    /// Contribute an instance method that chains to the implementation it
    /// overrides.
    pub fn chained(
        mut self,
        name: &str,
        f: impl Fn(&Value, &[Value], &SuperCall) -> RtResult<Value> + 'static,
    ) -> Self {
        self.instance.push((
            name.to_string(),
            Contribution::Method(MethodBody::chained(f)),
        ));
        self
    }

    /// Contribute a plain (non-callable) instance-side value.
    pub fn attr(mut self, name: &str, value: Value) -> Self {
        self.instance
            .push((name.to_string(), Contribution::Value(value)));
        self
    }

    pub fn class_method(
        mut self,
        name: &str,
        f: impl Fn(&Value, &[Value]) -> RtResult<Value> + 'static,
    ) -> Self {
        self.class_level
            .push((name.to_string(), Contribution::Method(MethodBody::plain(f))));
        self
    }

    pub fn class_chained(
        mut self,
        name: &str,
        f: impl Fn(&Value, &[Value], &SuperCall) -> RtResult<Value> + 'static,
    ) -> Self {
        self.class_level.push((
            name.to_string(),
            Contribution::Method(MethodBody::chained(f)),
        ));
        self
    }

    pub fn class_attr(mut self, name: &str, value: Value) -> Self {
        self.class_level
            .push((name.to_string(), Contribution::Value(value)));
        self
    }

    /// Nest another module's instance contributions; applied before this
    /// module's own when included.
    pub fn include(mut self, module: &Module) -> Self {
        self.includes.push(module.id());
        self
    }

    /// Nest another module's class-level contributions.
    pub fn extend(mut self, module: &Module) -> Self {
        self.extends.push(module.id());
        self
    }

    /// Register the module with the runtime. The descriptor is immutable
    /// from here on.
    pub fn build(self, rt: &Runtime) -> Module {
        let name = self.name.clone();
        let id = rt.register_module(ModuleDef {
            name: self.name,
            instance: self.instance,
            class_level: self.class_level,
            includes: self.includes,
            extends: self.extends,
        });
        Module {
            rt: rt.clone(),
            id,
            name,
        }
    }
}

impl Default for ModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}
