use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{ClassFlags, ClassKind, ClassRef, builtins};
use crate::error::DispatchError;

/// Describes a user class before it is defined.
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    name: Arc<str>,
    superclass: Option<ClassRef>,
    interfaces: Vec<ClassRef>,
    fields: Vec<Arc<str>>,
    flags: ClassFlags,
    interface: bool,
}

impl ClassBuilder {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            flags: ClassFlags::default(),
            interface: false,
        }
    }

    /// Declares an interface instead of a class.
    pub fn interface(name: impl Into<Arc<str>>) -> Self {
        Self {
            interface: true,
            ..Self::new(name)
        }
    }

    pub fn extends(mut self, superclass: &ClassRef) -> Self {
        self.superclass = Some(superclass.clone());
        self
    }

    pub fn implements(mut self, iface: &ClassRef) -> Self {
        self.interfaces.push(iface.clone());
        self
    }

    pub fn field(mut self, name: impl Into<Arc<str>>) -> Self {
        self.fields.push(name.into());
        self
    }

    pub fn final_class(mut self) -> Self {
        self.flags.is_final = true;
        self
    }

    pub fn expando(mut self) -> Self {
        self.flags.expando = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn build(self) -> ClassRef {
        if self.interface {
            return ClassRef::new(self.name, ClassKind::Interface, None, self.interfaces, Vec::new(), self.flags);
        }
        let superclass = self.superclass.unwrap_or_else(|| builtins().object.clone());
        ClassRef::new(self.name, ClassKind::Class, Some(superclass), self.interfaces, self.fields, self.flags)
    }
}

/// Name -> class table for one runtime. Builtins are always present.
#[derive(Debug)]
pub struct TypeUniverse {
    by_name: DashMap<Arc<str>, ClassRef>,
}

impl Default for TypeUniverse {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeUniverse {
    pub fn new() -> Self {
        let by_name = DashMap::new();
        for class in builtins().all() {
            by_name.insert(class.name_arc(), class.clone());
        }
        Self { by_name }
    }

    pub fn define(&self, builder: ClassBuilder) -> Result<ClassRef, DispatchError> {
        if let Some(sup) = &builder.superclass
            && sup.is_final()
        {
            return Err(DispatchError::InvalidClass {
                name: builder.name.to_string(),
                reason: format!("superclass {} is final", sup.name()),
            });
        }
        match self.by_name.entry(builder.name.clone()) {
            Entry::Occupied(_) => Err(DispatchError::DuplicateClass {
                name: builder.name.to_string(),
            }),
            Entry::Vacant(slot) => {
                let class = builder.build();
                tracing::debug!(target: "mop::meta", class = class.name(), id = class.id().as_u64(), "class defined");
                slot.insert(class.clone());
                Ok(class)
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ClassRef> {
        self.by_name.get(name).map(|c| c.clone())
    }

    pub fn require(&self, name: &str) -> Result<ClassRef, DispatchError> {
        self.resolve_type_name(name)
            .ok_or_else(|| DispatchError::UnknownClass { name: name.to_string() })
    }

    /// Resolves a class name as written in signatures, including `T[]`.
    pub fn resolve_type_name(&self, name: &str) -> Option<ClassRef> {
        let name = name.trim();
        if let Some(component) = name.strip_suffix("[]") {
            return self.resolve_type_name(component).map(|c| c.array_of());
        }
        self.lookup(name)
    }

    /// Removes a user class; its metadata is reclaimed by the next sweep.
    pub fn retire(&self, name: &str) -> Result<ClassRef, DispatchError> {
        if builtins().all().iter().any(|c| c.name() == name) {
            return Err(DispatchError::InvalidClass {
                name: name.to_string(),
                reason: "builtin classes cannot be retired".into(),
            });
        }
        let (_, class) = self
            .by_name
            .remove(name)
            .ok_or_else(|| DispatchError::UnknownClass { name: name.to_string() })?;
        class.retire();
        tracing::debug!(target: "mop::meta", class = class.name(), "class retired");
        Ok(class)
    }

    /// All known classes sorted by name.
    pub fn classes(&self) -> Vec<ClassRef> {
        let mut out: Vec<ClassRef> = self.by_name.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.name().cmp(b.name()));
        out
    }
}
