//! Method descriptors and the per-class registries that hold them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;

use crate::typ::{ClassRef, builtins};
use crate::val::Val;

mod registry;

#[cfg(test)]
mod registry_test;

pub use registry::{MethodRegistry, OverloadSet, Registration, Slot};

static NEXT_METHOD_ID: AtomicU64 = AtomicU64::new(1);

/// Callable body of a method. Static methods receive the class value as receiver.
#[derive(Clone)]
pub struct MethodHandle(Arc<dyn Fn(&Val, &[Val]) -> Result<Val> + Send + Sync>);

impl MethodHandle {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Val, &[Val]) -> Result<Val> + Send + Sync + 'static,
    {
        MethodHandle(Arc::new(f))
    }

    #[inline]
    pub fn call(&self, receiver: &Val, args: &[Val]) -> Result<Val> {
        (self.0)(receiver, args)
    }
}

impl fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MethodHandle")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodOrigin {
    /// Part of the class definition.
    Declared,
    /// Added at runtime through a meta class.
    Dynamic,
    Extension { module: Arc<str> },
    Category { name: Arc<str> },
}

impl MethodOrigin {
    /// Declared and dynamic methods outrank extension and category methods
    /// of the same signature.
    pub fn is_native(&self) -> bool {
        matches!(self, MethodOrigin::Declared | MethodOrigin::Dynamic)
    }

    pub fn label(&self) -> String {
        match self {
            MethodOrigin::Declared => "declared".to_string(),
            MethodOrigin::Dynamic => "dynamic".to_string(),
            MethodOrigin::Extension { module } => format!("extension:{module}"),
            MethodOrigin::Category { name } => format!("category:{name}"),
        }
    }
}

#[derive(Debug)]
pub struct MethodDescriptor {
    id: u64,
    owner: ClassRef,
    name: Arc<str>,
    params: Arc<[ClassRef]>,
    return_type: ClassRef,
    is_static: bool,
    visibility: Visibility,
    varargs: bool,
    origin: MethodOrigin,
    handle: MethodHandle,
}

impl MethodDescriptor {
    pub fn builder(owner: &ClassRef, name: impl Into<Arc<str>>) -> MethodBuilder {
        MethodBuilder {
            owner: owner.clone(),
            name: name.into(),
            params: Vec::new(),
            return_type: builtins().object.clone(),
            is_static: false,
            visibility: Visibility::Public,
            varargs: false,
            origin: MethodOrigin::Declared,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn owner(&self) -> &ClassRef {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn params(&self) -> &[ClassRef] {
        &self.params
    }

    pub fn params_arc(&self) -> Arc<[ClassRef]> {
        self.params.clone()
    }

    pub fn return_type(&self) -> &ClassRef {
        &self.return_type
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// The last parameter is an array collecting trailing arguments.
    pub fn is_varargs(&self) -> bool {
        self.varargs
    }

    pub fn origin(&self) -> &MethodOrigin {
        &self.origin
    }

    pub fn handle(&self) -> &MethodHandle {
        &self.handle
    }

    pub fn same_params(&self, params: &[ClassRef]) -> bool {
        same_params(&self.params, params)
    }

    /// `name(int, String...)`
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, format_params(&self.params, self.varargs))
    }

    /// `static Object Owner.name(int, String...)`
    pub fn describe(&self) -> String {
        format!(
            "{}{} {}.{}",
            if self.is_static { "static " } else { "" },
            self.return_type.name(),
            self.owner.name(),
            self.signature()
        )
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner.name(), self.signature())
    }
}

pub fn same_params(a: &[ClassRef], b: &[ClassRef]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}

pub fn format_params(params: &[ClassRef], varargs: bool) -> String {
    let mut parts: Vec<String> = params.iter().map(|p| p.name().to_string()).collect();
    if varargs
        && let (Some(last), Some(component)) = (parts.last_mut(), params.last().and_then(|p| p.component()))
    {
        *last = format!("{}...", component.name());
    }
    parts.join(", ")
}

pub struct MethodBuilder {
    owner: ClassRef,
    name: Arc<str>,
    params: Vec<ClassRef>,
    return_type: ClassRef,
    is_static: bool,
    visibility: Visibility,
    varargs: bool,
    origin: MethodOrigin,
}

impl MethodBuilder {
    pub fn param(mut self, class: &ClassRef) -> Self {
        self.params.push(class.clone());
        self
    }

    pub fn params<'a>(mut self, classes: impl IntoIterator<Item = &'a ClassRef>) -> Self {
        self.params.extend(classes.into_iter().cloned());
        self
    }

    /// Trailing `component...` parameter.
    pub fn varargs(mut self, component: &ClassRef) -> Self {
        self.params.push(component.array_of());
        self.varargs = true;
        self
    }

    pub fn returns(mut self, class: &ClassRef) -> Self {
        self.return_type = class.clone();
        self
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn origin(mut self, origin: MethodOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn build<F>(self, body: F) -> Arc<MethodDescriptor>
    where
        F: Fn(&Val, &[Val]) -> Result<Val> + Send + Sync + 'static,
    {
        self.build_with(MethodHandle::new(body))
    }

    pub fn build_with(self, handle: MethodHandle) -> Arc<MethodDescriptor> {
        Arc::new(MethodDescriptor {
            id: NEXT_METHOD_ID.fetch_add(1, Ordering::Relaxed),
            owner: self.owner,
            name: self.name,
            params: self.params.into(),
            return_type: self.return_type,
            is_static: self.is_static,
            visibility: self.visibility,
            varargs: self.varargs,
            origin: self.origin,
            handle,
        })
    }
}
