//! Class model used by dispatch.
//!
//! Classes are immutable once defined. Identity is the [`ClassId`]; two
//! [`ClassRef`]s compare equal when they point at the same class id.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use rustc_hash::{FxBuildHasher, FxHashSet};

mod builtins;
mod conversion;
mod numeric;
mod universe;


pub use builtins::{Builtins, builtins};
pub use conversion::{MatchTier, at_least_as_specific, conversion};
pub use numeric::Prim;
pub use universe::{ClassBuilder, TypeUniverse};

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

// component class id -> array class
static ARRAY_CLASSES: Lazy<DashMap<ClassId, ClassRef, FxBuildHasher>> = Lazy::new(DashMap::default);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(u64);

impl ClassId {
    fn fresh() -> Self {
        ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum ClassKind {
    /// Unboxed primitive; never a receiver class for dispatch.
    Primitive(Prim),
    /// Reference box of a primitive (`Integer` for `int`).
    Boxed(Prim),
    Class,
    Interface,
    Array(ClassRef),
    /// Runtime class of `nil`.
    Null,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassFlags {
    /// No subclasses may exist; lets the planner bind calls statically.
    pub is_final: bool,
    /// Instances accept arbitrary properties.
    pub expando: bool,
}

#[derive(Debug)]
pub struct ClassInfo {
    id: ClassId,
    name: Arc<str>,
    kind: ClassKind,
    superclass: Option<ClassRef>,
    interfaces: Vec<ClassRef>,
    fields: Vec<Arc<str>>,
    flags: ClassFlags,
    retired: AtomicBool,
}

impl ClassInfo {
    #[inline]
    pub fn id(&self) -> ClassId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    #[inline]
    pub fn kind(&self) -> &ClassKind {
        &self.kind
    }

    pub fn superclass(&self) -> Option<&ClassRef> {
        self.superclass.as_ref()
    }

    pub fn interfaces(&self) -> &[ClassRef] {
        &self.interfaces
    }

    /// Fields declared directly on this class.
    pub fn declared_fields(&self) -> &[Arc<str>] {
        &self.fields
    }

    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    pub fn is_final(&self) -> bool {
        self.flags.is_final
    }

    /// True when this class or any superclass accepts arbitrary properties.
    pub fn is_expando(&self) -> bool {
        self.flags.expando || self.superclass.as_ref().is_some_and(|s| s.is_expando())
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, ClassKind::Interface)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, ClassKind::Primitive(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ClassKind::Null)
    }

    pub fn primitive(&self) -> Option<Prim> {
        match self.kind {
            ClassKind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn boxed_primitive(&self) -> Option<Prim> {
        match self.kind {
            ClassKind::Boxed(p) => Some(p),
            _ => None,
        }
    }

    /// Primitive value carried by this class, boxed or not.
    pub fn numeric_or_bool(&self) -> Option<Prim> {
        match self.kind {
            ClassKind::Primitive(p) | ClassKind::Boxed(p) => Some(p),
            _ => None,
        }
    }

    pub fn component(&self) -> Option<&ClassRef> {
        match &self.kind {
            ClassKind::Array(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// Whether `field` is declared here or on a superclass.
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.as_ref() == field) || self.superclass.as_ref().is_some_and(|s| s.has_field(field))
    }

    /// All declared fields, superclass fields first.
    pub fn all_fields(&self) -> Vec<Arc<str>> {
        let mut out = self.superclass.as_ref().map(|s| s.all_fields()).unwrap_or_default();
        for field in &self.fields {
            if !out.contains(field) {
                out.push(field.clone());
            }
        }
        out
    }

    /// Reference subtyping (reflexive). Primitives are only subtypes of themselves.
    pub fn is_subclass_of(&self, other: &ClassInfo) -> bool {
        if self.id == other.id {
            return true;
        }
        if self.is_primitive() || other.is_primitive() {
            return false;
        }
        if other.id == builtins().object.id() {
            return true;
        }
        if let (ClassKind::Array(a), ClassKind::Array(b)) = (&self.kind, &other.kind) {
            return !a.is_primitive() && a.is_subclass_of(b);
        }
        if self.superclass.as_ref().is_some_and(|s| s.is_subclass_of(other)) {
            return true;
        }
        other.is_interface() && self.interfaces.iter().any(|i| i.is_subclass_of(other))
    }
}

/// Shared handle to a class.
#[derive(Clone)]
pub struct ClassRef(Arc<ClassInfo>);

impl ClassRef {
    pub(crate) fn new(
        name: impl Into<Arc<str>>,
        kind: ClassKind,
        superclass: Option<ClassRef>,
        interfaces: Vec<ClassRef>,
        fields: Vec<Arc<str>>,
        flags: ClassFlags,
    ) -> Self {
        ClassRef(Arc::new(ClassInfo {
            id: ClassId::fresh(),
            name: name.into(),
            kind,
            superclass,
            interfaces,
            fields,
            flags,
            retired: AtomicBool::new(false),
        }))
    }

    pub fn downgrade(&self) -> WeakClassRef {
        WeakClassRef(Arc::downgrade(&self.0))
    }

    /// `T[]` for this class, created once per component.
    pub fn array_of(&self) -> ClassRef {
        ARRAY_CLASSES
            .entry(self.id())
            .or_insert_with(|| {
                ClassRef::new(
                    format!("{}[]", self.name()),
                    ClassKind::Array(self.clone()),
                    Some(builtins().object.clone()),
                    Vec::new(),
                    Vec::new(),
                    ClassFlags {
                        is_final: true,
                        expando: false,
                    },
                )
            })
            .clone()
    }

    /// Class whose meta class answers calls on values of this class:
    /// primitives dispatch through their box.
    pub fn dispatch_class(&self) -> ClassRef {
        match self.kind {
            ClassKind::Primitive(p) => builtins().boxed(p).clone(),
            _ => self.clone(),
        }
    }

    /// Lookup order for inherited methods: the class and its superclasses
    /// (excluding `Object`), then interfaces breadth-first, then `Object`.
    pub fn linearize(&self) -> Vec<ClassRef> {
        let object = &builtins().object;
        let mut out: Vec<ClassRef> = Vec::new();
        let mut seen: FxHashSet<ClassId> = FxHashSet::default();

        let mut cursor = Some(self.clone());
        while let Some(class) = cursor {
            if class.id() == object.id() {
                break;
            }
            seen.insert(class.id());
            cursor = class.superclass().cloned();
            out.push(class);
        }

        let mut queue: std::collections::VecDeque<ClassRef> =
            out.iter().flat_map(|c| c.interfaces().iter().cloned()).collect();
        while let Some(iface) = queue.pop_front() {
            if !seen.insert(iface.id()) {
                continue;
            }
            queue.extend(iface.interfaces().iter().cloned());
            out.push(iface);
        }

        out.push(object.clone());
        out
    }
}

impl Deref for ClassRef {
    type Target = ClassInfo;

    #[inline]
    fn deref(&self) -> &ClassInfo {
        &self.0
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ClassRef {}

impl std::hash::Hash for ClassRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassRef({})", self.name())
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug)]
pub struct WeakClassRef(Weak<ClassInfo>);

impl WeakClassRef {
    pub fn upgrade(&self) -> Option<ClassRef> {
        self.0.upgrade().map(ClassRef)
    }
}
