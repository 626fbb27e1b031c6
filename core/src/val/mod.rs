//! Runtime values as seen by dispatch.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::typ::{ClassId, ClassRef, builtins};

mod coerce;


pub use coerce::coerce;

#[derive(Clone, Default)]
pub enum Val {
    #[default]
    Nil,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(Arc<str>),
    List(Arc<[Val]>),
    Class(ClassRef),
    Object(Arc<Instance>),
}

/// Object of a user-defined class.
pub struct Instance {
    class: ClassRef,
    fields: RwLock<FxHashMap<Arc<str>, Val>>,
}

impl Instance {
    /// Declared fields start out as `nil`.
    pub fn new(class: &ClassRef) -> Arc<Self> {
        let fields = class.all_fields().into_iter().map(|f| (f, Val::Nil)).collect();
        Arc::new(Self {
            class: class.clone(),
            fields: RwLock::new(fields),
        })
    }

    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    pub fn field(&self, name: &str) -> Option<Val> {
        self.fields.read().get(name).cloned()
    }

    /// Overwrites an existing field; returns false when there is none.
    pub fn set_field(&self, name: &str, value: Val) -> bool {
        match self.fields.write().get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Adds or overwrites a property-bag entry.
    pub fn put_property(&self, name: &str, value: Val) {
        self.fields.write().insert(Arc::from(name), value);
    }

    pub fn field_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self.fields.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name())
            .field("fields", &*self.fields.read())
            .finish()
    }
}

impl Val {
    pub fn str(s: impl AsRef<str>) -> Val {
        Val::Str(Arc::from(s.as_ref()))
    }

    pub fn list(items: impl IntoIterator<Item = Val>) -> Val {
        Val::List(items.into_iter().collect())
    }

    pub fn object(class: &ClassRef) -> Val {
        Val::Object(Instance::new(class))
    }

    /// Runtime class. Primitive payloads report their box class.
    pub fn class(&self) -> ClassRef {
        let b = builtins();
        match self {
            Val::Nil => b.null.clone(),
            Val::Bool(_) => b.boolean_box.clone(),
            Val::Int(_) => b.integer.clone(),
            Val::Long(_) => b.long_box.clone(),
            Val::Float(_) => b.float_box.clone(),
            Val::Double(_) => b.double_box.clone(),
            Val::Str(_) => b.string.clone(),
            Val::List(_) => b.list.clone(),
            Val::Class(_) => b.class.clone(),
            Val::Object(obj) => obj.class.clone(),
        }
    }

    /// Class id without touching reference counts.
    #[inline]
    pub fn class_id(&self) -> ClassId {
        let b = builtins();
        match self {
            Val::Nil => b.null.id(),
            Val::Bool(_) => b.boolean_box.id(),
            Val::Int(_) => b.integer.id(),
            Val::Long(_) => b.long_box.id(),
            Val::Float(_) => b.float_box.id(),
            Val::Double(_) => b.double_box.id(),
            Val::Str(_) => b.string.id(),
            Val::List(_) => b.list.id(),
            Val::Class(_) => b.class.id(),
            Val::Object(obj) => obj.class.id(),
        }
    }

    pub fn type_name(&self) -> String {
        self.class().name().to_string()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Val::Nil)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Val::Int(i) => Some(*i as i64),
            Val::Long(l) => Some(*l),
            Val::Float(f) => Some(*f as i64),
            Val::Double(d) => Some(*d as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Val::Int(i) => Some(*i as f64),
            Val::Long(l) => Some(*l as f64),
            Val::Float(f) => Some(*f as f64),
            Val::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Val::Int(_) | Val::Long(_) | Val::Float(_) | Val::Double(_))
    }

    /// Value equality used by `equals`: numbers compare by value across kinds.
    pub fn loose_eq(&self, other: &Val) -> bool {
        match (self, other) {
            (a, b) if a.is_number() && b.is_number() => match (a, b) {
                (Val::Int(_) | Val::Long(_), Val::Int(_) | Val::Long(_)) => a.as_i64() == b.as_i64(),
                _ => a.as_f64() == b.as_f64(),
            },
            (Val::List(a), Val::List(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq(y)),
            _ => self == other,
        }
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Nil, Val::Nil) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Long(a), Val::Long(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a == b,
            (Val::Double(a), Val::Double(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::List(a), Val::List(b)) => a == b,
            (Val::Class(a), Val::Class(b)) => a == b,
            (Val::Object(a), Val::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn fmt_float(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.is_finite() && value.fract() == 0.0 {
        write!(f, "{value:.1}")
    } else {
        write!(f, "{value}")
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Nil => f.write_str("null"),
            Val::Bool(b) => write!(f, "{b}"),
            Val::Int(i) => write!(f, "{i}"),
            Val::Long(l) => write!(f, "{l}"),
            Val::Float(x) => fmt_float(f, *x as f64),
            Val::Double(x) => fmt_float(f, *x),
            Val::Str(s) => f.write_str(s),
            Val::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Val::Class(class) => write!(f, "class {}", class.name()),
            Val::Object(obj) => write!(f, "{}@{:x}", obj.class.name(), Arc::as_ptr(obj) as *const () as usize),
        }
    }
}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Str(s) => write!(f, "{s:?}"),
            Val::Object(obj) => write!(f, "{obj:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl From<bool> for Val {
    #[inline]
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

impl From<i32> for Val {
    #[inline]
    fn from(i: i32) -> Self {
        Val::Int(i)
    }
}

impl From<i64> for Val {
    #[inline]
    fn from(i: i64) -> Self {
        Val::Long(i)
    }
}

impl From<f32> for Val {
    #[inline]
    fn from(x: f32) -> Self {
        Val::Float(x)
    }
}

impl From<f64> for Val {
    #[inline]
    fn from(x: f64) -> Self {
        Val::Double(x)
    }
}

impl From<&str> for Val {
    #[inline]
    fn from(s: &str) -> Self {
        Val::Str(Arc::from(s))
    }
}

impl From<String> for Val {
    #[inline]
    fn from(s: String) -> Self {
        Val::Str(Arc::<str>::from(s))
    }
}

impl<T> From<Vec<T>> for Val
where
    T: Into<Val>,
{
    fn from(items: Vec<T>) -> Self {
        Val::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<ClassRef> for Val {
    fn from(class: ClassRef) -> Self {
        Val::Class(class)
    }
}
