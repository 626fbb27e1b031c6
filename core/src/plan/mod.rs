//! Static-versus-dynamic dispatch decisions for compiled call expressions.
//!
//! The planner binds a call ahead of time only when nothing at runtime can
//! change which method runs; everything else gets a call site.

use std::fmt;
use std::sync::Arc;

use crate::callsite::CallSiteArray;
use crate::category::{self, CategorySnapshot};
use crate::error::DispatchError;
use crate::meta::{ArgInfo, CallForm, MetaClass, Resolved};
use crate::method::{MethodDescriptor, Visibility};
use crate::realm::Realm;
use crate::typ::{ClassRef, builtins};
use crate::val::Val;


/// What the compiler knows about an expression's class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticType {
    /// Untyped.
    Dynamic,
    /// The `null` literal.
    Null,
    /// Exactly this class, e.g. a constructor call or literal.
    Exact(ClassRef),
    /// This class or any subclass.
    Declared(ClassRef),
}

impl StaticType {
    /// Class every runtime value of this type has, if there is only one.
    pub fn pinned(&self) -> Option<ClassRef> {
        match self {
            StaticType::Dynamic => None,
            StaticType::Null => Some(builtins().null.clone()),
            StaticType::Exact(class) => Some(class.clone()),
            StaticType::Declared(class) if class.is_final() || class.is_primitive() => Some(class.clone()),
            StaticType::Declared(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receiver {
    /// `Type.method(...)`: static call on a class.
    Class(ClassRef),
    Value(StaticType),
}

/// A call expression as seen by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallShape {
    pub receiver: Receiver,
    pub name: Arc<str>,
    pub args: Vec<StaticType>,
}

impl CallShape {
    pub fn on(receiver: StaticType, name: &str) -> Self {
        Self {
            receiver: Receiver::Value(receiver),
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn on_class(class: &ClassRef, name: &str) -> Self {
        Self {
            receiver: Receiver::Class(class.clone()),
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, ty: StaticType) -> Self {
        self.args.push(ty);
        self
    }
}

/// Why a call could not be bound ahead of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicReason {
    DynamicReceiver,
    /// Receiver class could be a subclass at runtime.
    OpenReceiver,
    OpenArgument(usize),
    ExpandoReceiver,
    CategoriesActive,
    Unresolved,
    Ambiguous,
    NotPublic,
}

impl fmt::Display for DynamicReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynamicReason::DynamicReceiver => write!(f, "receiver is untyped"),
            DynamicReason::OpenReceiver => write!(f, "receiver class is not final"),
            DynamicReason::OpenArgument(i) => write!(f, "argument {i} class is not final"),
            DynamicReason::ExpandoReceiver => write!(f, "receiver class is expando"),
            DynamicReason::CategoriesActive => write!(f, "categories are active"),
            DynamicReason::Unresolved => write!(f, "no applicable method"),
            DynamicReason::Ambiguous => write!(f, "ambiguous overloads"),
            DynamicReason::NotPublic => write!(f, "target is not public"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CallPlan {
    /// Bound ahead of time.
    Direct {
        method: Arc<MethodDescriptor>,
        form: CallForm,
        meta: Arc<MetaClass>,
        generation: u64,
    },
    /// Deferred to the call site at `site` in the planner's array.
    Dynamic { site: usize, reason: DynamicReason },
}

impl CallPlan {
    pub fn is_direct(&self) -> bool {
        matches!(self, CallPlan::Direct { .. })
    }

    /// Whether a direct binding still reflects the metadata it was made from.
    /// Dynamic plans are always current.
    pub fn is_current(&self) -> bool {
        match self {
            CallPlan::Direct { meta, generation, .. } => meta.is_current() && meta.generation() == *generation,
            CallPlan::Dynamic { .. } => true,
        }
    }

    /// Runs a direct plan; dynamic plans go through `sites`.
    pub fn invoke(&self, sites: &CallSiteArray, receiver: &Val, args: &[Val]) -> Result<Val, DispatchError> {
        match self {
            CallPlan::Direct { method, form, .. } => Resolved {
                method: method.clone(),
                form: *form,
                cacheable: true,
            }
            .invoke(receiver, args),
            CallPlan::Dynamic { site, .. } => sites.call(*site, receiver, args),
        }
    }
}

impl fmt::Display for CallPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallPlan::Direct { method, form, .. } => match form {
                CallForm::Direct => write!(f, "direct {method}"),
                CallForm::Packed { .. } => write!(f, "direct {method} (varargs)"),
                CallForm::Expanded { .. } => write!(f, "direct {method} (spread)"),
            },
            CallPlan::Dynamic { site, reason } => write!(f, "dynamic site #{site} ({reason})"),
        }
    }
}

/// Plans the calls of one compilation unit against one realm.
#[derive(Debug)]
pub struct DispatchPlanner {
    realm: Arc<Realm>,
    sites: CallSiteArray,
}

impl DispatchPlanner {
    pub fn new(realm: Arc<Realm>, polymorphic_limit: usize) -> Self {
        Self {
            sites: CallSiteArray::new(realm.clone(), polymorphic_limit),
            realm,
        }
    }

    pub fn realm(&self) -> &Arc<Realm> {
        &self.realm
    }

    pub fn sites(&self) -> &CallSiteArray {
        &self.sites
    }

    /// Hands the unit's call sites to the code that will run it.
    pub fn into_sites(self) -> CallSiteArray {
        self.sites
    }

    pub fn plan(&mut self, shape: &CallShape) -> CallPlan {
        match self.decide(shape) {
            Ok((meta, generation, resolved)) => {
                tracing::debug!(target: "mop::plan", method = %resolved.method, "call bound directly");
                CallPlan::Direct {
                    method: resolved.method,
                    form: resolved.form,
                    meta,
                    generation,
                }
            }
            Err(reason) => {
                let site = self.sites.allocate(&shape.name);
                tracing::debug!(target: "mop::plan", method = %shape.name, site, %reason, "call left dynamic");
                CallPlan::Dynamic { site, reason }
            }
        }
    }

    /// The direct target for `shape`, or why there is none.
    pub fn decide(&self, shape: &CallShape) -> Result<(Arc<MetaClass>, u64, Resolved), DynamicReason> {
        if category::is_active() {
            return Err(DynamicReason::CategoriesActive);
        }
        let (class, static_only) = match &shape.receiver {
            Receiver::Class(class) => (class.clone(), true),
            Receiver::Value(StaticType::Dynamic) => return Err(DynamicReason::DynamicReceiver),
            Receiver::Value(ty) => (ty.pinned().ok_or(DynamicReason::OpenReceiver)?, false),
        };
        if class.is_expando() {
            return Err(DynamicReason::ExpandoReceiver);
        }
        let args = shape
            .args
            .iter()
            .enumerate()
            .map(|(i, ty)| ty.pinned().map(|c| ArgInfo::class(&c)).ok_or(DynamicReason::OpenArgument(i)))
            .collect::<Result<Vec<_>, _>>()?;

        let meta = self.realm.meta_class(&class);
        let generation = meta.generation();
        let resolved = meta
            .resolve_with(static_only, &shape.name, &args, &CategorySnapshot::empty())
            .map_err(|err| match err {
                DispatchError::AmbiguousMethod { .. } => DynamicReason::Ambiguous,
                _ => DynamicReason::Unresolved,
            })?;
        if resolved.method.visibility() != Visibility::Public {
            return Err(DynamicReason::NotPublic);
        }
        Ok((meta, generation, resolved))
    }
}
