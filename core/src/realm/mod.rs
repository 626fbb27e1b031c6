//! Isolation scopes for dispatch metadata.
//!
//! Realms form a tree rooted at the runtime's root realm. A realm only
//! holds registries for classes it overrides; every other lookup falls
//! through to the parent and finally to the runtime-wide base registries.
//! Lookups never go sideways or down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;

use crate::category;
use crate::clock;
use crate::error::DispatchError;
use crate::meta::{ArgInfo, MetaClass, Operator, Resolved, TypeLayer};
use crate::method::{MethodDescriptor, MethodRegistry, Registration};
use crate::rt::Shared;
use crate::typ::{ClassId, ClassRef, builtins};
use crate::val::Val;


/// Counters from one sweep of a realm subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted_meta_classes: usize,
    pub dropped_registries: usize,
    pub dead_realms: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.evicted_meta_classes += other.evicted_meta_classes;
        self.dropped_registries += other.dropped_registries;
        self.dead_realms += other.dead_realms;
    }
}

pub struct Realm {
    name: Arc<str>,
    shared: Arc<Shared>,
    parent: Option<Weak<Realm>>,
    me: Weak<Realm>,
    children: Mutex<Vec<Weak<Realm>>>,
    overrides: DashMap<ClassId, Arc<MethodRegistry>, FxBuildHasher>,
    meta_classes: DashMap<ClassId, Arc<MetaClass>, FxBuildHasher>,
    /// Topology stamp: bumped when this realm gains an override layer or an
    /// ancestor goes away.
    epoch: Arc<AtomicU64>,
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("name", &self.name)
            .field("overrides", &self.overrides.len())
            .field("meta_classes", &self.meta_classes.len())
            .finish()
    }
}

impl Realm {
    pub(crate) fn root(shared: Arc<Shared>) -> Arc<Realm> {
        Self::create("root".into(), shared, None)
    }

    fn create(name: Arc<str>, shared: Arc<Shared>, parent: Option<Weak<Realm>>) -> Arc<Realm> {
        Arc::new_cyclic(|me| Realm {
            name,
            shared,
            parent,
            me: me.clone(),
            children: Mutex::new(Vec::new()),
            overrides: DashMap::default(),
            meta_classes: DashMap::default(),
            epoch: Arc::new(AtomicU64::new(clock::tick())),
        })
    }

    /// Creates a child that sees this realm's methods until it overrides them.
    pub fn new_child(&self, name: impl Into<Arc<str>>) -> Arc<Realm> {
        let child = Self::create(name.into(), self.shared.clone(), Some(self.me.clone()));
        self.children.lock().push(Arc::downgrade(&child));
        tracing::debug!(target: "mop::realm", realm = %child.name, parent = %self.name, "realm created");
        child
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// `None` for the root realm and for realms whose parent was dropped.
    pub fn parent(&self) -> Option<Arc<Realm>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn children(&self) -> Vec<Arc<Realm>> {
        self.children.lock().iter().filter_map(Weak::upgrade).collect()
    }

    /// Fails when the parent was dropped; the realm keeps working against
    /// the base registries.
    pub fn check_attached(&self) -> Result<(), DispatchError> {
        match &self.parent {
            Some(parent) if parent.upgrade().is_none() => Err(DispatchError::RealmDetached {
                realm: self.name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Current topology stamp of this realm and its live ancestors.
    pub fn chain_stamp(&self) -> u64 {
        let mut stamp = self.epoch.load(Ordering::SeqCst);
        let mut cursor = self.parent();
        while let Some(realm) = cursor {
            stamp = stamp.max(realm.epoch.load(Ordering::SeqCst));
            cursor = realm.parent();
        }
        stamp
    }

    fn chain_epochs(&self) -> Vec<Arc<AtomicU64>> {
        let mut out = vec![self.epoch.clone()];
        let mut cursor = self.parent();
        while let Some(realm) = cursor {
            out.push(realm.epoch.clone());
            cursor = realm.parent();
        }
        out
    }

    fn bump_epoch(&self) {
        self.epoch.store(clock::tick(), Ordering::SeqCst);
    }

    /// Registries for `class` from this realm up to the base, nearest first.
    fn registries_for(&self, class: &ClassRef) -> Vec<Arc<MethodRegistry>> {
        let mut out = Vec::new();
        if let Some(own) = self.overrides.get(&class.id()) {
            out.push(own.clone());
        }
        let mut cursor = self.parent();
        while let Some(realm) = cursor {
            if let Some(reg) = realm.overrides.get(&class.id()) {
                out.push(reg.clone());
            }
            cursor = realm.parent();
        }
        out.push(self.shared.base_registry(class));
        out
    }

    fn build_meta(&self, class: &ClassRef) -> MetaClass {
        // epochs are captured before the layers so a concurrent topology
        // change leaves the table stale rather than silently incomplete
        let chain = self.chain_epochs();
        let layers = class
            .linearize()
            .into_iter()
            .map(|c| TypeLayer {
                registries: self.registries_for(&c),
                class: c,
            })
            .collect();
        MetaClass::new(class.clone(), self.name.clone(), layers, chain)
    }

    /// Dispatch table for `class` in this realm, built on first use.
    /// Primitive classes share the table of their box.
    pub fn meta_class(&self, class: &ClassRef) -> Arc<MetaClass> {
        let class = class.dispatch_class();
        let sweep = self.shared.sweep_count();
        if let Some(cached) = self.meta_classes.get(&class.id())
            && cached.is_current()
        {
            cached.touch(sweep);
            return cached.value().clone();
        }
        let meta = Arc::new(self.build_meta(&class));
        meta.touch(sweep);
        let mut slot = self.meta_classes.entry(class.id()).or_insert_with(|| meta.clone());
        // another thread may have published a table first; keep whichever is current
        if !Arc::ptr_eq(slot.value(), &meta) && !slot.is_current() {
            *slot = meta.clone();
        }
        slot.value().clone()
    }

    /// Table answering calls on `value`. Class values get their own class's
    /// table so that static methods resolve.
    pub fn meta_class_of(&self, value: &Val) -> Arc<MetaClass> {
        match value {
            Val::Class(class) => self.meta_class(class),
            other => self.meta_class(&other.class()),
        }
    }

    /// Resolution with the calling thread's categories.
    pub fn resolve(&self, receiver: &Val, name: &str, args: &[Val]) -> Result<Resolved, DispatchError> {
        let infos: Vec<ArgInfo> = args.iter().map(ArgInfo::of).collect();
        self.resolve_shape(&self.meta_class_of(receiver), receiver, name, &infos)
    }

    /// Resolution against a meta class the caller already holds.
    pub(crate) fn resolve_shape(
        &self,
        meta: &MetaClass,
        receiver: &Val,
        name: &str,
        args: &[ArgInfo],
    ) -> Result<Resolved, DispatchError> {
        let categories = category::current();
        match receiver {
            Val::Class(class) if class == meta.class() => match meta.resolve_with(true, name, args, &categories) {
                // class values also answer the instance methods of `Class`
                Err(err @ DispatchError::MethodNotFound { .. }) => {
                    match self
                        .meta_class(&builtins().class)
                        .resolve_with(false, name, args, &categories)
                    {
                        Ok(mut resolved) => {
                            resolved.cacheable = false;
                            Ok(resolved)
                        }
                        Err(DispatchError::MethodNotFound { .. }) => Err(err),
                        Err(other) => Err(other),
                    }
                }
                other => other,
            },
            _ => meta.resolve_with(false, name, args, &categories),
        }
    }

    pub fn invoke_method(&self, receiver: &Val, name: &str, args: &[Val]) -> Result<Val, DispatchError> {
        self.resolve(receiver, name, args)?.invoke(receiver, args)
    }

    pub fn get_property(&self, receiver: &Val, property: &str) -> Result<Val, DispatchError> {
        self.meta_class_of(receiver).get_property(receiver, property)
    }

    pub fn set_property(&self, receiver: &Val, property: &str, value: Val) -> Result<(), DispatchError> {
        self.meta_class_of(receiver).set_property(receiver, property, value)
    }

    /// Applies `op` to `lhs` with the remaining operands in `args`.
    pub fn apply_operator(&self, op: Operator, lhs: &Val, args: &[Val]) -> Result<Val, DispatchError> {
        if matches!(op, Operator::Equals | Operator::NotEquals) {
            let rhs = args.first().cloned().unwrap_or_default();
            let equal = if lhs.is_nil() || rhs.is_nil() {
                lhs.is_nil() && rhs.is_nil()
            } else {
                matches!(self.invoke_method(lhs, op.method_name(), args)?, Val::Bool(true))
            };
            return Ok(Val::Bool(equal == (op == Operator::Equals)));
        }
        let result = self.invoke_method(lhs, op.method_name(), args)?;
        if op.is_relational() {
            let cmp = result.as_i64().ok_or_else(|| DispatchError::Invocation {
                method: format!("{}.compareTo", lhs.type_name()),
                source: anyhow::anyhow!("compareTo returned {} instead of a number", result.type_name()),
            })?;
            return Ok(Val::Bool(op.from_ordering(cmp)));
        }
        Ok(result)
    }

    /// Adds `method` to its owner's registry in this realm. The root realm
    /// writes the base registries; child realms write override layers.
    pub fn add_method(&self, method: Arc<MethodDescriptor>) -> Result<Registration, DispatchError> {
        let owner = method.owner().clone();
        let registry = if self.is_root() {
            self.shared.base_registry(&owner)
        } else {
            self.override_registry(&owner)
        };
        let outcome = registry.register(method.clone())?;
        tracing::debug!(
            target: "mop::realm",
            realm = %self.name,
            method = %method,
            origin = %method.origin().label(),
            "method added"
        );
        Ok(outcome)
    }

    /// Removes `name(params)` from `class` as seen by this realm. In a child
    /// realm a method inherited from an ancestor is masked instead.
    /// Returns whether anything visible changed.
    pub fn remove_method(&self, class: &ClassRef, name: &str, params: &[ClassRef]) -> bool {
        if self.is_root() {
            return self.shared.base_registry(class).remove(name, params).is_some();
        }
        let own = self.overrides.get(&class.id()).map(|r| r.clone());
        let removed = own.as_ref().and_then(|r| r.remove(name, params)).is_some();
        let inherited = self
            .registries_for(class)
            .iter()
            .filter(|r| !own.as_ref().is_some_and(|o| Arc::ptr_eq(o, r)))
            .any(|r| r.lookup(name).iter().any(|m| m.same_params(params)));
        if inherited {
            self.override_registry(class).mask(name, params);
        }
        tracing::debug!(target: "mop::realm", realm = %self.name, class = class.name(), method = name, removed, masked = inherited, "method removed");
        removed || inherited
    }

    fn override_registry(&self, class: &ClassRef) -> Arc<MethodRegistry> {
        if let Some(existing) = self.overrides.get(&class.id()) {
            return existing.clone();
        }
        let registry = self
            .overrides
            .entry(class.id())
            .or_insert_with(|| Arc::new(MethodRegistry::new(class)))
            .clone();
        // a new layer changes what every table in this realm should see
        self.bump_epoch();
        tracing::debug!(target: "mop::realm", realm = %self.name, class = class.name(), "override layer created");
        registry
    }

    #[inline]
    pub(crate) fn sweep_count(&self) -> u64 {
        self.shared.sweep_count()
    }

    /// Number of cached tables, for diagnostics.
    pub fn cached_meta_classes(&self) -> usize {
        self.meta_classes.len()
    }

    /// Reclaims metadata in this realm and its descendants.
    pub(crate) fn sweep(&self, sweep: u64, idle_sweeps: u64) -> SweepReport {
        let mut report = SweepReport::default();

        let before = self.meta_classes.len();
        self.meta_classes.retain(|_, cached| {
            let idle = sweep.saturating_sub(cached.last_used());
            !cached.class().is_retired() && idle < idle_sweeps
        });
        report.evicted_meta_classes = before - self.meta_classes.len();

        let before = self.overrides.len();
        self.overrides.retain(|_, reg| !reg.owner().is_retired());
        report.dropped_registries = before - self.overrides.len();
        if report.dropped_registries > 0 {
            self.bump_epoch();
        }

        let children: Vec<Arc<Realm>> = {
            let mut children = self.children.lock();
            let before = children.len();
            children.retain(|c| c.strong_count() > 0);
            report.dead_realms = before - children.len();
            children.iter().filter_map(Weak::upgrade).collect()
        };
        for child in children {
            report.merge(child.sweep(sweep, idle_sweeps));
        }
        report
    }
}

fn bump_subtree(realm: &Realm) {
    realm.bump_epoch();
    for child in realm.children() {
        bump_subtree(&child);
    }
}

impl Drop for Realm {
    fn drop(&mut self) {
        // descendants still reference this realm's layers
        let children: Vec<Arc<Realm>> = self.children.get_mut().iter().filter_map(Weak::upgrade).collect();
        for child in &children {
            bump_subtree(child);
        }
        tracing::debug!(target: "mop::realm", realm = %self.name, orphaned = children.len(), "realm dropped");
    }
}
