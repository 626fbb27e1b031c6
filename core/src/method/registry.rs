use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rustc_hash::FxBuildHasher;

use super::{MethodDescriptor, format_params, same_params};
use crate::clock;
use crate::error::DispatchError;
use crate::typ::ClassRef;

#[derive(Debug, Clone)]
pub enum Slot {
    Method(Arc<MethodDescriptor>),
    /// Hides a same-signature method visible from a parent realm.
    Masked(Arc<[ClassRef]>),
}

impl Slot {
    pub fn params(&self) -> &[ClassRef] {
        match self {
            Slot::Method(m) => m.params(),
            Slot::Masked(p) => p,
        }
    }
}

/// Immutable snapshot of one name's overloads, in registration order.
#[derive(Debug, Clone, Default)]
pub struct OverloadSet(Arc<[Slot]>);

impl OverloadSet {
    pub fn slots(&self) -> &[Slot] {
        &self.0
    }

    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodDescriptor>> {
        self.0.iter().filter_map(|s| match s {
            Slot::Method(m) => Some(m),
            Slot::Masked(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn position(&self, params: &[ClassRef]) -> Option<usize> {
        self.0.iter().position(|s| same_params(s.params(), params))
    }

    fn with(&self, slot: Slot, at: Option<usize>) -> OverloadSet {
        let mut slots = self.0.to_vec();
        match at {
            Some(i) => slots[i] = slot,
            None => slots.push(slot),
        }
        OverloadSet(slots.into())
    }

    fn without(&self, at: usize) -> OverloadSet {
        let mut slots = self.0.to_vec();
        slots.remove(at);
        OverloadSet(slots.into())
    }
}

#[derive(Debug, Clone)]
pub enum Registration {
    Added,
    /// An extension method of the same signature was replaced.
    Replaced(Arc<MethodDescriptor>),
    /// A native method of the same signature already exists and stays.
    Shadowed,
}

/// Methods one class contributes in one realm layer.
///
/// Each name maps to an [`OverloadSet`] that is swapped as a whole on
/// change; readers holding an older set keep a consistent view.
#[derive(Debug)]
pub struct MethodRegistry {
    owner: ClassRef,
    overloads: DashMap<Arc<str>, OverloadSet, FxBuildHasher>,
    stamp: AtomicU64,
}

impl MethodRegistry {
    pub fn new(owner: &ClassRef) -> Self {
        Self {
            owner: owner.clone(),
            overloads: DashMap::default(),
            stamp: AtomicU64::new(clock::tick()),
        }
    }

    pub fn owner(&self) -> &ClassRef {
        &self.owner
    }

    /// Dispatch-clock value of the last mutation.
    #[inline]
    pub fn stamp(&self) -> u64 {
        self.stamp.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.stamp.store(clock::tick(), Ordering::SeqCst);
    }

    pub fn register(&self, method: Arc<MethodDescriptor>) -> Result<Registration, DispatchError> {
        let name = method.name_arc();
        let outcome = match self.overloads.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(OverloadSet(Arc::from(vec![Slot::Method(method.clone())])));
                Registration::Added
            }
            Entry::Occupied(mut slot) => {
                let set = slot.get();
                let at = set.position(method.params());
                match at.map(|i| &set.slots()[i]) {
                    None | Some(Slot::Masked(_)) => {
                        let next = set.with(Slot::Method(method.clone()), at);
                        slot.insert(next);
                        Registration::Added
                    }
                    Some(Slot::Method(existing)) => match (existing.origin().is_native(), method.origin().is_native()) {
                        (true, false) => Registration::Shadowed,
                        (false, true) => {
                            let old = existing.clone();
                            let next = set.with(Slot::Method(method.clone()), at);
                            slot.insert(next);
                            Registration::Replaced(old)
                        }
                        _ => {
                            return Err(DispatchError::DuplicateMethod {
                                owner: self.owner.name().to_string(),
                                signature: method.signature(),
                            });
                        }
                    },
                }
            }
        };
        match &outcome {
            Registration::Shadowed => {
                tracing::warn!(
                    target: "mop::meta",
                    owner = self.owner.name(),
                    method = %method.signature(),
                    origin = %method.origin().label(),
                    "method shadowed by existing declaration"
                );
            }
            _ => self.touch(),
        }
        Ok(outcome)
    }

    /// Visible overloads for `name` in registration order.
    pub fn lookup(&self, name: &str) -> Vec<Arc<MethodDescriptor>> {
        self.overloads(name).methods().cloned().collect()
    }

    /// Slots for `name`, including masks.
    pub fn overloads(&self, name: &str) -> OverloadSet {
        self.overloads.get(name).map(|s| s.clone()).unwrap_or_default()
    }

    pub fn remove(&self, name: &str, params: &[ClassRef]) -> Option<Arc<MethodDescriptor>> {
        let Entry::Occupied(mut slot) = self.overloads.entry(Arc::from(name)) else {
            return None;
        };
        let at = slot.get().position(params)?;
        let Slot::Method(removed) = slot.get().slots()[at].clone() else {
            return None;
        };
        let next = slot.get().without(at);
        if next.is_empty() {
            slot.remove();
        } else {
            slot.insert(next);
        }
        self.touch();
        Some(removed)
    }

    /// Hides `name(params)` from lower layers. Any method this registry
    /// holds for the signature is dropped.
    pub fn mask(&self, name: &str, params: &[ClassRef]) {
        let masked = Slot::Masked(params.iter().cloned().collect());
        match self.overloads.entry(Arc::from(name)) {
            Entry::Vacant(slot) => {
                slot.insert(OverloadSet(Arc::from(vec![masked])));
            }
            Entry::Occupied(mut slot) => {
                let at = slot.get().position(params);
                let next = slot.get().with(masked, at);
                slot.insert(next);
            }
        }
        tracing::debug!(
            target: "mop::meta",
            owner = self.owner.name(),
            method = %format!("{name}({})", format_params(params, false)),
            "method masked"
        );
        self.touch();
    }

    /// Drops every method matching `pred`; returns how many were removed.
    pub fn remove_where(&self, pred: impl Fn(&MethodDescriptor) -> bool) -> usize {
        let mut removed = 0;
        let names: Vec<Arc<str>> = self.overloads.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Entry::Occupied(mut slot) = self.overloads.entry(name) {
                let kept: Vec<Slot> = slot
                    .get()
                    .slots()
                    .iter()
                    .filter(|s| !matches!(s, Slot::Method(m) if pred(m)))
                    .cloned()
                    .collect();
                let dropped = slot.get().slots().len() - kept.len();
                if dropped == 0 {
                    continue;
                }
                removed += dropped;
                if kept.is_empty() {
                    slot.remove();
                } else {
                    slot.insert(OverloadSet(kept.into()));
                }
            }
        }
        if removed > 0 {
            self.touch();
        }
        removed
    }

    pub fn names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self.overloads.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// All methods, grouped by name in name order.
    pub fn methods(&self) -> Vec<Arc<MethodDescriptor>> {
        self.names().iter().flat_map(|n| self.lookup(n)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.overloads.is_empty()
    }
}
