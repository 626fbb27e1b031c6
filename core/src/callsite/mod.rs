//! Per-call-expression inline caches.
//!
//! A call site remembers the methods it resolved for the receiver and
//! argument class shapes it has seen, guarded by the meta class generation
//! at resolution time. The cache only grows in one direction:
//! unlinked, monomorphic, polymorphic, megamorphic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;

use crate::category;
use crate::error::DispatchError;
use crate::meta::{ArgInfo, CallForm, MetaClass, Resolved};
use crate::method::MethodDescriptor;
use crate::realm::Realm;
use crate::typ::ClassId;
use crate::val::Val;

#[cfg(test)]
mod callsite_test;

/// Receiver and argument classes a cache entry applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeKey {
    receiver: ClassId,
    static_receiver: bool,
    args: Box<[ClassId]>,
}

impl ShapeKey {
    pub fn of(receiver: &Val, args: &[Val]) -> Self {
        let (receiver, static_receiver) = match receiver {
            Val::Class(class) => (class.id(), true),
            other => (other.class_id(), false),
        };
        Self {
            receiver,
            static_receiver,
            args: args.iter().map(Val::class_id).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    guard: ShapeKey,
    meta: Weak<MetaClass>,
    method: Weak<MethodDescriptor>,
    form: CallForm,
    generation: u64,
}

impl CacheEntry {
    /// Entry for `resolved`, or `None` when `meta` went stale before
    /// `generation` was read: its layers may miss a registry added since.
    fn link(guard: ShapeKey, meta: &Arc<MetaClass>, generation: u64, resolved: &Resolved) -> Option<Self> {
        if !meta.is_current() {
            return None;
        }
        Some(Self {
            guard,
            meta: Arc::downgrade(meta),
            method: Arc::downgrade(&resolved.method),
            form: resolved.form,
            generation,
        })
    }

    /// The cached target when its metadata is alive and unchanged. A hit
    /// marks the meta class used in sweep `sweep`.
    fn target(&self, sweep: u64) -> Option<Resolved> {
        let meta = self.meta.upgrade()?;
        if !meta.is_current() || meta.generation() != self.generation {
            return None;
        }
        meta.touch(sweep);
        Some(Resolved {
            method: self.method.upgrade()?,
            form: self.form,
            cacheable: true,
        })
    }
}

#[derive(Debug)]
enum SiteState {
    Unlinked,
    Monomorphic(CacheEntry),
    Polymorphic(Vec<CacheEntry>),
    Megamorphic,
}

impl SiteState {
    fn kind(&self) -> SiteKind {
        match self {
            SiteState::Unlinked => SiteKind::Unlinked,
            SiteState::Monomorphic(_) => SiteKind::Monomorphic,
            SiteState::Polymorphic(_) => SiteKind::Polymorphic,
            SiteState::Megamorphic => SiteKind::Megamorphic,
        }
    }

    fn lookup(&self, key: &ShapeKey) -> Option<&CacheEntry> {
        match self {
            SiteState::Monomorphic(entry) if entry.guard == *key => Some(entry),
            SiteState::Polymorphic(entries) => entries.iter().find(|e| e.guard == *key),
            _ => None,
        }
    }

    /// State after caching `entry`, given at most `limit` entries.
    fn linked(&self, entry: CacheEntry, limit: usize) -> SiteState {
        match self {
            SiteState::Unlinked => SiteState::Monomorphic(entry),
            SiteState::Monomorphic(old) if old.guard == entry.guard => SiteState::Monomorphic(entry),
            SiteState::Monomorphic(_) if limit < 2 => SiteState::Megamorphic,
            SiteState::Monomorphic(old) => SiteState::Polymorphic(vec![old.clone(), entry]),
            SiteState::Polymorphic(entries) => {
                let mut entries = entries.clone();
                if let Some(slot) = entries.iter_mut().find(|e| e.guard == entry.guard) {
                    *slot = entry;
                } else if entries.len() < limit {
                    entries.push(entry);
                } else {
                    return SiteState::Megamorphic;
                }
                SiteState::Polymorphic(entries)
            }
            SiteState::Megamorphic => SiteState::Megamorphic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    Unlinked,
    Monomorphic,
    Polymorphic,
    Megamorphic,
}

#[derive(Debug, Default)]
struct SiteStats {
    hits: AtomicU64,
    misses: AtomicU64,
    resolutions: AtomicU64,
    invalidations: AtomicU64,
    bypasses: AtomicU64,
}

/// Counter snapshot for one call site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallSiteStats {
    pub hits: u64,
    pub misses: u64,
    /// Full resolutions through the meta class.
    pub resolutions: u64,
    /// Cached entries found stale and re-resolved.
    pub invalidations: u64,
    /// Calls made while categories were active.
    pub bypasses: u64,
}

pub struct CallSite {
    index: usize,
    name: Arc<str>,
    realm: Arc<Realm>,
    limit: usize,
    state: RwLock<Arc<SiteState>>,
    stats: SiteStats,
}

impl std::fmt::Debug for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSite")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish()
    }
}

impl CallSite {
    pub fn new(index: usize, name: impl Into<Arc<str>>, realm: Arc<Realm>, limit: usize) -> Self {
        Self {
            index,
            name: name.into(),
            realm,
            limit,
            state: RwLock::new(Arc::new(SiteState::Unlinked)),
            stats: SiteStats::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn realm(&self) -> &Arc<Realm> {
        &self.realm
    }

    pub fn kind(&self) -> SiteKind {
        self.state.read().kind()
    }

    /// Number of cached shapes.
    pub fn entries(&self) -> usize {
        match &**self.state.read() {
            SiteState::Monomorphic(_) => 1,
            SiteState::Polymorphic(entries) => entries.len(),
            _ => 0,
        }
    }

    pub fn stats(&self) -> CallSiteStats {
        CallSiteStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            resolutions: self.stats.resolutions.load(Ordering::Relaxed),
            invalidations: self.stats.invalidations.load(Ordering::Relaxed),
            bypasses: self.stats.bypasses.load(Ordering::Relaxed),
        }
    }

    pub fn call(&self, receiver: &Val, args: &[Val]) -> Result<Val, DispatchError> {
        self.target(receiver, args)?.invoke(receiver, args)
    }

    /// Method this site would invoke for `receiver` and `args`.
    pub fn target(&self, receiver: &Val, args: &[Val]) -> Result<Resolved, DispatchError> {
        if category::is_active() {
            self.stats.bypasses.fetch_add(1, Ordering::Relaxed);
            self.stats.resolutions.fetch_add(1, Ordering::Relaxed);
            return self.realm.resolve(receiver, &self.name, args);
        }

        let key = ShapeKey::of(receiver, args);
        let state = self.state.read().clone();
        if let Some(entry) = state.lookup(&key) {
            if let Some(resolved) = entry.target(self.realm.sweep_count()) {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(resolved);
            }
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        self.resolve_and_link(key, &state, receiver, args)
    }

    fn resolve_and_link(
        &self,
        key: ShapeKey,
        seen: &SiteState,
        receiver: &Val,
        args: &[Val],
    ) -> Result<Resolved, DispatchError> {
        self.stats.resolutions.fetch_add(1, Ordering::Relaxed);
        let meta = self.realm.meta_class_of(receiver);
        // read before resolving so a concurrent change leaves the entry stale
        let generation = meta.generation();
        let infos: Vec<ArgInfo> = args.iter().map(ArgInfo::of).collect();
        let resolved = self.realm.resolve_shape(&meta, receiver, &self.name, &infos)?;

        if matches!(seen, SiteState::Megamorphic) || !resolved.cacheable {
            return Ok(resolved);
        }

        let Some(entry) = CacheEntry::link(key, &meta, generation, &resolved) else {
            tracing::debug!(target: "mop::callsite", site = self.index, method = %self.name, "meta class went stale, not linking");
            return Ok(resolved);
        };
        let mut state = self.state.write();
        let before = state.kind();
        let next = state.linked(entry, self.limit);
        let after = next.kind();
        *state = Arc::new(next);
        drop(state);

        if before != after {
            tracing::debug!(
                target: "mop::callsite",
                site = self.index,
                method = %self.name,
                receiver = %receiver.type_name(),
                from = ?before,
                to = ?after,
                "call site transition"
            );
        }
        Ok(resolved)
    }
}

/// Call sites of one compilation unit, indexed by allocation order.
#[derive(Debug)]
pub struct CallSiteArray {
    realm: Arc<Realm>,
    limit: usize,
    sites: Vec<Arc<CallSite>>,
}

impl CallSiteArray {
    pub fn new(realm: Arc<Realm>, limit: usize) -> Self {
        Self {
            realm,
            limit,
            sites: Vec::new(),
        }
    }

    /// Adds a site for calls to `name`; returns its index.
    pub fn allocate(&mut self, name: &str) -> usize {
        let index = self.sites.len();
        self.sites
            .push(Arc::new(CallSite::new(index, name, self.realm.clone(), self.limit)));
        index
    }

    pub fn get(&self, index: usize) -> Option<&Arc<CallSite>> {
        self.sites.get(index)
    }

    pub fn call(&self, index: usize, receiver: &Val, args: &[Val]) -> Result<Val, DispatchError> {
        match self.sites.get(index) {
            Some(site) => site.call(receiver, args),
            None => Err(DispatchError::MethodNotFound {
                receiver: receiver.type_name(),
                name: format!("<call site {index}>"),
                arguments: String::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CallSite>> {
        self.sites.iter()
    }

    pub fn realm(&self) -> &Arc<Realm> {
        &self.realm
    }
}
