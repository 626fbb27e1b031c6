//! Runtime state shared by every realm.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;

use crate::config::DispatchConfig;
use crate::ext::LoadedModule;
use crate::method::MethodRegistry;
use crate::typ::{ClassId, ClassRef, TypeUniverse};

mod runtime;
mod sweeper;


pub use runtime::Runtime;
pub use sweeper::Sweeper;

/// Base registries and class table behind a runtime's realm tree.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) universe: TypeUniverse,
    pub(crate) config: DispatchConfig,
    base: DashMap<ClassId, Arc<MethodRegistry>, FxBuildHasher>,
    pub(crate) modules: Mutex<Vec<LoadedModule>>,
    sweeps: AtomicU64,
}

impl Shared {
    pub(crate) fn new(config: DispatchConfig) -> Self {
        Self {
            universe: TypeUniverse::new(),
            config,
            base: DashMap::default(),
            modules: Mutex::new(Vec::new()),
            sweeps: AtomicU64::new(0),
        }
    }

    /// Runtime-wide registry for `class`, created on first request.
    pub(crate) fn base_registry(&self, class: &ClassRef) -> Arc<MethodRegistry> {
        if let Some(existing) = self.base.get(&class.id()) {
            return existing.clone();
        }
        self.base
            .entry(class.id())
            .or_insert_with(|| Arc::new(MethodRegistry::new(class)))
            .clone()
    }

    pub(crate) fn base_registries(&self) -> Vec<Arc<MethodRegistry>> {
        self.base.iter().map(|e| e.value().clone()).collect()
    }

    #[inline]
    pub(crate) fn sweep_count(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    pub(crate) fn next_sweep(&self) -> u64 {
        self.sweeps.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Drops base registries of retired classes.
    pub(crate) fn drop_retired(&self) -> usize {
        let before = self.base.len();
        self.base.retain(|_, reg| !reg.owner().is_retired());
        before - self.base.len()
    }
}
