//! Runtime entry point: class table, realm tree, extensions and sweeping.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::{Shared, Sweeper};
use crate::builtins;
use crate::callsite::CallSiteArray;
use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::ext::{self, ExtensionCatalog, LoadedModule, ScanReport};
use crate::method::{MethodDescriptor, Registration};
use crate::plan::DispatchPlanner;
use crate::realm::{Realm, SweepReport};
use crate::typ::{ClassBuilder, ClassRef};

static GLOBAL_RUNTIME: Lazy<Runtime> = Lazy::new(Runtime::new);

pub struct Runtime {
    shared: Arc<Shared>,
    root: Arc<Realm>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").field("root", &self.root).finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::build(DispatchConfig::default())
    }

    pub fn with_config(config: DispatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: DispatchConfig) -> Self {
        let shared = Arc::new(Shared::new(config));
        builtins::install(&shared);
        let root = Realm::root(shared.clone());
        Self {
            shared,
            root,
            sweeper: Mutex::new(None),
        }
    }

    /// Process-wide runtime with default configuration.
    pub fn global() -> &'static Runtime {
        &GLOBAL_RUNTIME
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.shared.config
    }

    pub fn root(&self) -> &Arc<Realm> {
        &self.root
    }

    /// New realm under `parent`, or under the root realm.
    pub fn new_realm(&self, name: &str, parent: Option<&Arc<Realm>>) -> Arc<Realm> {
        parent.unwrap_or(&self.root).new_child(name)
    }

    pub fn define_class(&self, builder: ClassBuilder) -> Result<ClassRef, DispatchError> {
        self.shared.universe.define(builder)
    }

    pub fn class(&self, name: &str) -> Result<ClassRef, DispatchError> {
        self.shared.universe.require(name)
    }

    pub fn classes(&self) -> Vec<ClassRef> {
        self.shared.universe.classes()
    }

    /// Registers a method in the base registries, visible to every realm
    /// that does not override it.
    pub fn register_method(&self, method: Arc<MethodDescriptor>) -> Result<Registration, DispatchError> {
        self.root.add_method(method)
    }

    /// Unloads a class. Its metadata is reclaimed by the next sweep.
    pub fn retire_class(&self, name: &str) -> Result<ClassRef, DispatchError> {
        self.shared.universe.retire(name)
    }

    /// Loads extension modules found under `roots`, in order.
    pub fn load_extensions(&self, catalog: &ExtensionCatalog, roots: &[PathBuf]) -> ScanReport {
        ext::scan(&self.shared, catalog, roots)
    }

    /// Loads extension modules from the configured search paths.
    pub fn load_configured_extensions(&self, catalog: &ExtensionCatalog) -> ScanReport {
        let roots = self.shared.config.extensions.search_paths.clone();
        self.load_extensions(catalog, &roots)
    }

    /// Removes every method a module contributed. Returns how many went.
    pub fn unload_extension(&self, module: &str) -> usize {
        ext::unload(&self.shared, module)
    }

    pub fn loaded_extensions(&self) -> Vec<LoadedModule> {
        self.shared.modules.lock().clone()
    }

    /// Runs one reclamation pass over the whole realm tree.
    pub fn sweep(&self) -> SweepReport {
        sweep_shared(&self.shared, &self.root)
    }

    /// Starts periodic sweeping on a background thread. Idempotent.
    pub fn start_sweeper(&self) {
        let mut slot = self.sweeper.lock();
        if slot.is_some() {
            return;
        }
        *slot = Some(Sweeper::spawn(
            self.shared.clone(),
            Arc::downgrade(&self.root),
            self.shared.config.cache.sweep_interval_ms,
        ));
    }

    pub fn stop_sweeper(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
    }

    pub fn sweeper_running(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Planner for a compilation unit whose calls run in `realm`.
    pub fn planner(&self, realm: &Arc<Realm>) -> DispatchPlanner {
        DispatchPlanner::new(realm.clone(), self.shared.config.callsite.polymorphic_limit)
    }

    /// Empty call-site array bound to `realm`.
    pub fn call_sites(&self, realm: &Arc<Realm>) -> CallSiteArray {
        CallSiteArray::new(realm.clone(), self.shared.config.callsite.polymorphic_limit)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

pub(super) fn sweep_shared(shared: &Shared, root: &Realm) -> SweepReport {
    let sweep = shared.next_sweep();
    let mut report = root.sweep(sweep, shared.config.cache.idle_sweeps);
    report.dropped_registries += shared.drop_retired();
    tracing::debug!(
        target: "mop::sweep",
        sweep,
        evicted = report.evicted_meta_classes,
        registries = report.dropped_registries,
        dead_realms = report.dead_realms,
        "sweep finished"
    );
    report
}
