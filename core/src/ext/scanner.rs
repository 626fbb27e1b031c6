use std::path::PathBuf;
use std::sync::Arc;

use super::LoadedModule;
use super::descriptor::ModuleDescriptor;
use super::provider::{ExtensionCatalog, ExtensionModule, ExtensionProvider, ModuleFactory, PropertiesModuleFactory};
use crate::error::ModuleError;
use crate::method::{MethodDescriptor, MethodOrigin, Registration, Visibility};
use crate::rt::Shared;
use crate::typ::TypeUniverse;

/// Outcome of loading descriptors from a set of roots.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub loaded: Vec<LoadedModule>,
    /// Modules already loaded at the same version.
    pub skipped: Vec<String>,
    pub failed: Vec<(String, ModuleError)>,
    /// Helpers hidden by an existing method of the same signature.
    pub shadowed: usize,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Descriptor texts found under `roots`, in discovery order. A root may be
/// a directory containing `descriptor_path` or a descriptor file itself.
pub fn discover(roots: &[PathBuf], descriptor_path: &str) -> Vec<(String, Result<String, ModuleError>)> {
    roots
        .iter()
        .filter_map(|root| {
            let path = if root.is_file() {
                root.clone()
            } else {
                root.join(descriptor_path)
            };
            if !path.exists() {
                tracing::debug!(target: "mop::ext", root = %root.display(), "no extension descriptor");
                return None;
            }
            let origin = path.display().to_string();
            let text = std::fs::read_to_string(&path).map_err(|source| ModuleError::Io {
                path: origin.clone(),
                source,
            });
            Some((origin, text))
        })
        .collect()
}

pub(crate) fn scan(shared: &Shared, catalog: &ExtensionCatalog, roots: &[PathBuf]) -> ScanReport {
    let mut report = ScanReport::default();
    for (origin, text) in discover(roots, &shared.config.extensions.descriptor_path) {
        match text.and_then(|t| load_descriptor(shared, catalog, &t, &origin)) {
            Ok(Loaded::Module(module, shadowed)) => {
                report.shadowed += shadowed;
                report.loaded.push(module);
            }
            Ok(Loaded::AlreadyLoaded(name)) => report.skipped.push(name),
            Err(err) => {
                tracing::warn!(target: "mop::ext", origin = %origin, error = %err, "extension module failed");
                report.failed.push((origin, err));
            }
        }
    }
    report
}

enum Loaded {
    Module(LoadedModule, usize),
    AlreadyLoaded(String),
}

fn load_descriptor(shared: &Shared, catalog: &ExtensionCatalog, text: &str, origin: &str) -> Result<Loaded, ModuleError> {
    let descriptor = ModuleDescriptor::parse(text, origin)?;

    // held until the module is recorded so concurrent scans load it once
    let mut modules = shared.modules.lock();
    if let Some(existing) = modules.iter().find(|m| m.name == descriptor.name) {
        if existing.version == descriptor.version {
            tracing::debug!(target: "mop::ext", module = %descriptor.name, "module already loaded");
            return Ok(Loaded::AlreadyLoaded(descriptor.name));
        }
        return Err(ModuleError::VersionConflict {
            module: descriptor.name,
            loaded: existing.version.clone(),
            requested: descriptor.version,
        });
    }

    let module = match &descriptor.factory {
        Some(name) => catalog
            .factory(name)
            .ok_or_else(|| ModuleError::UnknownFactory {
                module: descriptor.name.clone(),
                factory: name.clone(),
            })?
            .create(&descriptor, catalog)?,
        None => PropertiesModuleFactory.create(&descriptor, catalog)?,
    };

    // every helper must resolve before anything registers
    let methods = build_methods(&shared.universe, &module)?;

    let mut registered = 0;
    let mut shadowed = 0;
    for method in methods {
        match shared.base_registry(method.owner()).register(method.clone()) {
            Ok(Registration::Shadowed) | Err(_) => {
                // an earlier module or a declared method keeps the signature
                tracing::warn!(target: "mop::ext", module = %module.name, method = %method, "extension method shadowed");
                shadowed += 1;
            }
            Ok(_) => registered += 1,
        }
    }

    let loaded = LoadedModule {
        name: module.name.clone(),
        version: module.version.clone(),
        origin: origin.to_string(),
        methods: registered,
    };
    modules.push(loaded.clone());
    tracing::debug!(target: "mop::ext", module = %loaded.name, version = %loaded.version, methods = registered, shadowed, "extension module loaded");
    Ok(Loaded::Module(loaded, shadowed))
}

fn build_methods(universe: &TypeUniverse, module: &ExtensionModule) -> Result<Vec<Arc<MethodDescriptor>>, ModuleError> {
    let mut out: Vec<Arc<MethodDescriptor>> = Vec::new();
    let groups = [(&module.instance_providers, false), (&module.static_providers, true)];
    for (providers, is_static) in groups {
        for provider in providers.iter() {
            for spec in provider.methods() {
                if spec.visibility != Visibility::Public {
                    tracing::debug!(target: "mop::ext", provider = provider.name(), method = %spec.name, "skipping non-public helper");
                    continue;
                }
                let method = build_method(universe, module, provider.as_ref(), &spec, is_static)?;
                if out
                    .iter()
                    .any(|m| m.owner() == method.owner() && m.name() == method.name() && m.same_params(method.params()))
                {
                    return Err(ModuleError::DuplicateHelper {
                        module: module.name.clone(),
                        provider: provider.name().to_string(),
                        method: method.to_string(),
                    });
                }
                out.push(method);
            }
        }
    }
    Ok(out)
}

fn build_method(
    universe: &TypeUniverse,
    module: &ExtensionModule,
    provider: &dyn ExtensionProvider,
    spec: &super::MethodSpec,
    is_static: bool,
) -> Result<Arc<MethodDescriptor>, ModuleError> {
    let resolve = |ty: &str| {
        universe.resolve_type_name(ty).ok_or_else(|| ModuleError::UnknownType {
            module: module.name.clone(),
            provider: provider.name().to_string(),
            ty: ty.to_string(),
        })
    };
    let target = resolve(&spec.target)?;
    let mut builder = MethodDescriptor::builder(&target, spec.name.as_str())
        .origin(MethodOrigin::Extension {
            module: Arc::from(module.name.as_str()),
        })
        .visibility(spec.visibility);
    let count = spec.params.len();
    for (i, ty) in spec.params.iter().enumerate() {
        let class = resolve(ty)?;
        builder = if spec.varargs && i + 1 == count {
            builder.varargs(&class)
        } else {
            builder.param(&class)
        };
    }
    if let Some(ret) = &spec.returns {
        builder = builder.returns(&resolve(ret)?);
    }
    if is_static {
        builder = builder.static_method();
    }
    Ok(builder.build_with(spec.handle.clone()))
}

/// Removes everything `module` registered.
pub(crate) fn unload(shared: &Shared, module: &str) -> usize {
    let origin = MethodOrigin::Extension { module: Arc::from(module) };
    let removed: usize = shared
        .base_registries()
        .iter()
        .map(|r| r.remove_where(|m| m.origin() == &origin))
        .sum();
    shared.modules.lock().retain(|m| m.name != module);
    tracing::debug!(target: "mop::ext", module, removed, "extension module unloaded");
    removed
}
