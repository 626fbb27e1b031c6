use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use super::descriptor::ModuleDescriptor;
use crate::error::ModuleError;
use crate::method::{MethodHandle, Visibility};
use crate::val::Val;

/// One helper a provider exposes. For instance providers `target` is the
/// receiver type (the helper's `self` parameter); for static providers it
/// is the class that gains a static method.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub target: String,
    pub name: String,
    pub params: Vec<String>,
    pub returns: Option<String>,
    /// The last entry of `params` names the varargs component type.
    pub varargs: bool,
    pub visibility: Visibility,
    pub handle: MethodHandle,
}

impl MethodSpec {
    pub fn new<F>(target: &str, name: &str, body: F) -> Self
    where
        F: Fn(&Val, &[Val]) -> Result<Val> + Send + Sync + 'static,
    {
        Self {
            target: target.to_string(),
            name: name.to_string(),
            params: Vec::new(),
            returns: None,
            varargs: false,
            visibility: Visibility::Public,
            handle: MethodHandle::new(body),
        }
    }

    pub fn param(mut self, ty: &str) -> Self {
        self.params.push(ty.to_string());
        self
    }

    pub fn varargs(mut self, component: &str) -> Self {
        self.params.push(component.to_string());
        self.varargs = true;
        self
    }

    pub fn returns(mut self, ty: &str) -> Self {
        self.returns = Some(ty.to_string());
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

/// A named bundle of helpers that extension modules refer to.
pub trait ExtensionProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn methods(&self) -> Vec<MethodSpec>;
}

/// Provider assembled from closures.
#[derive(Debug, Clone)]
pub struct FnProvider {
    name: String,
    methods: Vec<MethodSpec>,
}

impl FnProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            methods: Vec::new(),
        }
    }

    pub fn helper(mut self, spec: MethodSpec) -> Self {
        self.methods.push(spec);
        self
    }
}

impl ExtensionProvider for FnProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn methods(&self) -> Vec<MethodSpec> {
        self.methods.clone()
    }
}

/// Providers a module contributes, split by how their helpers register.
#[derive(Debug, Clone)]
pub struct ExtensionModule {
    pub name: String,
    pub version: String,
    pub instance_providers: Vec<Arc<dyn ExtensionProvider>>,
    pub static_providers: Vec<Arc<dyn ExtensionProvider>>,
}

/// Turns a descriptor into a module. Descriptors may name a custom factory
/// through `moduleFactory`.
pub trait ModuleFactory: Send + Sync + std::fmt::Debug {
    fn create(&self, descriptor: &ModuleDescriptor, catalog: &ExtensionCatalog) -> Result<ExtensionModule, ModuleError>;
}

/// Default factory: looks every listed provider up in the catalog.
#[derive(Debug, Default)]
pub struct PropertiesModuleFactory;

impl ModuleFactory for PropertiesModuleFactory {
    fn create(&self, descriptor: &ModuleDescriptor, catalog: &ExtensionCatalog) -> Result<ExtensionModule, ModuleError> {
        let lookup = |names: &[String]| -> Result<Vec<Arc<dyn ExtensionProvider>>, ModuleError> {
            names
                .iter()
                .map(|n| {
                    catalog.provider(n).ok_or_else(|| ModuleError::UnknownProvider {
                        module: descriptor.name.clone(),
                        provider: n.clone(),
                    })
                })
                .collect()
        };
        Ok(ExtensionModule {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            instance_providers: lookup(&descriptor.instance_classes)?,
            static_providers: lookup(&descriptor.static_classes)?,
        })
    }
}

/// Providers and factories that descriptors may name.
#[derive(Debug, Default)]
pub struct ExtensionCatalog {
    providers: HashMap<String, Arc<dyn ExtensionProvider>>,
    factories: HashMap<String, Arc<dyn ModuleFactory>>,
}

impl ExtensionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&mut self, provider: impl ExtensionProvider + 'static) -> &mut Self {
        self.providers.insert(provider.name().to_string(), Arc::new(provider));
        self
    }

    pub fn register_factory(&mut self, name: &str, factory: impl ModuleFactory + 'static) -> &mut Self {
        self.factories.insert(name.to_string(), Arc::new(factory));
        self
    }

    pub fn provider(&self, name: &str) -> Option<Arc<dyn ExtensionProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn factory(&self, name: &str) -> Option<Arc<dyn ModuleFactory>> {
        self.factories.get(name).cloned()
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}
