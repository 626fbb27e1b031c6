//! Extension modules.
//!
//! A module is described by a properties file (by default at
//! `META-INF/services/mop.ExtensionModule` under each search root) naming
//! providers from an [`ExtensionCatalog`]. Each provider's public helpers
//! become extension methods in the base registries. A module loads
//! completely or not at all; a broken module never affects the others.

mod descriptor;
mod provider;
mod scanner;
mod stock;


pub use descriptor::{ModuleDescriptor, parse_properties};
pub use provider::{
    ExtensionCatalog, ExtensionModule, ExtensionProvider, FnProvider, MethodSpec, ModuleFactory, PropertiesModuleFactory,
};
pub use scanner::{ScanReport, discover};
pub use stock::stock_catalog;

pub(crate) use scanner::{scan, unload};

/// A module that registered its methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub name: String,
    pub version: String,
    pub origin: String,
    pub methods: usize,
}
