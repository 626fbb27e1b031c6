//! Per-class, per-realm dispatch tables.
//!
//! A [`MetaClass`] snapshots which registries are visible for a class and
//! each of its supertypes in one realm. The registries themselves stay
//! live, so methods added after the snapshot are seen; the generation
//! tells caches when anything they depend on moved.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::category::{self, CategorySnapshot};
use crate::error::DispatchError;
use crate::method::MethodDescriptor;
use crate::method::MethodRegistry;
use crate::typ::ClassRef;
use crate::val::Val;

mod operator;
mod property;
mod resolve;

#[cfg(test)]
mod resolve_test;

pub use operator::Operator;
pub use resolve::{ArgInfo, CallForm, Resolved};

/// Registries contributing methods for one class in the lookup order,
/// nearest realm first.
#[derive(Debug, Clone)]
pub struct TypeLayer {
    pub class: ClassRef,
    pub registries: Vec<Arc<MethodRegistry>>,
}

#[derive(Debug)]
pub struct MetaClass {
    class: ClassRef,
    realm_name: Arc<str>,
    layers: Vec<TypeLayer>,
    /// Epochs of the realm chain, own realm first.
    chain: Vec<Arc<AtomicU64>>,
    built_chain: u64,
    /// Sweep counter at last use, through the realm or a call site.
    last_used: AtomicU64,
}

impl MetaClass {
    pub(crate) fn new(class: ClassRef, realm_name: Arc<str>, layers: Vec<TypeLayer>, chain: Vec<Arc<AtomicU64>>) -> Self {
        let built_chain = chain_stamp(&chain);
        tracing::debug!(
            target: "mop::meta",
            class = class.name(),
            realm = %realm_name,
            layers = layers.len(),
            "meta class built"
        );
        Self {
            class,
            realm_name,
            layers,
            chain,
            built_chain,
            last_used: AtomicU64::new(0),
        }
    }

    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    pub fn realm_name(&self) -> &str {
        &self.realm_name
    }

    pub fn layers(&self) -> &[TypeLayer] {
        &self.layers
    }

    /// Highest dispatch-clock stamp among everything this table depends on.
    /// Any mutation of a visible registry or of the realm topology raises it.
    pub fn generation(&self) -> u64 {
        let registries = self
            .layers
            .iter()
            .flat_map(|l| l.registries.iter())
            .map(|r| r.stamp())
            .max()
            .unwrap_or(0);
        registries.max(chain_stamp(&self.chain))
    }

    /// False once the realm topology changed; the realm then builds a
    /// fresh table.
    pub fn is_current(&self) -> bool {
        chain_stamp(&self.chain) == self.built_chain
    }

    #[inline]
    pub(crate) fn touch(&self, sweep: u64) {
        self.last_used.store(sweep, Ordering::Relaxed);
    }

    pub(crate) fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }

    /// Resolves `name(args)` on `receiver` with the calling thread's categories.
    /// Class values resolve static methods only.
    pub fn resolve(&self, receiver: &Val, name: &str, args: &[Val]) -> Result<Resolved, DispatchError> {
        let static_only = matches!(receiver, Val::Class(c) if *c == self.class);
        let infos: Vec<ArgInfo> = args.iter().map(ArgInfo::of).collect();
        self.resolve_with(static_only, name, &infos, &category::current())
    }

    pub fn invoke(&self, receiver: &Val, name: &str, args: &[Val]) -> Result<Val, DispatchError> {
        self.resolve(receiver, name, args)?.invoke(receiver, args)
    }

    /// Visible overloads of `name` without categories, nearest first.
    pub fn lookup(&self, name: &str) -> Vec<Arc<MethodDescriptor>> {
        self.gather(name, false, &CategorySnapshot::empty())
    }

    pub fn responds_to(&self, name: &str) -> bool {
        !self.lookup(name).is_empty()
    }

    /// Every visible method, sorted by name then signature.
    pub fn methods(&self) -> Vec<Arc<MethodDescriptor>> {
        let mut names: Vec<Arc<str>> = self
            .layers
            .iter()
            .flat_map(|l| l.registries.iter())
            .flat_map(|r| r.names())
            .collect();
        names.sort();
        names.dedup();
        let mut out: Vec<Arc<MethodDescriptor>> = names.iter().flat_map(|n| self.lookup(n)).collect();
        out.sort_by_key(|a| a.signature());
        out
    }
}

fn chain_stamp(chain: &[Arc<AtomicU64>]) -> u64 {
    chain.iter().map(|e| e.load(Ordering::SeqCst)).max().unwrap_or(0)
}
