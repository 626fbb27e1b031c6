use thiserror::Error;

/// Failures surfaced by lookup, resolution and invocation.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no method {receiver}.{name}({arguments})")]
    MethodNotFound {
        receiver: String,
        name: String,
        arguments: String,
    },

    #[error("ambiguous method overloading for {receiver}.{name}({arguments}): {first} vs {second}")]
    AmbiguousMethod {
        receiver: String,
        name: String,
        arguments: String,
        first: String,
        second: String,
    },

    #[error("method {signature} is already registered on {owner}")]
    DuplicateMethod { owner: String, signature: String },

    #[error("no property '{property}' on {receiver}")]
    PropertyNotFound { receiver: String, property: String },

    #[error("unknown class '{name}'")]
    UnknownClass { name: String },

    #[error("class '{name}' is already defined")]
    DuplicateClass { name: String },

    #[error("invalid class '{name}': {reason}")]
    InvalidClass { name: String, reason: String },

    #[error("realm '{realm}' is no longer attached")]
    RealmDetached { realm: String },

    #[error("{method} failed: {source}")]
    Invocation {
        method: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DispatchError::MethodNotFound { .. } | DispatchError::PropertyNotFound { .. })
    }
}

/// Failures while reading or applying extension module descriptors.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("{origin}:{line}: malformed descriptor line: {text}")]
    Malformed { origin: String, line: usize, text: String },

    #[error("{origin}: missing required key '{key}'")]
    MissingKey { origin: String, key: &'static str },

    #[error("module '{module}': unknown provider '{provider}'")]
    UnknownProvider { module: String, provider: String },

    #[error("module '{module}': unknown module factory '{factory}'")]
    UnknownFactory { module: String, factory: String },

    #[error("module '{module}': provider '{provider}' names unknown type '{ty}'")]
    UnknownType { module: String, provider: String, ty: String },

    #[error("module '{module}': provider '{provider}' declares {method} twice")]
    DuplicateHelper {
        module: String,
        provider: String,
        method: String,
    },

    #[error("module '{module}' version {requested} conflicts with loaded version {loaded}")]
    VersionConflict {
        module: String,
        loaded: String,
        requested: String,
    },

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
