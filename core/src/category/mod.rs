//! Scoped method overrides.
//!
//! A category is a named bundle of methods that apply only while it is in
//! use on the current thread. Scopes nest; an inner category shadows an
//! outer one for identical signatures.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::Result;

use crate::method::{MethodBuilder, MethodDescriptor, MethodOrigin};
use crate::val::Val;

#[cfg(test)]
mod category_test;

#[derive(Debug)]
pub struct Category {
    name: Arc<str>,
    methods: Vec<Arc<MethodDescriptor>>,
}

impl Category {
    pub fn builder(name: impl Into<Arc<str>>) -> CategoryBuilder {
        CategoryBuilder {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<MethodDescriptor>> + 'a {
        self.methods.iter().filter(move |m| m.name() == name)
    }
}

pub struct CategoryBuilder {
    name: Arc<str>,
    methods: Vec<Arc<MethodDescriptor>>,
}

impl CategoryBuilder {
    /// Adds a method; a later method with the same owner and signature wins.
    pub fn method<F>(mut self, method: MethodBuilder, body: F) -> Self
    where
        F: Fn(&Val, &[Val]) -> Result<Val> + Send + Sync + 'static,
    {
        let method = method
            .origin(MethodOrigin::Category { name: self.name.clone() })
            .build(body);
        self.methods
            .retain(|m| !(m.owner() == method.owner() && m.name() == method.name() && m.same_params(method.params())));
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Arc<Category> {
        Arc::new(Category {
            name: self.name,
            methods: self.methods,
        })
    }
}

/// Ordered set of categories in effect, outermost first.
#[derive(Debug, Clone, Default)]
pub struct CategorySnapshot(Arc<[Arc<Category>]>);

impl CategorySnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(categories: impl IntoIterator<Item = Arc<Category>>) -> Self {
        CategorySnapshot(categories.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Innermost category first.
    pub fn innermost_first(&self) -> impl Iterator<Item = &Arc<Category>> {
        self.0.iter().rev()
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|c| c.name().to_string()).collect()
    }

    fn pushed(&self, categories: &[Arc<Category>]) -> Self {
        CategorySnapshot(self.0.iter().chain(categories).cloned().collect())
    }
}

thread_local! {
    static ACTIVE: RefCell<CategorySnapshot> = RefCell::new(CategorySnapshot::empty());
}

/// Categories in effect on the current thread.
pub fn current() -> CategorySnapshot {
    ACTIVE.with(|active| active.borrow().clone())
}

#[inline]
pub fn is_active() -> bool {
    ACTIVE.with(|active| !active.borrow().is_empty())
}

/// Restores the previous category stack when dropped, including during
/// unwinding. Bound to the thread that created it.
pub struct CategoryScope {
    prev: Option<CategorySnapshot>,
    _thread_bound: PhantomData<*const ()>,
}

impl CategoryScope {
    pub fn enter(categories: &[Arc<Category>]) -> Self {
        let prev = ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            let next = active.pushed(categories);
            std::mem::replace(&mut *active, next)
        });
        tracing::debug!(
            target: "mop::meta",
            categories = ?categories.iter().map(|c| c.name()).collect::<Vec<_>>(),
            depth = prev.len() + categories.len(),
            "category scope entered"
        );
        Self {
            prev: Some(prev),
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for CategoryScope {
    fn drop(&mut self) {
        if let Some(prev) = self.prev.take() {
            ACTIVE.with(|active| *active.borrow_mut() = prev);
        }
    }
}

/// Runs `body` with `category` pushed on the current thread's stack.
pub fn use_category<R>(category: &Arc<Category>, body: impl FnOnce() -> R) -> R {
    use_categories(std::slice::from_ref(category), body)
}

/// Runs `body` with `categories` pushed in order (the last is innermost).
pub fn use_categories<R>(categories: &[Arc<Category>], body: impl FnOnce() -> R) -> R {
    let _scope = CategoryScope::enter(categories);
    body()
}
