#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Arc;

    use anyhow::{Result, bail};

    use crate::category::{self, Category, CategoryScope, CategorySnapshot, use_categories, use_category};
    use crate::error::DispatchError;
    use crate::method::{MethodDescriptor, MethodOrigin};
    use crate::rt::Runtime;
    use crate::typ::{ClassBuilder, builtins};
    use crate::val::Val;

    fn tagging(name: &str, tag: &'static str) -> Arc<Category> {
        Category::builder(name)
            .method(MethodDescriptor::builder(&builtins().string, "tag"), move |_, _| Ok(Val::str(tag)))
            .build()
    }

    #[test]
    fn test_category_method_visible_only_inside_block() -> Result<()> {
        let rt = Runtime::new();
        let realm = rt.root();
        let outer = tagging("Outer", "outer");
        assert!(!category::is_active());

        let inside = use_category(&outer, || realm.invoke_method(&Val::str("s"), "tag", &[]))?;
        assert_eq!(inside, Val::str("outer"));
        assert!(!category::is_active());
        assert!(matches!(
            realm.invoke_method(&Val::str("s"), "tag", &[]),
            Err(DispatchError::MethodNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_inner_category_shadows_outer() -> Result<()> {
        let rt = Runtime::new();
        let realm = rt.root();
        let outer = tagging("Outer", "outer");
        let inner = tagging("Inner", "inner");

        let seen = use_category(&outer, || -> Result<Vec<Val>> {
            let before = realm.invoke_method(&Val::str("s"), "tag", &[])?;
            let nested = use_category(&inner, || realm.invoke_method(&Val::str("s"), "tag", &[]))?;
            let after = realm.invoke_method(&Val::str("s"), "tag", &[])?;
            Ok(vec![before, nested, after])
        })?;
        assert_eq!(seen, vec![Val::str("outer"), Val::str("inner"), Val::str("outer")]);

        // the last category in one push is innermost
        let both = use_categories(&[outer, inner], || realm.invoke_method(&Val::str("s"), "tag", &[]))?;
        assert_eq!(both, Val::str("inner"));
        Ok(())
    }

    #[test]
    fn test_category_overrides_declared_method() -> Result<()> {
        let rt = Runtime::new();
        let b = builtins();
        let quiet = Category::builder("Quiet")
            .method(MethodDescriptor::builder(&b.string, "toUpperCase"), |recv, _| {
                Ok(Val::str(recv.as_str().unwrap_or_default().to_lowercase()))
            })
            .build();
        let out = use_category(&quiet, || rt.root().invoke_method(&Val::str("MiXed"), "toUpperCase", &[]))?;
        assert_eq!(out, Val::str("mixed"));
        assert_eq!(rt.root().invoke_method(&Val::str("MiXed"), "toUpperCase", &[])?, Val::str("MIXED"));
        Ok(())
    }

    #[test]
    fn test_category_applies_to_subclasses_only() -> Result<()> {
        let rt = Runtime::new();
        let animal = rt.define_class(ClassBuilder::new("Animal"))?;
        let dog = rt.define_class(ClassBuilder::new("Dog").extends(&animal))?;
        let rock = rt.define_class(ClassBuilder::new("Rock"))?;
        let pets = Category::builder("Pets")
            .method(MethodDescriptor::builder(&animal, "pet"), |_, _| Ok(Val::Bool(true)))
            .build();

        use_category(&pets, || -> Result<()> {
            assert_eq!(rt.root().invoke_method(&Val::object(&dog), "pet", &[])?, Val::Bool(true));
            assert!(rt.root().invoke_method(&Val::object(&rock), "pet", &[]).is_err());
            Ok(())
        })
    }

    #[test]
    fn test_stack_restored_after_error() {
        let outer = tagging("Outer", "outer");
        let inner = tagging("Inner", "inner");
        let result: Result<()> = use_category(&outer, || {
            let inner_result: Result<()> = use_category(&inner, || bail!("body failed"));
            assert!(inner_result.is_err());
            assert_eq!(category::current().names(), vec!["Outer".to_string()]);
            Ok(())
        });
        assert!(result.is_ok());
        assert!(category::current().is_empty());
    }

    #[test]
    fn test_stack_restored_after_panic() {
        let outer = tagging("Outer", "outer");
        let inner = tagging("Inner", "inner");
        let _scope = CategoryScope::enter(std::slice::from_ref(&outer));

        let caught = catch_unwind(AssertUnwindSafe(|| {
            let _: () = use_category(&inner, || panic!("boom inside category"));
        }));
        assert!(caught.is_err());
        assert_eq!(category::current().names(), vec!["Outer".to_string()]);
    }

    #[test]
    fn test_categories_are_thread_local() {
        let outer = tagging("Outer", "outer");
        use_category(&outer, || {
            let other = std::thread::spawn(category::is_active).join().expect("thread");
            assert!(!other);
            assert!(category::is_active());
        });
    }

    #[test]
    fn test_explicit_snapshot_resolution() -> Result<()> {
        let rt = Runtime::new();
        let meta = rt.root().meta_class(&builtins().string);
        let snapshot = CategorySnapshot::new([tagging("A", "a"), tagging("B", "b")]);
        assert_eq!(snapshot.len(), 2);

        let resolved = meta.resolve_with(false, "tag", &[], &snapshot)?;
        assert_eq!(resolved.method.handle().call(&Val::str(""), &[])?, Val::str("b"));
        assert!(matches!(resolved.method.origin(), MethodOrigin::Category { name } if &**name == "B"));

        let none = meta.resolve_with(false, "tag", &[], &CategorySnapshot::empty());
        assert!(none.is_err());
        Ok(())
    }

    #[test]
    fn test_later_builder_method_replaces_earlier() {
        let b = builtins();
        let cat = Category::builder("Twice")
            .method(MethodDescriptor::builder(&b.string, "x"), |_, _| Ok(Val::Int(1)))
            .method(MethodDescriptor::builder(&b.string, "x"), |_, _| Ok(Val::Int(2)))
            .build();
        assert_eq!(cat.methods().len(), 1);
        assert_eq!(cat.name(), "Twice");
    }
}
