#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::error::DispatchError;
    use crate::method::{MethodDescriptor, MethodOrigin, MethodRegistry, Registration};
    use crate::typ::{ClassRef, builtins};
    use crate::val::Val;

    fn method(owner: &ClassRef, name: &str, params: &[&ClassRef], origin: MethodOrigin, tag: &'static str) -> Arc<MethodDescriptor> {
        MethodDescriptor::builder(owner, name)
            .params(params.iter().copied())
            .origin(origin)
            .build(move |_, _| Ok(Val::str(tag)))
    }

    fn ext(module: &str) -> MethodOrigin {
        MethodOrigin::Extension { module: Arc::from(module) }
    }

    #[test]
    fn test_lookup_keeps_registration_order() -> anyhow::Result<()> {
        let b = builtins();
        let reg = MethodRegistry::new(&b.string);
        reg.register(method(&b.string, "foo", &[&b.int], MethodOrigin::Declared, "int"))?;
        reg.register(method(&b.string, "foo", &[&b.string], MethodOrigin::Declared, "str"))?;
        reg.register(method(&b.string, "foo", &[], ext("m"), "none"))?;
        let sigs: Vec<String> = reg.lookup("foo").iter().map(|m| m.signature()).collect();
        assert_eq!(sigs, vec!["foo(int)", "foo(String)", "foo()"]);
        assert!(reg.lookup("bar").is_empty());
        Ok(())
    }

    #[test]
    fn test_duplicate_in_same_precedence_class_fails() {
        let b = builtins();
        let reg = MethodRegistry::new(&b.string);
        reg.register(method(&b.string, "foo", &[&b.int], MethodOrigin::Declared, "a")).unwrap();
        let err = reg
            .register(method(&b.string, "foo", &[&b.int], MethodOrigin::Dynamic, "b"))
            .unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateMethod { .. }));

        reg.register(method(&b.string, "bar", &[], ext("one"), "a")).unwrap();
        assert!(reg.register(method(&b.string, "bar", &[], ext("two"), "b")).is_err());
    }

    #[test]
    fn test_declared_beats_extension_both_ways() -> anyhow::Result<()> {
        let b = builtins();
        let reg = MethodRegistry::new(&b.string);
        reg.register(method(&b.string, "foo", &[&b.int], MethodOrigin::Declared, "declared"))?;
        let stamp = reg.stamp();
        let outcome = reg.register(method(&b.string, "foo", &[&b.int], ext("m"), "ext"))?;
        assert!(matches!(outcome, Registration::Shadowed));
        assert_eq!(reg.stamp(), stamp, "shadowed registration must not bump the stamp");

        reg.register(method(&b.string, "baz", &[], ext("m"), "ext"))?;
        let outcome = reg.register(method(&b.string, "baz", &[], MethodOrigin::Declared, "declared"))?;
        assert!(matches!(outcome, Registration::Replaced(old) if old.origin() == &ext("m")));
        let found = reg.lookup("baz");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].handle().call(&Val::Nil, &[])?, Val::str("declared"));
        Ok(())
    }

    #[test]
    fn test_remove_and_mask_bump_stamp() -> anyhow::Result<()> {
        let b = builtins();
        let reg = MethodRegistry::new(&b.list);
        reg.register(method(&b.list, "foo", &[&b.int], MethodOrigin::Declared, "x"))?;
        let before = reg.stamp();
        assert!(reg.remove("foo", &[b.int.clone()]).is_some());
        assert!(reg.stamp() > before);
        assert!(reg.remove("foo", &[b.int.clone()]).is_none());
        assert!(reg.is_empty());

        reg.mask("foo", &[b.string.clone()]);
        assert!(reg.lookup("foo").is_empty());
        assert_eq!(reg.overloads("foo").slots().len(), 1);
        // registering over a mask replaces it
        reg.register(method(&b.list, "foo", &[&b.string], MethodOrigin::Dynamic, "y"))?;
        assert_eq!(reg.lookup("foo").len(), 1);
        Ok(())
    }

    #[test]
    fn test_remove_where_by_origin() -> anyhow::Result<()> {
        let b = builtins();
        let reg = MethodRegistry::new(&b.object);
        reg.register(method(&b.object, "a", &[], ext("m1"), "a"))?;
        reg.register(method(&b.object, "b", &[], ext("m2"), "b"))?;
        reg.register(method(&b.object, "c", &[], MethodOrigin::Declared, "c"))?;
        let removed = reg.remove_where(|m| m.origin() == &ext("m1"));
        assert_eq!(removed, 1);
        let names: Vec<String> = reg.names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["b", "c"]);
        Ok(())
    }

    #[test]
    fn test_concurrent_readers_see_whole_sets() {
        let b = builtins();
        let reg = Arc::new(MethodRegistry::new(&b.object));
        let writer = {
            let reg = reg.clone();
            let b = builtins();
            std::thread::spawn(move || {
                for i in 0..200 {
                    let class = if i % 2 == 0 { &b.int } else { &b.string };
                    let _ = reg.register(method(&b.object, "m", &[class, &b.long], MethodOrigin::Declared, "w"));
                    reg.remove("m", &[class.clone(), b.long.clone()]);
                }
            })
        };
        for _ in 0..200 {
            for m in reg.lookup("m") {
                assert_eq!(m.params().len(), 2);
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_varargs_signature() {
        let b = builtins();
        let m = MethodDescriptor::builder(&b.string, "format")
            .param(&b.string)
            .varargs(&b.object)
            .build(|_, _| Ok(Val::Nil));
        assert!(m.is_varargs());
        assert_eq!(m.signature(), "format(String, Object...)");
        assert_eq!(m.params()[1], b.object.array_of());
    }
}
