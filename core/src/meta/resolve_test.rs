#[cfg(test)]
mod tests {
    use anyhow::Result;

    use crate::error::DispatchError;
    use crate::meta::{CallForm, Operator};
    use crate::method::{MethodDescriptor, MethodOrigin};
    use crate::rt::Runtime;
    use crate::typ::{ClassBuilder, ClassRef, builtins};
    use crate::val::Val;

    fn named(rt: &Runtime, owner: &ClassRef, name: &str, params: &[&ClassRef], tag: &'static str) -> Result<()> {
        rt.register_method(
            MethodDescriptor::builder(owner, name)
                .params(params.iter().copied())
                .build(move |_, _| Ok(Val::str(tag))),
        )?;
        Ok(())
    }

    fn call(rt: &Runtime, receiver: &Val, name: &str, args: &[Val]) -> Result<Val, DispatchError> {
        rt.root().invoke_method(receiver, name, args)
    }

    #[test]
    fn test_declared_and_extension_overloads() -> Result<()> {
        let rt = Runtime::new();
        let b = builtins();
        let widget = rt.define_class(ClassBuilder::new("Widget"))?;
        rt.register_method(
            MethodDescriptor::builder(&widget, "foo")
                .param(&b.int)
                .build(|_, args| Ok(Val::str(format!("int:{}", args[0])))),
        )?;
        rt.register_method(
            MethodDescriptor::builder(&widget, "foo")
                .param(&b.string)
                .origin(MethodOrigin::Extension { module: "widgets".into() })
                .build(|_, args| Ok(Val::str(format!("ext:{}", args[0])))),
        )?;
        let w = Val::object(&widget);

        assert_eq!(call(&rt, &w, "foo", &[Val::Int(5)])?, Val::str("int:5"));
        assert_eq!(call(&rt, &w, "foo", &[Val::str("x")])?, Val::str("ext:x"));
        // coerced to the int parameter, truncating
        assert_eq!(call(&rt, &w, "foo", &[Val::Double(5.0)])?, Val::str("int:5"));
        assert!(matches!(
            call(&rt, &w, "bar", &[]),
            Err(DispatchError::MethodNotFound { ref name, .. }) if name == "bar"
        ));
        Ok(())
    }

    #[test]
    fn test_resolution_is_deterministic() -> Result<()> {
        let rt = Runtime::new();
        let meta = rt.root().meta_class(&builtins().integer);
        let first = meta.resolve(&Val::Int(1), "plus", &[Val::Int(2)])?.method.id();
        for _ in 0..32 {
            assert_eq!(meta.resolve(&Val::Int(1), "plus", &[Val::Int(2)])?.method.id(), first);
        }
        Ok(())
    }

    #[test]
    fn test_most_specific_overload_wins() -> Result<()> {
        let rt = Runtime::new();
        let b = builtins();
        let sink = rt.define_class(ClassBuilder::new("Sink"))?;
        named(&rt, &sink, "put", &[&b.object], "object")?;
        named(&rt, &sink, "put", &[&b.char_sequence], "chars")?;
        named(&rt, &sink, "put", &[&b.number], "number")?;
        named(&rt, &sink, "put", &[&b.integer], "integer")?;
        let s = Val::object(&sink);

        assert_eq!(call(&rt, &s, "put", &[Val::str("x")])?, Val::str("chars"));
        assert_eq!(call(&rt, &s, "put", &[Val::Int(1)])?, Val::str("integer"));
        assert_eq!(call(&rt, &s, "put", &[Val::Long(1)])?, Val::str("number"));
        assert_eq!(call(&rt, &s, "put", &[Val::Bool(true)])?, Val::str("object"));
        // null is assignable to every reference parameter; the most specific
        // among them is ambiguous between unrelated branches
        assert!(matches!(
            call(&rt, &s, "put", &[Val::Nil]),
            Err(DispatchError::AmbiguousMethod { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_widening_prefers_nearest_primitive() -> Result<()> {
        let rt = Runtime::new();
        let b = builtins();
        let math = rt.define_class(ClassBuilder::new("Math2"))?;
        named(&rt, &math, "f", &[&b.double], "double")?;
        named(&rt, &math, "f", &[&b.long], "long")?;
        let m = Val::object(&math);

        assert_eq!(call(&rt, &m, "f", &[Val::Int(1)])?, Val::str("long"));
        assert_eq!(call(&rt, &m, "f", &[Val::Float(1.0)])?, Val::str("double"));
        assert_eq!(call(&rt, &m, "f", &[Val::Long(1)])?, Val::str("long"));
        Ok(())
    }

    #[test]
    fn test_ambiguity_names_both_candidates() -> Result<()> {
        let rt = Runtime::new();
        let b = builtins();
        let pair = rt.define_class(ClassBuilder::new("Pair"))?;
        named(&rt, &pair, "join", &[&b.object, &b.string], "a")?;
        named(&rt, &pair, "join", &[&b.string, &b.object], "b")?;

        match call(&rt, &Val::object(&pair), "join", &[Val::str("x"), Val::str("y")]) {
            Err(DispatchError::AmbiguousMethod { first, second, .. }) => {
                let both = format!("{first} {second}");
                assert!(both.contains("join(Object, String)"), "{both}");
                assert!(both.contains("join(String, Object)"), "{both}");
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
        // an exact overload settles it
        named(&rt, &pair, "join", &[&b.string, &b.string], "c")?;
        assert_eq!(call(&rt, &Val::object(&pair), "join", &[Val::str("x"), Val::str("y")])?, Val::str("c"));
        Ok(())
    }

    #[test]
    fn test_varargs_forms() -> Result<()> {
        let rt = Runtime::new();
        let b = builtins();
        let fmt = rt.define_class(ClassBuilder::new("Fmt"))?;
        rt.register_method(
            MethodDescriptor::builder(&fmt, "format")
                .param(&b.string)
                .varargs(&b.object)
                .build(|_, args| Ok(Val::str(format!("{} {}", args[0], args[1])))),
        )?;
        rt.register_method(
            MethodDescriptor::builder(&fmt, "sum")
                .varargs(&b.int)
                .build(|_, args| {
                    let total: i64 = match &args[0] {
                        Val::List(items) => items.iter().filter_map(Val::as_i64).sum(),
                        _ => 0,
                    };
                    Ok(Val::Long(total))
                }),
        )?;
        named(&rt, &fmt, "format", &[&b.string], "plain")?;
        let f = Val::object(&fmt);
        let meta = rt.root().meta_class(&fmt);

        // a non-varargs overload always beats the varargs one
        assert_eq!(call(&rt, &f, "format", &[Val::str("x")])?, Val::str("plain"));
        assert_eq!(call(&rt, &f, "format", &[Val::str("x"), Val::Int(1), Val::Int(2)])?, Val::str("x [1, 2]"));
        let packed = meta.resolve(&f, "format", &[Val::str("x"), Val::Int(1)])?;
        assert_eq!(packed.form, CallForm::Packed { fixed: 1 });
        assert!(packed.cacheable);

        assert_eq!(call(&rt, &f, "sum", &[])?, Val::Long(0));
        assert_eq!(call(&rt, &f, "sum", &[Val::Int(1), Val::Long(2)])?, Val::Long(3));
        let spread_args = [Val::list([Val::Int(4), Val::Int(5)])];
        let spread = meta.resolve(&f, "sum", &spread_args)?;
        assert_eq!(spread.form, CallForm::Expanded { fixed: 0 });
        assert!(!spread.cacheable);
        assert_eq!(spread.invoke(&f, &spread_args)?, Val::Long(9));
        Ok(())
    }

    #[test]
    fn test_supertype_chain_and_shadowing() -> Result<()> {
        let rt = Runtime::new();
        let named_iface = rt.define_class(ClassBuilder::interface("Named"))?;
        let animal = rt.define_class(ClassBuilder::new("Animal").implements(&named_iface))?;
        let dog = rt.define_class(ClassBuilder::new("Dog").extends(&animal))?;
        named(&rt, &named_iface, "label", &[], "named")?;
        named(&rt, &animal, "kind", &[], "animal")?;
        named(&rt, &named_iface, "kind", &[], "iface")?;
        named(&rt, &dog, "toString", &[], "a dog")?;
        let d = Val::object(&dog);

        assert_eq!(call(&rt, &d, "label", &[])?, Val::str("named"));
        // superclass before interface
        assert_eq!(call(&rt, &d, "kind", &[])?, Val::str("animal"));
        assert_eq!(call(&rt, &d, "toString", &[])?, Val::str("a dog"));
        assert_eq!(call(&rt, &Val::object(&animal), "toString", &[])?.as_str().map(|s| s.starts_with("Animal@")), Some(true));

        let visible = rt.root().meta_class(&dog).lookup("kind");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].owner(), &animal);
        Ok(())
    }

    #[test]
    fn test_static_receivers_see_static_methods() -> Result<()> {
        let rt = Runtime::new();
        let b = builtins();
        let ids = rt.define_class(ClassBuilder::new("Ids"))?;
        rt.register_method(
            MethodDescriptor::builder(&ids, "make")
                .static_method()
                .build(|_, _| Ok(Val::Int(1))),
        )?;
        named(&rt, &ids, "peek", &[], "peek")?;
        let class_val = Val::Class(ids.clone());

        assert_eq!(call(&rt, &class_val, "make", &[])?, Val::Int(1));
        assert!(matches!(
            call(&rt, &class_val, "peek", &[]),
            Err(DispatchError::MethodNotFound { ref receiver, .. }) if receiver == "static Ids"
        ));
        // class values still answer the methods of `Class`
        assert_eq!(call(&rt, &class_val, "getName", &[])?, Val::str("Ids"));
        assert_eq!(call(&rt, &Val::object(&ids), "getClass", &[])?, class_val);
        assert_eq!(call(&rt, &Val::str("s"), "getClass", &[])?, Val::Class(b.string.clone()));
        Ok(())
    }

    #[test]
    fn test_properties() -> Result<()> {
        let rt = Runtime::new();
        let b = builtins();
        let person = rt.define_class(ClassBuilder::new("Person").field("name"))?;
        let bag = rt.define_class(ClassBuilder::new("Bag").expando())?;
        rt.register_method(
            MethodDescriptor::builder(&person, "isAdult")
                .returns(&b.boolean)
                .build(|_, _| Ok(Val::Bool(true))),
        )?;
        let realm = rt.root();
        let p = Val::object(&person);

        realm.set_property(&p, "name", Val::str("Ada"))?;
        assert_eq!(realm.get_property(&p, "name")?, Val::str("Ada"));
        assert_eq!(realm.get_property(&p, "adult")?, Val::Bool(true));
        assert!(matches!(
            realm.set_property(&p, "age", Val::Int(3)),
            Err(DispatchError::PropertyNotFound { .. })
        ));
        assert!(matches!(realm.get_property(&p, "age"), Err(DispatchError::PropertyNotFound { .. })));

        let g = Val::object(&bag);
        realm.set_property(&g, "color", Val::str("red"))?;
        assert_eq!(realm.get_property(&g, "color")?, Val::str("red"));
        Ok(())
    }

    #[test]
    fn test_setter_method_takes_precedence() -> Result<()> {
        let rt = Runtime::new();
        let b = builtins();
        let gauge = rt.define_class(ClassBuilder::new("Gauge").field("level"))?;
        rt.register_method(
            MethodDescriptor::builder(&gauge, "setLevel")
                .param(&b.int)
                .build(|recv, args| {
                    if let Val::Object(obj) = recv {
                        let doubled = args[0].as_i64().unwrap_or(0) * 2;
                        obj.set_field("level", Val::Long(doubled));
                    }
                    Ok(Val::Nil)
                }),
        )?;
        let g = Val::object(&gauge);
        rt.root().set_property(&g, "level", Val::Int(4))?;
        assert_eq!(rt.root().get_property(&g, "level")?, Val::Long(8));
        Ok(())
    }

    #[test]
    fn test_operators_dispatch_by_name() -> Result<()> {
        let rt = Runtime::new();
        let realm = rt.root();
        assert_eq!(realm.apply_operator(Operator::Plus, &Val::Int(1), &[Val::Int(2)])?, Val::Int(3));
        assert_eq!(realm.apply_operator(Operator::Plus, &Val::Int(1), &[Val::Double(2.5)])?, Val::Double(3.5));
        assert_eq!(realm.apply_operator(Operator::Plus, &Val::str("a"), &[Val::Int(1)])?, Val::str("a1"));
        assert_eq!(realm.apply_operator(Operator::Less, &Val::Int(1), &[Val::Long(2)])?, Val::Bool(true));
        assert_eq!(realm.apply_operator(Operator::GreaterEq, &Val::str("b"), &[Val::str("a")])?, Val::Bool(true));
        assert_eq!(realm.apply_operator(Operator::Equals, &Val::Nil, &[Val::Nil])?, Val::Bool(true));
        assert_eq!(realm.apply_operator(Operator::NotEquals, &Val::Int(1), &[Val::Nil])?, Val::Bool(true));
        assert_eq!(realm.apply_operator(Operator::Equals, &Val::Int(1), &[Val::Long(1)])?, Val::Bool(true));
        assert_eq!(realm.apply_operator(Operator::Negative, &Val::Int(4), &[])?, Val::Int(-4));

        let op = Operator::from_symbol("<<").map(Operator::method_name);
        assert_eq!(op, Some("leftShift"));
        Ok(())
    }

    #[test]
    fn test_user_operator_overload() -> Result<()> {
        let rt = Runtime::new();
        let vec2 = rt.define_class(ClassBuilder::new("Vec2").field("x"))?;
        let owner = vec2.clone();
        rt.register_method(
            MethodDescriptor::builder(&vec2, "plus")
                .param(&vec2)
                .build(move |recv, args| {
                    let x = |v: &Val| match v {
                        Val::Object(o) => o.field("x").and_then(|f| f.as_i64()).unwrap_or(0),
                        _ => 0,
                    };
                    let out = Val::object(&owner);
                    if let Val::Object(obj) = &out {
                        obj.set_field("x", Val::Long(x(recv) + x(&args[0])));
                    }
                    Ok(out)
                }),
        )?;
        let a = Val::object(&vec2);
        let b = Val::object(&vec2);
        rt.root().set_property(&a, "x", Val::Long(2))?;
        rt.root().set_property(&b, "x", Val::Long(3))?;

        let sum = rt.root().apply_operator(Operator::Plus, &a, &[b])?;
        assert_eq!(rt.root().get_property(&sum, "x")?, Val::Long(5));
        Ok(())
    }

    #[test]
    fn test_invocation_errors_are_wrapped() -> Result<()> {
        let rt = Runtime::new();
        let boom = rt.define_class(ClassBuilder::new("Boom"))?;
        rt.register_method(
            MethodDescriptor::builder(&boom, "go").build(|_, _| Err(anyhow::anyhow!("exploded"))),
        )?;
        match call(&rt, &Val::object(&boom), "go", &[]) {
            Err(DispatchError::Invocation { method, source }) => {
                assert_eq!(method, "Boom.go()");
                assert_eq!(source.to_string(), "exploded");
            }
            other => panic!("expected invocation error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_methods_listing_is_sorted_and_unique() -> Result<()> {
        let rt = Runtime::new();
        let meta = rt.root().meta_class(&builtins().string);
        let methods = meta.methods();
        let sigs: Vec<String> = methods.iter().map(|m| m.signature()).collect();
        let mut sorted = sigs.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sigs, sorted);
        assert!(sigs.iter().any(|s| s == "toUpperCase()"));
        assert!(methods.iter().any(|m| m.name() == "plus"));
        Ok(())
    }
}
