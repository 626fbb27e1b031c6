#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;

    use crate::callsite::{CacheEntry, CallSite, ShapeKey, SiteKind, SiteState};
    use crate::config::DispatchConfig;
    use crate::category::{Category, use_category};
    use crate::method::MethodDescriptor;
    use crate::rt::Runtime;
    use crate::typ::{ClassBuilder, ClassRef, builtins};
    use crate::val::Val;

    fn speaker(rt: &Runtime, name: &str, parent: &ClassRef) -> Result<ClassRef> {
        let class = rt.define_class(ClassBuilder::new(name).extends(parent))?;
        let sound = format!("{name} speaks");
        rt.register_method(
            MethodDescriptor::builder(&class, "speak")
                .returns(&builtins().string)
                .build(move |_, _| Ok(Val::str(&sound))),
        )?;
        Ok(class)
    }

    fn site(rt: &Runtime, name: &str) -> Arc<CallSite> {
        let mut sites = rt.call_sites(rt.root());
        let index = sites.allocate(name);
        sites.get(index).cloned().expect("allocated site")
    }

    #[test]
    fn test_site_goes_monomorphic_then_polymorphic() -> Result<()> {
        let rt = Runtime::new();
        let animal = rt.define_class(ClassBuilder::new("Animal"))?;
        let dog = speaker(&rt, "Dog", &animal)?;
        let cat = speaker(&rt, "Cat", &animal)?;
        let site = site(&rt, "speak");
        assert_eq!(site.kind(), SiteKind::Unlinked);

        let (d, c) = (Val::object(&dog), Val::object(&cat));
        assert_eq!(site.call(&d, &[])?, Val::str("Dog speaks"));
        assert_eq!(site.kind(), SiteKind::Monomorphic);
        assert_eq!(site.call(&d, &[])?, Val::str("Dog speaks"));

        assert_eq!(site.call(&c, &[])?, Val::str("Cat speaks"));
        assert_eq!(site.kind(), SiteKind::Polymorphic);
        assert_eq!(site.entries(), 2);
        // the first shape still hits
        assert_eq!(site.call(&d, &[])?, Val::str("Dog speaks"));

        let stats = site.stats();
        assert_eq!(stats.resolutions, 2);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        Ok(())
    }

    #[test]
    fn test_cached_target_is_stable() -> Result<()> {
        let rt = Runtime::new();
        let site = site(&rt, "toUpperCase");
        let first = site.target(&Val::str("a"), &[])?.method.id();
        for _ in 0..16 {
            assert_eq!(site.target(&Val::str("b"), &[])?.method.id(), first);
        }
        assert_eq!(site.stats().resolutions, 1);
        Ok(())
    }

    #[test]
    fn test_many_receiver_classes_go_megamorphic() -> Result<()> {
        let rt = Runtime::new();
        let animal = rt.define_class(ClassBuilder::new("Animal"))?;
        let classes = (0..10)
            .map(|i| speaker(&rt, &format!("Kind{i}"), &animal))
            .collect::<Result<Vec<_>>>()?;
        let site = site(&rt, "speak");
        let limit = rt.config().callsite.polymorphic_limit;

        let mut seen = Vec::new();
        for (i, class) in classes.iter().enumerate() {
            let out = site.call(&Val::object(class), &[])?;
            assert_eq!(out, Val::str(format!("Kind{i} speaks")));
            seen.push(site.kind());
            if i < limit {
                assert!(site.kind() <= SiteKind::Polymorphic);
            }
        }
        assert_eq!(site.kind(), SiteKind::Megamorphic);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "site state went backwards: {seen:?}");

        // still correct for every class once megamorphic
        for (i, class) in classes.iter().enumerate().rev() {
            assert_eq!(site.call(&Val::object(class), &[])?, Val::str(format!("Kind{i} speaks")));
        }
        assert_eq!(site.kind(), SiteKind::Megamorphic);
        Ok(())
    }

    #[test]
    fn test_limit_one_skips_polymorphic() -> Result<()> {
        let rt = Runtime::new();
        let animal = rt.define_class(ClassBuilder::new("Animal"))?;
        let dog = speaker(&rt, "Dog", &animal)?;
        let cat = speaker(&rt, "Cat", &animal)?;
        let site = CallSite::new(0, "speak", rt.root().clone(), 1);

        site.call(&Val::object(&dog), &[])?;
        assert_eq!(site.kind(), SiteKind::Monomorphic);
        site.call(&Val::object(&cat), &[])?;
        assert_eq!(site.kind(), SiteKind::Megamorphic);
        Ok(())
    }

    #[test]
    fn test_added_method_invalidates_cached_entry() -> Result<()> {
        let rt = Runtime::new();
        let base = rt.define_class(ClassBuilder::new("Greeter"))?;
        let b = builtins();
        rt.register_method(
            MethodDescriptor::builder(&base, "greet")
                .param(&b.object)
                .build(|_, _| Ok(Val::str("object"))),
        )?;
        let site = site(&rt, "greet");
        let receiver = Val::object(&base);
        let args = [Val::str("bob")];

        assert_eq!(site.call(&receiver, &args)?, Val::str("object"));
        assert_eq!(site.call(&receiver, &args)?, Val::str("object"));

        rt.register_method(
            MethodDescriptor::builder(&base, "greet")
                .param(&b.string)
                .build(|_, _| Ok(Val::str("string"))),
        )?;
        assert_eq!(site.call(&receiver, &args)?, Val::str("string"));
        assert_eq!(site.kind(), SiteKind::Monomorphic);
        assert_eq!(site.stats().invalidations, 1);
        Ok(())
    }

    #[test]
    fn test_superclass_change_invalidates_subclass_entry() -> Result<()> {
        let rt = Runtime::new();
        let animal = rt.define_class(ClassBuilder::new("Animal"))?;
        let dog = rt.define_class(ClassBuilder::new("Dog").extends(&animal))?;
        rt.register_method(
            MethodDescriptor::builder(&animal, "name").build(|_, _| Ok(Val::str("animal"))),
        )?;
        let site = site(&rt, "name");
        let d = Val::object(&dog);
        assert_eq!(site.call(&d, &[])?, Val::str("animal"));

        rt.root().remove_method(&animal, "name", &[]);
        rt.register_method(MethodDescriptor::builder(&animal, "name").build(|_, _| Ok(Val::str("beast"))))?;
        assert_eq!(site.call(&d, &[])?, Val::str("beast"));
        Ok(())
    }

    #[test]
    fn test_active_category_bypasses_cache() -> Result<()> {
        let rt = Runtime::new();
        let b = builtins();
        let site = site(&rt, "shout");
        let loud = Category::builder("Loud")
            .method(MethodDescriptor::builder(&b.string, "shout"), |recv, _| {
                Ok(Val::str(format!("{}!!", recv.as_str().unwrap_or_default())))
            })
            .build();

        let out = use_category(&loud, || site.call(&Val::str("hi"), &[]))?;
        assert_eq!(out, Val::str("hi!!"));
        assert_eq!(site.kind(), SiteKind::Unlinked);
        assert_eq!(site.stats().bypasses, 1);

        // outside the scope the method is gone again
        assert!(site.call(&Val::str("hi"), &[]).is_err());
        Ok(())
    }

    #[test]
    fn test_static_and_instance_receivers_cache_separately() -> Result<()> {
        let rt = Runtime::new();
        let counter = rt.define_class(ClassBuilder::new("Counter"))?;
        rt.register_method(
            MethodDescriptor::builder(&counter, "create")
                .static_method()
                .build(|recv, _| Ok(Val::Bool(matches!(recv, Val::Class(_))))),
        )?;
        let site = site(&rt, "create");

        // static methods answer instance receivers too
        assert_eq!(site.call(&Val::Class(counter.clone()), &[])?, Val::Bool(true));
        assert_eq!(site.call(&Val::object(&counter), &[])?, Val::Bool(false));
        assert_eq!(site.kind(), SiteKind::Polymorphic);
        assert_eq!(site.entries(), 2);
        Ok(())
    }

    #[test]
    fn test_concurrent_calls_agree() -> Result<()> {
        let rt = Runtime::new();
        let animal = rt.define_class(ClassBuilder::new("Animal"))?;
        let classes = (0..6)
            .map(|i| speaker(&rt, &format!("T{i}"), &animal))
            .collect::<Result<Vec<_>>>()?;
        let site = site(&rt, "speak");

        std::thread::scope(|s| {
            for t in 0..4 {
                let (site, classes) = (&site, &classes);
                s.spawn(move || {
                    for round in 0..50 {
                        let i = (t + round) % classes.len();
                        let out = site.call(&Val::object(&classes[i]), &[]).expect("speak");
                        assert_eq!(out, Val::str(format!("T{i} speaks")));
                    }
                });
            }
        });
        assert_eq!(site.kind(), SiteKind::Megamorphic);
        Ok(())
    }

    #[test]
    fn test_missing_method_is_not_cached() -> Result<()> {
        let rt = Runtime::new();
        let site = site(&rt, "nope");
        assert!(site.call(&Val::Int(1), &[]).is_err());
        assert_eq!(site.kind(), SiteKind::Unlinked);
        Ok(())
    }

    #[test]
    fn test_meta_stale_before_generation_read_is_never_served() -> Result<()> {
        let rt = Runtime::new();
        let host = rt.define_class(ClassBuilder::new("Host"))?;
        rt.register_method(MethodDescriptor::builder(&host, "greet").build(|_, _| Ok(Val::str("base"))))?;
        let child = rt.new_realm("child", None);
        let h = Val::object(&host);
        let mut sites = rt.call_sites(&child);
        let index = sites.allocate("greet");
        let site = sites.get(index).cloned().expect("allocated site");

        // an override layer appears between taking the table and reading its generation
        let meta = child.meta_class_of(&h);
        child.add_method(MethodDescriptor::builder(&host, "greet").build(|_, _| Ok(Val::str("override"))))?;
        let generation = meta.generation();
        let resolved = child.resolve_shape(&meta, &h, "greet", &[])?;
        assert_eq!(resolved.invoke(&h, &[])?, Val::str("base"));
        assert!(CacheEntry::link(ShapeKey::of(&h, &[]), &meta, generation, &resolved).is_none());

        // an entry recorded from that table is rejected on lookup
        let entry = CacheEntry {
            guard: ShapeKey::of(&h, &[]),
            meta: Arc::downgrade(&meta),
            method: Arc::downgrade(&resolved.method),
            form: resolved.form,
            generation,
        };
        *site.state.write() = Arc::new(SiteState::Monomorphic(entry));
        assert_eq!(site.call(&h, &[])?, Val::str("override"));
        assert_eq!(site.call(&h, &[])?, Val::str("override"));
        let stats = site.stats();
        assert_eq!(stats.invalidations, 1);
        assert_eq!(stats.hits, 1);
        Ok(())
    }

    #[test]
    fn test_hot_site_survives_sweeps() -> Result<()> {
        let mut config = DispatchConfig::default();
        config.cache.idle_sweeps = 2;
        let rt = Runtime::with_config(config)?;
        let animal = rt.define_class(ClassBuilder::new("Animal"))?;
        let dog = speaker(&rt, "Dog", &animal)?;
        let site = site(&rt, "speak");
        let d = Val::object(&dog);

        for _ in 0..10 {
            for _ in 0..50 {
                assert_eq!(site.call(&d, &[])?, Val::str("Dog speaks"));
            }
            rt.sweep();
        }
        let stats = site.stats();
        assert_eq!(stats.invalidations, 0);
        assert_eq!(stats.resolutions, 1);
        assert_eq!(stats.hits, 499);
        assert_eq!(site.kind(), SiteKind::Monomorphic);
        Ok(())
    }
}
