use once_cell::sync::Lazy;

use super::{ClassFlags, ClassKind, ClassRef, Prim};

/// Classes every runtime knows about. Shared process-wide so that values
/// created by one runtime can be dispatched by another.
#[derive(Debug)]
pub struct Builtins {
    pub object: ClassRef,
    pub null: ClassRef,
    pub number: ClassRef,
    pub boolean: ClassRef,
    pub int: ClassRef,
    pub long: ClassRef,
    pub float: ClassRef,
    pub double: ClassRef,
    pub boolean_box: ClassRef,
    pub integer: ClassRef,
    pub long_box: ClassRef,
    pub float_box: ClassRef,
    pub double_box: ClassRef,
    pub char_sequence: ClassRef,
    pub string: ClassRef,
    pub collection: ClassRef,
    pub list: ClassRef,
    pub class: ClassRef,
}

static BUILTINS: Lazy<Builtins> = Lazy::new(Builtins::create);

pub fn builtins() -> &'static Builtins {
    &BUILTINS
}

const FINAL: ClassFlags = ClassFlags {
    is_final: true,
    expando: false,
};

impl Builtins {
    fn create() -> Self {
        // `Object` must exist before anything that names it as superclass;
        // `is_subclass_of` consults `builtins()` so nothing below may call it.
        let object = ClassRef::new("Object", ClassKind::Class, None, Vec::new(), Vec::new(), ClassFlags::default());
        let class_of = |name: &str, kind: ClassKind, sup: &ClassRef, ifaces: Vec<ClassRef>, flags: ClassFlags| {
            ClassRef::new(name, kind, Some(sup.clone()), ifaces, Vec::new(), flags)
        };
        let iface = |name: &str, extends: Vec<ClassRef>| {
            ClassRef::new(name, ClassKind::Interface, None, extends, Vec::new(), ClassFlags::default())
        };

        let null = class_of("NullObject", ClassKind::Null, &object, Vec::new(), FINAL);
        let number = class_of("Number", ClassKind::Class, &object, Vec::new(), ClassFlags::default());
        let prim = |p: Prim| ClassRef::new(p.primitive_name(), ClassKind::Primitive(p), None, Vec::new(), Vec::new(), FINAL);
        let boxed = |p: Prim, sup: &ClassRef| class_of(p.boxed_name(), ClassKind::Boxed(p), sup, Vec::new(), FINAL);

        let char_sequence = iface("CharSequence", Vec::new());
        let collection = iface("Collection", Vec::new());
        let string = class_of("String", ClassKind::Class, &object, vec![char_sequence.clone()], FINAL);
        let list = class_of("List", ClassKind::Class, &object, vec![collection.clone()], ClassFlags::default());
        let class = class_of("Class", ClassKind::Class, &object, Vec::new(), FINAL);

        Builtins {
            boolean: prim(Prim::Boolean),
            int: prim(Prim::Int),
            long: prim(Prim::Long),
            float: prim(Prim::Float),
            double: prim(Prim::Double),
            boolean_box: boxed(Prim::Boolean, &object),
            integer: boxed(Prim::Int, &number),
            long_box: boxed(Prim::Long, &number),
            float_box: boxed(Prim::Float, &number),
            double_box: boxed(Prim::Double, &number),
            object,
            null,
            number,
            char_sequence,
            string,
            collection,
            list,
            class,
        }
    }

    pub fn primitive(&self, p: Prim) -> &ClassRef {
        match p {
            Prim::Boolean => &self.boolean,
            Prim::Int => &self.int,
            Prim::Long => &self.long,
            Prim::Float => &self.float,
            Prim::Double => &self.double,
        }
    }

    pub fn boxed(&self, p: Prim) -> &ClassRef {
        match p {
            Prim::Boolean => &self.boolean_box,
            Prim::Int => &self.integer,
            Prim::Long => &self.long_box,
            Prim::Float => &self.float_box,
            Prim::Double => &self.double_box,
        }
    }

    pub fn all(&self) -> Vec<&ClassRef> {
        vec![
            &self.object,
            &self.null,
            &self.number,
            &self.boolean,
            &self.int,
            &self.long,
            &self.float,
            &self.double,
            &self.boolean_box,
            &self.integer,
            &self.long_box,
            &self.float_box,
            &self.double_box,
            &self.char_sequence,
            &self.string,
            &self.collection,
            &self.list,
            &self.class,
        ]
    }
}
