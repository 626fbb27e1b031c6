use super::MetaClass;
use crate::error::DispatchError;
use crate::val::Val;

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `Ok(None)` when no accessor method applies.
fn try_accessor(meta: &MetaClass, receiver: &Val, name: &str, args: &[Val]) -> Result<Option<Val>, DispatchError> {
    match meta.resolve(receiver, name, args) {
        Ok(resolved) => resolved.invoke(receiver, args).map(Some),
        Err(DispatchError::MethodNotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

impl MetaClass {
    /// `getFoo()`, then `isFoo()`, then the field or property bag entry.
    pub fn get_property(&self, receiver: &Val, property: &str) -> Result<Val, DispatchError> {
        let cap = capitalize(property);
        for accessor in [format!("get{cap}"), format!("is{cap}")] {
            if let Some(value) = try_accessor(self, receiver, &accessor, &[])? {
                return Ok(value);
            }
        }
        if let Val::Object(obj) = receiver
            && let Some(value) = obj.field(property)
        {
            return Ok(value);
        }
        Err(DispatchError::PropertyNotFound {
            receiver: self.class.name().to_string(),
            property: property.to_string(),
        })
    }

    /// `setFoo(value)`, then an existing field, then the property bag of
    /// expando classes.
    pub fn set_property(&self, receiver: &Val, property: &str, value: Val) -> Result<(), DispatchError> {
        let setter = format!("set{}", capitalize(property));
        if try_accessor(self, receiver, &setter, std::slice::from_ref(&value))?.is_some() {
            return Ok(());
        }
        if let Val::Object(obj) = receiver {
            if obj.set_field(property, value.clone()) {
                return Ok(());
            }
            if obj.class().is_expando() {
                obj.put_property(property, value);
                return Ok(());
            }
        }
        Err(DispatchError::PropertyNotFound {
            receiver: self.class.name().to_string(),
            property: property.to_string(),
        })
    }
}
