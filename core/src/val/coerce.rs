use super::Val;
use crate::typ::{ClassRef, Prim};

/// Converts a numeric argument to the representation a parameter expects.
/// Non-numeric values and non-numeric parameters pass through unchanged;
/// integral targets truncate toward zero.
pub fn coerce(value: &Val, param: &ClassRef) -> Val {
    let Some(target) = param.numeric_or_bool() else {
        return value.clone();
    };
    if !value.is_number() {
        return value.clone();
    }
    match target {
        Prim::Boolean => value.clone(),
        Prim::Int => match value {
            Val::Int(_) => value.clone(),
            Val::Long(l) => Val::Int(*l as i32),
            other => Val::Int(other.as_f64().map(|x| x as i32).unwrap_or_default()),
        },
        Prim::Long => match value {
            Val::Long(_) => value.clone(),
            Val::Int(i) => Val::Long(*i as i64),
            other => Val::Long(other.as_f64().map(|x| x as i64).unwrap_or_default()),
        },
        Prim::Float => match value {
            Val::Float(_) => value.clone(),
            other => Val::Float(other.as_f64().map(|x| x as f32).unwrap_or_default()),
        },
        Prim::Double => match value {
            Val::Double(_) => value.clone(),
            Val::Long(l) => Val::Double(*l as f64),
            other => Val::Double(other.as_f64().unwrap_or_default()),
        },
    }
}
