use super::{ClassRef, builtins};

/// How an argument class reaches a parameter class. Lower is better.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchTier {
    Exact,
    Assignable,
    Widening,
    Boxing,
    Coercion,
}

/// Tier for passing a value of class `arg` to a parameter of class `param`,
/// or `None` when the argument is not applicable.
pub fn conversion(arg: &ClassRef, param: &ClassRef) -> Option<MatchTier> {
    if arg == param {
        return Some(MatchTier::Exact);
    }
    if arg.is_null() {
        return (!param.is_primitive()).then_some(MatchTier::Assignable);
    }

    match (arg.primitive(), param.primitive()) {
        (Some(a), Some(p)) => {
            return if a.widens_to(p) {
                Some(MatchTier::Widening)
            } else if a.is_numeric() && p.is_numeric() {
                Some(MatchTier::Coercion)
            } else {
                None
            };
        }
        (Some(a), None) => {
            let boxed = builtins().boxed(a);
            if boxed == param || boxed.is_subclass_of(param) {
                return Some(MatchTier::Boxing);
            }
            return match param.boxed_primitive() {
                Some(p) if a.is_numeric() && p.is_numeric() => Some(MatchTier::Coercion),
                _ => None,
            };
        }
        (None, Some(p)) => {
            return match arg.boxed_primitive() {
                Some(a) if a == p || a.widens_to(p) => Some(MatchTier::Boxing),
                Some(a) if a.is_numeric() && p.is_numeric() => Some(MatchTier::Coercion),
                _ => None,
            };
        }
        (None, None) => {}
    }

    if arg.is_subclass_of(param) {
        return Some(MatchTier::Assignable);
    }
    match (arg.boxed_primitive(), param.boxed_primitive()) {
        (Some(a), Some(p)) if a.is_numeric() && p.is_numeric() => Some(MatchTier::Coercion),
        _ => None,
    }
}

/// Specificity order between two parameter classes: `a` is at least as
/// specific as `b` when any argument accepted by `a` without coercion is
/// also accepted by `b`.
pub fn at_least_as_specific(a: &ClassRef, b: &ClassRef) -> bool {
    if a == b {
        return true;
    }
    if let Some(p) = a.primitive() {
        let boxed = builtins().boxed(p);
        if boxed == b || boxed.is_subclass_of(b) {
            return true;
        }
    }
    matches!(conversion(a, b), Some(MatchTier::Assignable | MatchTier::Widening))
}
