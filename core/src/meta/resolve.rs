use std::sync::Arc;

use super::MetaClass;
use crate::category::CategorySnapshot;
use crate::error::DispatchError;
use crate::method::{MethodDescriptor, Slot};
use crate::typ::{ClassRef, MatchTier, at_least_as_specific, conversion};
use crate::val::{Val, coerce};

/// Runtime class of one argument. Lists also carry their element classes
/// so that a varargs parameter can spread them.
#[derive(Debug, Clone)]
pub struct ArgInfo {
    pub class: ClassRef,
    pub elements: Option<Arc<[ClassRef]>>,
}

impl ArgInfo {
    pub fn of(value: &Val) -> Self {
        let elements = match value {
            Val::List(items) => Some(items.iter().map(Val::class).collect()),
            _ => None,
        };
        Self {
            class: value.class(),
            elements,
        }
    }

    pub fn class(class: &ClassRef) -> Self {
        Self {
            class: class.clone(),
            elements: None,
        }
    }
}

/// How arguments are bound to the chosen method's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallForm {
    /// One argument per parameter.
    Direct,
    /// Arguments from `fixed` on are collected into the varargs list.
    Packed { fixed: usize },
    /// The list argument at `fixed` becomes the varargs list.
    Expanded { fixed: usize },
}

impl CallForm {
    pub fn is_varargs(self) -> bool {
        !matches!(self, CallForm::Direct)
    }
}

/// Outcome of resolution: the method and how to bind arguments to it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub method: Arc<MethodDescriptor>,
    pub form: CallForm,
    /// False when the choice depended on list element classes, which a
    /// class-shape guard cannot see.
    pub cacheable: bool,
}

impl Resolved {
    pub fn invoke(&self, receiver: &Val, args: &[Val]) -> Result<Val, DispatchError> {
        let params = self.method.params();
        let bound: Vec<Val> = match self.form {
            CallForm::Direct => args.iter().zip(params).map(|(a, p)| coerce(a, p)).collect(),
            CallForm::Packed { fixed } => {
                let component = varargs_component(&self.method);
                let mut bound: Vec<Val> = args[..fixed].iter().zip(params).map(|(a, p)| coerce(a, p)).collect();
                bound.push(Val::list(args[fixed..].iter().map(|a| coerce(a, component))));
                bound
            }
            CallForm::Expanded { fixed } => {
                let component = varargs_component(&self.method);
                let mut bound: Vec<Val> = args[..fixed].iter().zip(params).map(|(a, p)| coerce(a, p)).collect();
                let spread = match &args[fixed] {
                    Val::List(items) => Val::list(items.iter().map(|a| coerce(a, component))),
                    other => other.clone(),
                };
                bound.push(spread);
                bound
            }
        };
        self.method
            .handle()
            .call(receiver, &bound)
            .map_err(|source| DispatchError::Invocation {
                method: self.method.to_string(),
                source,
            })
    }
}

fn varargs_component(method: &MethodDescriptor) -> &ClassRef {
    // builders always pair the varargs flag with a trailing array parameter
    let last = &method.params()[method.params().len() - 1];
    last.component().unwrap_or(last)
}

struct Candidate {
    method: Arc<MethodDescriptor>,
    form: CallForm,
    tier: MatchTier,
    /// Parameter class each argument binds to.
    effective: Vec<ClassRef>,
}

impl Candidate {
    fn key(&self) -> (bool, MatchTier) {
        (self.form.is_varargs(), self.tier)
    }

    fn at_least_as_specific(&self, other: &Candidate) -> bool {
        self.effective
            .iter()
            .zip(&other.effective)
            .all(|(a, b)| at_least_as_specific(a, b))
    }
}

impl MetaClass {
    /// Resolution against an explicit argument shape and category set.
    pub fn resolve_with(
        &self,
        static_only: bool,
        name: &str,
        args: &[ArgInfo],
        categories: &CategorySnapshot,
    ) -> Result<Resolved, DispatchError> {
        let methods = self.gather(name, static_only, categories);
        let mut depends_on_elements = false;
        let mut candidates: Vec<Candidate> = Vec::new();
        for method in methods {
            let (candidate, uses_elements) = applicability(method, args);
            depends_on_elements |= uses_elements;
            candidates.extend(candidate);
        }

        let Some(best_key) = candidates.iter().map(Candidate::key).min() else {
            tracing::debug!(target: "mop::meta", class = self.class.name(), method = name, "no applicable method");
            return Err(DispatchError::MethodNotFound {
                receiver: self.receiver_label(static_only),
                name: name.to_string(),
                arguments: describe_args(args),
            });
        };
        candidates.retain(|c| c.key() == best_key);

        let maximal: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| {
                !candidates
                    .iter()
                    .any(|o| !std::ptr::eq(*c, o) && o.at_least_as_specific(c) && !c.at_least_as_specific(o))
            })
            .collect();

        match maximal.as_slice() {
            [winner] => Ok(Resolved {
                method: winner.method.clone(),
                form: winner.form,
                cacheable: !depends_on_elements,
            }),
            _ => {
                let first = maximal.first().map(|c| c.method.to_string()).unwrap_or_default();
                let second = maximal.get(1).map(|c| c.method.to_string()).unwrap_or_default();
                Err(DispatchError::AmbiguousMethod {
                    receiver: self.receiver_label(static_only),
                    name: name.to_string(),
                    arguments: describe_args(args),
                    first,
                    second,
                })
            }
        }
    }

    fn receiver_label(&self, static_only: bool) -> String {
        if static_only {
            format!("static {}", self.class.name())
        } else {
            self.class.name().to_string()
        }
    }

    /// Candidate methods named `name`: nearest class layer first, nearest
    /// realm first within a layer, then categories innermost first.
    pub(super) fn gather(
        &self,
        name: &str,
        static_only: bool,
        categories: &CategorySnapshot,
    ) -> Vec<Arc<MethodDescriptor>> {
        let mut out: Vec<Arc<MethodDescriptor>> = Vec::new();
        for layer in &self.layers {
            let sets: Vec<_> = layer.registries.iter().map(|r| r.overloads(name)).collect();
            // masks hide lower realms for this class only
            let mut masked: Vec<&[ClassRef]> = Vec::new();
            for set in &sets {
                for slot in set.slots() {
                    let params = slot.params();
                    if masked.iter().any(|m| crate::method::same_params(m, params))
                        || out.iter().any(|m| m.same_params(params))
                    {
                        continue;
                    }
                    match slot {
                        Slot::Masked(_) => masked.push(params),
                        Slot::Method(m) => {
                            if !static_only || m.is_static() {
                                out.push(m.clone());
                            }
                        }
                    }
                }
            }
        }

        let receiver = self.class.dispatch_class();
        let mut from_categories: Vec<Arc<MethodDescriptor>> = Vec::new();
        for category in categories.innermost_first() {
            for m in category.methods_named(name) {
                if static_only && !m.is_static() {
                    continue;
                }
                if !receiver.is_subclass_of(m.owner()) {
                    continue;
                }
                if from_categories.iter().any(|c| c.same_params(m.params())) {
                    continue;
                }
                out.retain(|o| !o.same_params(m.params()));
                from_categories.push(m.clone());
            }
        }
        out.extend(from_categories);
        out
    }
}

/// Best binding form for `method` and whether it looked at list elements.
fn applicability(method: Arc<MethodDescriptor>, args: &[ArgInfo]) -> (Option<Candidate>, bool) {
    let params = method.params();

    if params.len() == args.len()
        && let Some(tier) = max_tier(args.iter().map(|a| &a.class).zip(params.iter()))
    {
        let effective = params.to_vec();
        return (
            Some(Candidate {
                method,
                form: CallForm::Direct,
                tier,
                effective,
            }),
            false,
        );
    }
    if !method.is_varargs() {
        return (None, false);
    }

    let fixed = params.len() - 1;
    let component = varargs_component(&method).clone();
    if args.len() < fixed {
        return (None, false);
    }

    let Some(fixed_tier) = max_tier(args[..fixed].iter().map(|a| &a.class).zip(params[..fixed].iter())) else {
        return (None, false);
    };

    let packed_tier = args[fixed..]
        .iter()
        .map(|a| conversion(&a.class, &component))
        .try_fold(fixed_tier, |acc, t| t.map(|t| acc.max(t)));
    if let Some(tier) = packed_tier {
        let mut effective = params[..fixed].to_vec();
        effective.extend(std::iter::repeat_n(component, args.len() - fixed));
        return (
            Some(Candidate {
                method,
                form: CallForm::Packed { fixed },
                tier,
                effective,
            }),
            false,
        );
    }

    if args.len() == fixed + 1
        && let Some(elements) = &args[fixed].elements
    {
        let spread_tier = elements
            .iter()
            .map(|e| conversion(e, &component))
            .try_fold(fixed_tier.max(MatchTier::Coercion), |acc, t| t.map(|t| acc.max(t)));
        if let Some(tier) = spread_tier {
            let mut effective = params[..fixed].to_vec();
            effective.push(component);
            return (
                Some(Candidate {
                    method,
                    form: CallForm::Expanded { fixed },
                    tier,
                    effective,
                }),
                true,
            );
        }
        return (None, true);
    }
    (None, false)
}

fn max_tier<'a>(pairs: impl Iterator<Item = (&'a ClassRef, &'a ClassRef)>) -> Option<MatchTier> {
    pairs
        .map(|(arg, param)| conversion(arg, param))
        .try_fold(MatchTier::Exact, |acc, t| t.map(|t| acc.max(t)))
}

fn describe_args(args: &[ArgInfo]) -> String {
    args.iter().map(|a| a.class.name()).collect::<Vec<_>>().join(", ")
}
