//! Default methods every runtime starts with.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use rustc_hash::FxHasher;

use crate::method::MethodDescriptor;
use crate::rt::Shared;
use crate::typ::{ClassRef, Prim, builtins};
use crate::val::Val;

type Body = fn(&Val, &[Val]) -> Result<Val>;

fn def(shared: &Shared, owner: &ClassRef, name: &str, params: &[&ClassRef], returns: &ClassRef, body: Body) {
    let method = MethodDescriptor::builder(owner, name)
        .params(params.iter().copied())
        .returns(returns)
        .build(body);
    if let Err(err) = shared.base_registry(owner).register(method) {
        tracing::error!(target: "mop::meta", error = %err, "builtin method rejected");
    }
}

pub(crate) fn install(shared: &Shared) {
    install_object(shared);
    install_numbers(shared);
    install_strings(shared);
    install_collections(shared);
}

fn arg(args: &[Val], index: usize) -> Result<&Val> {
    args.get(index).ok_or_else(|| anyhow!("missing argument {index}"))
}

fn install_object(shared: &Shared) {
    let b = builtins();
    def(shared, &b.object, "toString", &[], &b.string, |recv, _| Ok(Val::from(recv.to_string())));
    def(shared, &b.object, "equals", &[&b.object], &b.boolean, |recv, args| {
        Ok(Val::Bool(recv.loose_eq(arg(args, 0)?)))
    });
    def(shared, &b.object, "is", &[&b.object], &b.boolean, |recv, args| Ok(Val::Bool(recv == arg(args, 0)?)));
    def(shared, &b.object, "getClass", &[], &b.class, |recv, _| Ok(Val::Class(recv.class())));
    def(shared, &b.object, "hashCode", &[], &b.int, |recv, _| {
        let mut hasher = FxHasher::default();
        match recv {
            Val::Object(obj) => (Arc::as_ptr(obj) as *const () as usize).hash(&mut hasher),
            other => other.to_string().hash(&mut hasher),
        }
        Ok(Val::Int(hasher.finish() as i32))
    });

    def(shared, &b.null, "toString", &[], &b.string, |_, _| Ok(Val::str("null")));
    def(shared, &b.null, "equals", &[&b.object], &b.boolean, |_, args| Ok(Val::Bool(arg(args, 0)?.is_nil())));

    def(shared, &b.class, "getName", &[], &b.string, |recv, _| match recv {
        Val::Class(class) => Ok(Val::str(class.name())),
        other => bail!("getName() on {}", other.type_name()),
    });
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

fn prim_of(value: &Val) -> Option<Prim> {
    match value {
        Val::Int(_) => Some(Prim::Int),
        Val::Long(_) => Some(Prim::Long),
        Val::Float(_) => Some(Prim::Float),
        Val::Double(_) => Some(Prim::Double),
        _ => None,
    }
}

fn promoted(a: &Val, b: &Val) -> Result<Prim> {
    prim_of(a)
        .zip(prim_of(b))
        .and_then(|(x, y)| x.promote(y))
        .ok_or_else(|| anyhow!("{} and {} are not both numbers", a.type_name(), b.type_name()))
}

fn integral(op: Arith, x: i64, y: i64) -> Result<i64> {
    Ok(match op {
        Arith::Add => x.wrapping_add(y),
        Arith::Sub => x.wrapping_sub(y),
        Arith::Mul => x.wrapping_mul(y),
        Arith::Div => x.checked_div(y).ok_or_else(|| anyhow!("division by zero"))?,
        Arith::Mod => x.checked_rem(y).ok_or_else(|| anyhow!("division by zero"))?,
    })
}

fn floating(op: Arith, x: f64, y: f64) -> f64 {
    match op {
        Arith::Add => x + y,
        Arith::Sub => x - y,
        Arith::Mul => x * y,
        Arith::Div => x / y,
        Arith::Mod => x % y,
    }
}

fn arith(op: Arith, a: &Val, b: &Val) -> Result<Val> {
    let kind = promoted(a, b)?;
    let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
    let (i, j) = (a.as_i64().unwrap_or_default(), b.as_i64().unwrap_or_default());
    Ok(match kind {
        Prim::Int => Val::Int(integral(op, i, j)? as i32),
        Prim::Long => Val::Long(integral(op, i, j)?),
        Prim::Float => Val::Float(floating(op, x, y) as f32),
        _ => Val::Double(floating(op, x, y)),
    })
}

fn compare(a: &Val, b: &Val) -> Result<Val> {
    let ordering = match promoted(a, b)? {
        Prim::Int | Prim::Long => a.as_i64().cmp(&b.as_i64()),
        _ => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .ok_or_else(|| anyhow!("cannot compare NaN"))?,
    };
    Ok(Val::Int(match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }))
}

fn power(a: &Val, b: &Val) -> Result<Val> {
    if let (Some(Prim::Int | Prim::Long), Some(Prim::Int | Prim::Long)) = (prim_of(a), prim_of(b))
        && let (Some(base), Some(exp)) = (a.as_i64(), b.as_i64())
        && let Ok(exp) = u32::try_from(exp)
        && let Some(value) = base.checked_pow(exp)
    {
        return Ok(Val::Long(value));
    }
    promoted(a, b)?;
    Ok(Val::Double(
        a.as_f64().unwrap_or_default().powf(b.as_f64().unwrap_or_default()),
    ))
}

fn bits(op: fn(i64, i64) -> i64, a: &Val, b: &Val) -> Result<Val> {
    let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) else {
        bail!("bitwise operation on {} and {}", a.type_name(), b.type_name());
    };
    Ok(match promoted(a, b)? {
        Prim::Int => Val::Int(op(x, y) as i32),
        Prim::Long => Val::Long(op(x, y)),
        _ => bail!("bitwise operation on {} and {}", a.type_name(), b.type_name()),
    })
}

fn unary(recv: &Val, int: fn(i32) -> i32, long: fn(i64) -> i64, float: fn(f64) -> f64) -> Result<Val> {
    Ok(match recv {
        Val::Int(i) => Val::Int(int(*i)),
        Val::Long(l) => Val::Long(long(*l)),
        Val::Float(f) => Val::Float(float(*f as f64) as f32),
        Val::Double(d) => Val::Double(float(*d)),
        other => bail!("{} is not a number", other.type_name()),
    })
}

fn install_numbers(shared: &Shared) {
    let b = builtins();
    let number = &b.number;

    // promoting operations on any pair of numbers
    def(shared, number, "plus", &[number], number, |r, a| arith(Arith::Add, r, arg(a, 0)?));
    def(shared, number, "minus", &[number], number, |r, a| arith(Arith::Sub, r, arg(a, 0)?));
    def(shared, number, "multiply", &[number], number, |r, a| arith(Arith::Mul, r, arg(a, 0)?));
    def(shared, number, "div", &[number], number, |r, a| arith(Arith::Div, r, arg(a, 0)?));
    def(shared, number, "mod", &[number], number, |r, a| arith(Arith::Mod, r, arg(a, 0)?));
    def(shared, number, "power", &[number], number, |r, a| power(r, arg(a, 0)?));
    def(shared, number, "compareTo", &[number], &b.int, |r, a| compare(r, arg(a, 0)?));
    def(shared, number, "negative", &[], number, |r, _| {
        unary(r, i32::wrapping_neg, i64::wrapping_neg, |x| -x)
    });
    def(shared, number, "positive", &[], number, |r, _| Ok(r.clone()));
    def(shared, number, "next", &[], number, |r, _| {
        unary(r, |x| x.wrapping_add(1), |x| x.wrapping_add(1), |x| x + 1.0)
    });
    def(shared, number, "previous", &[], number, |r, _| {
        unary(r, |x| x.wrapping_sub(1), |x| x.wrapping_sub(1), |x| x - 1.0)
    });
    def(shared, number, "intValue", &[], &b.int, |r, _| Ok(crate::val::coerce(r, &builtins().int)));
    def(shared, number, "longValue", &[], &b.long, |r, _| Ok(crate::val::coerce(r, &builtins().long)));
    def(shared, number, "floatValue", &[], &b.float, |r, _| Ok(crate::val::coerce(r, &builtins().float)));
    def(shared, number, "doubleValue", &[], &b.double, |r, _| Ok(crate::val::coerce(r, &builtins().double)));

    // exact same-kind operations
    for boxed in [&b.integer, &b.long_box, &b.float_box, &b.double_box] {
        def(shared, boxed, "plus", &[boxed], boxed, |r, a| arith(Arith::Add, r, arg(a, 0)?));
        def(shared, boxed, "minus", &[boxed], boxed, |r, a| arith(Arith::Sub, r, arg(a, 0)?));
        def(shared, boxed, "multiply", &[boxed], boxed, |r, a| arith(Arith::Mul, r, arg(a, 0)?));
        def(shared, boxed, "compareTo", &[boxed], &b.int, |r, a| compare(r, arg(a, 0)?));
    }
    for boxed in [&b.integer, &b.long_box] {
        def(shared, boxed, "and", &[boxed], boxed, |r, a| bits(|x, y| x & y, r, arg(a, 0)?));
        def(shared, boxed, "or", &[boxed], boxed, |r, a| bits(|x, y| x | y, r, arg(a, 0)?));
        def(shared, boxed, "xor", &[boxed], boxed, |r, a| bits(|x, y| x ^ y, r, arg(a, 0)?));
        def(shared, boxed, "leftShift", &[&b.int], boxed, |r, a| {
            let shift = arg(a, 0)?.as_i64().unwrap_or_default();
            match r {
                Val::Int(i) => Ok(Val::Int(i.wrapping_shl(shift as u32))),
                Val::Long(l) => Ok(Val::Long(l.wrapping_shl(shift as u32))),
                other => bail!("leftShift on {}", other.type_name()),
            }
        });
        def(shared, boxed, "rightShift", &[&b.int], boxed, |r, a| {
            let shift = arg(a, 0)?.as_i64().unwrap_or_default();
            match r {
                Val::Int(i) => Ok(Val::Int(i.wrapping_shr(shift as u32))),
                Val::Long(l) => Ok(Val::Long(l.wrapping_shr(shift as u32))),
                other => bail!("rightShift on {}", other.type_name()),
            }
        });
        def(shared, boxed, "bitwiseNegate", &[], boxed, |r, _| unary(r, |x| !x, |x| !x, |x| x));
    }

    let boolean = &b.boolean_box;
    let logic: [(&'static str, fn(bool, bool) -> bool); 3] = [
        ("and", |x, y| x && y),
        ("or", |x, y| x || y),
        ("xor", |x, y| x ^ y),
    ];
    for (name, op) in logic {
        let method = MethodDescriptor::builder(boolean, name)
            .param(boolean)
            .returns(&b.boolean)
            .build(move |r, a| match (r, arg(a, 0)?) {
                (Val::Bool(x), Val::Bool(y)) => Ok(Val::Bool(op(*x, *y))),
                (x, y) => bail!("{} on {} and {}", name, x.type_name(), y.type_name()),
            });
        if let Err(err) = shared.base_registry(boolean).register(method) {
            tracing::error!(target: "mop::meta", error = %err, "builtin method rejected");
        }
    }
}

fn receiver_str(recv: &Val) -> Result<&str> {
    recv.as_str()
        .ok_or_else(|| anyhow!("expected String receiver, got {}", recv.type_name()))
}

fn char_count(s: &str) -> i32 {
    s.chars().count() as i32
}

/// Resolves a possibly negative index against `len`.
fn index(len: usize, raw: &Val) -> Result<usize> {
    let raw = raw.as_i64().ok_or_else(|| anyhow!("index must be a number"))?;
    let len = len as i64;
    let at = if raw < 0 { len + raw } else { raw };
    if at < 0 || at >= len {
        bail!("index {raw} out of range for length {len}");
    }
    Ok(at as usize)
}

fn install_strings(shared: &Shared) {
    let b = builtins();
    let string = &b.string;
    def(shared, string, "plus", &[&b.object], string, |r, a| {
        Ok(Val::from(format!("{}{}", receiver_str(r)?, arg(a, 0)?)))
    });
    def(shared, string, "size", &[], &b.int, |r, _| Ok(Val::Int(char_count(receiver_str(r)?))));
    def(shared, string, "length", &[], &b.int, |r, _| Ok(Val::Int(char_count(receiver_str(r)?))));
    def(shared, string, "toUpperCase", &[], string, |r, _| Ok(Val::from(receiver_str(r)?.to_uppercase())));
    def(shared, string, "toLowerCase", &[], string, |r, _| Ok(Val::from(receiver_str(r)?.to_lowercase())));
    def(shared, string, "isEmpty", &[], &b.boolean, |r, _| Ok(Val::Bool(receiver_str(r)?.is_empty())));
    def(shared, string, "getAt", &[&b.int], string, |r, a| {
        let s = receiver_str(r)?;
        let at = index(s.chars().count(), arg(a, 0)?)?;
        Ok(Val::from(s.chars().nth(at).map(String::from).unwrap_or_default()))
    });
    def(shared, string, "compareTo", &[string], &b.int, |r, a| {
        let other = receiver_str(arg(a, 0)?)?;
        Ok(Val::Int(match receiver_str(r)?.cmp(other) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }))
    });
}

fn receiver_list(recv: &Val) -> Result<&Arc<[Val]>> {
    match recv {
        Val::List(items) => Ok(items),
        other => bail!("expected a List receiver, got {}", other.type_name()),
    }
}

fn install_collections(shared: &Shared) {
    let b = builtins();
    let (collection, list) = (&b.collection, &b.list);
    def(shared, collection, "size", &[], &b.int, |r, _| Ok(Val::Int(receiver_list(r)?.len() as i32)));
    def(shared, collection, "isEmpty", &[], &b.boolean, |r, _| Ok(Val::Bool(receiver_list(r)?.is_empty())));
    def(shared, collection, "contains", &[&b.object], &b.boolean, |r, a| {
        let needle = arg(a, 0)?;
        Ok(Val::Bool(receiver_list(r)?.iter().any(|v| v.loose_eq(needle))))
    });
    def(shared, list, "getAt", &[&b.int], &b.object, |r, a| {
        let items = receiver_list(r)?;
        Ok(items[index(items.len(), arg(a, 0)?)?].clone())
    });
    def(shared, list, "plus", &[&b.object], list, |r, a| {
        let items = receiver_list(r)?;
        Ok(Val::list(items.iter().cloned().chain(std::iter::once(arg(a, 0)?.clone()))))
    });
    def(shared, list, "plus", &[collection], list, |r, a| {
        let items = receiver_list(r)?;
        let more = receiver_list(arg(a, 0)?)?;
        Ok(Val::list(items.iter().chain(more.iter()).cloned()))
    });
}
