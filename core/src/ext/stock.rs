use anyhow::{Result, anyhow};

use super::provider::{ExtensionCatalog, FnProvider, MethodSpec};
use crate::val::Val;

/// Largest string `multiply` builds.
const MAX_REPEAT_BYTES: usize = 1 << 26;

fn receiver_str(receiver: &Val) -> Result<&str> {
    receiver
        .as_str()
        .ok_or_else(|| anyhow!("expected a String receiver, got {}", receiver.type_name()))
}

fn arg_i64(args: &[Val], index: usize) -> Result<i64> {
    args.get(index)
        .and_then(Val::as_i64)
        .ok_or_else(|| anyhow!("argument {index} must be a number"))
}

fn string_extensions() -> FnProvider {
    FnProvider::new("mop.ext.StringExtensions")
        .helper(
            MethodSpec::new("String", "shout", |recv, _| Ok(Val::from(format!("{}!", receiver_str(recv)?.to_uppercase()))))
                .returns("String"),
        )
        .helper(
            MethodSpec::new("String", "reverse", |recv, _| {
                Ok(Val::from(receiver_str(recv)?.chars().rev().collect::<String>()))
            })
            .returns("String"),
        )
        .helper(
            MethodSpec::new("String", "words", |recv, _| {
                Ok(Val::list(receiver_str(recv)?.split_whitespace().map(Val::from)))
            })
            .returns("List"),
        )
        .helper(
            MethodSpec::new("String", "multiply", |recv, args| {
                let text = receiver_str(recv)?;
                let count = usize::try_from(arg_i64(args, 0)?.max(0))?;
                text.len()
                    .checked_mul(count)
                    .filter(|len| *len <= MAX_REPEAT_BYTES)
                    .ok_or_else(|| anyhow!("multiply({count}) would exceed {MAX_REPEAT_BYTES} bytes"))?;
                Ok(Val::from(text.repeat(count)))
            })
            .param("int")
            .returns("String"),
        )
}

fn number_extensions() -> FnProvider {
    FnProvider::new("mop.ext.NumberExtensions")
        .helper(
            MethodSpec::new("Number", "abs", |recv, _| {
                Ok(match recv {
                    Val::Int(i) => Val::Int(i.wrapping_abs()),
                    Val::Long(l) => Val::Long(l.wrapping_abs()),
                    Val::Float(f) => Val::Float(f.abs()),
                    Val::Double(d) => Val::Double(d.abs()),
                    other => return Err(anyhow!("abs() on {}", other.type_name())),
                })
            })
            .returns("Number"),
        )
        .helper(
            MethodSpec::new("Integer", "squared", |recv, _| match recv {
                Val::Int(i) => Ok(Val::Int(i.wrapping_mul(*i))),
                other => Err(anyhow!("squared() on {}", other.type_name())),
            })
            .returns("int"),
        )
}

fn list_statics() -> FnProvider {
    FnProvider::new("mop.ext.ListStatics")
        .helper(
            MethodSpec::new("List", "of", |_, args| Ok(args.first().cloned().unwrap_or_else(|| Val::list([]))))
                .varargs("Object")
                .returns("List"),
        )
        .helper(
            MethodSpec::new("List", "range", |_, args| {
                let (from, to) = (arg_i64(args, 0)?, arg_i64(args, 1)?);
                Ok(Val::list((from..to).map(Val::Long)))
            })
            .param("long")
            .param("long")
            .returns("List"),
        )
}

/// Catalog with the providers bundled with the runtime.
pub fn stock_catalog() -> ExtensionCatalog {
    let mut catalog = ExtensionCatalog::new();
    catalog
        .register_provider(string_extensions())
        .register_provider(number_extensions())
        .register_provider(list_statics());
    catalog
}
