use std::path::{Component, Path, PathBuf};
use std::sync::Once;

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "mop::callsite=debug,mop::plan=debug,mop::ext=info,mop::realm=info,mop_cli=info";

use anyhow::Context;
use clap::{Parser, Subcommand};
use mop_core::ext::{ScanReport, stock_catalog};
use mop_core::plan::Receiver;
use mop_core::{
    CallShape, ClassBuilder, ClassRef, DispatchConfig, MethodDescriptor, Runtime, StaticType, Val, builtins,
};
use serde::Serialize;


#[derive(Debug, Parser)]
#[command(name = "mop", author, version, about = "Inspect dynamic method dispatch", long_about = None)]
struct CliArgs {
    /// Dispatch configuration (.toml, .yaml or .json)
    #[arg(long, global = true, value_name = "FILE", value_parser = parse_sanitized_path)]
    config: Option<PathBuf>,

    /// Extension module roots loaded before the command runs
    #[arg(long = "ext", global = true, value_name = "DIR", value_parser = parse_sanitized_path)]
    extensions: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the methods a class responds to.
    Methods {
        #[arg(value_name = "CLASS")]
        class: String,
        /// Print JSON instead of one signature per line
        #[arg(long)]
        json: bool,
    },
    /// Show whether a call would be bound directly or through a call site.
    ///
    /// Argument types are class names (`Integer`), `Name!` for an exact
    /// class, `null` for the null literal and `?` for an untyped value.
    Resolve {
        #[arg(value_name = "CLASS")]
        class: String,
        #[arg(value_name = "METHOD")]
        method: String,
        #[arg(value_name = "ARG_TYPES")]
        args: Vec<String>,
        /// Treat the receiver as the class itself (`Type.method()`)
        #[arg(long = "static")]
        on_class: bool,
    },
    /// Load extension modules from directories or descriptor files.
    Scan {
        #[arg(value_name = "DIR", required = true, value_parser = parse_sanitized_path)]
        roots: Vec<PathBuf>,
    },
    /// Drive one call site with several receiver classes and print its state.
    Profile {
        /// Number of distinct receiver classes
        #[arg(long, default_value_t = 1)]
        types: usize,
        /// Number of calls, spread round-robin over the classes
        #[arg(long, default_value_t = 100)]
        calls: usize,
        #[arg(long)]
        json: bool,
    },
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let raw = match std::env::var("MOP_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn build_runtime(config: Option<&Path>) -> anyhow::Result<Runtime> {
    let config = match config {
        Some(path) => DispatchConfig::from_path(path)?,
        None => DispatchConfig::default(),
    };
    Runtime::with_config(config)
}

fn report_scan(report: &ScanReport) {
    for module in &report.loaded {
        println!(
            "loaded {} {} ({} methods) from {}",
            module.name, module.version, module.methods, module.origin
        );
    }
    for name in &report.skipped {
        println!("skipped {name} (already loaded)");
    }
    if report.shadowed > 0 {
        println!("{} helper(s) shadowed by existing methods", report.shadowed);
    }
    for (origin, err) in &report.failed {
        eprintln!("Error: {origin}: {err}");
    }
}

/// Loads configured and `--ext` modules; a failure here aborts the command.
fn load_startup_extensions(rt: &Runtime, roots: &[PathBuf]) -> anyhow::Result<()> {
    let catalog = stock_catalog();
    let mut report = rt.load_configured_extensions(&catalog);
    let extra = rt.load_extensions(&catalog, roots);
    report.loaded.extend(extra.loaded);
    report.failed.extend(extra.failed);
    if let Some((origin, err)) = report.failed.first() {
        anyhow::bail!("failed to load extension module {origin}: {err}");
    }
    tracing::info!(loaded = report.loaded.len(), "extension modules ready");
    Ok(())
}

#[derive(Debug, Serialize)]
struct MethodRow {
    name: String,
    signature: String,
    owner: String,
    returns: String,
    #[serde(rename = "static")]
    is_static: bool,
    visibility: String,
    origin: String,
}

impl From<&MethodDescriptor> for MethodRow {
    fn from(method: &MethodDescriptor) -> Self {
        Self {
            name: method.name().to_string(),
            signature: method.signature(),
            owner: method.owner().name().to_string(),
            returns: method.return_type().name().to_string(),
            is_static: method.is_static(),
            visibility: format!("{:?}", method.visibility()).to_ascii_lowercase(),
            origin: method.origin().label(),
        }
    }
}

fn list_methods(rt: &Runtime, class: &str, json: bool) -> anyhow::Result<()> {
    let class = rt.class(class)?;
    let methods = rt.root().meta_class(&class).methods();
    if json {
        let rows: Vec<MethodRow> = methods.iter().map(|m| MethodRow::from(&**m)).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for method in &methods {
        println!("{}  [{}]", method.describe(), method.origin().label());
    }
    Ok(())
}

/// `?` untyped, `null`, `Name!` exact, otherwise declared.
pub(crate) fn parse_static_type(rt: &Runtime, raw: &str) -> anyhow::Result<StaticType> {
    let raw = raw.trim();
    Ok(match raw {
        "?" => StaticType::Dynamic,
        "null" => StaticType::Null,
        _ => match raw.strip_suffix('!') {
            Some(name) => StaticType::Exact(rt.class(name)?),
            None => StaticType::Declared(rt.class(raw)?),
        },
    })
}

pub(crate) fn build_shape(rt: &Runtime, class: &str, method: &str, args: &[String], on_class: bool) -> anyhow::Result<CallShape> {
    let receiver = parse_static_type(rt, class)?;
    let mut shape = if on_class {
        match &receiver {
            StaticType::Exact(c) | StaticType::Declared(c) => CallShape::on_class(c, method),
            _ => anyhow::bail!("--static needs a class receiver, got '{class}'"),
        }
    } else {
        CallShape::on(receiver, method)
    };
    for raw in args {
        shape = shape.arg(parse_static_type(rt, raw)?);
    }
    Ok(shape)
}

fn resolve_call(rt: &Runtime, class: &str, method: &str, args: &[String], on_class: bool) -> anyhow::Result<()> {
    let shape = build_shape(rt, class, method, args, on_class)?;
    let mut planner = rt.planner(rt.root());
    let plan = planner.plan(&shape);
    let receiver = match &shape.receiver {
        Receiver::Class(c) => format!("class {}", c.name()),
        Receiver::Value(_) => class.to_string(),
    };
    println!("{receiver}.{method}: {plan}");
    Ok(())
}

fn scan_roots(rt: &Runtime, roots: &[PathBuf]) -> anyhow::Result<()> {
    let report = rt.load_extensions(&stock_catalog(), roots);
    report_scan(&report);
    if !report.is_clean() {
        anyhow::bail!("{} module(s) failed to load", report.failed.len());
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ProfileReport {
    types: usize,
    calls: usize,
    kind: mop_core::SiteKind,
    entries: usize,
    stats: mop_core::CallSiteStats,
}

/// `types` subclasses of one base class that declares `touch()`.
fn profile_receivers(rt: &Runtime, types: usize) -> anyhow::Result<Vec<Val>> {
    let base = rt.define_class(ClassBuilder::new("ProfileBase"))?;
    rt.register_method(
        MethodDescriptor::builder(&base, "touch")
            .returns(&builtins().int)
            .build(|_, _| Ok(Val::Int(1))),
    )?;
    (0..types)
        .map(|i| -> anyhow::Result<Val> {
            let class: ClassRef = rt.define_class(ClassBuilder::new(format!("Profile{i}")).extends(&base))?;
            Ok(Val::object(&class))
        })
        .collect()
}

fn profile(rt: &Runtime, types: usize, calls: usize, json: bool) -> anyhow::Result<()> {
    if types == 0 {
        anyhow::bail!("--types must be at least 1");
    }
    let receivers = profile_receivers(rt, types)?;
    let mut sites = rt.call_sites(rt.root());
    let index = sites.allocate("touch");
    for i in 0..calls {
        sites
            .call(index, &receivers[i % receivers.len()], &[])
            .with_context(|| format!("call {i}"))?;
    }
    let site = sites
        .get(index)
        .ok_or_else(|| anyhow::anyhow!("call site {index} missing"))?;
    let report = ProfileReport {
        types,
        calls,
        kind: site.kind(),
        entries: site.entries(),
        stats: site.stats(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let s = report.stats;
        println!("kind: {:?}", report.kind);
        println!("entries: {}", report.entries);
        println!(
            "hits: {} misses: {} resolutions: {} invalidations: {}",
            s.hits, s.misses, s.resolutions, s.invalidations
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    maybe_init_tracing();

    let CliArgs {
        config,
        extensions,
        command,
    } = CliArgs::parse();

    let rt = build_runtime(config.as_deref())?;
    load_startup_extensions(&rt, &extensions)?;

    match command {
        Commands::Methods { class, json } => list_methods(&rt, &class, json),
        Commands::Resolve {
            class,
            method,
            args,
            on_class,
        } => resolve_call(&rt, &class, &method, &args, on_class),
        Commands::Scan { roots } => scan_roots(&rt, &roots),
        Commands::Profile { types, calls, json } => profile(&rt, types, calls, json),
    }
}
