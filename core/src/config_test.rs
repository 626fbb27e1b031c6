use crate::config::{DEFAULT_DESCRIPTOR_PATH, DispatchConfig, Format};
use anyhow::Result;
use std::io::Write;

#[test]
fn test_defaults() {
    let config = DispatchConfig::default();
    assert_eq!(config.callsite.polymorphic_limit, 4);
    assert_eq!(config.cache.sweep_interval_ms, 1000);
    assert_eq!(config.cache.idle_sweeps, 8);
    assert_eq!(config.extensions.descriptor_path, DEFAULT_DESCRIPTOR_PATH);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_toml_keeps_defaults() -> Result<()> {
    let config = DispatchConfig::parse("[callsite]\npolymorphic_limit = 2\n", Format::Toml)?;
    assert_eq!(config.callsite.polymorphic_limit, 2);
    assert_eq!(config.cache.idle_sweeps, 8);
    Ok(())
}

#[test]
fn test_yaml_and_json() -> Result<()> {
    let yaml = DispatchConfig::parse("cache:\n  sweep_interval_ms: 50\n", Format::Yaml)?;
    assert_eq!(yaml.cache.sweep_interval_ms, 50);
    let json = DispatchConfig::parse(r#"{"extensions": {"search_paths": ["a", "b"]}}"#, Format::Json)?;
    assert_eq!(json.extensions.search_paths.len(), 2);
    assert_eq!(DispatchConfig::parse("", Format::Yaml)?, DispatchConfig::default());
    Ok(())
}

#[test]
fn test_rejects_out_of_range_limit() {
    let err = DispatchConfig::parse("[callsite]\npolymorphic_limit = 9\n", Format::Toml).unwrap_err();
    assert!(err.to_string().contains("callsite.polymorphic_limit"), "{err}");
    assert!(DispatchConfig::parse("[callsite]\npolymorphic_limit = 0\n", Format::Toml).is_err());
}

#[test]
fn test_rejects_unknown_keys() {
    assert!(DispatchConfig::parse("[callsite]\nlimit = 3\n", Format::Toml).is_err());
}

#[test]
fn test_from_path_uses_extension() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("mop.yml");
    let mut file = std::fs::File::create(&path)?;
    writeln!(file, "callsite:\n  polymorphic_limit: 8")?;
    let config = DispatchConfig::from_path(&path)?;
    assert_eq!(config.callsite.polymorphic_limit, 8);

    let bad = dir.path().join("mop.ini");
    std::fs::write(&bad, "x=1")?;
    assert!(DispatchConfig::from_path(&bad).is_err());
    Ok(())
}
