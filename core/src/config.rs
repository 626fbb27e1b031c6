//! Runtime tuning knobs, loadable from TOML, YAML or JSON.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Hard ceiling for polymorphic call-site entries.
pub const MAX_POLYMORPHIC_LIMIT: usize = 8;

pub const DEFAULT_DESCRIPTOR_PATH: &str = "META-INF/services/mop.ExtensionModule";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Format> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            "toml" => Some(Format::Toml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    pub callsite: CallSiteConfig,
    pub cache: CacheConfig,
    pub extensions: ExtensionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallSiteConfig {
    /// Receiver shapes a call site tracks before going megamorphic.
    pub polymorphic_limit: usize,
}

impl Default for CallSiteConfig {
    fn default() -> Self {
        Self { polymorphic_limit: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub sweep_interval_ms: u64,
    /// Sweeps a meta class may stay unused before it is evicted.
    pub idle_sweeps: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1000,
            idle_sweeps: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtensionConfig {
    pub search_paths: Vec<PathBuf>,
    pub descriptor_path: String,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            descriptor_path: DEFAULT_DESCRIPTOR_PATH.to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = Format::from_path(path)
            .with_context(|| format!("{}: unsupported config extension (use .toml, .yaml or .json)", path.display()))?;
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text, format).with_context(|| format!("loading {}", path.display()))
    }

    pub fn parse(input: &str, format: Format) -> Result<Self> {
        let config: DispatchConfig = match format {
            Format::Json => serde_json::from_str(input)?,
            Format::Yaml => {
                if input.trim().is_empty() {
                    DispatchConfig::default()
                } else {
                    serde_yaml::from_str(input)?
                }
            }
            Format::Toml => toml::from_str(input)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let limit = self.callsite.polymorphic_limit;
        if !(1..=MAX_POLYMORPHIC_LIMIT).contains(&limit) {
            bail!("callsite.polymorphic_limit must be within 1..={MAX_POLYMORPHIC_LIMIT}, got {limit}");
        }
        if self.cache.sweep_interval_ms == 0 {
            bail!("cache.sweep_interval_ms must be positive");
        }
        if self.cache.idle_sweeps == 0 {
            bail!("cache.idle_sweeps must be positive");
        }
        if self.extensions.descriptor_path.trim().is_empty() {
            bail!("extensions.descriptor_path must not be empty");
        }
        Ok(())
    }
}
