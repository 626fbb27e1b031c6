use crate::error::ModuleError;

pub const KEY_NAME: &str = "moduleName";
pub const KEY_VERSION: &str = "moduleVersion";
pub const KEY_INSTANCE: &str = "extensionClasses";
pub const KEY_STATIC: &str = "staticExtensionClasses";
pub const KEY_FACTORY: &str = "moduleFactory";

/// Parsed extension module descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: String,
    pub version: String,
    pub factory: Option<String>,
    /// Providers whose helpers become instance methods of their first parameter's type.
    pub instance_classes: Vec<String>,
    /// Providers whose helpers become static methods of their target type.
    pub static_classes: Vec<String>,
    /// File or label the descriptor came from.
    pub origin: String,
}

impl ModuleDescriptor {
    pub fn parse(text: &str, origin: &str) -> Result<Self, ModuleError> {
        let entries = parse_properties(text, origin)?;
        let get = |key: &str| {
            entries
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| {
            get(key).ok_or_else(|| ModuleError::MissingKey {
                origin: origin.to_string(),
                key,
            })
        };
        Ok(Self {
            name: require(KEY_NAME)?,
            version: require(KEY_VERSION)?,
            factory: get(KEY_FACTORY),
            instance_classes: split_list(get(KEY_INSTANCE).as_deref()),
            static_classes: split_list(get(KEY_STATIC).as_deref()),
            origin: origin.to_string(),
        })
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `key=value` / `key: value` lines with `#` and `!` comments and trailing
/// backslash continuations. Later keys win.
pub fn parse_properties(text: &str, origin: &str) -> Result<Vec<(String, String)>, ModuleError> {
    let mut entries = Vec::new();
    let mut lines = text.lines().enumerate();
    while let Some((index, raw)) = lines.next() {
        let line_no = index + 1;
        let trimmed = raw.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        let mut logical = trimmed.to_string();
        while logical.ends_with('\\') {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let Some(split) = logical.find(['=', ':']) else {
            return Err(ModuleError::Malformed {
                origin: origin.to_string(),
                line: line_no,
                text: raw.trim().to_string(),
            });
        };
        let key = logical[..split].trim();
        if key.is_empty() {
            return Err(ModuleError::Malformed {
                origin: origin.to_string(),
                line: line_no,
                text: raw.trim().to_string(),
            });
        }
        entries.push((key.to_string(), logical[split + 1..].trim().to_string()));
    }
    Ok(entries)
}
