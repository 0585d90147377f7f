//! Section parsing and binding.
//!
//! A document is decoded into a `serde_json::Value` tree, a section is
//! selected from it, and the section is laid over the serialized default of
//! the target type before deserializing. Every field the document omits
//! therefore keeps the type's declared default.

use crate::error::{ConfigError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

/// Separator between segments of a nested section path.
pub const SECTION_SEPARATOR: char = ':';

/// Encoding of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON (`.json`)
    Json,
    /// YAML (`.yaml`, `.yml`)
    #[cfg(feature = "yaml")]
    Yaml,
    /// TOML (`.toml`)
    #[cfg(feature = "toml")]
    Toml,
}

impl Format {
    /// Detect the format from a file extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::SetupError` if the extension is missing or names
    /// a format whose feature is not enabled.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                ConfigError::SetupError(format!(
                    "Unable to determine file format for: {}",
                    path.display()
                ))
            })?;

        match extension.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Ok(Self::Yaml),
            #[cfg(feature = "toml")]
            "toml" => Ok(Self::Toml),
            other => Err(ConfigError::SetupError(format!(
                "Unsupported file extension: {}. Supported: {}",
                other,
                Self::supported_extensions()
            ))),
        }
    }

    fn supported_extensions() -> &'static str {
        match (cfg!(feature = "yaml"), cfg!(feature = "toml")) {
            (true, true) => ".json, .yaml, .yml, .toml",
            (true, false) => ".json, .yaml, .yml",
            (false, true) => ".json, .toml",
            (false, false) => ".json",
        }
    }

    /// Decode raw bytes into a document tree.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` for invalid UTF-8 or invalid syntax.
    pub fn parse_document(&self, raw: &[u8]) -> Result<Value> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| ConfigError::ParseError(format!("Document is not valid UTF-8: {}", e)))?;

        match self {
            Self::Json => serde_json::from_str(text)
                .map_err(|e| ConfigError::ParseError(format!("Invalid JSON: {}", e))),
            #[cfg(feature = "yaml")]
            Self::Yaml => serde_yaml::from_str(text)
                .map_err(|e| ConfigError::ParseError(format!("Invalid YAML: {}", e))),
            #[cfg(feature = "toml")]
            Self::Toml => toml::from_str(text)
                .map_err(|e| ConfigError::ParseError(format!("Invalid TOML: {}", e))),
        }
    }
}

/// Which part of the document an options type is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// A named subtree, e.g. `"MyOptions"` or `"Outer:Inner"`.
    Section(String),
    /// The whole document.
    Root,
}

impl Binding {
    /// Bind to the section at `path`. Segments are separated by `:`.
    pub fn section(path: impl Into<String>) -> Self {
        Self::Section(path.into())
    }

    /// The section path, or an empty string for the root.
    pub fn path(&self) -> &str {
        match self {
            Self::Section(path) => path,
            Self::Root => "",
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Section(path) => write!(f, "section '{}'", path),
            Self::Root => f.write_str("document root"),
        }
    }
}

/// Decode raw bytes and bind the selected section onto `T`.
///
/// # Errors
///
/// Returns `ConfigError::ParseError` if the document is malformed or the
/// section cannot be bound onto `T`.
pub fn parse<T>(raw: &[u8], format: Format, binding: &Binding) -> Result<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    let document = format.parse_document(raw)?;
    bind(&document, binding)
}

/// Bind the selected section of an already decoded document onto `T`.
///
/// Keys match field names case-insensitively (Unicode lowercase) and unknown
/// keys are ignored. A missing section binds as an empty object. A key
/// present with `null` leaves the field at its default.
///
/// Strings are converted to numbers or booleans where the field's default
/// shows the target type. Fields whose default carries no type (`None`
/// options, empty collections) are bound with strings as written first;
/// only if that fails is the section re-bound with numeric and boolean
/// strings converted.
///
/// # Errors
///
/// Returns `ConfigError::ParseError` if the document root or the section is
/// not an object, or a value cannot be converted to its field's type.
pub fn bind<T>(document: &Value, binding: &Binding) -> Result<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    if !matches!(document, Value::Object(_) | Value::Null) {
        return Err(ConfigError::ParseError(format!(
            "Document root must be an object, found {}",
            kind(document)
        )));
    }

    let empty = Value::Object(Map::new());
    let section = match binding {
        Binding::Root => document,
        Binding::Section(path) => select_section(document, path).unwrap_or(&empty),
    };

    let section = match section {
        Value::Null => &empty,
        Value::Object(_) => section,
        other => {
            return Err(ConfigError::ParseError(format!(
                "{} must be an object, found {}",
                binding,
                kind(other)
            )));
        }
    };

    let default = serde_json::to_value(T::default()).map_err(|e| {
        ConfigError::ParseError(format!("Options default is not representable: {}", e))
    })?;

    let mut strict = default.clone();
    overlay(&mut strict, section, false);
    serde_json::from_value(strict).or_else(|first| {
        let mut lenient = default;
        overlay(&mut lenient, section, true);
        serde_json::from_value(lenient).map_err(|_| {
            ConfigError::ParseError(format!("Failed to bind {}: {}", binding, first))
        })
    })
}

/// Walk a `:`-separated path, matching each segment case-insensitively.
pub(crate) fn select_section<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split(SECTION_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .try_fold(document, |node, segment| child(node, segment))
}

fn child<'a>(node: &'a Value, key: &str) -> Option<&'a Value> {
    let map = node.as_object()?;
    map.get(key).or_else(|| {
        map.iter()
            .find(|(candidate, _)| keys_match(candidate, key))
            .map(|(_, value)| value)
    })
}

fn keys_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

fn resolve_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    if fields.contains_key(key) {
        return Some(key.to_owned());
    }
    fields
        .keys()
        .find(|field| keys_match(field, key))
        .cloned()
}

/// Lay `incoming` over `target`. With `lenient`, numeric and boolean strings
/// landing where the default has no type are converted as well.
fn overlay(target: &mut Value, incoming: &Value, lenient: bool) {
    match (target, incoming) {
        (_, Value::Null) => {}
        (Value::Object(fields), Value::Object(entries)) if !fields.is_empty() => {
            for (key, value) in entries {
                let Some(field) = resolve_field(fields, key) else {
                    continue;
                };
                if let Some(slot) = fields.get_mut(&field) {
                    overlay(slot, value, lenient);
                }
            }
        }
        (target, incoming) => {
            let coerced = coerce(target, incoming, lenient);
            *target = coerced;
        }
    }
}

/// Convert a scalar to the shape of the default it replaces where lossless.
fn coerce(default: &Value, incoming: &Value, lenient: bool) -> Value {
    match (default, incoming) {
        (Value::String(_), Value::Number(n)) => Value::String(n.to_string()),
        (Value::String(_), Value::Bool(b)) => Value::String(b.to_string()),
        (Value::Number(_), Value::String(s)) => s
            .trim()
            .parse::<serde_json::Number>()
            .map(Value::Number)
            .unwrap_or_else(|_| incoming.clone()),
        (Value::Bool(_), Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => incoming.clone(),
        },
        (Value::Null | Value::Array(_) | Value::Object(_), _) if lenient => loosen(incoming),
        _ => incoming.clone(),
    }
}

/// Convert every numeric or boolean string in `value`.
fn loosen(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if trimmed.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                trimmed
                    .parse::<serde_json::Number>()
                    .map(Value::Number)
                    .unwrap_or_else(|_| value.clone())
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(loosen).collect()),
        Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), loosen(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
