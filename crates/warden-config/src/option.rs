//! Option descriptors, typed values and storage conversion.
//!
//! Every backend stores strings; the declared [`OptionKind`] decides how a
//! stored string is turned into an [`OptionValue`] and back.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ConfigError, Result};

// =============================================================================
// OptionKind
// =============================================================================

/// Declared type of a configuration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    /// Free-form text.
    #[default]
    #[serde(alias = "string")]
    Str,
    /// Signed decimal integer.
    #[serde(alias = "integer")]
    Int,
    /// `True` / `False`.
    #[serde(alias = "boolean")]
    Bool,
    /// Floating point, written with six decimals.
    Float,
    /// Comma separated list of strings.
    List,
}

impl OptionKind {
    /// Returns the short type name used in definitions and JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Float => "float",
            Self::List => "list",
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// OptionValue
// =============================================================================

/// Typed option value.
///
/// `Empty` is the "no value, defer to default" marker for non-text kinds and
/// the sentinel returned for unknown options.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// No value stored.
    Empty,
    /// Text value.
    Str(String),
    /// Integer value.
    Int(i64),
    /// Boolean value.
    Bool(bool),
    /// Float value.
    Float(f64),
    /// List value.
    List(Vec<String>),
}

impl OptionValue {
    /// Returns true if this is the empty marker.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Boolean view; anything but `Bool(true)` is false.
    #[must_use]
    pub const fn as_bool(&self) -> bool {
        matches!(self, Self::Bool(true))
    }

    /// Integer view, if the value is an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view; non-text values are rendered with [`fmt::Display`].
    #[must_use]
    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => f.write_str(bool_literal(*v)),
            Self::Float(v) => write!(f, "{v}"),
            Self::List(items) => f.write_str(&items.join(",")),
        }
    }
}

impl Serialize for OptionValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_str(""),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::List(items) => items.serialize(serializer),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

// =============================================================================
// Conversion
// =============================================================================

const fn bool_literal(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// Returns true for `1`, `true`, `yes`, `on` (case-insensitive).
#[must_use]
pub fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_list(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',').map(|item| item.trim().to_string()).collect()
}

/// Converts a stored string into a typed value.
///
/// Returns `None` when `raw` cannot be parsed as `kind`.
#[must_use]
pub fn from_storage(raw: &str, kind: OptionKind) -> Option<OptionValue> {
    match kind {
        OptionKind::Str => Some(OptionValue::Str(raw.to_string())),
        OptionKind::List => Some(OptionValue::List(split_list(raw))),
        _ if raw.is_empty() => Some(OptionValue::Empty),
        OptionKind::Int => raw.trim().parse().ok().map(OptionValue::Int),
        OptionKind::Bool => Some(OptionValue::Bool(is_truthy(raw))),
        OptionKind::Float => raw.trim().parse().ok().map(OptionValue::Float),
    }
}

/// Converts a typed (or user-supplied text) value into its stored string.
///
/// Returns `None` when `value` cannot be represented as `kind`.
#[must_use]
pub fn to_storage(value: &OptionValue, kind: OptionKind) -> Option<String> {
    if value.is_empty() {
        return Some(String::new());
    }
    match kind {
        OptionKind::Str => Some(value.to_string()),
        OptionKind::Bool => match value {
            OptionValue::Bool(v) => Some(bool_literal(*v).to_string()),
            OptionValue::Str(s) if s.is_empty() => Some(String::new()),
            other => Some(bool_literal(is_truthy(&other.to_string())).to_string()),
        },
        OptionKind::Int => match value {
            OptionValue::Int(v) => Some(v.to_string()),
            OptionValue::Str(s) if s.trim().is_empty() => Some(String::new()),
            OptionValue::Str(s) => s.trim().parse::<i64>().ok().map(|v| v.to_string()),
            OptionValue::Float(v) if v.fract() == 0.0 => Some((*v as i64).to_string()),
            _ => None,
        },
        OptionKind::Float => match value {
            OptionValue::Float(v) => Some(format!("{v:.6}")),
            OptionValue::Int(v) => Some(format!("{:.6}", *v as f64)),
            OptionValue::Str(s) if s.trim().is_empty() => Some(String::new()),
            OptionValue::Str(s) => s.trim().parse::<f64>().ok().map(|v| format!("{v:.6}")),
            _ => None,
        },
        OptionKind::List => match value {
            OptionValue::List(items) => Some(items.join(",")),
            other => Some(split_list(&other.to_string()).join(",")),
        },
    }
}

// =============================================================================
// OptionDescriptor
// =============================================================================

/// Definition of one registered option.
///
/// The storage location is `(section, key)`; how it is interpreted depends on
/// the backend (section + key, slash path, or flat key).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionDescriptor {
    name: String,
    section: Option<String>,
    key: String,
    default: String,
    kind: OptionKind,
    help: String,
    allowed: Option<Vec<String>>,
}

impl OptionDescriptor {
    /// Creates a descriptor with an empty default (`False` for booleans).
    #[must_use]
    pub fn new(name: impl Into<String>, key: impl Into<String>, kind: OptionKind) -> Self {
        let default = if kind == OptionKind::Bool {
            bool_literal(false).to_string()
        } else {
            String::new()
        };
        Self {
            name: name.into(),
            section: None,
            key: key.into(),
            default,
            kind,
            help: String::new(),
            allowed: None,
        }
    }

    /// Places the option in a section (sectioned backend only).
    #[must_use]
    pub fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Sets the stored default; boolean defaults are normalised to `True`/`False`.
    #[must_use]
    pub fn with_default(mut self, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        self.default = if self.kind == OptionKind::Bool && !raw.is_empty() {
            bool_literal(is_truthy(&raw)).to_string()
        } else {
            raw
        };
        self
    }

    /// Sets the help text.
    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// Restricts the option to an enumerated set of values.
    #[must_use]
    pub fn with_allowed(mut self, allowed: Vec<String>) -> Self {
        self.allowed = Some(allowed);
        self
    }

    /// Option name (lookup key).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Section, if any.
    #[must_use]
    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    /// Key, or slash-delimited path for document backends.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Default in stored form.
    #[must_use]
    pub fn default_raw(&self) -> &str {
        &self.default
    }

    /// Declared type.
    #[must_use]
    pub const fn kind(&self) -> OptionKind {
        self.kind
    }

    /// Help text.
    #[must_use]
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Enumerated allowed values, if restricted.
    #[must_use]
    pub fn allowed(&self) -> Option<&[String]> {
        self.allowed.as_deref()
    }

    /// Typed default value.
    #[must_use]
    pub fn default_value(&self) -> OptionValue {
        from_storage(&self.default, self.kind).unwrap_or_else(|| OptionValue::Str(self.default.clone()))
    }

    /// Decodes a stored string for this option.
    pub fn decode(&self, raw: &str) -> Result<OptionValue> {
        from_storage(raw, self.kind).ok_or_else(|| self.invalid(raw))
    }

    /// Encodes a value into stored form for this option.
    pub fn encode(&self, value: &OptionValue) -> Result<String> {
        to_storage(value, self.kind).ok_or_else(|| self.invalid(&value.to_string()))
    }

    fn invalid(&self, value: &str) -> ConfigError {
        ConfigError::InvalidValue {
            option: self.name.clone(),
            value: value.to_string(),
            expected: self.kind.as_str(),
        }
    }
}
