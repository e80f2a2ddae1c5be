//! Hierarchical JSON documents addressed by slash-delimited paths.

use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use super::{FormatBackend, FormatKind, write_file};
use crate::error::{ConfigError, Result};
use crate::option::{OptionDescriptor, OptionKind, is_truthy};

/// In-memory JSON document.
#[derive(Debug, Clone)]
pub struct DocumentFile {
    root: Value,
}

impl Default for DocumentFile {
    fn default() -> Self {
        Self::new()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.trim_start_matches('/').split('/').filter(|s| !s.is_empty())
}

fn render_native(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(render_native).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

fn to_native(raw: &str, kind: OptionKind) -> Value {
    let parsed = match kind {
        OptionKind::Str => None,
        OptionKind::Int => raw.trim().parse::<i64>().ok().map(Value::from),
        OptionKind::Bool if raw.is_empty() => None,
        OptionKind::Bool => Some(Value::Bool(is_truthy(raw))),
        OptionKind::Float => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        OptionKind::List if raw.trim().is_empty() => Some(Value::Array(Vec::new())),
        OptionKind::List => Some(Value::Array(
            raw.split(',')
                .map(|item| Value::String(item.trim().to_string()))
                .collect(),
        )),
    };
    parsed.unwrap_or_else(|| Value::String(raw.to_string()))
}

impl DocumentFile {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// Parses a document from a string; blank input is an empty document.
    pub fn parse(&mut self, content: &str, path: &Path) -> Result<()> {
        self.root = if content.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(content).map_err(|e| ConfigError::parse(path, e.to_string()))?
        };
        Ok(())
    }

    /// Renders the document with four-space indentation.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.root
            .serialize(&mut ser)
            .map_err(|e| ConfigError::Io(std::io::Error::other(e)))?;
        String::from_utf8(buf).map_err(|e| ConfigError::Io(std::io::Error::other(e)))
    }

    fn lookup(&self, path: &str) -> Option<&Value> {
        segments(path).try_fold(&self.root, |node, segment| node.as_object()?.get(segment))
    }

    fn insert(&mut self, path: &str, value: Value) {
        let parts: Vec<&str> = segments(path).collect();
        insert_at(&mut self.root, &parts, value);
    }
}

fn insert_at(node: &mut Value, parts: &[&str], value: Value) {
    if parts.is_empty() {
        return;
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };
    match parts {
        [last] => {
            map.insert((*last).to_string(), value);
        }
        [first, rest @ ..] => {
            let child = map
                .entry((*first).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            insert_at(child, rest, value);
        }
        [] => {}
    }
}

impl FormatBackend for DocumentFile {
    fn kind(&self) -> FormatKind {
        FormatKind::Document
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        self.parse(&content, path)
    }

    fn save(&self, path: &Path, privileged: bool) -> Result<()> {
        write_file(path, &self.render()?, privileged)
    }

    fn get_raw(&self, option: &OptionDescriptor) -> Option<String> {
        self.lookup(option.key()).map(render_native)
    }

    fn set_raw(&mut self, option: &OptionDescriptor, raw: &str) {
        self.insert(option.key(), to_native(raw, option.kind()));
    }

    fn has_raw(&self, option: &OptionDescriptor) -> bool {
        match self.lookup(option.key()) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}
