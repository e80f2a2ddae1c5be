//! Flat `key=value` property files.

use std::path::Path;

use super::{FormatBackend, FormatKind, write_file};
use crate::error::Result;
use crate::option::OptionDescriptor;

/// In-memory property file; entries keep their first-seen order.
#[derive(Debug, Clone, Default)]
pub struct FlatFile {
    entries: Vec<(String, String)>,
}

impl FlatFile {
    /// Creates an empty property file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses property content. `#` and `!` start comments.
    pub fn parse(&mut self, content: &str) {
        self.entries.clear();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim().replace("\\:", ":")),
                None => (line, String::new()),
            };
            self.put(key, value);
        }
    }

    /// Renders every entry as `key=value`, escaping `:`.
    #[must_use]
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{key}={}\n", value.replace(':', "\\:")))
            .collect()
    }

    fn find(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn put(&mut self, key: &str, value: String) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }
}

impl FormatBackend for FlatFile {
    fn kind(&self) -> FormatKind {
        FormatKind::Flat
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        self.parse(&content);
        Ok(())
    }

    fn save(&self, path: &Path, privileged: bool) -> Result<()> {
        write_file(path, &self.render(), privileged)
    }

    fn get_raw(&self, option: &OptionDescriptor) -> Option<String> {
        self.find(option.key()).map(str::to_string)
    }

    fn set_raw(&mut self, option: &OptionDescriptor, raw: &str) {
        self.put(option.key(), raw.to_string());
    }

    fn has_raw(&self, option: &OptionDescriptor) -> bool {
        self.find(option.key()).is_some_and(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::OptionKind;

    fn opt(key: &str) -> OptionDescriptor {
        OptionDescriptor::new(key, key, OptionKind::Str)
    }

    #[test]
    fn test_comments_blank_lines_and_bare_keys() {
        let mut file = FlatFile::new();
        file.parse("#Minecraft server properties\n! also a comment\n\nlevel-name=world\nmotd\nserver-port = 25565\n");
        assert_eq!(file.get_raw(&opt("level-name")).as_deref(), Some("world"));
        assert_eq!(file.get_raw(&opt("server-port")).as_deref(), Some("25565"));
        assert_eq!(file.get_raw(&opt("motd")).as_deref(), Some(""));
        assert!(!file.has_raw(&opt("motd")));
        assert_eq!(file.get_raw(&opt("#Minecraft server properties")), None);
    }

    #[test]
    fn test_colon_escaping() {
        let mut file = FlatFile::new();
        file.parse("resource-pack=https\\://example.invalid/pack.zip\n");
        assert_eq!(
            file.get_raw(&opt("resource-pack")).as_deref(),
            Some("https://example.invalid/pack.zip")
        );
        assert_eq!(file.render(), "resource-pack=https\\://example.invalid/pack.zip\n");
    }

    #[test]
    fn test_set_keeps_order() {
        let mut file = FlatFile::new();
        file.parse("b=1\na=2\n");
        file.set_raw(&opt("a"), "3");
        file.set_raw(&opt("c"), "4");
        assert_eq!(file.render(), "b=1\na=3\nc=4\n");
    }

    #[test]
    fn test_value_containing_equals() {
        let mut file = FlatFile::new();
        file.parse("generator-settings=a=b\n");
        assert_eq!(file.get_raw(&opt("generator-settings")).as_deref(), Some("a=b"));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instance/server.properties");
        let mut file = FlatFile::new();
        assert!(!file.exists(&path));
        file.set_raw(&opt("server-port"), "25566");
        file.save(&path, false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "server-port=25566\n");
    }
}
