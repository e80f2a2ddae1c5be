//! Sectioned key-value files (`[Section]` / `key = value`).
//!
//! The file is kept as a list of lines so comments, ordering and untouched
//! entries are written back exactly as they were read.

use std::path::Path;

use super::{FormatBackend, FormatKind, write_file};
use crate::error::Result;
use crate::option::OptionDescriptor;

#[derive(Debug, Clone)]
enum Line {
    Header { name: String, text: String },
    Entry { key: String, value: String, text: String },
    Other(String),
}

impl Line {
    fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') && trimmed.len() >= 2 {
            return Self::Header {
                name: trimmed[1..trimmed.len() - 1].trim().to_string(),
                text: text.to_string(),
            };
        }
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with(';')
            || text.starts_with(char::is_whitespace)
        {
            return Self::Other(text.to_string());
        }
        let split = trimmed.find(['=', ':']);
        let (key, value) = match split {
            Some(idx) => (trimmed[..idx].trim(), trimmed[idx + 1..].trim()),
            None => (trimmed, ""),
        };
        Self::Entry {
            key: key.to_string(),
            value: value.to_string(),
            text: text.to_string(),
        }
    }

    fn text(&self) -> &str {
        match self {
            Self::Header { text, .. } | Self::Entry { text, .. } | Self::Other(text) => text,
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, Self::Other(text) if text.trim().is_empty())
    }
}

/// In-memory sectioned file.
#[derive(Debug, Clone)]
pub struct SectionedFile {
    lines: Vec<Line>,
    trailing_newline: bool,
    spoof: Option<String>,
}

impl Default for SectionedFile {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionedFile {
    /// Creates an empty file whose entries must live under real headers
    /// (entries before the first header are addressed with no section).
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            trailing_newline: true,
            spoof: None,
        }
    }

    /// Creates an empty file read under a synthetic `[group]` header.
    #[must_use]
    pub fn spoofed(group: &str) -> Self {
        Self {
            spoof: Some(group.to_string()),
            ..Self::new()
        }
    }

    /// Parses content from a string.
    pub fn parse(&mut self, content: &str) {
        let content = match &self.spoof {
            Some(group) => format!("[{group}]\n{content}"),
            None => content.to_string(),
        };
        let mut pieces: Vec<&str> = content.split('\n').collect();
        self.trailing_newline = pieces.last().is_some_and(|last| last.is_empty());
        if self.trailing_newline {
            pieces.pop();
        }
        self.lines = pieces.into_iter().map(Line::parse).collect();
    }

    /// Renders the file as it will be written to disk.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self
            .lines
            .iter()
            .map(Line::text)
            .collect::<Vec<_>>()
            .join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        if self.spoof.is_some() {
            out = strip_leading_header(&out);
        }
        out
    }

    fn section_for<'a>(&'a self, option: &'a OptionDescriptor) -> Option<&'a str> {
        option.section().or(self.spoof.as_deref())
    }

    fn find_entry(&self, section: Option<&str>, key: &str) -> Option<usize> {
        let mut current: Option<&str> = None;
        for (idx, line) in self.lines.iter().enumerate() {
            match line {
                Line::Header { name, .. } => current = Some(name.as_str()),
                Line::Entry { key: k, .. } if current == section && k.eq_ignore_ascii_case(key) => {
                    return Some(idx);
                }
                _ => {}
            }
        }
        None
    }

    /// Index just after the last non-blank line of `section`, if present.
    ///
    /// `None` addresses the header-less region before the first header.
    fn section_insert_point(&self, section: Option<&str>) -> Option<usize> {
        let mut current: Option<&str> = None;
        let mut insert_at = section.is_none().then_some(0);
        for (idx, line) in self.lines.iter().enumerate() {
            match line {
                Line::Header { name, .. } => {
                    if current == section && insert_at.is_some() {
                        return insert_at;
                    }
                    current = Some(name.as_str());
                    if current == section {
                        insert_at = Some(idx + 1);
                    }
                }
                _ if current == section && insert_at.is_some() && !line.is_blank() => {
                    insert_at = Some(idx + 1);
                }
                _ => {}
            }
        }
        insert_at
    }
}

fn strip_leading_header(rendered: &str) -> String {
    let (first, rest) = rendered.split_once('\n').unwrap_or((rendered, ""));
    let first = first.trim();
    if !(first.starts_with('[') && first.ends_with(']')) {
        return rendered.to_string();
    }
    rest.to_string()
}

fn escape(raw: &str) -> String {
    raw.replace('%', "%%")
}

fn unescape(stored: &str) -> String {
    stored.replace("%%", "%")
}

impl FormatBackend for SectionedFile {
    fn kind(&self) -> FormatKind {
        FormatKind::Sectioned
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
        let idx = self.find_entry(self.section_for(option), option.key())?;
        match &self.lines[idx] {
            Line::Entry { value, .. } => Some(unescape(value)),
            _ => None,
        }
    }

    fn set_raw(&mut self, option: &OptionDescriptor, raw: &str) {
        let section = self.section_for(option).map(str::to_string);
        let value = escape(raw);

        if let Some(idx) = self.find_entry(section.as_deref(), option.key()) {
            if let Line::Entry { key, .. } = &self.lines[idx] {
                let key = key.clone();
                self.lines[idx] = Line::Entry {
                    text: format!("{key} = {value}"),
                    key,
                    value,
                };
            }
            return;
        }

        let entry = Line::Entry {
            key: option.key().to_string(),
            text: format!("{} = {value}", option.key()),
            value,
        };
        if let Some(idx) = self.section_insert_point(section.as_deref()) {
            self.lines.insert(idx, entry);
            return;
        }

        // Section does not exist yet; append it.
        if let Some(name) = section {
            if self.lines.last().is_some_and(|line| !line.is_blank()) {
                self.lines.push(Line::Other(String::new()));
            }
            self.lines.push(Line::Header {
                text: format!("[{name}]"),
                name,
            });
        }
        self.lines.push(entry);
    }

    fn has_raw(&self, option: &OptionDescriptor) -> bool {
        self.get_raw(option).is_some_and(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::OptionKind;

    fn opt(section: &str, key: &str) -> OptionDescriptor {
        OptionDescriptor::new(key, key, OptionKind::Str).in_section(section)
    }

    fn bare(key: &str) -> OptionDescriptor {
        OptionDescriptor::new(key, key, OptionKind::Str)
    }

    #[test]
    fn test_get_by_section_and_key() {
        let mut file = SectionedFile::new();
        file.parse("[Server]\nPort = 7777\n; comment\nName: My Server\n\n[Discord]\nenabled = True\n");
        assert_eq!(file.get_raw(&opt("Server", "Port")).as_deref(), Some("7777"));
        assert_eq!(file.get_raw(&opt("Server", "name")).as_deref(), Some("My Server"));
        assert_eq!(file.get_raw(&opt("Discord", "enabled")).as_deref(), Some("True"));
        assert_eq!(file.get_raw(&opt("Discord", "Port")), None);
        assert_eq!(file.get_raw(&opt("Missing", "Port")), None);
    }

    #[test]
    fn test_unmodified_round_trip_is_identical() {
        let content = "# header comment\n[Server]\nPort = 7777\n\n[Other]\nkey=value\n";
        let mut file = SectionedFile::new();
        file.parse(content);
        assert_eq!(file.render(), content);
    }

    #[test]
    fn test_set_existing_preserves_other_lines() {
        let mut file = SectionedFile::new();
        file.parse("[Server]\n# port\nPort = 7777\nName = x\n");
        file.set_raw(&opt("Server", "Port"), "8888");
        assert_eq!(file.render(), "[Server]\n# port\nPort = 8888\nName = x\n");
    }

    #[test]
    fn test_set_appends_to_existing_section() {
        let mut file = SectionedFile::new();
        file.parse("[Server]\nPort = 7777\n\n[Discord]\nenabled = False\n");
        file.set_raw(&opt("Server", "Name"), "Arena");
        assert_eq!(
            file.render(),
            "[Server]\nPort = 7777\nName = Arena\n\n[Discord]\nenabled = False\n"
        );
    }

    #[test]
    fn test_set_creates_section() {
        let mut file = SectionedFile::new();
        file.parse("[Server]\nPort = 7777\n");
        file.set_raw(&opt("Discord", "webhook"), "https://example.invalid/hook");
        assert_eq!(
            file.render(),
            "[Server]\nPort = 7777\n\n[Discord]\nwebhook = https://example.invalid/hook\n"
        );
    }

    #[test]
    fn test_percent_escaped_on_write() {
        let mut file = SectionedFile::new();
        file.set_raw(&opt("Messages", "stop"), "100% done");
        assert!(file.render().contains("stop = 100%% done"));
        assert_eq!(file.get_raw(&opt("Messages", "stop")).as_deref(), Some("100% done"));

        let mut reparsed = SectionedFile::new();
        reparsed.parse(&file.render());
        assert_eq!(reparsed.get_raw(&opt("Messages", "stop")).as_deref(), Some("100% done"));
    }

    #[test]
    fn test_spoofed_round_trip_is_identical() {
        let content = "MaxPlayers=16\nServerName=Test Server\n";
        let mut file = SectionedFile::spoofed("server");
        file.parse(content);
        assert_eq!(file.get_raw(&bare("MaxPlayers")).as_deref(), Some("16"));
        assert_eq!(file.render(), content);
    }

    #[test]
    fn test_spoofed_keeps_leading_blank_line() {
        for content in ["\nMaxPlayers=16\n", "\n\nMaxPlayers=16\n", "\n"] {
            let mut file = SectionedFile::spoofed("server");
            file.parse(content);
            assert_eq!(file.render(), content);
        }
    }

    #[test]
    fn test_spoofed_without_trailing_newline() {
        let mut file = SectionedFile::spoofed("server");
        file.parse("a = 1");
        assert_eq!(file.render(), "a = 1");
    }

    #[test]
    fn test_spoofed_set_never_leaks_header() {
        let mut file = SectionedFile::spoofed("server");
        file.parse("MaxPlayers=16\n");
        file.set_raw(&bare("MaxPlayers"), "32");
        file.set_raw(&bare("Password"), "hunter2");
        let rendered = file.render();
        assert!(!rendered.contains("[server]"));
        assert_eq!(rendered, "MaxPlayers = 32\nPassword = hunter2\n");
    }

    #[test]
    fn test_spoofed_new_file() {
        let mut file = SectionedFile::spoofed("server");
        file.set_raw(&bare("Port"), "1");
        assert_eq!(file.render(), "Port = 1\n");
    }

    #[test]
    fn test_strip_leading_header_drops_only_the_header() {
        assert_eq!(strip_leading_header("[g]\n\n\nk = v\n"), "\n\nk = v\n");
        assert_eq!(strip_leading_header("k = v\n"), "k = v\n");
        assert_eq!(strip_leading_header("[g]"), "");
    }

    #[test]
    fn test_has_raw_ignores_empty_values() {
        let mut file = SectionedFile::new();
        file.parse("[s]\nempty =\nfull = 1\n");
        assert!(!file.has_raw(&opt("s", "empty")));
        assert!(file.has_raw(&opt("s", "full")));
        assert!(!file.has_raw(&opt("s", "absent")));
    }

    #[test]
    fn test_headless_entries_without_spoof() {
        let mut file = SectionedFile::new();
        file.parse("top = 1\n[s]\nk = v\n");
        assert_eq!(file.get_raw(&bare("top")).as_deref(), Some("1"));
        file.set_raw(&bare("second"), "2");
        assert_eq!(file.render(), "top = 1\nsecond = 2\n[s]\nk = v\n");
    }

    #[test]
    fn test_load_and_save_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Game.ini");
        std::fs::write(&path, "[Server]\nPort = 1\n").unwrap();
        let mut file = SectionedFile::new();
        assert!(file.exists(&path));
        file.load(&path).unwrap();
        file.set_raw(&opt("Server", "Port"), "2");
        file.save(&path, false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[Server]\nPort = 2\n");
    }
}
