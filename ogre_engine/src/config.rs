//! Text configuration files and environment overrides
//!
//! `ConfigFile` reads and writes the `key=value` files grouped in `[Section]`s
//! used for `ogre.cfg` (render system choice and options) and `resources.cfg`
//! (resource locations per group). Section order, key order, comments and
//! blank lines survive a parse/serialise cycle unchanged.

use std::path::{Path, PathBuf};
use crate::error::Result;

/// Name of the section holding keys that appear before any `[Section]` header
pub const UNNAMED_SECTION: &str = "";

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Blank(String),
    Comment(String),
    /// `raw` holds the original text until the value is changed
    Entry { key: String, value: String, raw: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
struct Section {
    name: String,
    header: Option<String>,
    lines: Vec<Line>,
}

impl Section {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            header: None,
            lines: Vec::new(),
        }
    }
}

/// Ordered sectioned key/value configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    sections: Vec<Section>,
}

impl ConfigFile {
    pub fn new() -> Self {
        Self { sections: Vec::new() }
    }

    /// Parse configuration text.
    ///
    /// Lines starting with `#` are comments. A line without `=` inside a
    /// section is kept as a key with an empty value.
    pub fn parse(text: &str) -> Self {
        let mut sections = vec![Section::new(UNNAMED_SECTION)];

        for raw_line in text.lines() {
            let trimmed = raw_line.trim();
            if trimmed.is_empty() {
                push_line(&mut sections, Line::Blank(raw_line.to_string()));
            } else if trimmed.starts_with('#') {
                push_line(&mut sections, Line::Comment(raw_line.to_string()));
            } else if trimmed.starts_with('[') && trimmed.ends_with(']') {
                let name = trimmed[1..trimmed.len() - 1].trim();
                sections.push(Section {
                    name: name.to_string(),
                    header: Some(raw_line.to_string()),
                    lines: Vec::new(),
                });
            } else {
                let (key, value) = match trimmed.split_once('=') {
                    Some((k, v)) => (k.trim(), v.trim()),
                    None => (trimmed, ""),
                };
                push_line(
                    &mut sections,
                    Line::Entry {
                        key: key.to_string(),
                        value: value.to_string(),
                        raw: Some(raw_line.to_string()),
                    },
                );
            }
        }

        if sections[0].lines.is_empty() {
            sections.remove(0);
        }
        Self { sections }
    }

    /// Load and parse a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::parse(&text))
    }

    /// Serialise and write to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_string())?;
        Ok(())
    }

    /// Value of `key` in `section`
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.find_section(section)?.lines.iter().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set `key` in `section`, creating both when missing.
    ///
    /// Setting an identical value leaves the original line untouched.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let index = match self.sections.iter().position(|s| s.name == section) {
            Some(index) => index,
            None => {
                self.sections.push(Section::new(section));
                self.sections.len() - 1
            }
        };
        let target = &mut self.sections[index];

        for line in target.lines.iter_mut() {
            if let Line::Entry { key: k, value: v, raw } = line {
                if k == key {
                    if v != value {
                        *v = value.to_string();
                        *raw = None;
                    }
                    return;
                }
            }
        }
        target.lines.push(Line::Entry {
            key: key.to_string(),
            value: value.to_string(),
            raw: None,
        });
    }

    /// Append an entry even when `key` already exists (multi-valued keys)
    pub fn add(&mut self, section: &str, key: &str, value: &str) {
        let index = match self.sections.iter().position(|s| s.name == section) {
            Some(index) => index,
            None => {
                self.sections.push(Section::new(section));
                self.sections.len() - 1
            }
        };
        self.sections[index].lines.push(Line::Entry {
            key: key.to_string(),
            value: value.to_string(),
            raw: None,
        });
    }

    /// Remove `key` from `section`; returns whether it existed
    pub fn remove(&mut self, section: &str, key: &str) -> bool {
        let Some(target) = self.sections.iter_mut().find(|s| s.name == section) else {
            return false;
        };
        let before = target.lines.len();
        target
            .lines
            .retain(|line| !matches!(line, Line::Entry { key: k, .. } if k == key));
        before != target.lines.len()
    }

    /// Key/value pairs of a section, in file order
    pub fn section(&self, name: &str) -> Vec<(&str, &str)> {
        self.find_section(name)
            .map(|s| {
                s.lines
                    .iter()
                    .filter_map(|line| match line {
                        Line::Entry { key, value, .. } => Some((key.as_str(), value.as_str())),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Section names, in file order
    pub fn sections(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.find_section(name).is_some()
    }

    fn find_section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }
}

fn push_line(sections: &mut [Section], line: Line) {
    if let Some(last) = sections.last_mut() {
        last.lines.push(line);
    }
}

impl std::fmt::Display for ConfigFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for section in &self.sections {
            match (&section.header, section.name.as_str()) {
                (Some(header), _) => writeln!(f, "{}", header)?,
                (None, UNNAMED_SECTION) => {}
                (None, name) => writeln!(f, "[{}]", name)?,
            }
            for line in &section.lines {
                match line {
                    Line::Blank(raw) | Line::Comment(raw) => writeln!(f, "{}", raw)?,
                    Line::Entry { raw: Some(raw), .. } => writeln!(f, "{}", raw)?,
                    Line::Entry { key, value, raw: None } => writeln!(f, "{}={}", key, value)?,
                }
            }
        }
        Ok(())
    }
}

// ===== ENVIRONMENT =====

/// Environment variables consumed by the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    /// `OGRE_CONFIG_DIR`: directory holding `ogre.cfg` / `resources.cfg`
    pub config_dir: Option<PathBuf>,
    /// `OGRE_MIN_LOGLEVEL`: integer log threshold (1 = Trivial .. 4 = Critical)
    pub min_log_level: Option<i32>,
    /// `OGRE_MEDIA_DIR`: default asset root
    pub media_dir: Option<PathBuf>,
}

impl Environment {
    pub const CONFIG_DIR_VAR: &'static str = "OGRE_CONFIG_DIR";
    pub const MIN_LOGLEVEL_VAR: &'static str = "OGRE_MIN_LOGLEVEL";
    pub const MEDIA_DIR_VAR: &'static str = "OGRE_MEDIA_DIR";

    /// Read the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// Empty values count as unset; a non-integer log level is ignored.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            config_dir: non_empty(Self::CONFIG_DIR_VAR).map(PathBuf::from),
            min_log_level: non_empty(Self::MIN_LOGLEVEL_VAR)
                .and_then(|v| v.trim().parse::<i32>().ok()),
            media_dir: non_empty(Self::MEDIA_DIR_VAR).map(PathBuf::from),
        }
    }

    /// Full path of a config file, honouring `OGRE_CONFIG_DIR`
    /// (current directory otherwise)
    pub fn config_path(&self, file_name: &str) -> PathBuf {
        match &self.config_dir {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
