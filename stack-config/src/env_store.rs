//! Flat `KEY=value` environment store (the install's `.env` file).
//!
//! Comments, blank lines and key order survive a load/save cycle. Updating
//! an existing key rewrites its line in place; new keys are appended.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use stack_core::error::{Result, StackError};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry {
        key: String,
        value: String,
        export: bool,
    },
    Raw(String),
}

#[derive(Debug, Clone, Default)]
pub struct EnvStore {
    path: Option<PathBuf>,
    lines: Vec<Line>,
}

impl EnvStore {
    /// An empty store with no backing file (degraded mode).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StackError::Configuration(format!(
                "Failed to read environment file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let mut store = Self::parse(&content);
        store.path = Some(path.to_path_buf());
        debug!("Loaded {} keys from {}", store.keys().len(), path.display());
        Ok(store)
    }

    /// Load the store when a path is known, otherwise return an empty one.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::empty()),
        }
    }

    pub fn parse(content: &str) -> Self {
        let lines = content.lines().map(parse_line).collect();
        Self { path: None, lines }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The effective value for `key`; the last definition wins.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(unquote(value)),
            _ => None,
        })
    }

    /// Like [`get`](Self::get) but treats blank values as missing.
    pub fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Entry { key, .. } => Some(key.as_str()),
                Line::Raw(_) => None,
            })
            .collect()
    }

    /// Set `key` to `value`, updating its line in place or appending it.
    pub fn set(&mut self, key: &str, value: &str) {
        let encoded = quote_if_needed(value);
        let existing = self.lines.iter_mut().rev().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value),
            _ => None,
        });

        match existing {
            Some(slot) => *slot = encoded,
            None => self.lines.push(Line::Entry {
                key: key.to_string(),
                value: encoded,
                export: false,
            }),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Entry { key, value, export } => {
                    if *export {
                        out.push_str("export ");
                    }
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
                Line::Raw(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }

    /// Write the store back to its file atomically (temp file + rename).
    pub fn save(&self) -> Result<()> {
        let path = self.path.as_deref().ok_or_else(|| {
            StackError::Configuration(
                "Environment store has no backing file; cannot persist changes".to_string(),
            )
        })?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(self.render().as_bytes())?;
        tmp.flush()?;
        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(tmp.path(), meta.permissions())?;
        }
        tmp.persist(path).map_err(|e| StackError::Io(e.error))?;
        debug!("Saved environment store {}", path.display());
        Ok(())
    }
}

fn parse_line(raw: &str) -> Line {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Line::Raw(raw.to_string());
    }
    let (body, export) = match trimmed.strip_prefix("export ") {
        Some(rest) => (rest, true),
        None => (trimmed, false),
    };
    match body.split_once('=') {
        Some((key, value)) if is_valid_key(key.trim()) => Line::Entry {
            key: key.trim().to_string(),
            value: value.trim().to_string(),
            export,
        },
        _ => Line::Raw(raw.to_string()),
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == b'"' && last == b'"' {
            return value[1..value.len() - 1].replace("\\\"", "\"");
        }
        if first == b'\'' && last == b'\'' {
            return value[1..value.len() - 1].to_string();
        }
    }
    // Unquoted values may carry a trailing " # comment".
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}

fn quote_if_needed(value: &str) -> String {
    if value.contains(char::is_whitespace) || value.contains('#') {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "# Generated by setup\nPOSTGRES_USER=app\nPOSTGRES_PASSWORD=\"s3cr et\"\n\nBACKEND_VERSION=1.2.0 # pinned\nexport GITHUB_TOKEN='ghp_abc'\n";

    #[test]
    fn test_parse_and_get() {
        let store = EnvStore::parse(SAMPLE);
        assert_eq!(store.get("POSTGRES_USER").as_deref(), Some("app"));
        assert_eq!(store.get("POSTGRES_PASSWORD").as_deref(), Some("s3cr et"));
        assert_eq!(store.get("BACKEND_VERSION").as_deref(), Some("1.2.0"));
        assert_eq!(store.get("GITHUB_TOKEN").as_deref(), Some("ghp_abc"));
        assert_eq!(store.get("MISSING"), None);
    }

    #[test]
    fn test_last_definition_wins() {
        let store = EnvStore::parse("A=1\nA=2\n");
        assert_eq!(store.get("A").as_deref(), Some("2"));
    }

    #[test]
    fn test_get_non_empty() {
        let store = EnvStore::parse("POSTGRES_PASSWORD=\nEMPTY_QUOTED=\"\"\n");
        assert!(store.contains("POSTGRES_PASSWORD"));
        assert_eq!(store.get_non_empty("POSTGRES_PASSWORD"), None);
        assert_eq!(store.get_non_empty("EMPTY_QUOTED"), None);
    }

    #[test]
    fn test_set_updates_in_place_and_appends() {
        let mut store = EnvStore::parse(SAMPLE);
        store.set("BACKEND_VERSION", "1.3.0");
        store.set("FRONTEND_VERSION", "2.0.1");

        let rendered = store.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "# Generated by setup");
        assert_eq!(lines[4], "BACKEND_VERSION=1.3.0");
        assert_eq!(lines[5], "export GITHUB_TOKEN='ghp_abc'");
        assert_eq!(lines.last(), Some(&"FRONTEND_VERSION=2.0.1"));
        assert_eq!(store.get("BACKEND_VERSION").as_deref(), Some("1.3.0"));
    }

    #[test]
    fn test_set_quotes_values_with_spaces() {
        let mut store = EnvStore::empty();
        store.set("MOTD", "hello world");
        assert_eq!(store.render(), "MOTD=\"hello world\"\n");
        assert_eq!(store.get("MOTD").as_deref(), Some("hello world"));
    }

    #[test]
    fn test_save_round_trip_preserves_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, SAMPLE).unwrap();

        let mut store = EnvStore::load(&path).unwrap();
        store.set("BACKEND_VERSION", "1.3.0");
        store.save().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Generated by setup\n"));
        assert!(content.contains("BACKEND_VERSION=1.3.0\n"));
        assert!(!content.contains("1.2.0"));

        let reloaded = EnvStore::load(&path).unwrap();
        assert_eq!(reloaded.get("POSTGRES_PASSWORD").as_deref(), Some("s3cr et"));
    }

    #[test]
    fn test_save_without_backing_file_fails() {
        let store = EnvStore::empty();
        assert!(matches!(store.save(), Err(StackError::Configuration(_))));
    }

    #[test]
    fn test_load_missing_file_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let result = EnvStore::load(&dir.path().join("nope.env"));
        assert!(matches!(result, Err(StackError::Configuration(_))));
    }
}
