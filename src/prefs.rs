//! User preferences (custom host config path and executable locations).
//!
//! Kept as raw JSON so keys written by hand or by other versions survive a rewrite.

use std::path::Path;

use serde_json::{json, Map, Value};

use crate::backup::write_atomic;

pub const CONFIG_PATH_KEY: &str = "claude_desktop_config_path";
pub const EXECUTABLE_PATHS_KEY: &str = "claude_executable_paths";
pub const COMMENTS_KEY: &str = "comments";

/// Preferences file contents. Unknown keys are carried along untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct UserPreferences {
    doc: Map<String, Value>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        let Value::Object(doc) = default_document() else {
            return Self { doc: Map::new() };
        };
        Self { doc }
    }
}

/// Whether `load_or_create` found a file or wrote the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefsSource {
    Loaded,
    Created,
}

impl UserPreferences {
    /// Load preferences, creating the file with defaults on first run.
    /// Missing known keys are backfilled in memory; extra keys are preserved.
    pub fn load_or_create(path: &Path) -> Result<(Self, PrefsSource), PrefsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let prefs = Self::default();
                prefs.save(path)?;
                log::info!("Created default preferences at {}", path.display());
                return Ok((prefs, PrefsSource::Created));
            }
            Err(e) => return Err(PrefsError::ReadFailed(e)),
        };

        let value: Value = serde_json::from_str(&content).map_err(PrefsError::ParseFailed)?;
        let Value::Object(mut doc) = value else {
            return Err(PrefsError::NotAnObject);
        };

        let defaults = Self::default();
        for (key, value) in defaults.doc {
            if !doc.contains_key(&key) {
                log::debug!("Preferences missing '{}', using default", key);
                doc.insert(key, value);
            }
        }

        Ok((Self { doc }, PrefsSource::Loaded))
    }

    /// Write the preferences (2-space indented JSON).
    pub fn save(&self, path: &Path) -> Result<(), PrefsError> {
        let output = serde_json::to_string_pretty(&self.doc).map_err(PrefsError::SerializeFailed)?;
        write_atomic(path, output.as_bytes()).map_err(|e| PrefsError::WriteFailed(e, path.to_path_buf()))
    }

    /// Restore the documented defaults, dropping any extra keys.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Non-blank custom config path, if any.
    pub fn config_path_override(&self) -> Option<&str> {
        self.doc
            .get(CONFIG_PATH_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn set_config_path_override(&mut self, path: &str) {
        self.doc
            .insert(CONFIG_PATH_KEY.to_string(), Value::String(path.trim().to_string()));
    }

    /// User executable paths in listed order. Non-string items are skipped.
    pub fn executable_path_overrides(&self) -> Vec<String> {
        self.doc
            .get(EXECUTABLE_PATHS_KEY)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_executable_path_overrides(&mut self, paths: Vec<String>) {
        let items = paths.into_iter().map(Value::String).collect();
        self.doc
            .insert(EXECUTABLE_PATHS_KEY.to_string(), Value::Array(items));
    }

    /// Raw document, for display.
    pub fn as_json(&self) -> &Map<String, Value> {
        &self.doc
    }
}

fn default_document() -> Value {
    json!({
        CONFIG_PATH_KEY: "",
        EXECUTABLE_PATHS_KEY: [],
        COMMENTS_KEY: {
            "claude_desktop_config_path_examples": {
                "windows": [
                    "%APPDATA%\\Claude\\claude_desktop_config.json",
                    "C:\\Users\\USERNAME\\AppData\\Roaming\\Claude\\claude_desktop_config.json"
                ],
                "macos": [
                    "~/Library/Application Support/Claude/claude_desktop_config.json",
                    "/Users/USERNAME/Library/Application Support/Claude/claude_desktop_config.json"
                ],
                "linux": [
                    "~/.config/Claude/claude_desktop_config.json",
                    "/home/USERNAME/.config/Claude/claude_desktop_config.json"
                ]
            },
            "claude_executable_paths_examples": {
                "windows": [
                    "%LOCALAPPDATA%\\AnthropicClaude\\Claude.exe",
                    "%LOCALAPPDATA%\\Programs\\Claude\\Claude.exe",
                    "%PROGRAMFILES%\\Claude\\Claude.exe"
                ],
                "macos": [
                    "/Applications/Claude.app",
                    "~/Applications/Claude.app"
                ],
                "linux": [
                    "/usr/bin/claude",
                    "/usr/local/bin/claude",
                    "~/.local/bin/claude",
                    "/opt/Claude/claude",
                    "/snap/bin/claude"
                ]
            },
            "usage": "Set 'claude_desktop_config_path' to use a custom config file location (empty means auto-detect). Set 'claude_executable_paths' to custom Claude executable locations; the first one found is used. Environment variables like %APPDATA%, $HOME and ~ are expanded."
        }
    })
}

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("Failed to read preferences: {0}")]
    ReadFailed(#[source] std::io::Error),
    #[error("Failed to parse preferences: {0}")]
    ParseFailed(#[source] serde_json::Error),
    #[error("Preferences file must contain a JSON object")]
    NotAnObject,
    #[error("Failed to serialize preferences: {0}")]
    SerializeFailed(#[source] serde_json::Error),
    #[error("Failed to write preferences to {}: {}", .1.display(), .0)]
    WriteFailed(#[source] std::io::Error, std::path::PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_creates_file_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let (prefs, source) = UserPreferences::load_or_create(&path).unwrap();
        assert_eq!(source, PrefsSource::Created);
        assert!(path.exists());
        assert_eq!(prefs.config_path_override(), None);
        assert!(prefs.executable_path_overrides().is_empty());

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(written.get(COMMENTS_KEY).is_some());
    }

    #[test]
    fn missing_keys_are_backfilled_and_extras_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, r#"{"claude_desktop_config_path": "~/c.json", "theme": "dark"}"#).unwrap();

        let (mut prefs, source) = UserPreferences::load_or_create(&path).unwrap();
        assert_eq!(source, PrefsSource::Loaded);
        assert_eq!(prefs.config_path_override(), Some("~/c.json"));
        assert!(prefs.as_json().contains_key(EXECUTABLE_PATHS_KEY));
        assert!(prefs.as_json().contains_key(COMMENTS_KEY));

        prefs.set_executable_path_overrides(vec!["/opt/claude".into()]);
        prefs.save(&path).unwrap();

        let (reloaded, _) = UserPreferences::load_or_create(&path).unwrap();
        assert_eq!(reloaded.as_json().get("theme"), Some(&json!("dark")));
        assert_eq!(reloaded.executable_path_overrides(), vec!["/opt/claude".to_string()]);
    }

    #[test]
    fn corrupt_file_is_reported_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = UserPreferences::load_or_create(&path).unwrap_err();
        assert!(matches!(err, PrefsError::ParseFailed(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn reset_drops_custom_values() {
        let mut prefs = UserPreferences::default();
        prefs.set_config_path_override("/x.json");
        prefs.reset();
        assert_eq!(prefs, UserPreferences::default());
    }
}
