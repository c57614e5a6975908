//! In-memory registry of declared servers, reconciled with the host config file.
//!
//! The file's `mcpServers` object holds the active servers. Paused servers keep
//! their spec in memory only and are left out of the file on save. Every other
//! top-level key of the file is passed through untouched.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::backup::{backup_file, write_atomic};
use crate::models::{LaunchSpec, ServerRow, ServerStatus};

/// Top-level key of the host config that holds server declarations.
pub const SERVERS_KEY: &str = "mcpServers";

/// Result of [`RegistryStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// File read; the number of entries found.
    Loaded(usize),
    /// No file yet. The registry is now empty; this is the normal first-run state.
    Missing,
}

/// Counts reported by [`RegistryStore::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSummary {
    pub active: usize,
    pub paused: usize,
    pub backup: Option<PathBuf>,
}

/// Result of a successful [`RegistryStore::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    Replaced,
}

/// Named launch specs plus the set of paused names.
///
/// A name is Active when it has a spec and is not paused, Paused when it is in
/// the paused set. A paused name without a spec is an orphan: it is shown but
/// cannot be resumed.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    entries: IndexMap<String, LaunchSpec>,
    paused: BTreeSet<String>,
    dirty: bool,
    backup_dir: PathBuf,
}

impl RegistryStore {
    /// Empty registry. Backups made during save go to `backup_dir`.
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            entries: IndexMap::new(),
            paused: BTreeSet::new(),
            dirty: false,
            backup_dir: backup_dir.into(),
        }
    }

    /// Registry with the given state, marked clean. Paused names need not have a spec.
    pub fn with_state(
        backup_dir: impl Into<PathBuf>,
        entries: IndexMap<String, LaunchSpec>,
        paused: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            entries,
            paused: paused.into_iter().collect(),
            dirty: false,
            backup_dir: backup_dir.into(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn get(&self, name: &str) -> Option<&LaunchSpec> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> &IndexMap<String, LaunchSpec> {
        &self.entries
    }

    pub fn paused(&self) -> &BTreeSet<String> {
        &self.paused
    }

    /// Status of a name, or `None` if it is unknown.
    pub fn status(&self, name: &str) -> Option<ServerStatus> {
        if self.paused.contains(name) {
            Some(ServerStatus::Paused)
        } else if self.entries.contains_key(name) {
            Some(ServerStatus::Active)
        } else {
            None
        }
    }

    /// Entries that a save would write: everything not paused, in registry order.
    pub fn active_entries(&self) -> IndexMap<String, LaunchSpec> {
        self.entries
            .iter()
            .filter(|(name, _)| !self.paused.contains(*name))
            .map(|(name, spec)| (name.clone(), spec.clone()))
            .collect()
    }

    /// Rows for display: entries in registry order, then orphaned pause records.
    pub fn snapshot(&self) -> Vec<ServerRow> {
        let mut rows: Vec<ServerRow> = self
            .entries
            .iter()
            .map(|(name, spec)| ServerRow {
                name: name.clone(),
                status: self.status(name).unwrap_or(ServerStatus::Active),
                spec: Some(spec.clone()),
            })
            .collect();

        rows.extend(
            self.paused
                .iter()
                .filter(|name| !self.entries.contains_key(*name))
                .map(|name| ServerRow {
                    name: name.clone(),
                    status: ServerStatus::Paused,
                    spec: None,
                }),
        );
        rows
    }

    /// Add a server. New and replaced entries are always Active.
    ///
    /// If the name already exists and `overwrite` is false, nothing changes and
    /// `Conflict` is returned so the caller can ask for confirmation.
    pub fn add(&mut self, name: &str, spec: LaunchSpec, overwrite: bool) -> Result<AddOutcome, RegistryError> {
        let name = validate_new_entry(name, &spec)?;
        let exists = self.entries.contains_key(&name);
        if exists && !overwrite {
            return Err(RegistryError::Conflict(name));
        }

        log::info!("{} server '{}'", if exists { "Replaced" } else { "Added" }, name);
        self.paused.remove(&name);
        self.entries.insert(name, spec);
        self.dirty = true;

        Ok(if exists {
            AddOutcome::Replaced
        } else {
            AddOutcome::Inserted
        })
    }

    /// Replace the entry `original`, possibly under a new name. The result is Active.
    ///
    /// Renaming onto another existing name is a `Conflict` unless `overwrite` is set.
    pub fn edit(
        &mut self,
        original: &str,
        new_name: &str,
        spec: LaunchSpec,
        overwrite: bool,
    ) -> Result<AddOutcome, RegistryError> {
        let new_name = validate_new_entry(new_name, &spec)?;
        if !self.entries.contains_key(original) && !self.paused.contains(original) {
            return Err(RegistryError::NotConfigured(original.to_string()));
        }

        let renamed = new_name != original;
        if renamed && self.entries.contains_key(&new_name) && !overwrite {
            return Err(RegistryError::Conflict(new_name));
        }

        if renamed {
            self.entries.shift_remove(original);
            self.paused.remove(original);
            log::info!("Renamed server '{}' to '{}'", original, new_name);
        }
        self.add(&new_name, spec, true)
    }

    /// Delete a name from entries and paused. Unknown names are a no-op; returns
    /// whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let had_entry = self.entries.shift_remove(name).is_some();
        let was_paused = self.paused.remove(name);
        let changed = had_entry || was_paused;
        if changed {
            log::info!("Removed server '{}'", name);
            self.dirty = true;
        }
        changed
    }

    /// Pause a configured server. Pausing a paused server is a no-op.
    pub fn pause(&mut self, name: &str) -> Result<(), RegistryError> {
        if !self.entries.contains_key(name) {
            return Err(RegistryError::NotConfigured(name.to_string()));
        }
        if self.paused.insert(name.to_string()) {
            log::info!("Paused server '{}'", name);
            self.dirty = true;
        }
        Ok(())
    }

    /// Resume a paused server. Orphans fail with `ConfigLost` and stay paused.
    pub fn resume(&mut self, name: &str) -> Result<(), RegistryError> {
        if !self.paused.contains(name) {
            return Err(if self.entries.contains_key(name) {
                RegistryError::NotPaused(name.to_string())
            } else {
                RegistryError::NotConfigured(name.to_string())
            });
        }
        if !self.entries.contains_key(name) {
            log::warn!("Cannot resume '{}': configuration lost", name);
            return Err(RegistryError::ConfigLost(name.to_string()));
        }

        self.paused.remove(name);
        log::info!("Resumed server '{}'", name);
        self.dirty = true;
        Ok(())
    }

    /// Replace the in-memory entries with the file's `mcpServers`.
    ///
    /// A missing file empties the registry. A malformed file fails and leaves the
    /// registry as it was. Pause markers survive only for names still present.
    /// The registry is clean afterwards.
    pub fn load(&mut self, path: &Path) -> Result<LoadOutcome, RegistryError> {
        log::debug!("Loading config from: {}", path.display());
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("Config file not found - will create new one on save");
                self.entries.clear();
                self.paused.clear();
                self.dirty = false;
                return Ok(LoadOutcome::Missing);
            }
            Err(e) => return Err(RegistryError::Io(e, path.to_path_buf())),
        };

        let doc: Value = serde_json::from_str(&content).map_err(RegistryError::Parse)?;
        let entries = decode_servers(&doc)?;

        let dropped: Vec<String> = self
            .paused
            .iter()
            .filter(|name| !entries.contains_key(*name))
            .cloned()
            .collect();
        for name in &dropped {
            log::warn!("Dropping pause marker for '{}': not in reloaded config", name);
            self.paused.remove(name);
        }

        let count = entries.len();
        self.entries = entries;
        self.dirty = false;
        log::info!("Loaded {} servers from config", count);
        log::debug!("Server names: {:?}", self.entries.keys().collect::<Vec<_>>());
        Ok(LoadOutcome::Loaded(count))
    }

    /// Write the active entries to `path` under `mcpServers`, keeping every other
    /// top-level key of the file as it is on disk right now.
    ///
    /// An existing file is first copied into the backup directory. The write goes
    /// through a temp file and a rename. The in-memory registry is never changed;
    /// only a successful write clears the dirty flag.
    pub fn save(&mut self, path: &Path) -> Result<SaveSummary, RegistryError> {
        log::debug!("Starting save to {}", path.display());

        let backup = if path.exists() {
            let target = backup_file(path, &self.backup_dir)
                .map_err(|e| RegistryError::Io(e, self.backup_dir.clone()))?;
            log::info!("Backup created: {}", target.display());
            Some(target)
        } else {
            None
        };

        let mut doc = read_existing_document(path)?;
        let active = self.active_entries();
        let servers = serde_json::to_value(&active).map_err(RegistryError::Serialize)?;
        doc.insert(SERVERS_KEY.to_string(), servers);

        let output = serde_json::to_string_pretty(&Value::Object(doc)).map_err(RegistryError::Serialize)?;
        write_atomic(path, output.as_bytes()).map_err(|e| RegistryError::Io(e, path.to_path_buf()))?;

        self.dirty = false;
        let summary = SaveSummary {
            active: active.len(),
            paused: self.paused.len(),
            backup,
        };
        log::info!(
            "Config saved successfully. Active: {}, Paused: {}",
            summary.active,
            summary.paused
        );
        Ok(summary)
    }

    /// Copy the config file into the backup directory without saving.
    pub fn backup(&self, path: &Path) -> Result<PathBuf, RegistryError> {
        if !path.exists() {
            return Err(RegistryError::NotFound(path.to_path_buf()));
        }
        backup_file(path, &self.backup_dir).map_err(|e| RegistryError::Io(e, self.backup_dir.clone()))
    }
}

/// Decode `mcpServers` into typed entries. Absent or null means no servers.
fn decode_servers(doc: &Value) -> Result<IndexMap<String, LaunchSpec>, RegistryError> {
    let top = doc.as_object().ok_or_else(|| RegistryError::Invalid {
        server: None,
        reason: "config must be a JSON object".to_string(),
    })?;

    let servers = match top.get(SERVERS_KEY) {
        None | Some(Value::Null) => return Ok(IndexMap::new()),
        Some(Value::Object(servers)) => servers,
        Some(_) => {
            return Err(RegistryError::Invalid {
                server: None,
                reason: format!("'{}' must be an object", SERVERS_KEY),
            })
        }
    };

    servers
        .iter()
        .map(|(name, raw)| {
            if !raw.is_object() {
                return Err(RegistryError::Invalid {
                    server: Some(name.clone()),
                    reason: "entry must be an object".to_string(),
                });
            }
            let spec: LaunchSpec = serde_json::from_value(raw.clone()).map_err(|e| RegistryError::Invalid {
                server: Some(name.clone()),
                reason: e.to_string(),
            })?;
            Ok((name.clone(), spec))
        })
        .collect()
}

/// Fresh read of the on-disk document for merging. A file that is missing,
/// unreadable as JSON, or not an object starts from an empty document; the
/// backup taken just before holds the old bytes.
fn read_existing_document(path: &Path) -> Result<Map<String, Value>, RegistryError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => return Err(RegistryError::Io(e, path.to_path_buf())),
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => {
            log::warn!("Existing config is not a JSON object; replacing it (backup kept)");
            Ok(Map::new())
        }
        Err(e) => {
            log::warn!("Error loading existing config: {}; replacing it (backup kept)", e);
            Ok(Map::new())
        }
    }
}

fn validate_new_entry(name: &str, spec: &LaunchSpec) -> Result<String, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::Invalid {
            server: None,
            reason: "server name is required".to_string(),
        });
    }
    if spec.command.trim().is_empty() {
        return Err(RegistryError::Invalid {
            server: Some(name.to_string()),
            reason: "command is required".to_string(),
        });
    }
    Ok(name.to_string())
}

fn server_suffix(server: &Option<String>) -> String {
    server
        .as_ref()
        .map(|s| format!(" for server '{}'", s))
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to parse config: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("Invalid config{}: {reason}", server_suffix(.server))]
    Invalid { server: Option<String>, reason: String },
    #[error("Server '{0}' already exists")]
    Conflict(String),
    #[error("Server '{0}' not found in configuration")]
    NotConfigured(String),
    #[error("Cannot resume '{0}': configuration lost")]
    ConfigLost(String),
    #[error("Server '{0}' is not paused")]
    NotPaused(String),
    #[error("No config file at {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("I/O error on {}: {}", .1.display(), .0)]
    Io(#[source] std::io::Error, PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(dir: &Path) -> RegistryStore {
        RegistryStore::new(dir.join("backups"))
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn add_reports_conflict_without_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = store(dir.path());
        assert_eq!(reg.add("a", LaunchSpec::new("one"), false).unwrap(), AddOutcome::Inserted);

        let err = reg.add("a", LaunchSpec::new("two"), false).unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(ref n) if n == "a"));
        assert_eq!(reg.get("a").unwrap().command, "one");

        assert_eq!(reg.add("a", LaunchSpec::new("two"), true).unwrap(), AddOutcome::Replaced);
        assert_eq!(reg.get("a").unwrap().command, "two");
    }

    #[test]
    fn add_rejects_blank_name_or_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = store(dir.path());
        assert!(matches!(reg.add(" ", LaunchSpec::new("x"), false), Err(RegistryError::Invalid { .. })));
        assert!(matches!(reg.add("a", LaunchSpec::new(""), false), Err(RegistryError::Invalid { .. })));
        assert!(!reg.is_dirty());
    }

    #[test]
    fn overwriting_a_paused_entry_makes_it_active() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = store(dir.path());
        reg.add("a", LaunchSpec::new("one"), false).unwrap();
        reg.pause("a").unwrap();
        reg.add("a", LaunchSpec::new("two"), true).unwrap();
        assert_eq!(reg.status("a"), Some(ServerStatus::Active));
    }

    #[test]
    fn pause_and_resume_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = store(dir.path());
        assert!(matches!(reg.pause("nope"), Err(RegistryError::NotConfigured(_))));

        reg.add("a", LaunchSpec::new("run"), false).unwrap();
        reg.pause("a").unwrap();
        assert_eq!(reg.status("a"), Some(ServerStatus::Paused));
        reg.resume("a").unwrap();
        assert_eq!(reg.status("a"), Some(ServerStatus::Active));
        assert!(matches!(reg.resume("a"), Err(RegistryError::NotPaused(_))));
    }

    #[test]
    fn orphan_cannot_be_resumed() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = RegistryStore::with_state(dir.path(), IndexMap::new(), ["ghost".to_string()]);

        let err = reg.resume("ghost").unwrap_err();
        assert!(matches!(err, RegistryError::ConfigLost(ref n) if n == "ghost"));
        assert!(reg.paused().contains("ghost"));
        assert!(!reg.is_dirty());

        let rows = reg.snapshot();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_orphan());
        assert_eq!(rows[0].status, ServerStatus::Paused);
    }

    #[test]
    fn remove_unknown_is_a_silent_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = store(dir.path());
        assert!(!reg.remove("nope"));
        assert!(!reg.is_dirty());

        reg.add("a", LaunchSpec::new("run"), false).unwrap();
        reg.pause("a").unwrap();
        assert!(reg.remove("a"));
        assert_eq!(reg.status("a"), None);
        assert!(reg.paused().is_empty());
    }

    #[test]
    fn edit_renames_and_unpauses() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = store(dir.path());
        reg.add("old", LaunchSpec::new("run"), false).unwrap();
        reg.add("taken", LaunchSpec::new("x"), false).unwrap();
        reg.pause("old").unwrap();

        assert!(matches!(
            reg.edit("old", "taken", LaunchSpec::new("y"), false),
            Err(RegistryError::Conflict(_))
        ));

        reg.edit("old", "new", LaunchSpec::new("run2"), false).unwrap();
        assert_eq!(reg.status("old"), None);
        assert_eq!(reg.status("new"), Some(ServerStatus::Active));
        assert_eq!(reg.get("new").unwrap().command, "run2");

        assert!(matches!(
            reg.edit("missing", "m", LaunchSpec::new("z"), false),
            Err(RegistryError::NotConfigured(_))
        ));
    }

    #[test]
    fn load_missing_file_is_empty_and_clean() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = store(dir.path());
        reg.add("a", LaunchSpec::new("run"), false).unwrap();

        let outcome = reg.load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(outcome, LoadOutcome::Missing);
        assert!(reg.entries().is_empty());
        assert!(!reg.is_dirty());
    }

    #[test]
    fn load_parse_error_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ broken").unwrap();

        let mut reg = store(dir.path());
        reg.add("a", LaunchSpec::new("run"), false).unwrap();

        assert!(matches!(reg.load(&path), Err(RegistryError::Parse(_))));
        assert_eq!(reg.get("a").unwrap().command, "run");
        assert!(reg.is_dirty());
    }

    #[test]
    fn load_rejects_wrongly_typed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"mcpServers": {"a": {"command": "x", "args": "nope"}}}"#).unwrap();

        let mut reg = store(dir.path());
        let err = reg.load(&path).unwrap_err();
        assert!(matches!(err, RegistryError::Invalid { server: Some(ref s), .. } if s == "a"));
    }

    #[test]
    fn load_preserves_empty_entries_and_drops_stale_pauses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"mcpServers": {"kept": {"command": "k"}, "blank": {}}}"#).unwrap();

        let mut entries = IndexMap::new();
        entries.insert("kept".to_string(), LaunchSpec::new("k"));
        entries.insert("gone".to_string(), LaunchSpec::new("g"));
        let mut reg = RegistryStore::with_state(dir.path(), entries, ["kept".to_string(), "gone".to_string()]);

        assert_eq!(reg.load(&path).unwrap(), LoadOutcome::Loaded(2));
        assert_eq!(reg.get("blank"), Some(&LaunchSpec::default()));
        assert_eq!(reg.status("kept"), Some(ServerStatus::Paused));
        assert_eq!(reg.status("gone"), None);
    }

    #[test]
    fn save_writes_only_active_and_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"foo": "bar", "mcpServers": {"old": {"command": "o"}}}"#).unwrap();

        let mut reg = store(dir.path());
        reg.load(&path).unwrap();
        reg.add("b", LaunchSpec::new("bb"), false).unwrap();
        reg.pause("old").unwrap();

        let summary = reg.save(&path).unwrap();
        assert_eq!(summary.active, 1);
        assert_eq!(summary.paused, 1);
        assert!(summary.backup.is_some());
        assert!(!reg.is_dirty());

        let written = read_json(&path);
        assert_eq!(written["foo"], json!("bar"));
        assert_eq!(written["mcpServers"], json!({"b": {"command": "bb"}}));
        // paused spec still held in memory
        assert_eq!(reg.get("old").unwrap().command, "o");
    }

    #[test]
    fn save_creates_missing_directories_without_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep/nested/config.json");
        let mut reg = store(dir.path());
        reg.add("a", LaunchSpec::new("run"), false).unwrap();

        let summary = reg.save(&path).unwrap();
        assert_eq!(summary.backup, None);
        assert_eq!(read_json(&path), json!({"mcpServers": {"a": {"command": "run"}}}));
    }

    #[test]
    fn save_over_corrupt_file_keeps_a_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json at all").unwrap();

        let mut reg = store(dir.path());
        reg.add("a", LaunchSpec::new("run"), false).unwrap();
        let summary = reg.save(&path).unwrap();

        let backup = summary.backup.unwrap();
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "not json at all");
        assert_eq!(read_json(&path)["mcpServers"]["a"]["command"], json!("run"));
    }

    #[test]
    fn failed_save_keeps_dirty_flag() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be makes the write fail
        let path = dir.path().join("config.json");
        std::fs::create_dir_all(path.join("child")).unwrap();

        let mut reg = RegistryStore::new(dir.path().join("backups"));
        reg.add("a", LaunchSpec::new("run"), false).unwrap();
        assert!(reg.save(&path).is_err());
        assert!(reg.is_dirty());
        assert_eq!(reg.get("a").unwrap().command, "run");
    }

    #[test]
    fn explicit_backup_requires_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let reg = store(dir.path());
        let path = dir.path().join("config.json");
        assert!(matches!(reg.backup(&path), Err(RegistryError::NotFound(_))));

        std::fs::write(&path, "{}").unwrap();
        let backup = reg.backup(&path).unwrap();
        assert!(backup.starts_with(reg.backup_dir()));
    }

    #[test]
    fn entries_without_command_are_written_back_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let servers = json!({"remote": {"url": "u"}, "blank": {}, "local": {"command": "run"}});
        std::fs::write(&path, json!({"mcpServers": servers}).to_string()).unwrap();

        let mut reg = store(dir.path());
        assert_eq!(reg.load(&path).unwrap(), LoadOutcome::Loaded(3));
        reg.save(&path).unwrap();

        assert_eq!(read_json(&path)["mcpServers"], servers);
    }
}
