//! Local marketplace catalog: an SQLite file with a `servers` table and a
//! `metadata` table holding the catalog version.
//!
//! Every successful add/edit/remove bumps the patch version. The file can be
//! replaced wholesale by the published archive.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::backup::write_atomic;
use crate::fetch::{self, FetchError};
use crate::import::{validate_catalog_fields, FieldErrors};
use crate::models::{CatalogEntry, CatalogFields, CatalogSummary, LaunchSpec};

pub const DEFAULT_VERSION: &str = "1.0.0";

/// Version written when the stored one cannot be parsed as `MAJOR.MINOR.PATCH`.
pub const FALLBACK_VERSION: &str = "1.0.1";

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS servers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    instructions TEXT,
    owner_name TEXT,
    owner_link TEXT,
    repo_link TEXT,
    command TEXT NOT NULL,
    args TEXT,
    env_vars TEXT,
    date_added TEXT
);
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT
);
";

const ENTRY_COLUMNS: &str = "id, name, description, instructions, owner_name, owner_link, \
                             repo_link, command, args, env_vars, date_added";

/// Handle on the catalog file. Each operation opens its own connection.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Stored catalog version, written as `1.0.0` on first access.
    pub fn get_version(&self) -> Result<String, CatalogError> {
        let conn = self.open()?;
        read_or_init_version(&conn)
    }

    /// Increment the patch component. An unparseable version is reset to `1.0.1`.
    pub fn bump_version(&self) -> Result<String, CatalogError> {
        let conn = self.open()?;
        let current = read_or_init_version(&conn)?;
        let next = next_version(&current);
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('version', ?1)",
            params![next],
        )?;
        log::info!("Marketplace DB version updated from '{}' to '{}'", current, next);
        Ok(next)
    }

    /// Entries whose name or description contains `search` (all entries if `None`
    /// or blank). A missing store is `CatalogError::Missing`, not an empty list.
    pub fn list(&self, search: Option<&str>) -> Result<Vec<CatalogSummary>, CatalogError> {
        let conn = self.open_existing()?;
        let term = search.map(str::trim).filter(|s| !s.is_empty());
        log::debug!("Loading marketplace servers. Search term: '{}'", term.unwrap_or(""));

        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(CatalogSummary {
                name: row.get(0)?,
                description: row.get(1)?,
                owner_name: row.get(2)?,
            })
        };

        let rows = match term {
            None => {
                let mut stmt = conn.prepare("SELECT name, description, owner_name FROM servers ORDER BY id")?;
                let rows = stmt.query_map([], map_row)?.collect::<Result<Vec<_>, _>>()?;
                rows
            }
            Some(term) => {
                let pattern = format!("%{}%", escape_like(term));
                let mut stmt = conn.prepare(
                    "SELECT name, description, owner_name FROM servers
                     WHERE name LIKE ?1 ESCAPE '\\' OR description LIKE ?1 ESCAPE '\\'
                     ORDER BY id",
                )?;
                let rows = stmt.query_map(params![pattern], map_row)?.collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        log::debug!("Loaded {} marketplace servers", rows.len());
        Ok(rows)
    }

    /// Full entry by exact name.
    pub fn get_details(&self, name: &str) -> Result<CatalogEntry, CatalogError> {
        let conn = self.open_existing()?;
        conn.query_row(
            &format!("SELECT {} FROM servers WHERE name = ?1", ENTRY_COLUMNS),
            params![name],
            entry_from_row,
        )
        .optional()?
        .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    /// Insert a new entry and bump the version. Returns the assigned id.
    pub fn add(&self, fields: &CatalogFields) -> Result<i64, CatalogError> {
        let fields = normalize_fields(fields)?;
        let conn = self.open()?;
        let date_added = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();

        conn.execute(
            "INSERT INTO servers (name, description, instructions, owner_name, owner_link,
                                  repo_link, command, args, env_vars, date_added)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                fields.name,
                fields.description,
                fields.instructions,
                fields.owner_name,
                fields.owner_link,
                fields.repo_link,
                fields.command,
                fields.args,
                fields.env_vars,
                date_added,
            ],
        )
        .map_err(|e| duplicate_or(e, &fields.name))?;

        let id = conn.last_insert_rowid();
        drop(conn);
        log::info!("Added server '{}' to marketplace (id {})", fields.name, id);
        self.bump_after_mutation();
        Ok(id)
    }

    /// Update every editable field of the entry with `id`. The name may change.
    pub fn edit(&self, id: i64, fields: &CatalogFields) -> Result<(), CatalogError> {
        let fields = normalize_fields(fields)?;
        let conn = self.open()?;

        let updated = conn
            .execute(
                "UPDATE servers
                 SET name = ?1, description = ?2, instructions = ?3, owner_name = ?4, owner_link = ?5,
                     repo_link = ?6, command = ?7, args = ?8, env_vars = ?9
                 WHERE id = ?10",
                params![
                    fields.name,
                    fields.description,
                    fields.instructions,
                    fields.owner_name,
                    fields.owner_link,
                    fields.repo_link,
                    fields.command,
                    fields.args,
                    fields.env_vars,
                    id,
                ],
            )
            .map_err(|e| duplicate_or(e, &fields.name))?;
        drop(conn);

        if updated == 0 {
            return Err(CatalogError::NotFound(format!("id {}", id)));
        }
        log::info!("Updated marketplace server id {} ('{}')", id, fields.name);
        self.bump_after_mutation();
        Ok(())
    }

    /// Delete by name. `Ok(false)` means no row matched (e.g. already removed).
    pub fn remove(&self, name: &str) -> Result<bool, CatalogError> {
        let conn = self.open()?;
        let deleted = conn.execute("DELETE FROM servers WHERE name = ?1", params![name])?;
        drop(conn);

        if deleted == 0 {
            log::warn!("No marketplace server named '{}' to remove", name);
            return Ok(false);
        }
        log::info!("Removed server '{}' from marketplace", name);
        self.bump_after_mutation();
        Ok(true)
    }

    /// Replace the local file with the published archive.
    ///
    /// The body is checked to be an SQLite database and written through a temp
    /// file, so a failed download leaves the current copy as it was.
    pub fn download_latest(&self, url: &str) -> Result<usize, CatalogError> {
        log::info!("Downloading marketplace DB from {} to {}", url, self.path.display());
        let body = fetch::fetch_bytes(url, fetch::ARCHIVE_TIMEOUT)?;
        if !body.starts_with(SQLITE_HEADER) {
            return Err(CatalogError::InvalidArchive);
        }
        write_atomic(&self.path, &body).map_err(|e| CatalogError::Io(e, self.path.clone()))?;
        log::info!("Database downloaded successfully ({} bytes)", body.len());
        Ok(body.len())
    }

    fn bump_after_mutation(&self) {
        if let Err(e) = self.bump_version() {
            log::warn!("Catalog changed but the version bump failed: {}", e);
        }
    }

    fn open_existing(&self) -> Result<Connection, CatalogError> {
        if !self.exists() {
            return Err(CatalogError::Missing(self.path.clone()));
        }
        self.open()
    }

    fn open(&self) -> Result<Connection, CatalogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::Io(e, parent.to_path_buf()))?;
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }
}

/// Fetch the published catalog version marker.
pub fn check_remote_version(url: &str) -> Result<String, FetchError> {
    let version = fetch::fetch_text(url, fetch::MARKER_TIMEOUT)?;
    log::debug!("Fetched remote catalog version: {}", version);
    Ok(version)
}

/// `MAJOR.MINOR.PATCH` with the patch incremented, or `1.0.1` if `current` is not that shape.
pub fn next_version(current: &str) -> String {
    let parts: Vec<&str> = current.trim().split('.').collect();
    let parsed: Option<Vec<u64>> = if parts.len() == 3 {
        parts.iter().map(|p| p.parse::<u64>().ok()).collect()
    } else {
        None
    };

    match parsed.as_deref() {
        Some([major, minor, patch]) => match patch.checked_add(1) {
            Some(next) => format!("{}.{}.{}", major, minor, next),
            None => FALLBACK_VERSION.to_string(),
        },
        _ => {
            log::warn!("Unexpected version format '{}'; resetting to {}", current, FALLBACK_VERSION);
            FALLBACK_VERSION.to_string()
        }
    }
}

/// Launch spec for a catalog entry, validating the stored args/env text.
pub fn launch_spec_for(entry: &CatalogEntry) -> Result<LaunchSpec, CatalogError> {
    if entry.command.trim().is_empty() {
        return Err(CatalogError::Invalid(format!(
            "server '{}' has no command",
            entry.name
        )));
    }
    let (args, env) = validate_catalog_fields(&entry.args, &entry.env_vars)?;
    Ok(LaunchSpec {
        command: entry.command.clone(),
        args,
        env,
        extra: serde_json::Map::new(),
    })
}

fn read_or_init_version(conn: &Connection) -> Result<String, CatalogError> {
    let stored: Option<Option<String>> = conn
        .query_row("SELECT value FROM metadata WHERE key = 'version'", [], |row| row.get(0))
        .optional()?;

    match stored.flatten() {
        Some(v) => Ok(v),
        None => {
            log::debug!("No version key found in metadata; initializing to {}", DEFAULT_VERSION);
            conn.execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES ('version', ?1)",
                params![DEFAULT_VERSION],
            )?;
            Ok(DEFAULT_VERSION.to_string())
        }
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogEntry> {
    Ok(CatalogEntry {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        instructions: row.get(3)?,
        owner_name: row.get(4)?,
        owner_link: row.get(5)?,
        repo_link: row.get(6)?,
        command: row.get(7)?,
        args: row.get::<_, Option<String>>(8)?.unwrap_or_else(|| "[]".to_string()),
        env_vars: row.get::<_, Option<String>>(9)?.unwrap_or_else(|| "{}".to_string()),
        date_added: row.get(10)?,
    })
}

/// Trim text fields, turn blank optionals into NULL and check args/env decode.
fn normalize_fields(fields: &CatalogFields) -> Result<CatalogFields, CatalogError> {
    let name = fields.name.trim().to_string();
    let command = fields.command.trim().to_string();
    if name.is_empty() {
        return Err(CatalogError::Invalid("server name is required".to_string()));
    }
    if command.is_empty() {
        return Err(CatalogError::Invalid("command is required".to_string()));
    }
    validate_catalog_fields(&fields.args, &fields.env_vars)?;

    let optional = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    let or_default = |v: &str, default: &str| {
        let t = v.trim();
        if t.is_empty() { default.to_string() } else { t.to_string() }
    };

    Ok(CatalogFields {
        name,
        description: optional(&fields.description),
        instructions: optional(&fields.instructions),
        owner_name: optional(&fields.owner_name),
        owner_link: optional(&fields.owner_link),
        repo_link: optional(&fields.repo_link),
        command,
        args: or_default(&fields.args, "[]"),
        env_vars: or_default(&fields.env_vars, "{}"),
    })
}

fn duplicate_or(err: rusqlite::Error, name: &str) -> CatalogError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            CatalogError::DuplicateName(name.to_string())
        }
        _ => CatalogError::Sqlite(err),
    }
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Marketplace database not found at {}", .0.display())]
    Missing(PathBuf),
    #[error("Marketplace server not found: {0}")]
    NotFound(String),
    #[error("A marketplace server named '{0}' already exists")]
    DuplicateName(String),
    #[error("Invalid marketplace entry: {0}")]
    Invalid(String),
    #[error("Invalid marketplace entry: {0}")]
    Fields(#[from] FieldErrors),
    #[error("Downloaded file is not a marketplace database")]
    InvalidArchive,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("I/O error on {}: {}", .1.display(), .0)]
    Io(#[source] std::io::Error, PathBuf),
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::test_server::{closed_url, serve_once};
    use rstest::rstest;

    fn store() -> (tempfile::TempDir, CatalogStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("data/marketplace.db"));
        (dir, store)
    }

    fn fields(name: &str, description: &str) -> CatalogFields {
        let mut f = CatalogFields::new(name, "npx");
        f.description = Some(description.to_string());
        f.owner_name = Some("owner".to_string());
        f.args = r#"["-y", "pkg"]"#.to_string();
        f
    }

    #[rstest]
    #[case("1.0.0", "1.0.1")]
    #[case("2.7.41", "2.7.42")]
    #[case(" 3.0.9 ", "3.0.10")]
    #[case("garbage", "1.0.1")]
    #[case("1.0", "1.0.1")]
    #[case("1.0.x", "1.0.1")]
    #[case("", "1.0.1")]
    fn next_version_cases(#[case] current: &str, #[case] expected: &str) {
        assert_eq!(next_version(current), expected);
    }

    #[test]
    fn version_initializes_once() {
        let (_dir, store) = store();
        assert_eq!(store.get_version().unwrap(), DEFAULT_VERSION);
        assert!(store.exists());
        assert_eq!(store.get_version().unwrap(), DEFAULT_VERSION);
    }

    #[test]
    fn mutations_bump_version_monotonically() {
        let (_dir, store) = store();
        let id = store.add(&fields("alpha", "first")).unwrap();
        assert_eq!(store.get_version().unwrap(), "1.0.1");

        let mut edited = fields("alpha2", "renamed");
        edited.repo_link = Some("https://example.invalid/repo".into());
        store.edit(id, &edited).unwrap();
        assert_eq!(store.get_version().unwrap(), "1.0.2");

        assert!(store.remove("alpha2").unwrap());
        assert_eq!(store.get_version().unwrap(), "1.0.3");

        assert!(!store.remove("alpha2").unwrap());
        assert_eq!(store.get_version().unwrap(), "1.0.3");
    }

    #[test]
    fn list_on_missing_store_is_distinct_from_no_matches() {
        let (_dir, store) = store();
        assert!(matches!(store.list(None), Err(CatalogError::Missing(_))));
        assert!(!store.exists());

        store.get_version().unwrap();
        assert!(store.list(None).unwrap().is_empty());
    }

    #[test]
    fn search_matches_name_or_description_substring() {
        let (_dir, store) = store();
        store.add(&fields("filesystem", "Read local files")).unwrap();
        store.add(&fields("github", "Issues and PRs")).unwrap();
        store.add(&fields("percent", "100% literal")).unwrap();

        let names = |term: Option<&str>| -> Vec<String> {
            store.list(term).unwrap().into_iter().map(|s| s.name).collect()
        };
        assert_eq!(names(None), vec!["filesystem", "github", "percent"]);
        assert_eq!(names(Some("hub")), vec!["github"]);
        assert_eq!(names(Some("local")), vec!["filesystem"]);
        assert_eq!(names(Some("%")), vec!["percent"]);
        assert!(names(Some("nothing-like-this")).is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected_on_add_and_edit() {
        let (_dir, store) = store();
        store.add(&fields("a", "")).unwrap();
        let b = store.add(&fields("b", "")).unwrap();
        let version = store.get_version().unwrap();

        assert!(matches!(store.add(&fields("a", "")), Err(CatalogError::DuplicateName(_))));
        assert!(matches!(store.edit(b, &fields("a", "")), Err(CatalogError::DuplicateName(_))));
        assert_eq!(store.get_version().unwrap(), version);
    }

    #[test]
    fn edit_unknown_id_is_not_found() {
        let (_dir, store) = store();
        store.get_version().unwrap();
        assert!(matches!(store.edit(42, &fields("x", "")), Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn details_round_trip_and_launch_spec() {
        let (_dir, store) = store();
        let mut f = fields("fs", "files");
        f.env_vars = r#"{"ROOT": "/tmp"}"#.to_string();
        f.instructions = Some("  ".to_string());
        store.add(&f).unwrap();

        let entry = store.get_details("fs").unwrap();
        assert_eq!(entry.command, "npx");
        assert_eq!(entry.instructions, None);
        assert!(entry.date_added.is_some());

        let spec = launch_spec_for(&entry).unwrap();
        assert_eq!(spec.args, vec!["-y".to_string(), "pkg".to_string()]);
        assert_eq!(spec.env.get("ROOT").map(String::as_str), Some("/tmp"));

        assert!(matches!(store.get_details("nope"), Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn invalid_fields_are_rejected_before_touching_the_store() {
        let (_dir, store) = store();
        let mut f = fields("bad", "");
        f.args = "not json".into();
        f.env_vars = "[]".into();
        match store.add(&f) {
            Err(CatalogError::Fields(errors)) => {
                assert!(errors.args.is_some());
                assert!(errors.env.is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!store.exists());
    }

    #[test]
    fn download_replaces_file_on_success() {
        let (dir, store) = store();
        let source = CatalogStore::new(dir.path().join("published.db"));
        source.add(&fields("remote", "from upstream")).unwrap();
        let bytes = std::fs::read(source.path()).unwrap();

        let url = serve_once("200 OK", bytes);
        store.download_latest(&format!("{}/marketplace.db", url)).unwrap();
        assert_eq!(store.list(None).unwrap()[0].name, "remote");
        assert_eq!(store.get_version().unwrap(), "1.0.1");
    }

    #[test]
    fn failed_download_leaves_local_copy_intact() {
        let (_dir, store) = store();
        store.add(&fields("local", "mine")).unwrap();
        let before = std::fs::read(store.path()).unwrap();

        let err = store.download_latest(&closed_url()).unwrap_err();
        assert!(matches!(err, CatalogError::Fetch(ref e) if e.is_connection()));

        let url = serve_once("200 OK", b"<html>not a database</html>".to_vec());
        assert!(matches!(store.download_latest(&url), Err(CatalogError::InvalidArchive)));

        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn remote_version_is_trimmed_text() {
        let url = serve_once("200 OK", b"1.0.7\n".to_vec());
        assert_eq!(check_remote_version(&url).unwrap(), "1.0.7");
    }
}
