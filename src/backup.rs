//! Backups and crash-safe writes for files the manager rewrites.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Prefix of every backup file name; the suffix is the source's mtime in epoch seconds.
pub const BACKUP_PREFIX: &str = "claude_desktop_config_backup_";

/// Copy `source` into `backup_dir`, named after the source's last-modified time.
///
/// Saving an unchanged file twice yields the same name, so the second copy
/// replaces the first.
pub fn backup_file(source: &Path, backup_dir: &Path) -> std::io::Result<PathBuf> {
    let modified = std::fs::metadata(source)?.modified()?;
    let secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    std::fs::create_dir_all(backup_dir)?;
    let target = backup_dir.join(backup_name(secs));
    std::fs::copy(source, &target)?;
    log::debug!("Backup created: {}", target.display());
    Ok(target)
}

pub fn backup_name(mtime_secs: u64) -> String {
    format!("{}{}.json", BACKUP_PREFIX, mtime_secs)
}

/// Write `contents` to `path` through a temp file in the same directory and a rename,
/// so readers see either the old or the new file, never a partial one.
/// The parent directory is created if missing.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
