//! Path resolution for the manager's own files and for the host application.
//!
//! Tool-owned paths use env vars when set, otherwise home/XDG defaults.
//! Host paths come from user preferences first, then OS defaults.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::prefs::UserPreferences;

/// Directory name the host application uses under the platform config root.
pub const HOST_APP_DIR: &str = "Claude";

/// File name of the host application's config file.
pub const HOST_CONFIG_FILE: &str = "claude_desktop_config.json";

/// Platform family, used to pick default locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
}

impl Platform {
    /// The platform this binary was built for. Unix-likes other than macOS count as Linux.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    /// Executable locations probed after any user overrides, in order.
    pub fn default_executable_paths(self) -> &'static [&'static str] {
        match self {
            Platform::MacOs => &["/Applications/Claude.app", "~/Applications/Claude.app"],
            Platform::Windows => &[
                r"%LOCALAPPDATA%\AnthropicClaude\Claude.exe",
                r"%LOCALAPPDATA%\Programs\Claude\Claude.exe",
                r"%PROGRAMFILES%\Claude\Claude.exe",
                r"%PROGRAMFILES(X86)%\Claude\Claude.exe",
            ],
            Platform::Linux => &[
                "/usr/bin/claude",
                "/usr/local/bin/claude",
                "~/.local/bin/claude",
                "/opt/Claude/claude",
                "/snap/bin/claude",
            ],
        }
    }
}

/// Resolved paths for files the manager owns.
#[derive(Debug, Clone)]
pub struct Paths {
    pub preferences: PathBuf,
    pub backup_dir: PathBuf,
    pub catalog_db: PathBuf,
}

impl Paths {
    /// Resolve paths from environment, falling back to home/XDG defaults.
    pub fn resolve() -> Self {
        let home = dirs::home_dir();

        let preferences = resolve_path(
            "MCPM_PREFS_PATH",
            home.as_ref().map(|h| h.join(".mcp_manager_config.json")),
            "~/.mcp_manager_config.json",
        );
        let backup_dir = resolve_path(
            "MCPM_BACKUP_DIR",
            home.as_ref().map(|h| h.join(".mcp_manager_backups")),
            "~/.mcp_manager_backups",
        );
        let catalog_db = resolve_path(
            "MCPM_CATALOG_PATH",
            dirs::data_local_dir().map(|p| p.join("mcp_manager/marketplace.db")),
            "~/.local/share/mcp_manager/marketplace.db",
        );

        Self {
            preferences,
            backup_dir,
            catalog_db,
        }
    }

    /// Build paths rooted in a single directory. Used by tests and portable setups.
    pub fn in_dir(root: &Path) -> Self {
        Self {
            preferences: root.join("mcp_manager_config.json"),
            backup_dir: root.join("backups"),
            catalog_db: root.join("marketplace.db"),
        }
    }
}

/// Path to the host application's config file.
///
/// A non-blank override from the preferences wins and is returned after token
/// expansion, without checking that it exists.
pub fn resolve_config_path(prefs: &UserPreferences) -> PathBuf {
    resolve_config_path_for(prefs, Platform::current())
}

pub fn resolve_config_path_for(prefs: &UserPreferences, platform: Platform) -> PathBuf {
    if let Some(custom) = prefs.config_path_override() {
        return expand_path(custom);
    }
    default_config_path(platform)
}

/// OS default location of the host config file.
pub fn default_config_path(platform: Platform) -> PathBuf {
    match platform {
        Platform::MacOs => home_or_tilde()
            .join("Library/Application Support")
            .join(HOST_APP_DIR)
            .join(HOST_CONFIG_FILE),
        Platform::Windows => {
            let appdata = std::env::var("APPDATA").unwrap_or_default();
            PathBuf::from(appdata).join(HOST_APP_DIR).join(HOST_CONFIG_FILE)
        }
        Platform::Linux => home_or_tilde()
            .join(".config")
            .join(HOST_APP_DIR)
            .join(HOST_CONFIG_FILE),
    }
}

/// Executable candidates: user overrides in listed order, then platform defaults.
/// Callers probe in order and use the first that exists.
pub fn candidate_executable_paths(prefs: &UserPreferences) -> Vec<PathBuf> {
    candidate_executable_paths_for(prefs, Platform::current())
}

pub fn candidate_executable_paths_for(prefs: &UserPreferences, platform: Platform) -> Vec<PathBuf> {
    prefs
        .executable_path_overrides()
        .iter()
        .map(String::as_str)
        .filter(|p| !p.trim().is_empty())
        .chain(platform.default_executable_paths().iter().copied())
        .map(expand_path)
        .collect()
}

/// First candidate that exists on disk.
pub fn first_existing(candidates: &[PathBuf]) -> Option<&PathBuf> {
    candidates.iter().find(|p| p.exists())
}

static PERCENT_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%([A-Za-z_][A-Za-z0-9_()]*)%").expect("static pattern")
});

/// Expand `~`, `$VAR`, `${VAR}` and `%VAR%` tokens. Unknown variables stay as written.
pub fn expand_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let percent = PERCENT_VAR.replace_all(trimmed, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });
    let expanded = shellexpand::full_with_context_no_errors(
        percent.as_ref(),
        || dirs::home_dir().map(|h| h.to_string_lossy().into_owned()),
        |var| std::env::var(var).ok(),
    );
    PathBuf::from(expanded.as_ref())
}

fn resolve_path(env_var: &str, default: Option<PathBuf>, fallback: &str) -> PathBuf {
    if let Ok(val) = std::env::var(env_var) {
        let trimmed = val.trim();
        if !trimmed.is_empty() {
            return expand_path(trimmed);
        }
    }
    default.unwrap_or_else(|| expand_path(fallback))
}

fn home_or_tilde() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs_with(config: &str, exes: &[&str]) -> UserPreferences {
        let mut prefs = UserPreferences::default();
        prefs.set_config_path_override(config);
        prefs.set_executable_path_overrides(exes.iter().map(|s| s.to_string()).collect());
        prefs
    }

    #[test]
    fn override_wins_and_is_not_checked_for_existence() {
        let prefs = prefs_with("/definitely/not/here/config.json", &[]);
        assert_eq!(
            resolve_config_path_for(&prefs, Platform::Linux),
            PathBuf::from("/definitely/not/here/config.json")
        );
    }

    #[test]
    fn blank_override_uses_platform_default() {
        let prefs = prefs_with("   ", &[]);
        let linux = resolve_config_path_for(&prefs, Platform::Linux);
        assert!(linux.ends_with(".config/Claude/claude_desktop_config.json"));
        let mac = resolve_config_path_for(&prefs, Platform::MacOs);
        assert!(mac.ends_with("Library/Application Support/Claude/claude_desktop_config.json"));
        let win = resolve_config_path_for(&prefs, Platform::Windows);
        assert!(win.ends_with("Claude/claude_desktop_config.json"));
    }

    #[test]
    fn tilde_and_env_tokens_expand() {
        let home = dirs::home_dir().expect("home dir");
        assert_eq!(expand_path("~/x.json"), home.join("x.json"));

        std::env::set_var("MCPM_TEST_EXPAND_DIR", "/tmp/mcpm-expand");
        assert_eq!(
            expand_path("$MCPM_TEST_EXPAND_DIR/a.json"),
            PathBuf::from("/tmp/mcpm-expand/a.json")
        );
        assert_eq!(
            expand_path("%MCPM_TEST_EXPAND_DIR%/b.json"),
            PathBuf::from("/tmp/mcpm-expand/b.json")
        );
    }

    #[test]
    fn unknown_variables_are_left_verbatim() {
        assert_eq!(
            expand_path("%MCPM_SURELY_UNSET_VAR%/c.json"),
            PathBuf::from("%MCPM_SURELY_UNSET_VAR%/c.json")
        );
    }

    #[test]
    fn executable_candidates_put_overrides_first() {
        let prefs = prefs_with("", &["/custom/claude", "", "/other/claude"]);
        let candidates = candidate_executable_paths_for(&prefs, Platform::Linux);
        assert_eq!(candidates[0], PathBuf::from("/custom/claude"));
        assert_eq!(candidates[1], PathBuf::from("/other/claude"));
        assert_eq!(candidates[2], PathBuf::from("/usr/bin/claude"));
        assert_eq!(
            candidates.len(),
            2 + Platform::Linux.default_executable_paths().len()
        );
    }

    #[test]
    fn first_existing_probes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let second = dir.path().join("second");
        let third = dir.path().join("third");
        std::fs::write(&second, "").unwrap();
        std::fs::write(&third, "").unwrap();
        let candidates = vec![dir.path().join("missing"), second.clone(), third];
        assert_eq!(first_existing(&candidates), Some(&second));
        assert_eq!(first_existing(&[dir.path().join("none")]), None);
    }

    #[test]
    fn in_dir_roots_everything_under_one_directory() {
        let paths = Paths::in_dir(Path::new("/data"));
        assert_eq!(paths.backup_dir, PathBuf::from("/data/backups"));
        assert_eq!(paths.catalog_db, PathBuf::from("/data/marketplace.db"));
    }
}
