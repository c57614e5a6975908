//! The application context: preferences, registry, catalog and endpoints owned
//! together and handed by `&mut` to each operation.

use std::path::{Path, PathBuf};

use crate::catalog::{self, CatalogError, CatalogStore};
use crate::import::{self, ImportError};
use crate::paths::{self, Paths, Platform};
use crate::prefs::{PrefsError, PrefsSource, UserPreferences};
use crate::registry::{AddOutcome, LoadOutcome, RegistryError, RegistryStore, SaveSummary};
use crate::restart::{self, RestartError, RestartPlan};
use crate::tasks::BackgroundTasks;

pub const DEFAULT_APP_VERSION_URL: &str =
    "https://raw.githubusercontent.com/dawid-ai/MCP-manager/refs/heads/feat/marketplace-and-version-check/mcp_manager_ver.txt";
pub const DEFAULT_CATALOG_VERSION_URL: &str =
    "https://raw.githubusercontent.com/dawid-ai/MCP-manager/refs/heads/feat/marketplace-and-version-check/marketplace_ver.txt";
pub const DEFAULT_CATALOG_URL: &str =
    "https://github.com/dawid-ai/MCP-manager/raw/refs/heads/feat/marketplace-and-version-check/marketplace.db";
pub const RELEASES_URL: &str = "https://github.com/dawid-ai/MCP-manager";

/// Remote endpoints. All are advisory; none is needed for registry work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub app_version: String,
    pub catalog_version: String,
    pub catalog_archive: String,
    pub releases: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            app_version: DEFAULT_APP_VERSION_URL.to_string(),
            catalog_version: DEFAULT_CATALOG_VERSION_URL.to_string(),
            catalog_archive: DEFAULT_CATALOG_URL.to_string(),
            releases: RELEASES_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Published URLs, each replaceable through an environment variable.
    pub fn resolve() -> Self {
        let defaults = Self::default();
        Self {
            app_version: env_or("MCPM_APP_VERSION_URL", defaults.app_version),
            catalog_version: env_or("MCPM_CATALOG_VERSION_URL", defaults.catalog_version),
            catalog_archive: env_or("MCPM_CATALOG_URL", defaults.catalog_archive),
            releases: defaults.releases,
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

/// What happened during [`Manager::open`]. Failures here are reported, not fatal.
#[derive(Debug)]
pub struct StartupReport {
    /// An unreadable preferences file is left in place and defaults are used.
    pub prefs: Result<PrefsSource, PrefsError>,
    pub config_path: PathBuf,
    pub load: Result<LoadOutcome, RegistryError>,
    /// `None` when no local catalog exists yet.
    pub catalog_version: Option<String>,
    pub catalog_entries: Option<usize>,
}

/// Result of [`Manager::import_server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub name: String,
    pub outcome: AddOutcome,
    /// Further servers in the fragment that were not imported.
    pub ignored: Vec<String>,
}

pub struct Manager {
    paths: Paths,
    platform: Platform,
    prefs: UserPreferences,
    config_path: PathBuf,
    registry: RegistryStore,
    catalog: CatalogStore,
    endpoints: Endpoints,
}

impl Manager {
    /// Start-up sequence: preferences, host config path, registry load, local
    /// catalog version and size.
    pub fn open(paths: Paths, endpoints: Endpoints) -> (Self, StartupReport) {
        Self::open_for(paths, endpoints, Platform::current())
    }

    pub fn open_for(paths: Paths, endpoints: Endpoints, platform: Platform) -> (Self, StartupReport) {
        let (prefs, prefs_source) = match UserPreferences::load_or_create(&paths.preferences) {
            Ok((prefs, source)) => (prefs, Ok(source)),
            Err(e) => {
                log::warn!("{}; using default preferences", e);
                (UserPreferences::default(), Err(e))
            }
        };
        let config_path = paths::resolve_config_path_for(&prefs, platform);
        log::debug!("Config file path: {}", config_path.display());

        let mut manager = Self {
            registry: RegistryStore::new(&paths.backup_dir),
            catalog: CatalogStore::new(&paths.catalog_db),
            paths,
            platform,
            prefs,
            config_path,
            endpoints,
        };

        let load = manager.reload();
        if let Err(e) = &load {
            log::error!("Failed to load config: {}", e);
        }

        let (catalog_version, catalog_entries) = manager.catalog_status();
        let report = StartupReport {
            prefs: prefs_source,
            config_path: manager.config_path.clone(),
            load,
            catalog_version,
            catalog_entries,
        };
        (manager, report)
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn prefs(&self) -> &UserPreferences {
        &self.prefs
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RegistryStore {
        &mut self.registry
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn is_dirty(&self) -> bool {
        self.registry.is_dirty()
    }

    /// Reload the host config. Pending changes are discarded.
    pub fn reload(&mut self) -> Result<LoadOutcome, RegistryError> {
        self.registry.load(&self.config_path)
    }

    pub fn save(&mut self) -> Result<SaveSummary, RegistryError> {
        self.registry.save(&self.config_path)
    }

    pub fn backup(&self) -> Result<PathBuf, RegistryError> {
        self.registry.backup(&self.config_path)
    }

    /// Local catalog version and entry count, both `None` if there is no local catalog.
    pub fn catalog_status(&self) -> (Option<String>, Option<usize>) {
        if !self.catalog.exists() {
            log::info!("Marketplace database not found at {}", self.catalog.path().display());
            return (None, None);
        }
        let version = self
            .catalog
            .get_version()
            .map_err(|e| log::warn!("Could not read marketplace version: {}", e))
            .ok();
        let count = self
            .catalog
            .list(None)
            .map(|rows| rows.len())
            .map_err(|e| log::warn!("Could not list marketplace servers: {}", e))
            .ok();
        (version, count)
    }

    /// Add the first server of an `mcpServers` fragment to the registry.
    pub fn import_server(&mut self, json_text: &str, overwrite: bool) -> Result<ImportReport, ManagerError> {
        let imported = import::validate_server_import(json_text)?;
        let outcome = self.registry.add(&imported.name, imported.spec, overwrite)?;
        log::info!("Imported server '{}'", imported.name);
        Ok(ImportReport {
            name: imported.name,
            outcome,
            ignored: imported.ignored,
        })
    }

    /// Add a catalog entry to the registry as an Active server.
    pub fn install_from_catalog(&mut self, name: &str, overwrite: bool) -> Result<AddOutcome, ManagerError> {
        let entry = self.catalog.get_details(name)?;
        let spec = catalog::launch_spec_for(&entry)?;
        let outcome = self.registry.add(&entry.name, spec, overwrite)?;
        log::info!("Installed '{}' from marketplace", entry.name);
        Ok(outcome)
    }

    /// Point at a different host config file and load it.
    ///
    /// Refused while there are unsaved changes unless `force` is set. The new
    /// path is stored in the preferences; a blank path restores the OS default.
    pub fn switch_config_path(&mut self, raw_path: &str, force: bool) -> Result<LoadOutcome, ManagerError> {
        self.ensure_clean(force)?;
        let mut prefs = self.prefs.clone();
        prefs.set_config_path_override(raw_path);
        self.adopt_prefs(prefs)
    }

    /// Restore default preferences, then reload from the resulting config path.
    pub fn reset_preferences(&mut self, force: bool) -> Result<LoadOutcome, ManagerError> {
        self.ensure_clean(force)?;
        let outcome = self.adopt_prefs(UserPreferences::default())?;
        log::info!("Settings reset to defaults");
        Ok(outcome)
    }

    /// Append an executable location to the preferences.
    pub fn add_executable_path(&mut self, raw_path: &str) -> Result<(), PrefsError> {
        let raw_path = raw_path.trim();
        let mut current = self.prefs.executable_path_overrides();
        if !raw_path.is_empty() && !current.iter().any(|p| p == raw_path) {
            current.push(raw_path.to_string());
        }
        self.set_executable_paths(current)
    }

    pub fn set_executable_paths(&mut self, paths: Vec<String>) -> Result<(), PrefsError> {
        self.prefs.set_executable_path_overrides(paths);
        self.prefs.save(&self.paths.preferences)
    }

    pub fn executable_candidates(&self) -> Vec<PathBuf> {
        paths::candidate_executable_paths_for(&self.prefs, self.platform)
    }

    pub fn restart_plan(&self) -> Result<RestartPlan, RestartError> {
        restart::plan_restart(self.platform, &self.executable_candidates())
    }

    /// Start the app and catalog version checks in the background.
    pub fn start_version_checks(&self, tasks: &mut BackgroundTasks) -> std::io::Result<()> {
        tasks.check_app_version(self.endpoints.app_version.clone())?;
        let local = if self.catalog.exists() {
            self.catalog.get_version().ok()
        } else {
            None
        };
        tasks.check_catalog_version(local, self.endpoints.catalog_version.clone())
    }

    fn ensure_clean(&self, force: bool) -> Result<(), ManagerError> {
        if self.registry.is_dirty() && !force {
            return Err(ManagerError::UnsavedChanges);
        }
        Ok(())
    }

    /// Load the config file `prefs` points at, then commit prefs, path and
    /// registry together. Nothing changes if the load or the prefs save fails.
    fn adopt_prefs(&mut self, prefs: UserPreferences) -> Result<LoadOutcome, ManagerError> {
        let config_path = paths::resolve_config_path_for(&prefs, self.platform);
        let mut registry = RegistryStore::new(&self.paths.backup_dir);
        let outcome = registry.load(&config_path)?;
        prefs.save(&self.paths.preferences)?;

        log::info!("Using config file {}", config_path.display());
        self.prefs = prefs;
        self.config_path = config_path;
        self.registry = registry;
        Ok(outcome)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("There are unsaved changes; save them first or force the operation")]
    UnsavedChanges,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Prefs(#[from] PrefsError),
}
