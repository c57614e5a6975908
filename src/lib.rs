//! mcpm - MCP Manager
//!
//! Manages the MCP server declarations in Claude Desktop's config file (with
//! pause/resume, backups and import) and a local marketplace catalog synced
//! from a published SQLite archive.

pub mod backup;
pub mod catalog;
pub mod fetch;
pub mod import;
pub mod manager;
pub mod models;
pub mod paths;
pub mod prefs;
pub mod registry;
pub mod restart;
pub mod tasks;
pub mod update;

pub use catalog::{CatalogError, CatalogStore};
pub use fetch::FetchError;
pub use import::{validate_catalog_fields, validate_server_import, ImportError, ImportedServer};
pub use manager::{Endpoints, Manager, ManagerError, StartupReport};
pub use models::{CatalogEntry, CatalogFields, CatalogSummary, LaunchSpec, ServerRow, ServerStatus};
pub use paths::{Paths, Platform};
pub use prefs::{PrefsError, UserPreferences};
pub use registry::{AddOutcome, LoadOutcome, RegistryError, RegistryStore, SaveSummary};
pub use tasks::{BackgroundTasks, TaskEvent};
pub use update::{UpdateError, VersionCheck};
