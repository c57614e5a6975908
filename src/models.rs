//! Data structures for the registry file and the marketplace catalog.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One declared server under `mcpServers`.
///
/// Empty `command`/`args`/`env` are omitted on write: on disk an absent key means
/// "no args"/"no env". Keys this struct does not know (e.g. `type`, `url`)
/// are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LaunchSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env<I, K, V>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }
}

/// Registry status of a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Active,
    Paused,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::Active => write!(f, "Active"),
            ServerStatus::Paused => write!(f, "Paused"),
        }
    }
}

/// A registry row for display. Orphaned pause records have no spec.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerRow {
    pub name: String,
    pub status: ServerStatus,
    pub spec: Option<LaunchSpec>,
}

impl ServerRow {
    pub fn is_orphan(&self) -> bool {
        self.spec.is_none()
    }
}

/// A row of the marketplace `servers` table.
///
/// `args` and `env_vars` hold JSON text; they are validated when turned into a
/// [`LaunchSpec`], not by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub owner_name: Option<String>,
    pub owner_link: Option<String>,
    pub repo_link: Option<String>,
    pub command: String,
    pub args: String,
    pub env_vars: String,
    pub date_added: Option<String>,
}

/// Editable fields of a catalog entry (everything except id and date).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogFields {
    pub name: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub owner_name: Option<String>,
    pub owner_link: Option<String>,
    pub repo_link: Option<String>,
    pub command: String,
    pub args: String,
    pub env_vars: String,
}

impl CatalogFields {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: "[]".to_string(),
            env_vars: "{}".to_string(),
            ..Self::default()
        }
    }
}

/// Listing row: name, description, owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogSummary {
    pub name: String,
    pub description: Option<String>,
    pub owner_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_args_and_env_are_omitted() {
        let spec = LaunchSpec::new("npx");
        assert_eq!(serde_json::to_value(&spec).unwrap(), json!({"command": "npx"}));
    }

    #[test]
    fn unknown_keys_survive() {
        let raw = json!({"command": "uvx", "type": "stdio", "args": ["a"]});
        let spec: LaunchSpec = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(spec.extra.get("type"), Some(&json!("stdio")));
        assert_eq!(serde_json::to_value(&spec).unwrap(), raw);
    }

    #[test]
    fn empty_object_decodes_to_blank_spec() {
        let spec: LaunchSpec = serde_json::from_value(json!({})).unwrap();
        assert_eq!(spec, LaunchSpec::default());
    }
}
