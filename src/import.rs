//! Validation of externally supplied JSON: server imports and catalog args/env fields.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::models::{CatalogFields, LaunchSpec};
use crate::registry::SERVERS_KEY;

/// A server pulled out of an import fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedServer {
    pub name: String,
    pub spec: LaunchSpec,
    /// Other entries in the container, in document order. Only the first entry is imported.
    pub ignored: Vec<String>,
}

/// Parse `{"mcpServers": {"<name>": {"command": ..., "args": [...], "env": {...}}}}`.
///
/// The first entry in document order is taken; the rest are listed in `ignored`.
/// Type mismatches are rejected per field rather than coerced; `args` and `env`
/// are checked before `command`.
pub fn validate_server_import(json_text: &str) -> Result<ImportedServer, ImportError> {
    let container = servers_container(json_text)?;

    let mut names = container.keys();
    let name = names.next().ok_or(ImportError::EmptyContainer)?.clone();
    let ignored: Vec<String> = names.cloned().collect();
    if !ignored.is_empty() {
        log::info!(
            "Multiple servers found in JSON; importing the first one: '{}' (ignored: {})",
            name,
            ignored.join(", ")
        );
    }

    let entry = container
        .get(&name)
        .and_then(Value::as_object)
        .ok_or_else(|| field_error(&name, "entry", "must be an object"))?;

    let args = match entry.get("args") {
        None => Vec::new(),
        Some(v) => args_from_value(v).map_err(|problem| field_error(&name, "args", &problem))?,
    };

    let env = match entry.get("env") {
        None => IndexMap::new(),
        Some(v) => env_from_value(v).map_err(|problem| field_error(&name, "env", &problem))?,
    };

    let command = match entry.get("command") {
        None => return Err(field_error(&name, "command", "is missing")),
        Some(Value::String(c)) if !c.trim().is_empty() => c.clone(),
        Some(Value::String(_)) => return Err(field_error(&name, "command", "must not be empty")),
        Some(_) => return Err(field_error(&name, "command", "must be a string")),
    };

    Ok(ImportedServer {
        name,
        spec: LaunchSpec {
            command,
            args,
            env,
            extra: Map::new(),
        },
        ignored,
    })
}

/// Decode the catalog's JSON-text `args` and `env_vars` columns.
///
/// Both fields are checked independently; any failure fails the whole call
/// but the error reports each field's problem separately. Blank text counts
/// as an empty list/object.
pub fn validate_catalog_fields(
    raw_args: &str,
    raw_env: &str,
) -> Result<(Vec<String>, IndexMap<String, String>), FieldErrors> {
    let args = parse_field(raw_args, "[]").and_then(|v| args_from_value(&v));
    let env = parse_field(raw_env, "{}").and_then(|v| env_from_value(&v));

    match (args, env) {
        (Ok(args), Ok(env)) => Ok((args, env)),
        (args, env) => Err(FieldErrors {
            args: args.err(),
            env: env.err(),
        }),
    }
}

/// Fill catalog fields (name, command, args, env) from an `mcpServers` fragment.
/// Descriptive fields of `fields` are left as they are.
pub fn catalog_fields_from_server_json(
    json_text: &str,
    fields: &mut CatalogFields,
) -> Result<ImportedServer, ImportError> {
    let imported = validate_server_import(json_text)?;
    fields.name = imported.name.clone();
    fields.command = imported.spec.command.clone();
    fields.args = Value::from(imported.spec.args.clone()).to_string();
    fields.env_vars = Value::Object(
        imported
            .spec
            .env
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
    .to_string();
    Ok(imported)
}

fn servers_container(json_text: &str) -> Result<Map<String, Value>, ImportError> {
    let trimmed = json_text.trim();
    if trimmed.is_empty() {
        return Err(ImportError::Empty);
    }

    let data: Value = serde_json::from_str(trimmed).map_err(ImportError::Parse)?;
    let Value::Object(mut top) = data else {
        return Err(ImportError::MissingContainer);
    };

    match top.remove(SERVERS_KEY) {
        None => Err(ImportError::MissingContainer),
        Some(Value::Object(servers)) if !servers.is_empty() => Ok(servers),
        Some(_) => Err(ImportError::EmptyContainer),
    }
}

fn parse_field(raw: &str, empty: &str) -> Result<Value, String> {
    let text = if raw.trim().is_empty() { empty } else { raw };
    serde_json::from_str(text).map_err(|e| format!("contains invalid JSON: {}", e))
}

fn args_from_value(value: &Value) -> Result<Vec<String>, String> {
    let items = value.as_array().ok_or("must be a list")?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_str()
                .map(String::from)
                .ok_or_else(|| format!("item {} must be a string", i))
        })
        .collect()
}

fn env_from_value(value: &Value) -> Result<IndexMap<String, String>, String> {
    let object = value.as_object().ok_or("must be an object")?;
    object
        .iter()
        .map(|(k, v)| {
            v.as_str()
                .map(|s| (k.clone(), s.to_string()))
                .ok_or_else(|| format!("value of '{}' must be a string", k))
        })
        .collect()
}

fn field_error(server: &str, field: &'static str, problem: &str) -> ImportError {
    ImportError::Field {
        server: server.to_string(),
        field,
        problem: problem.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("JSON input is empty")]
    Empty,
    #[error("Invalid JSON: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("JSON must be an object with an 'mcpServers' key")]
    MissingContainer,
    #[error("'mcpServers' must be a non-empty object")]
    EmptyContainer,
    #[error("Server '{server}': '{field}' {problem}")]
    Field {
        server: String,
        field: &'static str,
        problem: String,
    },
}

/// Per-field problems with catalog args/env text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldErrors {
    pub args: Option<String>,
    pub env: Option<String>,
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.args, &self.env) {
            (Some(a), Some(e)) => write!(f, "Arguments {}; Environment variables {}", a, e),
            (Some(a), None) => write!(f, "Arguments {}", a),
            (None, Some(e)) => write!(f, "Environment variables {}", e),
            (None, None) => write!(f, "Invalid arguments or environment variables"),
        }
    }
}

impl std::error::Error for FieldErrors {}
