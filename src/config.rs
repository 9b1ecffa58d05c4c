//! Action configuration model and loading
//!
//! Supports YAML and JSON configuration files describing named actions,
//! their performs, and response-conditioned branching.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::errors::{ApiFlowError, Result};

/// Maximum configuration file size (1 MB) - prevents OOM from malicious files
/// YAML/JSON parsers can expand memory 10-20x, so limit input size
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Default application server URL seeded into vars when the config omits one
pub const DEFAULT_APP_SERVER: &str = "http://localhost:8000";

/// Top-level action configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Configuration format version string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_integrator: Option<String>,

    /// Free-form metadata (title, version, contact, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<JsonValue>,

    /// Named base URLs resolvable by id through `{{supplier_server.url}}`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supplier_servers: Vec<SupplierServer>,

    /// Tags for the configuration as a whole
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// User variables, mutable at runtime through `vars.set`
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub vars: IndexMap<String, JsonValue>,

    /// Constants, immutable after load
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub constants: IndexMap<String, JsonValue>,

    /// Base URL of the application server, seeded into vars at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub my_app_server: Option<String>,

    /// Named actions
    pub actions: IndexMap<String, Action>,
}

/// A named base URL entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierServer {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// A named, ordered sequence of performs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub performs: Vec<PerformSpec>,
}

/// A single step within an action: one command plus optional response handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformSpec {
    /// The command, either a bare string or an object carrying its data
    pub perform: PerformClause,

    /// Command data when `perform` is a bare string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,

    /// Response condition groups evaluated after the command completes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub responses: Vec<ResponseGroup>,
}

/// The two accepted shapes of a perform clause
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PerformClause {
    /// `perform: http.get` with a sibling `data` key
    Command(String),
    /// `perform: {action: http.get, data: {...}}`
    Detailed {
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<JsonValue>,
    },
}

impl PerformSpec {
    /// The `namespace.verb` command string of this perform
    pub fn command(&self) -> &str {
        match &self.perform {
            PerformClause::Command(cmd) => cmd,
            PerformClause::Detailed { action, .. } => action,
        }
    }

    /// The data payload, preferring the clause-embedded form over the sibling key
    pub fn data(&self) -> JsonValue {
        match &self.perform {
            PerformClause::Detailed { data: Some(data), .. } => data.clone(),
            _ => self.data.clone().unwrap_or(JsonValue::Null),
        }
    }
}

/// A response condition group: `is_success`/`is_error` predicates plus the
/// performs to run when the group matches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_success: Option<IndexMap<String, JsonValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<IndexMap<String, JsonValue>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub performs: Vec<PerformSpec>,
}

/// Load a configuration from a file (YAML or JSON)
///
/// File size is checked before loading to keep parser memory expansion bounded.
pub fn load_config(path: &Path) -> Result<ApiConfig> {
    let metadata = fs::metadata(path)?;

    let file_size = metadata.len();
    if file_size > MAX_CONFIG_FILE_SIZE {
        return Err(ApiFlowError::Config(format!(
            "Config file too large: {} bytes (max {} bytes)",
            file_size, MAX_CONFIG_FILE_SIZE
        )));
    }

    let content = fs::read_to_string(path)?;

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let config: ApiConfig = match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .map_err(|e| ApiFlowError::Config(format!("Failed to parse YAML config: {}", e)))?,
        "json" => serde_json::from_str(&content)
            .map_err(|e| ApiFlowError::Config(format!("Failed to parse JSON config: {}", e)))?,
        _ => serde_yaml::from_str(&content)
            .or_else(|_| serde_json::from_str(&content))
            .map_err(|e| ApiFlowError::Config(format!("Failed to parse config: {}", e)))?,
    };

    validate_config_structure(&config)?;

    Ok(config)
}

/// Validate basic configuration structure
fn validate_config_structure(config: &ApiConfig) -> Result<()> {
    if config.actions.is_empty() {
        return Err(ApiFlowError::Config(
            "Config must define at least one action".to_string(),
        ));
    }

    for (name, action) in &config.actions {
        for (i, perform) in action.performs.iter().enumerate() {
            if perform.command().is_empty() {
                return Err(ApiFlowError::Config(format!(
                    "Action '{}', perform {} has an empty command",
                    name,
                    i + 1
                )));
            }
        }
    }

    Ok(())
}

impl ApiConfig {
    /// Resolve a supplier server entry by id
    pub fn supplier_server_by_id(&self, id: &str) -> Option<&SupplierServer> {
        self.supplier_servers.iter().find(|s| s.id == id)
    }
}
