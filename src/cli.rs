//! CLI argument definitions using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::errors::{ApiFlowError, Result};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable output
    Pretty,
    /// Newline-delimited JSON (for log collectors)
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "apiflow", version, about, long_about = None)]
pub struct Args {
    /// Path to the action configuration file (YAML or JSON)
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Name of the action to perform
    #[arg(value_name = "ACTION")]
    pub action: Option<String>,

    /// Caller-supplied parameter (NAME=VALUE, value parsed as JSON when possible)
    #[arg(long = "param", short = 'p', value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// List available actions and exit
    #[arg(long)]
    pub list: bool,

    /// Validate the configuration without executing anything
    #[arg(long)]
    pub validate: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 30.0)]
    pub timeout: f64,

    /// Maximum nested action depth
    #[arg(long, value_name = "N", default_value_t = 64)]
    pub max_depth: usize,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Enable debug-level logging (overridden by RUST_LOG)
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parse `NAME=VALUE` parameter arguments into a JSON map.
///
/// Values are parsed as JSON when possible so `--param count=3` yields a
/// number and `--param ids=[1,2]` an array; everything else stays a string.
pub fn parse_params(pairs: &[String]) -> Result<indexmap::IndexMap<String, serde_json::Value>> {
    let mut params = indexmap::IndexMap::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            ApiFlowError::Argument(format!("Invalid parameter format: {}. Use NAME=VALUE", pair))
        })?;
        let json_value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        params.insert(key.to_string(), json_value);
    }
    Ok(params)
}
