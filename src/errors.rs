//! Error types for apiflow

use thiserror::Error;

/// Main error type for apiflow
#[derive(Error, Debug)]
pub enum ApiFlowError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Action '{0}' not found in config")]
    ActionNotFound(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid command format: {0}")]
    InvalidCommand(String),

    #[error("Unknown response condition: {0}")]
    UnknownCondition(String),

    #[error("Recursion limit of {limit} exceeded while performing action '{action}'")]
    RecursionLimit { action: String, limit: usize },

    #[error("Invalid argument: {0}")]
    Argument(String),
}

pub type Result<T> = std::result::Result<T, ApiFlowError>;
