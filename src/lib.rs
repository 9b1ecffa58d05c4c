//! apiflow: a declarative HTTP action runner
//!
//! Actions are declared in YAML or JSON and executed as ordered sequences of
//! performs: HTTP requests, log statements, variable manipulation, and nested
//! action invocations. `{{expr}}` templates resolve against a layered
//! variable scope and the latest HTTP response, and response condition groups
//! branch into follow-up performs after each request.

pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod status;

pub use config::{load_config, ApiConfig};
pub use engine::{ActionRunner, HttpResponse, RunnerOptions};
pub use errors::{ApiFlowError, Result};
