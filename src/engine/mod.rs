//! Declarative action execution
//!
//! The engine turns a loaded [`crate::config::ApiConfig`] into running
//! behavior: [`scope`] merges the per-call variable layers, [`template`]
//! resolves `{{expr}}` placeholders, [`response`] wraps completed HTTP
//! responses, [`conditions`] evaluates response predicates, and [`runner`]
//! drives the perform loop.

pub mod conditions;
pub mod response;
pub mod runner;
pub mod scope;
pub mod template;

pub use response::HttpResponse;
pub use runner::{parse_command, ActionRunner, Namespace, RunnerOptions};
pub use scope::Scope;
pub use template::{render, render_string, RenderContext};
