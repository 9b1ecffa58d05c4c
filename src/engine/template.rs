//! Template rendering
//!
//! Resolves `{{expr}}` placeholders in strings and structures against the
//! layered variable scope and the latest HTTP response. Unresolvable keys
//! render to the literal `{{ key }}` sentinel instead of failing, so a bad
//! parameter stays visible in the output rather than aborting the action.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::config::SupplierServer;
use crate::engine::response::HttpResponse;
use crate::engine::scope::{lookup_in_map, lookup_path, path_segments, Scope};

// Cached regex patterns to avoid recompilation in hot paths
static TEMPLATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{([^{}]+?)\}\}").unwrap());
static WHOLE_TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{([^{}]+?)\}\}$").unwrap());

/// Everything a template expression can resolve against during one perform.
pub struct RenderContext<'a> {
    /// Merged per-call scope (constants < vars < params at merge time)
    pub scope: &'a Scope,
    /// Live persistent vars, consulted after the per-call scope
    pub vars: &'a IndexMap<String, JsonValue>,
    /// Constants, consulted last
    pub constants: &'a IndexMap<String, JsonValue>,
    /// Latest HTTP response for `response.*` expressions
    pub response: Option<&'a HttpResponse>,
    /// Named base URLs for `supplier_server.url`
    pub supplier_servers: &'a [SupplierServer],
}

/// The literal placeholder returned for an unresolved key.
pub fn sentinel(key: &str) -> String {
    format!("{{{{ {} }}}}", key)
}

/// Render a template value against the context.
///
/// Strings are interpolated, mappings and sequences recurse preserving keys
/// and order, all other scalars pass through unchanged.
pub fn render(template: &JsonValue, ctx: &RenderContext) -> JsonValue {
    match template {
        JsonValue::String(s) => render_string(s, ctx),
        JsonValue::Object(map) => {
            let mut rendered = serde_json::Map::new();
            for (key, value) in map {
                rendered.insert(key.clone(), render(value, ctx));
            }
            JsonValue::Object(rendered)
        }
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|item| render(item, ctx)).collect())
        }
        scalar => scalar.clone(),
    }
}

/// Render a single string template.
///
/// A string that is exactly one placeholder resolves to the underlying value
/// (so lists and maps survive for bulk iteration); placeholders embedded in a
/// larger string are stringified in place. A string without delimiters is
/// returned unchanged.
pub fn render_string(template: &str, ctx: &RenderContext) -> JsonValue {
    if !template.contains("{{") {
        return JsonValue::String(template.to_string());
    }

    if let Some(caps) = WHOLE_TEMPLATE_RE.captures(template) {
        return resolve(caps[1].trim(), ctx);
    }

    let rendered = TEMPLATE_RE.replace_all(template, |caps: &regex::Captures| {
        stringify(&resolve(caps[1].trim(), ctx))
    });
    JsonValue::String(rendered.into_owned())
}

/// Resolve one template expression, falling back to the sentinel.
pub fn resolve(key: &str, ctx: &RenderContext) -> JsonValue {
    match resolve_key(key, ctx) {
        Some(value) => value,
        None => {
            warn!(key, "template key unresolved, leaving placeholder");
            JsonValue::String(sentinel(key))
        }
    }
}

fn resolve_key(key: &str, ctx: &RenderContext) -> Option<JsonValue> {
    if let Some(path) = key.strip_prefix("response.") {
        return resolve_response(path, ctx);
    }

    if key == "supplier_server.url" {
        return resolve_supplier_server(ctx);
    }

    // Three-tier fallback: per-call scope, then live vars, then constants.
    // Lookups are presence-based so 0/""/false are real values.
    if let Some(value) = ctx.scope.get(key) {
        return Some(value.clone());
    }
    if let Some(value) = lookup_in_map(ctx.vars, key) {
        return Some(value.clone());
    }
    lookup_in_map(ctx.constants, key).cloned()
}

fn resolve_response(path: &str, ctx: &RenderContext) -> Option<JsonValue> {
    let response = match ctx.response {
        Some(response) => response,
        None => {
            warn!(path, "no response available yet");
            return None;
        }
    };

    let segments = path_segments(path);
    let (first, rest) = segments.split_first()?;

    match *first {
        "body" if rest.is_empty() => Some(JsonValue::String(response.body.clone())),
        "json" => walk(response.json()?, rest),
        _ => {
            if let Some(attribute) = response.attribute(first) {
                return walk(&attribute, rest);
            }
            // Bare path into the parsed body: response.token, response.items.0
            walk(response.json()?, &segments)
        }
    }
}

fn walk(root: &JsonValue, segments: &[&str]) -> Option<JsonValue> {
    if segments.is_empty() {
        return Some(root.clone());
    }
    lookup_path(root, &segments.join(".")).cloned()
}

fn resolve_supplier_server(ctx: &RenderContext) -> Option<JsonValue> {
    let selected = ctx
        .scope
        .get("supplier_server")
        .cloned()
        .or_else(|| ctx.vars.get("supplier_server").cloned())
        .or_else(|| ctx.constants.get("supplier_server").cloned());

    let url = match &selected {
        Some(JsonValue::Object(map)) => {
            if let Some(JsonValue::String(url)) = map.get("url") {
                Some(url.clone())
            } else if let Some(JsonValue::String(id)) = map.get("id") {
                ctx.supplier_servers
                    .iter()
                    .find(|s| s.id == *id)
                    .map(|s| s.url.clone())
            } else {
                None
            }
        }
        Some(JsonValue::String(id)) => ctx
            .supplier_servers
            .iter()
            .find(|s| s.id == *id)
            .map(|s| s.url.clone()),
        _ => None,
    };

    if url.is_none() {
        warn!(?selected, "could not resolve supplier_server.url");
    }
    url.map(JsonValue::String)
}

/// Stringify a resolved value for embedding inside a larger string.
///
/// Strings embed bare, structures embed as compact JSON.
pub fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "null".to_string(),
        other => other.to_string(),
    }
}
