//! Action execution engine
//!
//! Walks the action/perform graph: merges the per-call scope, dispatches each
//! perform to its command handler, evaluates response condition groups, and
//! recurses into matched branches and nested actions.

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use reqwest::{Client, Method};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{ApiConfig, PerformSpec, ResponseGroup, DEFAULT_APP_SERVER};
use crate::engine::conditions;
use crate::engine::response::HttpResponse;
use crate::engine::scope::Scope;
use crate::engine::template::{render, stringify, RenderContext};
use crate::errors::{ApiFlowError, Result};

/// Default bound on nested action depth
pub const DEFAULT_MAX_ACTION_DEPTH: usize = 64;

/// Runner configuration options
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Request timeout applied to every HTTP perform
    pub timeout: Duration,
    /// Maximum nested action depth before aborting
    pub max_depth: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_depth: DEFAULT_MAX_ACTION_DEPTH,
        }
    }
}

/// The closed set of command namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Http,
    Log,
    Vars,
    Action,
}

/// Parse a `namespace.verb` command string against the static registry.
///
/// A command without a namespace separator is malformed; a namespace or verb
/// outside the registry is unknown. Both are hard failures.
pub fn parse_command(command: &str) -> Result<(Namespace, &str)> {
    let (namespace, verb) = command
        .split_once('.')
        .ok_or_else(|| ApiFlowError::InvalidCommand(command.to_string()))?;

    if verb.is_empty() {
        return Err(ApiFlowError::InvalidCommand(command.to_string()));
    }

    match namespace {
        "http" => match verb {
            "get" | "post" | "put" | "delete" | "patch" => Ok((Namespace::Http, verb)),
            _ => Err(ApiFlowError::UnknownCommand(command.to_string())),
        },
        "log" => match verb {
            "debug" | "info" | "warning" | "error" | "critical" => Ok((Namespace::Log, verb)),
            _ => Err(ApiFlowError::UnknownCommand(command.to_string())),
        },
        "vars" => match verb {
            "set" | "get" => Ok((Namespace::Vars, verb)),
            _ => Err(ApiFlowError::UnknownCommand(command.to_string())),
        },
        "action" => Ok((Namespace::Action, verb)),
        _ => Err(ApiFlowError::UnknownCommand(command.to_string())),
    }
}

/// Action execution engine
///
/// Owns the persistent variable store and the latest-response slot for one
/// session. Not shareable across concurrent invocations; `perform_action`
/// takes `&mut self` so the borrow checker enforces one traversal at a time.
pub struct ActionRunner {
    config: ApiConfig,
    client: Client,
    vars: IndexMap<String, JsonValue>,
    constants: IndexMap<String, JsonValue>,
    latest_response: Option<HttpResponse>,
    options: RunnerOptions,
    depth: usize,
}

impl ActionRunner {
    /// Create a runner with default options
    pub fn new(config: ApiConfig) -> Result<Self> {
        Self::with_options(config, RunnerOptions::default())
    }

    /// Create a runner with explicit options
    pub fn with_options(config: ApiConfig, options: RunnerOptions) -> Result<Self> {
        let client = Client::builder().timeout(options.timeout).build()?;

        let mut vars = config.vars.clone();
        let app_server = config
            .my_app_server
            .clone()
            .unwrap_or_else(|| DEFAULT_APP_SERVER.to_string());
        vars.insert("my_app_server".to_string(), JsonValue::String(app_server));

        let constants = config.constants.clone();

        Ok(Self {
            config,
            client,
            vars,
            constants,
            latest_response: None,
            options,
            depth: 0,
        })
    }

    /// The persistent variable store
    pub fn vars(&self) -> &IndexMap<String, JsonValue> {
        &self.vars
    }

    /// The most recent HTTP response, if any
    pub fn latest_response(&self) -> Option<&HttpResponse> {
        self.latest_response.as_ref()
    }

    /// Perform a named action with caller-supplied params.
    ///
    /// The per-call scope merges constants, vars, and params (lowest to
    /// highest precedence) and is discarded when the call returns; `vars.set`
    /// performs mutate the persistent store and survive into later calls.
    pub async fn perform_action(
        &mut self,
        name: &str,
        params: IndexMap<String, JsonValue>,
    ) -> Result<()> {
        self.perform_action_inner(name, params).await
    }

    fn perform_action_inner<'a>(
        &'a mut self,
        name: &'a str,
        params: IndexMap<String, JsonValue>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if self.depth >= self.options.max_depth {
                return Err(ApiFlowError::RecursionLimit {
                    action: name.to_string(),
                    limit: self.options.max_depth,
                });
            }

            let action = self
                .config
                .actions
                .get(name)
                .cloned()
                .ok_or_else(|| ApiFlowError::ActionNotFound(name.to_string()))?;

            self.depth += 1;
            info!(action = name, depth = self.depth, "performing action");

            let mut scope = Scope::from_layers(&[&self.constants, &self.vars, &params]);

            let mut outcome = Ok(());
            for perform in &action.performs {
                if let Err(e) = self.execute_perform(perform, &mut scope).await {
                    // Abort the rest of this action; earlier side effects stay applied
                    outcome = Err(e);
                    break;
                }
            }

            self.depth -= 1;
            outcome
        }
        .boxed()
    }

    fn execute_perform<'a>(
        &'a mut self,
        perform: &'a PerformSpec,
        scope: &'a mut Scope,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let command = perform.command();
            let (namespace, verb) = parse_command(command)?;
            debug!(command, "executing perform");

            let data = perform.data();
            match namespace {
                Namespace::Http => self.handle_http(verb, &data, scope).await?,
                Namespace::Log => self.handle_log(verb, &data, scope),
                Namespace::Vars => self.handle_vars(verb, &data, scope)?,
                Namespace::Action => {
                    // Propagate the current scope as the caller-supplied params
                    let params = scope.to_map();
                    self.perform_action_inner(verb, params).await?;
                }
            }

            if !perform.responses.is_empty() {
                self.handle_responses(&perform.responses, scope).await?;
            }

            Ok(())
        }
        .boxed()
    }

    fn render_ctx<'s>(&'s self, scope: &'s Scope) -> RenderContext<'s> {
        RenderContext {
            scope,
            vars: &self.vars,
            constants: &self.constants,
            response: self.latest_response.as_ref(),
            supplier_servers: &self.config.supplier_servers,
        }
    }

    async fn handle_http(&mut self, verb: &str, data: &JsonValue, scope: &mut Scope) -> Result<()> {
        let method = match verb {
            "get" => Method::GET,
            "post" => Method::POST,
            "put" => Method::PUT,
            "delete" => Method::DELETE,
            "patch" => Method::PATCH,
            _ => return Err(ApiFlowError::UnknownCommand(format!("http.{}", verb))),
        };

        let bulk = data.get("type").and_then(JsonValue::as_str) == Some("bulk");
        let wrapper = data
            .get("wrapper")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        let concurrency = data
            .get("concurrency")
            .and_then(JsonValue::as_u64)
            .unwrap_or(1)
            .max(1) as usize;

        let (url, headers, query, body) = {
            let ctx = self.render_ctx(scope);

            let endpoint = data
                .get("path")
                .or_else(|| data.get("url"))
                .cloned()
                .unwrap_or(JsonValue::Null);
            let url = match render(&endpoint, &ctx) {
                JsonValue::String(url) => url,
                JsonValue::Null => String::new(),
                other => stringify(&other),
            };

            let mut headers = Vec::new();
            if let Some(JsonValue::Object(map)) = data.get("headers") {
                for (name, value) in map {
                    headers.push((name.clone(), stringify(&render(value, &ctx))));
                }
            }

            // Query entries rendering to null are dropped
            let mut query = Vec::new();
            if let Some(JsonValue::Object(map)) = data.get("query") {
                for (name, value) in map {
                    let rendered = render(value, &ctx);
                    if !rendered.is_null() {
                        query.push((name.clone(), stringify(&rendered)));
                    }
                }
            }

            let body = data.get("body").map(|body| render(body, &ctx));

            (url, headers, query, body)
        };

        if url.is_empty() {
            return Err(ApiFlowError::Argument(
                "http perform requires a 'path' or 'url'".to_string(),
            ));
        }

        if bulk {
            let items = match body {
                Some(JsonValue::Array(items)) => items,
                _ => {
                    return Err(ApiFlowError::Argument(
                        "bulk http perform requires 'body' to render to a list".to_string(),
                    ))
                }
            };

            let total = items.len();
            let requests = items.into_iter().map(|item| {
                let wrapped = if wrapper.is_empty() {
                    item
                } else {
                    let mut map = Map::new();
                    map.insert(wrapper.clone(), item);
                    JsonValue::Object(map)
                };
                let body_string = match wrapped {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                };
                self.send_request(
                    method.clone(),
                    url.clone(),
                    headers.clone(),
                    query.clone(),
                    Some(body_string),
                )
            });

            // Buffered keeps submission order, so the final element is the
            // canonical latest response regardless of concurrency
            let responses: Vec<Result<HttpResponse>> =
                stream::iter(requests).buffered(concurrency).collect().await;

            let mut last = None;
            for result in responses {
                let response = result?;
                debug!(status = response.status_code, "bulk response received");
                last = Some(response);
            }
            info!(total, url = %url, "bulk dispatch complete");

            if let Some(response) = last {
                self.publish_response(response, scope);
            }
        } else {
            let body_string = body.and_then(|body| match body {
                JsonValue::Null => None,
                JsonValue::String(s) => Some(s),
                other => Some(other.to_string()),
            });
            let response = self
                .send_request(method, url, headers, query, body_string)
                .await?;
            self.publish_response(response, scope);
        }

        Ok(())
    }

    async fn send_request(
        &self,
        method: Method,
        url: String,
        headers: Vec<(String, String)>,
        query: Vec<(String, String)>,
        body: Option<String>,
    ) -> Result<HttpResponse> {
        // Reject malformed URLs before reqwest buries them in a builder error
        let url = Url::parse(&url)?;

        let mut request = self.client.request(method.clone(), url.clone());
        for (name, value) in &headers {
            request = request.header(name, value);
        }
        if !query.is_empty() {
            request = request.query(&query);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        info!(%method, url = %url, "sending request");
        let response = request.send().await?;
        let response = HttpResponse::read(response).await?;
        debug!(
            status = response.status_code,
            body = %response.body.chars().take(200).collect::<String>(),
            "response received"
        );
        Ok(response)
    }

    /// Publish a response into the latest-response slot, the per-call scope,
    /// and the persistent vars.
    fn publish_response(&mut self, response: HttpResponse, scope: &mut Scope) {
        let value = response.to_value();
        scope.set("response", value.clone());
        self.vars.insert("response".to_string(), value);
        self.latest_response = Some(response);
    }

    fn handle_log(&self, verb: &str, data: &JsonValue, scope: &Scope) {
        let message = stringify(&render(data, &self.render_ctx(scope)));
        match verb {
            "debug" => debug!("{}", message),
            "info" => info!("{}", message),
            "warning" => warn!("{}", message),
            // tracing has no level above error; critical folds into it
            _ => error!("{}", message),
        }
    }

    fn handle_vars(&mut self, verb: &str, data: &JsonValue, scope: &mut Scope) -> Result<()> {
        match verb {
            "set" => {
                let entries = data.as_object().ok_or_else(|| {
                    ApiFlowError::Argument("vars.set expects a mapping of names to values".to_string())
                })?;
                let rendered: Vec<(String, JsonValue)> = {
                    let ctx = self.render_ctx(scope);
                    entries
                        .iter()
                        .map(|(key, value)| (key.clone(), render(value, &ctx)))
                        .collect()
                };
                for (key, value) in rendered {
                    self.set_var(&key, value);
                }
                Ok(())
            }
            "get" => {
                for key in vars_get_keys(data)? {
                    match self.vars.get(&key) {
                        Some(value) => scope.set(&key, value.clone()),
                        None => warn!(key = %key, "vars.get: no such var"),
                    }
                }
                Ok(())
            }
            _ => Err(ApiFlowError::UnknownCommand(format!("vars.{}", verb))),
        }
    }

    /// Write a persistent var, skipping the write when the value is unchanged.
    /// Returns whether a write happened.
    pub fn set_var(&mut self, key: &str, value: JsonValue) -> bool {
        if self.vars.get(key) == Some(&value) {
            debug!(key, "var unchanged, skipping write");
            return false;
        }
        info!(key, value = %value, "var set");
        self.vars.insert(key.to_string(), value);
        true
    }

    fn handle_responses<'a>(
        &'a mut self,
        groups: &'a [ResponseGroup],
        scope: &'a mut Scope,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let matched = {
                let response = match self.latest_response.as_ref() {
                    Some(response) => response,
                    None => {
                        warn!("no response available to evaluate response conditions");
                        return Ok(());
                    }
                };

                // Declaration order, is_success before is_error, first match wins
                let mut matched = None;
                'groups: for (index, group) in groups.iter().enumerate() {
                    for conditions_map in [&group.is_success, &group.is_error]
                        .into_iter()
                        .flatten()
                    {
                        if conditions::matches(conditions_map, response)? {
                            matched = Some(index);
                            break 'groups;
                        }
                    }
                }
                matched
            };

            match matched {
                Some(index) => {
                    for perform in &groups[index].performs {
                        self.execute_perform(perform, scope).await?;
                    }
                }
                None => warn!("no matching response conditions found"),
            }

            Ok(())
        }
        .boxed()
    }

    /// Validate the configuration against the command registry and condition
    /// vocabulary without executing anything.
    ///
    /// Returns warnings on success, errors on failure.
    pub fn validate(&self) -> std::result::Result<Vec<String>, Vec<String>> {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        for (i, server) in self.config.supplier_servers.iter().enumerate() {
            if server.id.is_empty() || server.url.is_empty() {
                errors.push(format!(
                    "supplier_servers[{}] must have both an id and a url",
                    i
                ));
            }
        }

        for (name, action) in &self.config.actions {
            if action.performs.is_empty() {
                warnings.push(format!("Action '{}' has no performs", name));
            }
            self.validate_performs(name, &action.performs, &mut warnings, &mut errors);
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(errors)
        }
    }

    fn validate_performs(
        &self,
        action_name: &str,
        performs: &[PerformSpec],
        warnings: &mut Vec<String>,
        errors: &mut Vec<String>,
    ) {
        for perform in performs {
            let command = perform.command();
            match parse_command(command) {
                Ok((Namespace::Action, target)) => {
                    if !self.config.actions.contains_key(target) {
                        errors.push(format!(
                            "Action '{}': nested action '{}' is not defined",
                            action_name, target
                        ));
                    }
                }
                Ok((Namespace::Http, _)) => {
                    let data = perform.data();
                    if data.get("path").is_none() && data.get("url").is_none() {
                        warnings.push(format!(
                            "Action '{}': '{}' has no 'path' or 'url'",
                            action_name, command
                        ));
                    }
                }
                Ok(_) => {}
                Err(e) => errors.push(format!("Action '{}': {}", action_name, e)),
            }

            for group in &perform.responses {
                for conditions_map in [&group.is_success, &group.is_error].into_iter().flatten() {
                    for condition_name in conditions_map.keys() {
                        if !conditions::is_known_condition(condition_name) {
                            errors.push(format!(
                                "Action '{}': unknown response condition '{}'",
                                action_name, condition_name
                            ));
                        }
                    }
                }
                self.validate_performs(action_name, &group.performs, warnings, errors);
            }
        }
    }
}

/// The var names a `vars.get` perform asks for.
///
/// Accepts a single name, a list of names, or a mapping whose keys are the
/// names.
fn vars_get_keys(data: &JsonValue) -> Result<Vec<String>> {
    match data {
        JsonValue::String(key) => Ok(vec![key.clone()]),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ApiFlowError::Argument("vars.get expects var names as strings".to_string())
                })
            })
            .collect(),
        JsonValue::Object(map) => Ok(map.keys().cloned().collect()),
        _ => Err(ApiFlowError::Argument(
            "vars.get expects a name, a list of names, or a mapping".to_string(),
        )),
    }
}
