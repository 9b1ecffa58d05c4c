//! End-to-end engine tests against a local mock HTTP server

use indexmap::IndexMap;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use apiflow::{ActionRunner, ApiConfig, ApiFlowError};

fn config_from(yaml: &str) -> ApiConfig {
    serde_yaml::from_str(yaml).unwrap()
}

#[tokio::test]
async fn test_auth_flow_stores_session_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(json!({"user": "bob"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "abc"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_from(&format!(
        r#"
supplier_servers:
  - id: test
    url: "{uri}"
vars:
  supplier_server: test
  user: bob
actions:
  auth:
    performs:
      - perform: http.post
        data:
          path: "{{{{supplier_server.url}}}}/login"
          body:
            user: "{{{{user}}}}"
        responses:
          - is_success:
              code: 200
            performs:
              - perform: vars.set
                data:
                  session_token: "{{{{response.json.token}}}}"
          - is_error:
              code: 401
            performs:
              - perform: log.error
                data: "Authentication failed for {{{{user}}}}"
"#,
        uri = server.uri()
    ));

    let mut runner = ActionRunner::new(config).unwrap();
    runner.perform_action("auth", IndexMap::new()).await.unwrap();

    assert_eq!(runner.vars()["session_token"], json!("abc"));
    assert_eq!(runner.vars()["response"]["status_code"], json!(200));
}

#[tokio::test]
async fn test_first_matching_response_group_wins() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "ok"})))
        .mount(&server)
        .await;

    let config = config_from(&format!(
        r#"
actions:
  check:
    performs:
      - perform: http.get
        data:
          path: "{uri}/status"
        responses:
          - is_success:
              code: 200
            performs:
              - perform: vars.set
                data:
                  branch: first
          - is_success:
              contains: ok
            performs:
              - perform: vars.set
                data:
                  branch: second
"#,
        uri = server.uri()
    ));

    let mut runner = ActionRunner::new(config).unwrap();
    runner.perform_action("check", IndexMap::new()).await.unwrap();

    assert_eq!(runner.vars()["branch"], json!("first"));
}

#[tokio::test]
async fn test_error_branch_on_server_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let config = config_from(&format!(
        r#"
actions:
  check:
    performs:
      - perform: http.get
        data:
          path: "{uri}/flaky"
        responses:
          - is_success:
              code: 200
            performs:
              - perform: vars.set
                data:
                  outcome: ok
          - is_error:
              code: 500
            performs:
              - perform: log.warning
                data: "server failure"
              - perform: vars.set
                data:
                  outcome: failed
"#,
        uri = server.uri()
    ));

    let mut runner = ActionRunner::new(config).unwrap();
    runner.perform_action("check", IndexMap::new()).await.unwrap();

    assert_eq!(runner.vars()["outcome"], json!("failed"));
}

#[tokio::test]
async fn test_no_matching_group_is_not_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let config = config_from(&format!(
        r#"
actions:
  check:
    performs:
      - perform: http.get
        data:
          path: "{uri}/empty"
        responses:
          - is_success:
              code: 200
            performs:
              - perform: vars.set
                data:
                  matched: true
"#,
        uri = server.uri()
    ));

    let mut runner = ActionRunner::new(config).unwrap();
    runner.perform_action("check", IndexMap::new()).await.unwrap();

    assert!(runner.vars().get("matched").is_none());
}

#[tokio::test]
async fn test_response_chains_into_next_perform() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t-123"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .and(query_param("token", "t-123"))
        .and(header("Authorization", "Bearer t-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_from(&format!(
        r#"
actions:
  fetch:
    performs:
      - perform: http.get
        data:
          path: "{uri}/token"
      - perform: http.get
        data:
          path: "{uri}/data"
          headers:
            Authorization: "Bearer {{{{response.json.token}}}}"
          query:
            token: "{{{{response.json.token}}}}"
            omitted: null
"#,
        uri = server.uri()
    ));

    let mut runner = ActionRunner::new(config).unwrap();
    runner.perform_action("fetch", IndexMap::new()).await.unwrap();

    // Null query entries are dropped entirely
    let requests = server.received_requests().await.unwrap();
    let data_request = requests
        .iter()
        .find(|r| r.url.path() == "/data")
        .unwrap();
    assert!(!data_request.url.query().unwrap().contains("omitted"));
}

#[tokio::test]
async fn test_bulk_sends_one_request_per_element() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
        .expect(3)
        .mount(&server)
        .await;

    let config = config_from(&format!(
        r#"
vars:
  pending:
    - id: 1
    - id: 2
    - id: 3
actions:
  push:
    performs:
      - perform: http.post
        data:
          type: bulk
          path: "{uri}/items"
          wrapper: item
          concurrency: 2
          body: "{{{{pending}}}}"
"#,
        uri = server.uri()
    ));

    let mut runner = ActionRunner::new(config).unwrap();
    runner.perform_action("push", IndexMap::new()).await.unwrap();

    // Each element travels wrapped under the wrapper key
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    let mut ids: Vec<i64> = requests
        .iter()
        .map(|r| r.body_json::<serde_json::Value>().unwrap()["item"]["id"].as_i64().unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);

    // The canonical latest response is published
    assert_eq!(runner.vars()["response"]["status_code"], json!(201));
}

#[tokio::test]
async fn test_bulk_latest_response_is_last_submitted() {
    let server = MockServer::start().await;

    // Each element gets its own mock so the responses are distinguishable
    for id in 1..=3 {
        Mock::given(method("POST"))
            .and(path("/items"))
            .and(body_json(json!({"item": {"id": id}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"echo": id})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = config_from(&format!(
        r#"
vars:
  pending:
    - id: 1
    - id: 2
    - id: 3
actions:
  push:
    performs:
      - perform: http.post
        data:
          type: bulk
          path: "{uri}/items"
          wrapper: item
          concurrency: 2
          body: "{{{{pending}}}}"
"#,
        uri = server.uri()
    ));

    let mut runner = ActionRunner::new(config).unwrap();
    runner.perform_action("push", IndexMap::new()).await.unwrap();

    // The last element in submission order wins, regardless of which
    // request completed first under concurrency
    assert_eq!(runner.vars()["response"]["json"], json!({"echo": 3}));
    assert_eq!(
        runner.latest_response().unwrap().body,
        json!({"echo": 3}).to_string()
    );
}

#[tokio::test]
async fn test_nested_action_sees_caller_scope() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/hello"))
        .and(query_param("who", "alice"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_from(&format!(
        r#"
actions:
  outer:
    performs:
      - perform: vars.set
        data:
          who: alice
      - perform: action.inner
  inner:
    performs:
      - perform: http.get
        data:
          path: "{uri}/hello"
          query:
            who: "{{{{who}}}}"
"#,
        uri = server.uri()
    ));

    let mut runner = ActionRunner::new(config).unwrap();
    runner.perform_action("outer", IndexMap::new()).await.unwrap();
}

#[tokio::test]
async fn test_caller_params_override_vars() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/hello"))
        .and(query_param("who", "carol"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_from(&format!(
        r#"
vars:
  who: bob
actions:
  greet:
    performs:
      - perform: http.get
        data:
          path: "{uri}/hello"
          query:
            who: "{{{{who}}}}"
"#,
        uri = server.uri()
    ));

    let mut params = IndexMap::new();
    params.insert("who".to_string(), json!("carol"));

    let mut runner = ActionRunner::new(config).unwrap();
    runner.perform_action("greet", params).await.unwrap();
}

#[tokio::test]
async fn test_transport_failure_aborts_action() {
    // Nothing listens on this port
    let config = config_from(
        r#"
actions:
  doomed:
    performs:
      - perform: http.get
        data:
          path: "http://127.0.0.1:1/nope"
      - perform: vars.set
        data:
          reached: true
"#,
    );

    let mut runner = ActionRunner::new(config).unwrap();
    let err = runner
        .perform_action("doomed", IndexMap::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiFlowError::Request(_)));
    assert!(runner.vars().get("reached").is_none());
}
