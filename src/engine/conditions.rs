//! Response condition evaluation
//!
//! Matches a completed HTTP response against a condition map. Conditions are
//! ANDed; an unknown condition name is a hard error, never a silent pass.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::engine::response::HttpResponse;
use crate::errors::{ApiFlowError, Result};

/// All recognized condition names, for upfront validation.
pub const KNOWN_CONDITIONS: &[&str] = &[
    "code",
    "contains",
    "has_value",
    "matches",
    "has_key",
    "has_keys",
    "is_empty",
    "is_null",
    "is_type",
    "length",
    "length_gt",
    "length_lt",
    "length_gte",
    "length_lte",
];

pub fn is_known_condition(name: &str) -> bool {
    KNOWN_CONDITIONS.contains(&name)
}

/// Check a condition map against a response. All conditions must hold.
pub fn matches(conditions: &IndexMap<String, JsonValue>, response: &HttpResponse) -> Result<bool> {
    for (name, expected) in conditions {
        if !check_condition(name, expected, response)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn check_condition(name: &str, expected: &JsonValue, response: &HttpResponse) -> Result<bool> {
    let body = &response.body;
    match name {
        "code" => Ok(i64::from(response.status_code) == expected_int(name, expected)?),
        "contains" => Ok(body.contains(expected_str(name, expected)?)),
        "has_value" => Ok(!body.is_empty() == expected_bool(name, expected)?),
        "matches" => {
            let pattern = Regex::new(expected_str(name, expected)?).map_err(|e| {
                ApiFlowError::Argument(format!("Invalid regex in 'matches' condition: {}", e))
            })?;
            Ok(pattern.is_match(body))
        }
        "has_key" => Ok(json_has_key(response, expected_str(name, expected)?)),
        "has_keys" => {
            let keys = expected.as_array().ok_or_else(|| {
                ApiFlowError::Argument(format!("Condition '{}' expects a list of keys", name))
            })?;
            for key in keys {
                let key = key.as_str().ok_or_else(|| {
                    ApiFlowError::Argument(format!("Condition '{}' expects string keys", name))
                })?;
                if !json_has_key(response, key) {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "is_empty" => Ok(body.is_empty() == expected_bool(name, expected)?),
        "is_null" => Ok((body == "null") == expected_bool(name, expected)?),
        "is_type" => check_type(expected_str(name, expected)?, response.json()),
        "length" => Ok(body_len(response) == expected_int(name, expected)?),
        "length_gt" => Ok(body_len(response) > expected_int(name, expected)?),
        "length_lt" => Ok(body_len(response) < expected_int(name, expected)?),
        "length_gte" => Ok(body_len(response) >= expected_int(name, expected)?),
        "length_lte" => Ok(body_len(response) <= expected_int(name, expected)?),
        unknown => Err(ApiFlowError::UnknownCondition(unknown.to_string())),
    }
}

fn body_len(response: &HttpResponse) -> i64 {
    response.body.len() as i64
}

fn json_has_key(response: &HttpResponse, key: &str) -> bool {
    response
        .json()
        .and_then(|value| value.as_object())
        .map(|map| map.contains_key(key))
        .unwrap_or(false)
}

/// Fixed allow-listed type check for the `is_type` condition.
///
/// Accepts Python-style names (dict, list, str, int, bool, NoneType) plus
/// their JSON-native aliases. Anything else is a configuration error.
fn check_type(type_name: &str, parsed: Option<&JsonValue>) -> Result<bool> {
    let predicate: fn(&JsonValue) -> bool = match type_name {
        "dict" | "object" | "map" => JsonValue::is_object,
        "list" | "array" => JsonValue::is_array,
        "str" | "string" => JsonValue::is_string,
        "int" | "integer" => |v| v.is_i64() || v.is_u64(),
        "float" | "number" => JsonValue::is_number,
        "bool" | "boolean" => JsonValue::is_boolean,
        "NoneType" | "null" | "none" => JsonValue::is_null,
        other => {
            return Err(ApiFlowError::Argument(format!(
                "Unsupported type name in 'is_type' condition: {}",
                other
            )))
        }
    };
    Ok(parsed.map(predicate).unwrap_or(false))
}

fn expected_int(name: &str, value: &JsonValue) -> Result<i64> {
    value.as_i64().ok_or_else(|| {
        ApiFlowError::Argument(format!("Condition '{}' expects an integer value", name))
    })
}

fn expected_str<'a>(name: &str, value: &'a JsonValue) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        ApiFlowError::Argument(format!("Condition '{}' expects a string value", name))
    })
}

fn expected_bool(name: &str, value: &JsonValue) -> Result<bool> {
    value.as_bool().ok_or_else(|| {
        ApiFlowError::Argument(format!("Condition '{}' expects a boolean value", name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: &str) -> HttpResponse {
        let mut headers = IndexMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        HttpResponse::new(status, headers, "http://x/", body)
    }

    fn conditions(value: JsonValue) -> IndexMap<String, JsonValue> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_code_condition() {
        let r = response(200, "{}");
        assert!(matches(&conditions(json!({"code": 200})), &r).unwrap());
        assert!(!matches(&conditions(json!({"code": 404})), &r).unwrap());
    }

    #[test]
    fn test_body_text_conditions() {
        let r = response(200, r#"{"status": "ok"}"#);
        assert!(matches(&conditions(json!({"contains": "ok"})), &r).unwrap());
        assert!(matches(&conditions(json!({"has_value": true})), &r).unwrap());
        assert!(matches(&conditions(json!({"matches": "\"status\":\\s*\"ok\""})), &r).unwrap());
        assert!(matches(&conditions(json!({"is_empty": false})), &r).unwrap());
        assert!(matches(&conditions(json!({"is_null": false})), &r).unwrap());

        let empty = response(204, "");
        assert!(matches(&conditions(json!({"is_empty": true})), &empty).unwrap());
        assert!(matches(&conditions(json!({"has_value": false})), &empty).unwrap());

        let null_body = response(200, "null");
        assert!(matches(&conditions(json!({"is_null": true})), &null_body).unwrap());
    }

    #[test]
    fn test_key_conditions() {
        let r = response(200, r#"{"token": "abc", "user": "bob"}"#);
        assert!(matches(&conditions(json!({"has_key": "token"})), &r).unwrap());
        assert!(!matches(&conditions(json!({"has_key": "missing"})), &r).unwrap());
        assert!(matches(&conditions(json!({"has_keys": ["token", "user"]})), &r).unwrap());
        assert!(!matches(&conditions(json!({"has_keys": ["token", "missing"]})), &r).unwrap());
    }

    #[test]
    fn test_length_conditions() {
        let r = response(200, "abcde");
        assert!(matches(&conditions(json!({"length": 5})), &r).unwrap());
        assert!(matches(&conditions(json!({"length_gt": 4})), &r).unwrap());
        assert!(matches(&conditions(json!({"length_lt": 6})), &r).unwrap());
        assert!(matches(&conditions(json!({"length_gte": 5})), &r).unwrap());
        assert!(matches(&conditions(json!({"length_lte": 5})), &r).unwrap());
        assert!(!matches(&conditions(json!({"length_gt": 5})), &r).unwrap());
    }

    #[test]
    fn test_conditions_are_anded() {
        let r = response(200, r#"{"status": "ok"}"#);
        assert!(matches(&conditions(json!({"code": 200, "contains": "ok"})), &r).unwrap());
        assert!(!matches(&conditions(json!({"code": 200, "contains": "nope"})), &r).unwrap());
    }

    #[test]
    fn test_is_type_allow_list() {
        let obj = response(200, r#"{"a": 1}"#);
        assert!(matches(&conditions(json!({"is_type": "dict"})), &obj).unwrap());
        assert!(matches(&conditions(json!({"is_type": "object"})), &obj).unwrap());
        assert!(!matches(&conditions(json!({"is_type": "list"})), &obj).unwrap());

        let arr = response(200, "[1, 2]");
        assert!(matches(&conditions(json!({"is_type": "list"})), &arr).unwrap());

        let num = response(200, "42");
        assert!(matches(&conditions(json!({"is_type": "int"})), &num).unwrap());

        let null_body = response(200, "null");
        assert!(matches(&conditions(json!({"is_type": "NoneType"})), &null_body).unwrap());

        // Arbitrary names never reach any dynamic evaluation
        let err = matches(
            &conditions(json!({"is_type": "__import__('os')"})),
            &obj,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unsupported type name"));
    }

    #[test]
    fn test_unknown_condition_is_hard_error() {
        let r = response(200, "{}");
        let err = matches(&conditions(json!({"frobnicates": true})), &r).unwrap_err();
        assert!(matches!(err, ApiFlowError::UnknownCondition(name) if name == "frobnicates"));
    }

    #[test]
    fn test_invalid_regex_is_error() {
        let r = response(200, "{}");
        let err = matches(&conditions(json!({"matches": "("})), &r).unwrap_err();
        assert!(err.to_string().contains("Invalid regex"));
    }
}
