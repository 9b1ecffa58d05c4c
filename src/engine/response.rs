//! Latest-response value object
//!
//! Wraps a completed HTTP response with the pieces the engine consumes:
//! status code, headers, final URL, raw body, and a lazily-parsed structured
//! body. XML bodies are converted to a JSON tree so dotted-path lookups work
//! uniformly over either content type.

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value as JsonValue};

use crate::errors::Result;

/// A completed HTTP response
#[derive(Debug)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: IndexMap<String, String>,
    pub url: String,
    pub encoding: String,
    pub body: String,
    parsed: OnceCell<Option<JsonValue>>,
}

impl HttpResponse {
    pub fn new(
        status_code: u16,
        headers: IndexMap<String, String>,
        url: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let mut response = Self {
            status_code,
            headers,
            url: url.into(),
            encoding: "utf-8".to_string(),
            body: body.into(),
            parsed: OnceCell::new(),
        };
        if let Some(charset) = response.charset_from_content_type() {
            response.encoding = charset;
        }
        response
    }

    /// Consume a reqwest response into an owned value object.
    pub async fn read(response: reqwest::Response) -> Result<Self> {
        let status_code = response.status().as_u16();
        let url = response.url().to_string();
        let mut headers = IndexMap::new();
        for (name, value) in response.headers() {
            headers.insert(
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            );
        }
        let body = response.text().await?;
        Ok(Self::new(status_code, headers, url, body))
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn charset_from_content_type(&self) -> Option<String> {
        let content_type = self.header("content-type")?;
        content_type
            .split(';')
            .filter_map(|part| part.trim().strip_prefix("charset="))
            .next()
            .map(|charset| charset.trim_matches('"').to_ascii_lowercase())
    }

    /// The body parsed into a JSON tree, computed once on first access.
    ///
    /// JSON bodies parse directly; XML bodies are converted. Anything else
    /// yields `None`.
    pub fn json(&self) -> Option<&JsonValue> {
        self.parsed
            .get_or_init(|| {
                if let Ok(value) = serde_json::from_str(&self.body) {
                    return Some(value);
                }
                let looks_like_xml = self
                    .header("content-type")
                    .map(|ct| ct.contains("xml"))
                    .unwrap_or_else(|| self.body.trim_start().starts_with('<'));
                if looks_like_xml {
                    xml_to_json(&self.body)
                } else {
                    None
                }
            })
            .as_ref()
    }

    /// Direct attributes addressable as `response.<name>` in templates.
    pub fn attribute(&self, name: &str) -> Option<JsonValue> {
        match name {
            "status_code" => Some(JsonValue::from(self.status_code)),
            "url" => Some(JsonValue::String(self.url.clone())),
            "encoding" => Some(JsonValue::String(self.encoding.clone())),
            "headers" => Some(self.headers_value()),
            _ => None,
        }
    }

    fn headers_value(&self) -> JsonValue {
        let mut map = Map::new();
        for (name, value) in &self.headers {
            map.insert(name.clone(), JsonValue::String(value.clone()));
        }
        JsonValue::Object(map)
    }

    /// The full response as a JSON object, for publication into scope/vars.
    pub fn to_value(&self) -> JsonValue {
        let mut map = Map::new();
        map.insert("status_code".to_string(), JsonValue::from(self.status_code));
        map.insert("url".to_string(), JsonValue::String(self.url.clone()));
        map.insert(
            "encoding".to_string(),
            JsonValue::String(self.encoding.clone()),
        );
        map.insert("headers".to_string(), self.headers_value());
        map.insert("body".to_string(), JsonValue::String(self.body.clone()));
        map.insert(
            "json".to_string(),
            self.json().cloned().unwrap_or(JsonValue::Null),
        );
        JsonValue::Object(map)
    }
}

/// Convert an XML document into a JSON tree.
///
/// Elements become objects keyed by tag name, repeated siblings collapse into
/// arrays, attributes are prefixed with `@`, and text-only elements become
/// strings. Malformed XML yields `None`.
pub fn xml_to_json(xml: &str) -> Option<JsonValue> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // Bottom frame collects the document root element(s)
    let mut stack: Vec<(String, Map<String, JsonValue>, String)> =
        vec![(String::new(), Map::new(), String::new())];

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let mut attrs = Map::new();
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    attrs.insert(format!("@{}", key), JsonValue::String(value));
                }
                stack.push((name, attrs, String::new()));
            }
            Ok(Event::End(ref e)) => {
                let closing = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let (name, mut map, text) = stack.pop()?;
                if name != closing || stack.is_empty() {
                    return None;
                }
                let value = if map.is_empty() && !text.is_empty() {
                    JsonValue::String(text)
                } else if map.is_empty() {
                    JsonValue::Null
                } else {
                    if !text.is_empty() {
                        map.insert("#text".to_string(), JsonValue::String(text));
                    }
                    JsonValue::Object(map)
                };
                let (_, parent, _) = stack.last_mut()?;
                insert_child(parent, name, value);
            }
            Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let mut attrs = Map::new();
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    attrs.insert(format!("@{}", key), JsonValue::String(value));
                }
                let value = if attrs.is_empty() {
                    JsonValue::Null
                } else {
                    JsonValue::Object(attrs)
                };
                let (_, parent, _) = stack.last_mut()?;
                insert_child(parent, name, value);
            }
            Ok(Event::Text(ref e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).trim().to_string();
                if !text.is_empty() {
                    let (_, _, buffer) = stack.last_mut()?;
                    buffer.push_str(&text);
                }
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).to_string();
                let (_, _, buffer) = stack.last_mut()?;
                buffer.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return None;
    }
    let (_, root, _) = stack.pop()?;
    if root.is_empty() {
        None
    } else {
        Some(JsonValue::Object(root))
    }
}

/// Insert a child under its tag name, collapsing repeated siblings into arrays.
fn insert_child(parent: &mut Map<String, JsonValue>, name: String, value: JsonValue) {
    match parent.get_mut(&name) {
        Some(JsonValue::Array(items)) => items.push(value),
        Some(existing) => {
            let previous = existing.take();
            *existing = JsonValue::Array(vec![previous, value]);
        }
        None => {
            parent.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response_with(content_type: &str, body: &str) -> HttpResponse {
        let mut headers = IndexMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        HttpResponse::new(200, headers, "http://x/login", body)
    }

    #[test]
    fn test_json_body_parsed_lazily() {
        let response = response_with("application/json", r#"{"token": "abc"}"#);
        assert_eq!(response.json(), Some(&json!({"token": "abc"})));
        // Second access hits the cached parse
        assert_eq!(response.json(), Some(&json!({"token": "abc"})));
    }

    #[test]
    fn test_non_json_body_yields_none() {
        let response = response_with("text/plain", "plain text");
        assert_eq!(response.json(), None);
    }

    #[test]
    fn test_xml_body_converted() {
        let response = response_with(
            "application/xml",
            "<order id=\"7\"><item>widget</item><item>gadget</item></order>",
        );
        assert_eq!(
            response.json(),
            Some(&json!({
                "order": {"@id": "7", "item": ["widget", "gadget"]}
            }))
        );
    }

    #[test]
    fn test_malformed_xml_yields_none() {
        assert_eq!(xml_to_json("<a><b></a>"), None);
    }

    #[test]
    fn test_attributes_and_headers() {
        let response = response_with("application/json; charset=iso-8859-1", "{}");
        assert_eq!(response.attribute("status_code"), Some(json!(200)));
        assert_eq!(response.attribute("url"), Some(json!("http://x/login")));
        assert_eq!(response.attribute("encoding"), Some(json!("iso-8859-1")));
        assert_eq!(response.header("CONTENT-TYPE").is_some(), true);
        assert_eq!(response.attribute("bogus"), None);
    }

    #[test]
    fn test_to_value_shape() {
        let response = response_with("application/json", r#"{"ok": true}"#);
        let value = response.to_value();
        assert_eq!(value["status_code"], json!(200));
        assert_eq!(value["body"], json!(r#"{"ok": true}"#));
        assert_eq!(value["json"], json!({"ok": true}));
    }
}
