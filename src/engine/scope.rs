//! Per-call variable scope
//!
//! The scope is the merged key-value context one action invocation resolves
//! templates against. Lookups support dotted paths into nested structures
//! (`a.b.0.c`) and never fail: a missing segment or out-of-range index
//! simply yields `None`.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

/// Split a dotted/bracketed path into plain segments.
///
/// `items[0].name` and `items.0.name` are equivalent.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split(['.', '['])
        .map(|seg| seg.trim_end_matches(']'))
        .filter(|seg| !seg.is_empty())
        .collect()
}

/// Walk a dotted path into a JSON value tree.
///
/// Map segments index objects, numeric segments index arrays.
pub fn lookup_path<'a>(root: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = root;
    for segment in path_segments(path) {
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Look up a key in a mapping, trying the exact key before walking it as a
/// dotted path into a nested value.
pub fn lookup_in_map<'a>(
    map: &'a IndexMap<String, JsonValue>,
    key: &str,
) -> Option<&'a JsonValue> {
    if let Some(value) = map.get(key) {
        return Some(value);
    }
    let (head, rest) = key.split_once(['.', '['])?;
    lookup_path(map.get(head)?, rest)
}

/// The merged lookup context for one action invocation
#[derive(Debug, Clone, Default)]
pub struct Scope {
    entries: IndexMap<String, JsonValue>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge layers lowest-precedence first; later layers override earlier ones.
    pub fn from_layers(layers: &[&IndexMap<String, JsonValue>]) -> Self {
        let mut entries = IndexMap::new();
        for layer in layers {
            for (key, value) in layer.iter() {
                entries.insert(key.clone(), value.clone());
            }
        }
        Self { entries }
    }

    /// Look up a key, trying the exact key before walking it as a dotted path.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        lookup_in_map(&self.entries, key)
    }

    /// Look up a key, falling back to a default instead of failing.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a JsonValue) -> &'a JsonValue {
        self.get(key).unwrap_or(default)
    }

    pub fn set(&mut self, key: &str, value: JsonValue) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The scope entries as an owned map, for propagation into nested actions.
    pub fn to_map(&self) -> IndexMap<String, JsonValue> {
        self.entries.clone()
    }

    /// The scope as a JSON object, in insertion order.
    pub fn to_value(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.entries {
            map.insert(key.clone(), value.clone());
        }
        JsonValue::Object(map)
    }
}
