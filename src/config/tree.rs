//! The resolved, immutable configuration tree.

use super::node::{join_path, split_path};
use serde_json::Value;
use std::collections::BTreeMap;

/// Fully merged, substitution-free configuration addressable by dotted path.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfigTree {
    root: Value,
    /// Origin description for every leaf, keyed by dotted path.
    origins: BTreeMap<String, String>,
}

impl ResolvedConfigTree {
    pub fn new(root: Value, origins: BTreeMap<String, String>) -> Self {
        Self { root, origins }
    }

    /// The whole tree as a JSON object.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Get the value at a dotted path. `null` values count as absent.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in split_path(path) {
            current = current.as_object()?.get(&segment)?;
        }
        if current.is_null() { None } else { Some(current) }
    }

    /// Get a scalar at `path` rendered as a string.
    pub fn get_string(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Where the leaf at `path` came from, e.g. `"5.conf: 1"`.
    pub fn origin(&self, path: &str) -> Option<&str> {
        self.origins.get(&join_path(&split_path(path))).map(String::as_str)
    }

    /// Every non-object value with its dotted path, sorted by path.
    ///
    /// Arrays are reported as single leaves.
    pub fn leaves(&self) -> Vec<(String, &Value)> {
        let mut out = Vec::new();
        collect_leaves(&self.root, &mut Vec::new(), &mut out);
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

fn collect_leaves<'a>(value: &'a Value, path: &mut Vec<String>, out: &mut Vec<(String, &'a Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                path.push(key.clone());
                collect_leaves(child, path, out);
                path.pop();
            }
        }
        leaf => {
            if !path.is_empty() {
                out.push((join_path(path), leaf));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> ResolvedConfigTree {
        let mut origins = BTreeMap::new();
        origins.insert("app.name".to_string(), "5.conf: 1".to_string());
        ResolvedConfigTree::new(
            json!({
                "app": {"name": "demo", "port": 8080, "debug": false, "gone": null},
                "hosts": ["a", "b"]
            }),
            origins,
        )
    }

    #[test]
    fn test_get_paths() {
        let t = tree();
        assert_eq!(t.get("app.name"), Some(&json!("demo")));
        assert_eq!(t.get_string("app.port").as_deref(), Some("8080"));
        assert_eq!(t.get_string("app.debug").as_deref(), Some("false"));
        assert!(t.get("app.gone").is_none());
        assert!(t.get("app.name.deeper").is_none());
        assert!(t.has_path("hosts"));
        assert_eq!(t.origin("app.name"), Some("5.conf: 1"));
    }

    #[test]
    fn test_leaves_sorted_with_arrays_as_leaves() {
        let t = tree();
        let paths: Vec<String> = t.leaves().into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            vec!["app.debug", "app.gone", "app.name", "app.port", "hosts"]
        );
    }
}
