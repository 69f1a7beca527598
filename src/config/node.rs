//! Unresolved configuration nodes.
//!
//! Fragments and override layers are first turned into a tree of
//! [`ConfigNode`]s that may still contain `${path}` substitutions. Every node
//! remembers where it came from so diagnostics and the config listing can
//! name the origin of each value.

use serde_json::Value;
use std::collections::BTreeMap;

/// One piece of a value concatenation.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    /// Literal text (quoted or unquoted).
    Text(String),
    /// A `${path}` (or optional `${?path}`) reference.
    Subst { path: String, optional: bool },
}

/// The payload of a [`ConfigNode`].
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    /// Fully known scalar (string, number, bool or null).
    Scalar(Value),
    Object(BTreeMap<String, ConfigNode>),
    Array(Vec<ConfigNode>),
    /// Concatenation that contains at least one substitution.
    Concat(Vec<Piece>),
    /// A lone `${?path}` laid over an earlier value; the earlier value is
    /// used when the reference is undefined.
    Fallback {
        preferred: Box<ConfigNode>,
        shadowed: Box<ConfigNode>,
    },
}

/// A value together with a human-readable description of its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigNode {
    pub value: NodeValue,
    pub origin: String,
}

impl ConfigNode {
    pub fn new(value: NodeValue, origin: impl Into<String>) -> Self {
        Self {
            value,
            origin: origin.into(),
        }
    }

    pub fn scalar(value: impl Into<Value>, origin: impl Into<String>) -> Self {
        Self::new(NodeValue::Scalar(value.into()), origin)
    }

    pub fn empty_object(origin: impl Into<String>) -> Self {
        Self::new(NodeValue::Object(BTreeMap::new()), origin)
    }

    pub fn is_object(&self) -> bool {
        matches!(self.value, NodeValue::Object(_))
    }

    /// Whether this node is exactly one optional substitution, `${?path}`.
    pub fn is_optional_reference(&self) -> bool {
        matches!(&self.value, NodeValue::Concat(pieces)
            if matches!(pieces.as_slice(), [Piece::Subst { optional: true, .. }]))
    }

    /// Convert an already-resolved JSON value into a node tree.
    pub fn from_json(value: Value, origin: &str) -> Self {
        match value {
            Value::Object(map) => {
                let children = map
                    .into_iter()
                    .map(|(k, v)| (k, ConfigNode::from_json(v, origin)))
                    .collect();
                ConfigNode::new(NodeValue::Object(children), origin)
            }
            Value::Array(items) => {
                let items = items
                    .into_iter()
                    .map(|v| ConfigNode::from_json(v, origin))
                    .collect();
                ConfigNode::new(NodeValue::Array(items), origin)
            }
            scalar => ConfigNode::scalar(scalar, origin),
        }
    }

    /// Build an object node from `(dotted path, value)` pairs.
    ///
    /// Later pairs win on collision; intermediate objects are created as
    /// needed.
    pub fn from_paths<I, K>(entries: I, origin: &str) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut root = BTreeMap::new();
        for (key, value) in entries {
            let path = split_path(key.as_ref());
            if path.is_empty() {
                continue;
            }
            insert_path(&mut root, &path, ConfigNode::from_json(value, origin));
        }
        ConfigNode::new(NodeValue::Object(root), origin)
    }
}

/// Insert `node` at `path` below `map`, deep-merging with anything already
/// there.
pub fn insert_path(map: &mut BTreeMap<String, ConfigNode>, path: &[String], node: ConfigNode) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };

    if rest.is_empty() {
        let merged = match map.remove(head) {
            Some(existing) => super::merge::merge_nodes(existing, node),
            None => node,
        };
        map.insert(head.clone(), merged);
        return;
    }

    let entry = map
        .entry(head.clone())
        .or_insert_with(|| ConfigNode::empty_object(node.origin.clone()));
    if !entry.is_object() {
        *entry = ConfigNode::empty_object(node.origin.clone());
    }
    if let NodeValue::Object(children) = &mut entry.value {
        insert_path(children, rest, node);
    }
}

/// Split a dotted path into segments. Double-quoted segments may contain dots.
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut saw_any = false;

    for ch in path.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                saw_any = true;
            }
            '.' if !in_quotes => {
                segments.push(std::mem::take(&mut current));
                saw_any = false;
            }
            c => {
                current.push(c);
                saw_any = true;
            }
        }
    }
    if saw_any || !segments.is_empty() {
        segments.push(current);
    }

    segments
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Join path segments, quoting any segment that would not survive
/// [`split_path`].
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| {
            let s = s.as_ref();
            if s.contains('.') || s.contains('"') || s.trim() != s {
                format!("\"{}\"", s.replace('"', ""))
            } else {
                s.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_path_plain_and_quoted() {
        assert_eq!(split_path("a.b.c"), vec!["a", "b", "c"]);
        assert_eq!(split_path("a.\"b.c\".d"), vec!["a", "b.c", "d"]);
        assert_eq!(split_path(""), Vec::<String>::new());
    }

    #[test]
    fn test_join_path_quotes_dotted_segments() {
        assert_eq!(join_path(&["a", "b.c"]), "a.\"b.c\"");
        assert_eq!(split_path(&join_path(&["a", "b.c"])), vec!["a", "b.c"]);
    }

    #[test]
    fn test_from_paths_builds_nested_objects() {
        let node = ConfigNode::from_paths(
            [("server.port", json!(8080)), ("server.host", json!("localhost"))],
            "override map",
        );
        let NodeValue::Object(root) = &node.value else {
            panic!("expected object");
        };
        let NodeValue::Object(server) = &root["server"].value else {
            panic!("expected nested object");
        };
        assert_eq!(server["port"].value, NodeValue::Scalar(json!(8080)));
        assert_eq!(server["host"].origin, "override map");
    }

    #[test]
    fn test_insert_path_replaces_scalar_with_object() {
        let mut map = BTreeMap::new();
        insert_path(&mut map, &["a".to_string()], ConfigNode::scalar(1, "x"));
        insert_path(
            &mut map,
            &["a".to_string(), "b".to_string()],
            ConfigNode::scalar(2, "y"),
        );
        assert!(map["a"].is_object());
    }
}
