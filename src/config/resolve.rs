//! Substitution resolution over a fully merged node tree.
//!
//! References are looked up in the final merged tree, so a low-precedence
//! fragment may refer to a key that only a higher-precedence layer defines.

use super::node::{ConfigNode, NodeValue, Piece, join_path, split_path};
use super::tree::ResolvedConfigTree;
use crate::error::ConfigError;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Resolve every substitution in `root` and produce the final tree.
pub fn resolve(root: &ConfigNode) -> Result<ResolvedConfigTree, ConfigError> {
    let mut resolver = Resolver {
        root,
        memo: HashMap::new(),
        in_progress: HashSet::new(),
    };
    let mut origins = BTreeMap::new();
    let value = resolver
        .resolve_node(root, &[], &mut origins)?
        .unwrap_or_else(|| Value::Object(Map::new()));
    Ok(ResolvedConfigTree::new(value, origins))
}

struct Resolver<'a> {
    root: &'a ConfigNode,
    /// Resolved values by dotted path; `None` marks an absent optional value.
    memo: HashMap<String, Option<Value>>,
    in_progress: HashSet<String>,
}

impl<'a> Resolver<'a> {
    /// Resolve `node` located at `path`. Returns `None` when the node is an
    /// optional substitution that did not resolve.
    fn resolve_node(
        &mut self,
        node: &ConfigNode,
        path: &[String],
        origins: &mut BTreeMap<String, String>,
    ) -> Result<Option<Value>, ConfigError> {
        match &node.value {
            NodeValue::Scalar(v) => {
                origins.insert(join_path(path), node.origin.clone());
                Ok(Some(v.clone()))
            }
            NodeValue::Object(children) => {
                let mut map = Map::new();
                for (key, child) in children {
                    let mut child_path = path.to_vec();
                    child_path.push(key.clone());
                    if let Some(v) = self.resolve_node(child, &child_path, origins)? {
                        map.insert(key.clone(), v);
                    }
                }
                Ok(Some(Value::Object(map)))
            }
            NodeValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                let mut scratch = BTreeMap::new();
                for (i, item) in items.iter().enumerate() {
                    let mut item_path = path.to_vec();
                    item_path.push(i.to_string());
                    if let Some(v) = self.resolve_node(item, &item_path, &mut scratch)? {
                        out.push(v);
                    }
                }
                origins.insert(join_path(path), node.origin.clone());
                Ok(Some(Value::Array(out)))
            }
            NodeValue::Fallback { preferred, shadowed } => {
                match self.resolve_node(preferred, path, origins)? {
                    Some(v) => Ok(Some(v)),
                    None => self.resolve_node(shadowed, path, origins),
                }
            }
            NodeValue::Concat(pieces) => {
                let value = self.resolve_concat(pieces, &node.origin)?;
                if let Some(ref v) = value {
                    record_origins(v, path, &node.origin, origins);
                }
                Ok(value)
            }
        }
    }

    fn resolve_concat(
        &mut self,
        pieces: &[Piece],
        origin: &str,
    ) -> Result<Option<Value>, ConfigError> {
        // A lone substitution keeps the referenced value's type
        if let [Piece::Subst { path, optional }] = pieces {
            return match self.lookup(path, origin)? {
                Some(v) => Ok(Some(v)),
                None if *optional => Ok(None),
                None => Err(ConfigError::Merge {
                    reference: path.clone(),
                    origin: origin.to_string(),
                }),
            };
        }

        let mut text = String::new();
        for piece in pieces {
            match piece {
                Piece::Text(s) => text.push_str(s),
                Piece::Subst { path, optional } => match self.lookup(path, origin)? {
                    Some(Value::String(s)) => text.push_str(&s),
                    Some(Value::Null) => {}
                    Some(v @ (Value::Number(_) | Value::Bool(_))) => text.push_str(&v.to_string()),
                    Some(_) => {
                        return Err(ConfigError::Parse {
                            origin: origin.to_string(),
                            line: 0,
                            message: format!(
                                "cannot concatenate object or array ${{{path}}} with text"
                            ),
                        });
                    }
                    None if *optional => {}
                    None => {
                        return Err(ConfigError::Merge {
                            reference: path.clone(),
                            origin: origin.to_string(),
                        });
                    }
                },
            }
        }
        Ok(Some(Value::String(text)))
    }

    /// Look up a dotted path in the merged tree, resolving along the way.
    fn lookup(&mut self, reference: &str, origin: &str) -> Result<Option<Value>, ConfigError> {
        let segments = split_path(reference);
        let key = join_path(&segments);
        if let Some(cached) = self.memo.get(&key) {
            return Ok(cached.clone());
        }
        if !self.in_progress.insert(key.clone()) {
            return Err(ConfigError::SubstitutionCycle {
                reference: reference.to_string(),
                origin: origin.to_string(),
            });
        }

        let result = self.lookup_uncached(&segments);
        self.in_progress.remove(&key);
        let value = result?;
        self.memo.insert(key, value.clone());
        Ok(value)
    }

    fn lookup_uncached(&mut self, segments: &[String]) -> Result<Option<Value>, ConfigError> {
        let root = self.root;
        let mut current = root;
        for (depth, segment) in segments.iter().enumerate() {
            match &current.value {
                NodeValue::Object(children) => match children.get(segment) {
                    Some(child) => current = child,
                    None => return Ok(None),
                },
                _ => {
                    // Resolve the intermediate value and keep walking the JSON
                    let mut scratch = BTreeMap::new();
                    let resolved = self.resolve_node(current, &segments[..depth], &mut scratch)?;
                    return Ok(resolved.and_then(|v| walk_json(v, &segments[depth..])));
                }
            }
        }
        let mut scratch = BTreeMap::new();
        let resolved = self.resolve_node(current, segments, &mut scratch)?;
        Ok(resolved.filter(|v| !v.is_null()))
    }
}

fn walk_json(value: Value, segments: &[String]) -> Option<Value> {
    let mut current = value;
    for segment in segments {
        current = match current {
            Value::Object(mut map) => map.remove(segment)?,
            _ => return None,
        };
    }
    if current.is_null() { None } else { Some(current) }
}

/// Attribute every leaf below `value` to `origin`.
fn record_origins(value: &Value, path: &[String], origin: &str, origins: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let mut child_path = path.to_vec();
                child_path.push(key.clone());
                record_origins(child, &child_path, origin, origins);
            }
        }
        _ => {
            origins.insert(join_path(path), origin.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::hocon::parse_document;
    use crate::config::merge::merge_layers;
    use serde_json::json;

    fn resolve_text(text: &str) -> Result<ResolvedConfigTree, ConfigError> {
        resolve(&parse_document(text, "1.conf").unwrap())
    }

    #[test]
    fn test_plain_values_pass_through() {
        let tree = resolve_text("a = 1\nb { c = x }").unwrap();
        assert_eq!(tree.get("a"), Some(&json!(1)));
        assert_eq!(tree.get("b.c"), Some(&json!("x")));
        assert_eq!(tree.origin("b.c"), Some("1.conf: 2"));
    }

    #[test]
    fn test_whole_value_substitution_keeps_type() {
        let tree = resolve_text("port = 8080\ncopy = ${port}\nobj { a = 1 }\nalias = ${obj}").unwrap();
        assert_eq!(tree.get("copy"), Some(&json!(8080)));
        assert_eq!(tree.get("alias.a"), Some(&json!(1)));
    }

    #[test]
    fn test_concatenation_and_chained_references() {
        let tree = resolve_text("root = /srv\ndata = ${root}/data\nlogs = ${data}/logs").unwrap();
        assert_eq!(tree.get_string("logs").as_deref(), Some("/srv/data/logs"));
    }

    #[test]
    fn test_optional_substitution_drops_field() {
        let tree = resolve_text("a = ${?nope}\nb = x${?nope}y").unwrap();
        assert!(!tree.has_path("a"));
        assert_eq!(tree.get_string("b").as_deref(), Some("xy"));
    }

    #[test]
    fn test_undefined_optional_keeps_earlier_value() {
        let tree = resolve_text("password = default\npassword = ${?DB_PASSWORD}").unwrap();
        assert_eq!(tree.get_string("password").as_deref(), Some("default"));
        assert_eq!(tree.origin("password"), Some("1.conf: 1"));

        let tree = resolve_text("DB_PASSWORD = s3cret\npassword = default\npassword = ${?DB_PASSWORD}").unwrap();
        assert_eq!(tree.get_string("password").as_deref(), Some("s3cret"));
        assert_eq!(tree.origin("password"), Some("1.conf: 3"));
    }

    #[test]
    fn test_optional_over_lower_layer_falls_back() {
        let low = parse_document("port = 8080", "9.conf").unwrap();
        let high = parse_document("port = ${?sysenv.PORT}", "5.conf").unwrap();
        let tree = resolve(&merge_layers(vec![high.clone(), low.clone()])).unwrap();
        assert_eq!(tree.get("port"), Some(&json!(8080)));
        assert_eq!(tree.origin("port"), Some("9.conf: 1"));

        let env = parse_document("sysenv.PORT = 9090", "env").unwrap();
        let tree = resolve(&merge_layers(vec![env, high, low])).unwrap();
        assert_eq!(tree.get("port"), Some(&json!(9090)));
    }

    #[test]
    fn test_unresolved_reference_names_path_and_origin() {
        let err = resolve_text("a = 1\nb = ${db.host}").unwrap_err();
        match err {
            ConfigError::Merge { reference, origin } => {
                assert_eq!(reference, "db.host");
                assert_eq!(origin, "1.conf: 2");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_cycle_detected() {
        let err = resolve_text("a = ${b}\nb = ${a}").unwrap_err();
        assert!(matches!(err, ConfigError::SubstitutionCycle { .. }));
    }

    #[test]
    fn test_reference_into_higher_precedence_layer() {
        let low = parse_document("url = ${host}\":80\"", "9.conf").unwrap();
        let high = parse_document("host = example.org", "5.conf").unwrap();
        let tree = resolve(&merge_layers(vec![high, low])).unwrap();
        assert_eq!(tree.get_string("url").as_deref(), Some("example.org:80"));
    }
}
