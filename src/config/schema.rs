//! Typed records and their required-leaf schemas.
//!
//! Deserialization errors from serde only say that *something* is missing.
//! Each record therefore declares its required leaves so a failed
//! extraction can name the first absent dotted path.

use super::node::join_path;
use super::tree::ResolvedConfigTree;
use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A configuration record that can be extracted from the resolved tree.
///
/// ```
/// use ktp_config::config::{ConfigRecord, Schema};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Pool { size: u32 }
///
/// #[derive(Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct StorageSettings {
///     bucket: String,
///     pool: Pool,
///     #[serde(default)]
///     region: Option<String>,
/// }
///
/// impl ConfigRecord for Pool {
///     fn describe(schema: &mut Schema) {
///         schema.leaf("size");
///     }
/// }
///
/// impl ConfigRecord for StorageSettings {
///     fn describe(schema: &mut Schema) {
///         schema.leaf("bucket").nested::<Pool>("pool");
///     }
/// }
///
/// assert_eq!(StorageSettings::child_path(), "storageSettings");
/// ```
pub trait ConfigRecord: DeserializeOwned {
    /// Declare the required leaves of this record. Optional and defaulted
    /// fields are left out.
    fn describe(schema: &mut Schema);

    /// Path of this record when extracted as a child block.
    fn child_path() -> String {
        child_path_for(std::any::type_name::<Self>())
    }
}

/// An untyped view of the whole tree; nothing is required.
impl ConfigRecord for Value {
    fn describe(_schema: &mut Schema) {}
}

/// Required leaf paths of a record, rooted at a prefix.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    prefix: Vec<String>,
    leaves: Vec<String>,
}

impl Schema {
    /// The schema of `T` rooted at `prefix` (empty for the whole tree).
    pub fn for_record<T: ConfigRecord>(prefix: &str) -> Self {
        let mut schema = Self::at(prefix);
        T::describe(&mut schema);
        schema
    }

    fn at(prefix: &str) -> Self {
        Self {
            prefix: super::node::split_path(prefix),
            leaves: Vec::new(),
        }
    }

    fn path_of(&self, field: &str) -> String {
        let mut segments = self.prefix.clone();
        segments.push(field.to_string());
        join_path(&segments)
    }

    /// A required field whose type is not itself a record.
    pub fn leaf(&mut self, field: &str) -> &mut Self {
        let path = self.path_of(field);
        self.leaves.push(path);
        self
    }

    /// A required field holding another record.
    pub fn nested<T: ConfigRecord>(&mut self, field: &str) -> &mut Self {
        let inner = Self::for_record::<T>(&self.path_of(field));
        self.leaves.extend(inner.leaves);
        self
    }

    /// Required leaves in declaration order.
    pub fn leaf_paths(&self) -> &[String] {
        &self.leaves
    }

    /// The first required leaf missing from `tree`.
    pub fn first_missing(&self, tree: &ResolvedConfigTree) -> Option<&str> {
        self.leaves
            .iter()
            .find(|path| !tree.has_path(path))
            .map(String::as_str)
    }
}

/// `my_app::auth::AuthSettings` -> `authSettings`.
pub fn child_path_for(type_name: &str) -> String {
    let without_generics = type_name.split('<').next().unwrap_or(type_name);
    let short = without_generics.rsplit("::").next().unwrap_or(without_generics);
    let mut chars = short.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Deserialize the subtree at `prefix` into `T`.
///
/// On failure the first missing required leaf is reported; other failures
/// keep serde's message along with the path.
pub fn extract<T: ConfigRecord>(tree: &ResolvedConfigTree, prefix: &str) -> Result<T, ConfigError> {
    let value = if prefix.is_empty() {
        tree.root().clone()
    } else {
        tree.get(prefix)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    };

    serde_json::from_value::<T>(value).map_err(|source| {
        let schema = Schema::for_record::<T>(prefix);
        match schema.first_missing(tree) {
            Some(path) => ConfigError::missing_field(path),
            None => ConfigError::Deserialize {
                path: if prefix.is_empty() { "<root>".to_string() } else { prefix.to_string() },
                source,
            },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Record {
        name: String,
        value: i64,
    }

    impl ConfigRecord for Record {
        fn describe(schema: &mut Schema) {
            schema.leaf("name").leaf("value");
        }
    }

    #[derive(Debug, Deserialize)]
    struct Top {
        app: Record,
        #[serde(default)]
        #[allow(dead_code)]
        debug: bool,
    }

    impl ConfigRecord for Top {
        fn describe(schema: &mut Schema) {
            schema.nested::<Record>("app");
        }
    }

    fn tree(value: Value) -> ResolvedConfigTree {
        ResolvedConfigTree::new(value, BTreeMap::new())
    }

    #[test]
    fn test_leaf_paths_follow_nesting() {
        let schema = Schema::for_record::<Top>("");
        assert_eq!(schema.leaf_paths(), &["app.name", "app.value"]);

        let schema = Schema::for_record::<Record>("outer.inner");
        assert_eq!(schema.leaf_paths(), &["outer.inner.name", "outer.inner.value"]);
    }

    #[test]
    fn test_extract_success() {
        let t = tree(json!({"app": {"name": "demo", "value": 3}}));
        let top: Top = extract(&t, "").unwrap();
        assert_eq!(top.app, Record { name: "demo".into(), value: 3 });

        let child: Record = extract(&t, "app").unwrap();
        assert_eq!(child.value, 3);
    }

    #[test]
    fn test_missing_field_names_dotted_path() {
        let t = tree(json!({"app": {"name": "demo"}}));
        let err = extract::<Top>(&t, "").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref path } if path == "app.value"));
        assert!(err.to_string().contains("app.value"));
    }

    #[test]
    fn test_type_mismatch_is_deserialize_error() {
        let t = tree(json!({"app": {"name": "demo", "value": "not a number"}}));
        let err = extract::<Top>(&t, "").unwrap_err();
        assert!(matches!(err, ConfigError::Deserialize { .. }));
    }

    #[test]
    fn test_child_path_for_type_names() {
        assert_eq!(child_path_for("my_app::auth::AuthSettings"), "authSettings");
        assert_eq!(child_path_for("Wrapper<my_app::Inner>"), "wrapper");
        assert_eq!(child_path_for("a::b::HTTPConfig"), "hTTPConfig");
        assert_eq!(Record::child_path(), "record");
    }
}
