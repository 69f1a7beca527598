//! Flat, redacted rendering of the resolved tree for display and logs.

use super::node::split_path;
use super::tree::ResolvedConfigTree;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Namespaces left out of the listing.
pub const EXCLUDED_PREFIXES: &[&str] = &["os", "process", "sysenv"];

/// Path fragments whose values are never shown (matched case-insensitively).
pub const SENSITIVE_WORDS: &[&str] = &[
    "secret",
    "password",
    "passwd",
    "apikey",
    "api_key",
    "api-key",
    "credential",
    "privatekey",
    "private_key",
];

/// Rendered values longer than this are cut.
pub const MAX_VALUE_LENGTH: usize = 200;

/// One line of the config listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub value: String,
    pub origin: String,
}

/// Render every leaf outside the excluded namespaces, sorted by path.
pub fn get_all_config(tree: &ResolvedConfigTree) -> BTreeMap<String, ConfigEntry> {
    let mut out = BTreeMap::new();
    for (path, value) in tree.leaves() {
        let segments = split_path(&path);
        if segments
            .first()
            .is_some_and(|head| EXCLUDED_PREFIXES.contains(&head.as_str()))
        {
            continue;
        }

        let rendered: String = render_value(value).chars().take(MAX_VALUE_LENGTH).collect();
        let value = if is_sensitive(&segments) {
            format!("{} chars", rendered.chars().count())
        } else {
            rendered
        };
        let origin = tree.origin(&path).unwrap_or("unknown").to_string();
        out.insert(path, ConfigEntry { value, origin });
    }
    out
}

/// Whether any path segment contains a sensitive word.
pub fn is_sensitive<S: AsRef<str>>(segments: &[S]) -> bool {
    segments.iter().any(|segment| {
        let lower = segment.as_ref().to_lowercase();
        SENSITIVE_WORDS.iter().any(|word| lower.contains(word))
    })
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
