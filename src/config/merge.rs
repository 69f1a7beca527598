//! Deep merge functionality for configuration layers.
//!
//! Implements field-by-field merging where higher-precedence layers override
//! lower ones. Arrays are replaced entirely, not concatenated.

use super::node::{ConfigNode, NodeValue};

/// Deep merge two nodes, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans, nulls and unresolved
///   concatenations are replaced entirely
/// - An explicit `null` in the overlay clears the base value
/// - A lone `${?path}` in the overlay keeps the base as its fallback
///
/// # Example
/// ```
/// use ktp_config::config::{ConfigNode, merge_nodes};
/// use serde_json::json;
///
/// let base = ConfigNode::from_json(
///     json!({ "server": { "port": 8080, "host": "localhost" }, "features": ["a", "b"] }),
///     "9.conf",
/// );
/// let overlay = ConfigNode::from_json(
///     json!({ "server": { "port": 9000 }, "features": ["c"] }),
///     "5.conf",
/// );
/// let merged = merge_nodes(base, overlay);
/// // Result: { "server": { "port": 9000, "host": "localhost" }, "features": ["c"] }
/// # assert!(merged.is_object());
/// ```
pub fn merge_nodes(base: ConfigNode, overlay: ConfigNode) -> ConfigNode {
    match (base, overlay) {
        (
            ConfigNode {
                value: NodeValue::Object(mut base_map),
                ..
            },
            ConfigNode {
                value: NodeValue::Object(overlay_map),
                origin,
            },
        ) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = if let Some(base_value) = base_map.remove(&key) {
                    merge_nodes(base_value, overlay_value)
                } else {
                    overlay_value
                };
                base_map.insert(key, merged_value);
            }
            ConfigNode::new(NodeValue::Object(base_map), origin)
        }
        (base, overlay) if overlay.is_optional_reference() => {
            let origin = overlay.origin.clone();
            ConfigNode::new(
                NodeValue::Fallback {
                    preferred: Box::new(overlay),
                    shadowed: Box::new(base),
                },
                origin,
            )
        }
        // Any other case: overlay replaces base entirely
        (_, overlay) => overlay,
    }
}

/// Merge layers given from highest to lowest precedence.
///
/// The lowest layer is applied first, so every earlier entry of `layers`
/// wins over every later one on a leaf collision.
pub fn merge_layers(layers: impl IntoIterator<Item = ConfigNode>) -> ConfigNode {
    let layers: Vec<ConfigNode> = layers.into_iter().collect();
    layers
        .into_iter()
        .rev()
        .fold(ConfigNode::empty_object("merged configuration"), merge_nodes)
}
