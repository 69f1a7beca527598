//! Output formatting for config listings.

use crate::config::ConfigEntry;
use anyhow::Result;
use std::collections::BTreeMap;

/// Output format for `dump`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            _ => None,
        }
    }
}

/// Render a config listing in `format`.
pub fn format_entries(entries: &BTreeMap<String, ConfigEntry>, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => format_entries_text(entries),
        OutputFormat::Json => serde_json::to_string_pretty(entries)?,
        OutputFormat::Yaml => serde_yaml::to_string(entries)?,
    })
}

/// One `path = value  # origin` line per entry, values aligned.
pub fn format_entries_text(entries: &BTreeMap<String, ConfigEntry>) -> String {
    let width = entries.keys().map(|k| k.chars().count()).max().unwrap_or(0);
    let mut out = String::new();
    for (path, entry) in entries {
        out.push_str(&format!("{:<width$} = {}  # {}\n", path, entry.value, entry.origin));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> BTreeMap<String, ConfigEntry> {
        let mut map = BTreeMap::new();
        map.insert(
            "app.name".to_string(),
            ConfigEntry { value: "demo".to_string(), origin: "5.conf: 1".to_string() },
        );
        map.insert(
            "db.password".to_string(),
            ConfigEntry { value: "7 chars".to_string(), origin: "9.conf: 3".to_string() },
        );
        map
    }

    #[test]
    fn test_from_str() {
        assert_eq!(OutputFormat::from_str("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("yml"), Some(OutputFormat::Yaml));
        assert_eq!(OutputFormat::from_str("text"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::from_str("markdown"), None);
    }

    #[test]
    fn test_text_is_aligned() {
        let text = format_entries_text(&entries());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "app.name    = demo  # 5.conf: 1");
        assert_eq!(lines[1], "db.password = 7 chars  # 9.conf: 3");
    }

    #[test]
    fn test_json_and_yaml() {
        let json = format_entries(&entries(), OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["app.name"]["origin"], "5.conf: 1");

        let yaml = format_entries(&entries(), OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("app.name:"));
        assert!(yaml.contains("value: 7 chars"));
    }
}
