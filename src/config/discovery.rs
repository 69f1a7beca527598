//! Fragment discovery across resource roots.
//!
//! Every root is searched for `<dir>/*.conf` where `<dir>` is the logical
//! config directory (`config` by default). Roots are either directories on
//! disk or bundles of fragments compiled into the binary with
//! `include_str!`.
//!
//! File names follow `<priority>[.<name>][.<envTag>].conf`:
//! - `0.conf` - base defaults
//! - `9.database.conf` - named group
//! - `5.myapp.prod.conf` - named group restricted to `prod`

use crate::error::ConfigError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Logical directory searched under every root.
pub const CONFIG_DIR: &str = "config";

/// Extension of fragment files, without the dot.
pub const CONFIG_EXTENSION: &str = "conf";

/// Metadata parsed from a fragment file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentName {
    pub priority: i64,
    pub name: String,
    pub env_tag: String,
}

impl FragmentName {
    /// Parse `<priority>[.<name>][.<envTag>].<ext>`.
    pub fn parse(file_name: &str) -> Result<Self, ConfigError> {
        let mut tokens: Vec<&str> = file_name.split('.').collect();
        if tokens.len() > 1 {
            // Discard the extension
            tokens.pop();
        }

        // Tokens are positional; `5..prod.conf` has an empty name
        let Some((first, rest)) = tokens.split_first() else {
            return Err(ConfigError::discovery(file_name, "missing priority token"));
        };
        if first.is_empty() {
            return Err(ConfigError::discovery(file_name, "missing priority token"));
        }
        let priority = first.parse::<i64>().map_err(|_| {
            ConfigError::discovery(
                file_name,
                format!("priority token '{first}' must be an integer"),
            )
        })?;
        if rest.len() > 2 {
            return Err(ConfigError::discovery(
                file_name,
                "expected at most <priority>.<name>.<envTag>",
            ));
        }

        Ok(Self {
            priority,
            name: rest.first().map(|s| s.to_string()).unwrap_or_default(),
            env_tag: rest.get(1).map(|s| s.to_string()).unwrap_or_default(),
        })
    }
}

/// One discovered configuration source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFragment {
    /// Where the fragment came from, e.g. `file:///etc/app/config/0.conf`.
    pub location_id: String,
    pub file_name: String,
    pub priority: i64,
    /// Logical group name; empty when absent.
    pub name: String,
    /// Environment restriction; empty when the fragment applies everywhere.
    pub env_tag: String,
    pub body: String,
}

impl ConfigFragment {
    pub fn new(
        location_id: impl Into<String>,
        file_name: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let file_name = file_name.into();
        let parsed = FragmentName::parse(&file_name)?;
        Ok(Self {
            location_id: location_id.into(),
            file_name,
            priority: parsed.priority,
            name: parsed.name,
            env_tag: parsed.env_tag,
            body: body.into(),
        })
    }
}

/// A place fragments can be loaded from.
#[derive(Debug, Clone)]
pub enum ResourceRoot {
    /// A directory on disk; fragments live in `<root>/<config dir>/`.
    Directory(PathBuf),
    /// Fragments embedded in the binary, as `(file name, contents)` pairs.
    Embedded {
        bundle: &'static str,
        files: &'static [(&'static str, &'static str)],
    },
}

/// The set of roots scanned by [`ConfigSources::discover`].
#[derive(Debug, Clone)]
pub struct ConfigSources {
    pub roots: Vec<ResourceRoot>,
    pub dir_name: String,
    pub extension: String,
}

impl Default for ConfigSources {
    fn default() -> Self {
        Self::from_environment()
    }
}

impl ConfigSources {
    /// Roots from the environment: the working directory and the user
    /// config dir (`KTP_USER_DIR` or `<config dir>/ktp`).
    pub fn from_environment() -> Self {
        let mut roots = vec![ResourceRoot::Directory(PathBuf::from("."))];

        let user_dir = std::env::var("KTP_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join("ktp")));
        if let Some(dir) = user_dir {
            roots.push(ResourceRoot::Directory(dir));
        }

        Self::with_roots(roots)
    }

    /// Sources with explicit roots.
    pub fn with_roots(roots: Vec<ResourceRoot>) -> Self {
        Self {
            roots,
            dir_name: CONFIG_DIR.to_string(),
            extension: CONFIG_EXTENSION.to_string(),
        }
    }

    /// Add a root scanned after the existing ones.
    pub fn with_root(mut self, root: ResourceRoot) -> Self {
        self.roots.push(root);
        self
    }

    /// Scan every root. Each call re-reads the sources.
    ///
    /// Returns fragments sorted by merge order.
    pub fn discover(&self) -> Result<Vec<ConfigFragment>, ConfigError> {
        let mut fragments = Vec::new();
        for root in &self.roots {
            match root {
                ResourceRoot::Directory(dir) => self.scan_directory(dir, &mut fragments)?,
                ResourceRoot::Embedded { bundle, files } => {
                    for (file_name, body) in files.iter() {
                        if !self.has_extension(file_name) {
                            continue;
                        }
                        let location = format!("embedded:{}/{}/{}", bundle, self.dir_name, file_name);
                        debug!(location = %location, "Discovered config fragment");
                        fragments.push(ConfigFragment::new(location, *file_name, *body)?);
                    }
                }
            }
        }

        fragments.sort();
        warn_on_ties(&fragments);
        Ok(fragments)
    }

    fn has_extension(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .is_some_and(|ext| ext == self.extension.as_str())
    }

    fn scan_directory(&self, root: &Path, out: &mut Vec<ConfigFragment>) -> Result<(), ConfigError> {
        let dir = root.join(&self.dir_name);
        let io_error = |source: std::io::Error| ConfigError::Io {
            location: dir.display().to_string(),
            source,
        };
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "Config directory not found, skipping");
                return Ok(());
            }
            Err(e) => return Err(io_error(e)),
        };

        for entry in entries {
            let path = entry.map_err(io_error)?.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !self.has_extension(file_name) {
                continue;
            }

            let body = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                location: path.display().to_string(),
                source,
            })?;
            let absolute = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            let location = format!("file://{}", absolute.display());
            debug!(location = %location, "Discovered config fragment");
            out.push(ConfigFragment::new(location, file_name, body)?);
        }
        Ok(())
    }
}

/// Report fragments that only differ by location; their order is decided by
/// the location id alone.
fn warn_on_ties(sorted: &[ConfigFragment]) {
    for pair in sorted.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.priority == b.priority && a.name == b.name && a.env_tag == b.env_tag {
            warn!(
                first = %a.location_id,
                second = %b.location_id,
                "Config fragments share priority, name and environment; order decided by location"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_name() {
        let parsed = FragmentName::parse("5.myapp.prod.conf").unwrap();
        assert_eq!(parsed.priority, 5);
        assert_eq!(parsed.name, "myapp");
        assert_eq!(parsed.env_tag, "prod");
    }

    #[test]
    fn test_parse_priority_only() {
        let parsed = FragmentName::parse("0.conf").unwrap();
        assert_eq!(parsed.priority, 0);
        assert_eq!(parsed.name, "");
        assert_eq!(parsed.env_tag, "");
    }

    #[test]
    fn test_parse_is_positional() {
        let parsed = FragmentName::parse("5..prod.conf").unwrap();
        assert_eq!(parsed.priority, 5);
        assert_eq!(parsed.name, "");
        assert_eq!(parsed.env_tag, "prod");

        let parsed = FragmentName::parse("5.app..conf").unwrap();
        assert_eq!(parsed.name, "app");
        assert_eq!(parsed.env_tag, "");
    }

    #[test]
    fn test_parse_negative_priority() {
        assert_eq!(FragmentName::parse("-1.early.conf").unwrap().priority, -1);
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        for bad in ["app.conf", ".conf", "conf", "x1.db.conf", "1.a.b.c.conf"] {
            let err = FragmentName::parse(bad).unwrap_err();
            assert!(err.to_string().contains(bad), "{bad}: {err}");
        }
    }

    #[test]
    fn test_discover_directory_and_embedded() {
        static EMBEDDED: &[(&str, &str)] = &[("9.conf", "v = default"), ("README.md", "ignored")];

        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("5.conf"), "v = app").unwrap();
        std::fs::write(config_dir.join("notes.txt"), "not a fragment").unwrap();

        let sources = ConfigSources::with_roots(vec![
            ResourceRoot::Embedded {
                bundle: "defaults",
                files: EMBEDDED,
            },
            ResourceRoot::Directory(temp.path().to_path_buf()),
        ]);
        let fragments = sources.discover().unwrap();

        let names: Vec<&str> = fragments.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["5.conf", "9.conf"]);
        assert!(fragments[0].location_id.starts_with("file://"));
        assert_eq!(fragments[1].location_id, "embedded:defaults/config/9.conf");
        assert_eq!(fragments[1].body, "v = default");
    }

    #[test]
    fn test_discover_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let sources = ConfigSources::with_roots(vec![ResourceRoot::Directory(temp.path().join("nope"))]);
        assert!(sources.discover().unwrap().is_empty());
    }

    #[test]
    fn test_discover_fails_when_config_is_not_a_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_DIR), "v = 1").unwrap();

        let sources = ConfigSources::with_roots(vec![ResourceRoot::Directory(temp.path().to_path_buf())]);
        let err = sources.discover().unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_discover_fails_on_malformed_name() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("defaults.conf"), "a = 1").unwrap();

        let sources = ConfigSources::with_roots(vec![ResourceRoot::Directory(temp.path().to_path_buf())]);
        let err = sources.discover().unwrap_err();
        assert!(matches!(err, ConfigError::Discovery { ref file, .. } if file == "defaults.conf"));
    }
}
