//! Layered, environment-aware configuration.
//!
//! Configuration is assembled from `.conf` fragments found under the
//! `config/` directory of every resource root. Fragment names follow
//! `<priority>[.<name>[.<env>]].conf`. On top of the fragments sit, from
//! lowest to highest precedence:
//! 1. The raw text in `KTP_CONFIG_OVERRIDE`
//! 2. System properties (`os.*`, `process.*` and caller supplied ones)
//! 3. `sysenv.<VAR>` for every environment variable
//! 4. `CONFIG_FORCE_*` variables, when enabled
//! 5. Programmatic overrides
//! 6. The chosen environment name at `ktp.env`
//!
//! Substitutions (`${path}`, `${?path}`) are resolved after all layers are
//! merged, so fragments can reference values set by any layer.

mod builder;
mod discovery;
mod environment;
mod hocon;
mod manager;
mod merge;
mod node;
mod ordering;
mod render;
mod resolve;
mod schema;
mod tree;

pub use builder::{
    BuildOptions, ENV_PATH, FORCE_PREFIX, RAW_OVERRIDE_VAR, SYSENV_PREFIX, build_config,
    process_properties,
};
pub use discovery::{CONFIG_DIR, CONFIG_EXTENSION, ConfigFragment, ConfigSources, FragmentName, ResourceRoot};
pub use environment::{DEFAULT_ENV_NAME, ENV_SELECTORS, LOCAL_DEV_ENV_KEY, LOCAL_MARKER, RuntimeEnvironment};
pub use hocon::{infer_scalar, parse_document};
pub use manager::{ConfigManager, ConfigManagerBuilder, FromConfig};
pub use merge::{merge_layers, merge_nodes};
pub use node::{ConfigNode, NodeValue, Piece, join_path, split_path};
pub use ordering::applies_to_environment;
pub use render::{ConfigEntry, EXCLUDED_PREFIXES, MAX_VALUE_LENGTH, SENSITIVE_WORDS, get_all_config, is_sensitive};
pub use resolve::resolve;
pub use schema::{ConfigRecord, Schema, child_path_for, extract};
pub use tree::ResolvedConfigTree;
