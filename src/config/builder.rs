//! Layered configuration build.
//!
//! Layers from highest to lowest precedence:
//! 1. Runtime environment name at [`ENV_PATH`]
//! 2. Explicit override map
//! 3. `CONFIG_FORCE_*` environment variables (only with `env_var_overrides`)
//! 4. The whole process environment under [`SYSENV_PREFIX`]
//! 5. System properties (process facts plus caller-supplied properties)
//! 6. Raw override text from [`RAW_OVERRIDE_VAR`] (dropped if malformed)
//! 7. Applicable fragments in merge order
//!
//! Substitutions are resolved once all layers are merged.

use super::discovery::ConfigFragment;
use super::environment::RuntimeEnvironment;
use super::hocon::{infer_scalar, parse_document};
use super::merge::merge_layers;
use super::node::{ConfigNode, NodeValue, insert_path, split_path};
use super::ordering::applies_to_environment;
use super::resolve::resolve;
use super::tree::ResolvedConfigTree;
use crate::error::ConfigError;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Path holding the active environment name.
pub const ENV_PATH: &str = "ktp.env";

/// Namespace holding every process environment variable.
pub const SYSENV_PREFIX: &str = "sysenv";

/// Environment variable carrying raw configuration text.
pub const RAW_OVERRIDE_VAR: &str = "KTP_CONFIG_OVERRIDE";

/// Prefix of environment variables that force a single config path.
pub const FORCE_PREFIX: &str = "CONFIG_FORCE_";

/// Runtime inputs folded on top of the discovered fragments.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Explicit `path -> value` overrides; these win over every fragment.
    pub overrides: BTreeMap<String, Value>,
    /// Snapshot of the process environment.
    pub env_vars: BTreeMap<String, String>,
    /// Process properties, keyed by dotted path.
    pub system_properties: BTreeMap<String, String>,
    /// Apply `CONFIG_FORCE_*` variables as overrides.
    pub env_var_overrides: bool,
}

impl BuildOptions {
    /// Options populated from the running process.
    pub fn from_process() -> Self {
        Self {
            overrides: BTreeMap::new(),
            env_vars: std::env::vars().collect(),
            system_properties: process_properties(),
            env_var_overrides: false,
        }
    }

    pub fn with_override(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.insert(path.into(), value.into());
        self
    }

    pub fn with_env_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(name.into(), value.into());
        self
    }

    pub fn with_property(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.system_properties.insert(path.into(), value.into());
        self
    }

    pub fn with_env_var_overrides(mut self, enabled: bool) -> Self {
        self.env_var_overrides = enabled;
        self
    }
}

/// Facts about the running process exposed as system properties.
pub fn process_properties() -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    props.insert("os.name".to_string(), std::env::consts::OS.to_string());
    props.insert("os.arch".to_string(), std::env::consts::ARCH.to_string());
    props.insert("os.family".to_string(), std::env::consts::FAMILY.to_string());
    props.insert("process.pid".to_string(), std::process::id().to_string());
    if let Ok(cwd) = std::env::current_dir() {
        props.insert("process.cwd".to_string(), cwd.display().to_string());
    }
    if let Some(home) = dirs::home_dir() {
        props.insert("os.home".to_string(), home.display().to_string());
    }
    props
}

/// Fold all layers for `env` into one resolved tree.
pub fn build_config(
    env: &RuntimeEnvironment,
    fragments: &[ConfigFragment],
    options: &BuildOptions,
) -> Result<ResolvedConfigTree, ConfigError> {
    let mut layers = vec![
        ConfigNode::from_paths([(ENV_PATH, Value::String(env.name().to_string()))], "runtime environment"),
        ConfigNode::from_paths(options.overrides.clone(), "override map"),
    ];

    if options.env_var_overrides {
        layers.push(force_overrides(&options.env_vars));
    }
    layers.push(sysenv_layer(&options.env_vars));
    layers.push(ConfigNode::from_paths(
        options
            .system_properties
            .iter()
            .map(|(k, v)| (k.as_str(), Value::String(v.clone()))),
        "system properties",
    ));

    if let Some(text) = options.env_vars.get(RAW_OVERRIDE_VAR) {
        match parse_document(text, &format!("env var {RAW_OVERRIDE_VAR}")) {
            Ok(node) => layers.push(node),
            Err(e) => warn!(error = %e, "Ignoring malformed {}", RAW_OVERRIDE_VAR),
        }
    }

    let mut ordered: Vec<&ConfigFragment> = fragments.iter().collect();
    ordered.sort();
    for fragment in ordered {
        if !applies_to_environment(fragment, env) {
            debug!(file = %fragment.file_name, env = %env, "Skipping fragment for environment");
            continue;
        }
        layers.push(parse_document(&fragment.body, &fragment.file_name)?);
    }

    resolve(&merge_layers(layers))
}

/// `CONFIG_FORCE_a_b__c___d=1` forces `a.b-c_d = 1`.
fn force_overrides(env_vars: &BTreeMap<String, String>) -> ConfigNode {
    let mut root = BTreeMap::new();
    for (name, value) in env_vars {
        let Some(raw_path) = name.strip_prefix(FORCE_PREFIX) else {
            continue;
        };
        let path = split_path(&force_var_to_path(raw_path));
        if path.is_empty() {
            continue;
        }
        let origin = format!("env var {name}");
        insert_path(&mut root, &path, ConfigNode::scalar(infer_scalar(value), origin));
    }
    ConfigNode::new(NodeValue::Object(root), "env var overrides")
}

fn force_var_to_path(raw: &str) -> String {
    let mut out = String::new();
    let mut underscores = 0;
    let flush = |out: &mut String, n: &mut usize| {
        while *n >= 3 {
            out.push('_');
            *n -= 3;
        }
        match *n {
            2 => out.push('-'),
            1 => out.push('.'),
            _ => {}
        }
        *n = 0;
    };
    for c in raw.chars() {
        if c == '_' {
            underscores += 1;
        } else {
            flush(&mut out, &mut underscores);
            out.push(c);
        }
    }
    flush(&mut out, &mut underscores);
    out
}

/// Every environment variable as a leaf of [`SYSENV_PREFIX`]; names are not
/// split on dots.
fn sysenv_layer(env_vars: &BTreeMap<String, String>) -> ConfigNode {
    let vars = env_vars
        .iter()
        .map(|(k, v)| (k.clone(), ConfigNode::scalar(v.clone(), "env variables")))
        .collect();
    let mut root = BTreeMap::new();
    root.insert(
        SYSENV_PREFIX.to_string(),
        ConfigNode::new(NodeValue::Object(vars), "env variables"),
    );
    ConfigNode::new(NodeValue::Object(root), "env variables")
}
