//! Runtime environment selection.
//!
//! The active environment decides which env-tagged fragments apply. It is
//! resolved once per process from, in order:
//! 1. `KTP_ENV` / `ktp.env`, then `ENVIRONMENT` / `environment`
//!    (environment variable first, system property second)
//! 2. the `localDevEnv` key of the priority-0 unnamed fragment
//! 3. [`DEFAULT_ENV_NAME`]

use super::discovery::ConfigFragment;
use super::hocon::parse_document;
use super::node::NodeValue;
use crate::error::ConfigError;
use regex_lite::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

/// Name of the default local-development environment.
pub const DEFAULT_ENV_NAME: &str = "localdev";

/// Fragment name reserved for local-only settings; never applied in tests.
pub const LOCAL_MARKER: &str = "local";

/// Key read from `0.conf` when no environment is selected explicitly.
pub const LOCAL_DEV_ENV_KEY: &str = "localDevEnv";

/// `(environment variable, system property)` pairs, checked in order.
pub const ENV_SELECTORS: &[(&str, &str)] = &[("KTP_ENV", "ktp.env"), ("ENVIRONMENT", "environment")];

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("valid environment name regex"));

/// A named deployment context, e.g. `prod`, `dev` or `localdev`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeEnvironment {
    name: Cow<'static, str>,
    is_test_context: bool,
}

impl RuntimeEnvironment {
    /// Environment used by unit tests.
    pub const UNIT_TEST: RuntimeEnvironment = RuntimeEnvironment {
        name: Cow::Borrowed("unittest"),
        is_test_context: true,
    };

    /// Environment used by integration tests.
    pub const INTEGRATION_TEST: RuntimeEnvironment = RuntimeEnvironment {
        name: Cow::Borrowed("integrationtest"),
        is_test_context: true,
    };

    /// Create a non-test environment, validating the name.
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_test_context(name, false)
    }

    pub fn with_test_context(name: impl Into<String>, is_test_context: bool) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::Environment {
                name,
                reason: "name must not be blank".into(),
            });
        }
        if !NAME_RE.is_match(&name) {
            return Err(ConfigError::Environment {
                name,
                reason: "name must start with a lowercase letter or digit and contain only those and '-'".into(),
            });
        }
        Ok(Self {
            name: Cow::Owned(name),
            is_test_context,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_test_context(&self) -> bool {
        self.is_test_context
    }

    /// The default local-development environment.
    pub fn is_default(&self) -> bool {
        !self.is_test_context && self.name == DEFAULT_ENV_NAME
    }

    /// Any local-development variant, e.g. `localdev` or `localdev-ci`.
    pub fn is_local_dev(&self) -> bool {
        !self.is_test_context && self.name.to_lowercase().starts_with(DEFAULT_ENV_NAME)
    }

    /// Resolve the active environment from the process inputs and fragments.
    pub fn resolve(
        env_vars: &BTreeMap<String, String>,
        properties: &BTreeMap<String, String>,
        fragments: &[ConfigFragment],
    ) -> Result<Self, ConfigError> {
        for (var, prop) in ENV_SELECTORS {
            let selected = non_blank(env_vars.get(*var)).or_else(|| non_blank(properties.get(*prop)));
            if let Some(name) = selected {
                debug!(source = %var, env = %name, "Environment selected explicitly");
                return Self::new(name);
            }
        }

        if let Some(name) = local_dev_env(fragments) {
            debug!(env = %name, "Environment selected by {}", LOCAL_DEV_ENV_KEY);
            return Self::new(name);
        }

        Self::new(DEFAULT_ENV_NAME)
    }
}

impl fmt::Display for RuntimeEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Read `localDevEnv` from the priority-0 unnamed, untagged fragment.
fn local_dev_env(fragments: &[ConfigFragment]) -> Option<String> {
    let base = fragments
        .iter()
        .find(|f| f.priority == 0 && f.name.is_empty() && f.env_tag.is_empty())?;
    let doc = match parse_document(&base.body, &base.file_name) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "Could not read {} from {}", LOCAL_DEV_ENV_KEY, base.file_name);
            return None;
        }
    };
    let NodeValue::Object(map) = doc.value else {
        return None;
    };
    match &map.get(LOCAL_DEV_ENV_KEY)?.value {
        NodeValue::Scalar(Value::String(s)) => non_blank(Some(s)),
        _ => None,
    }
}
