//! Typed access to the resolved configuration.
//!
//! [`ConfigManager`] is built once at startup. It owns the resolved tree,
//! the active environment, the eagerly extracted top-level record, and a
//! cache of lazily constructed sub-records.

use super::builder::{BuildOptions, build_config};
use super::discovery::{ConfigFragment, ConfigSources};
use super::environment::RuntimeEnvironment;
use super::render::{ConfigEntry, get_all_config};
use super::schema::{ConfigRecord, extract};
use super::tree::ResolvedConfigTree;
use crate::error::ConfigError;
use anyhow::{Result, anyhow};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

type Shared = Arc<dyn Any + Send + Sync>;
type Factory<C> = Arc<dyn Fn(&ConfigManager<C>) -> Result<Shared> + Send + Sync>;

thread_local! {
    /// `(manager, type)` pairs whose construction is running on this thread.
    static BUILDING: RefCell<HashSet<(usize, TypeId)>> = RefCell::new(HashSet::new());
}

/// Marks a construction as running on the current thread until dropped.
struct Building((usize, TypeId));

impl Building {
    /// `None` if this thread is already constructing the same entry.
    fn enter(manager: usize, type_id: TypeId) -> Option<Self> {
        let key = (manager, type_id);
        let inserted = BUILDING.with(|building| building.borrow_mut().insert(key));
        // A guard built for a rejected entry would clear the key on drop
        if inserted { Some(Self(key)) } else { None }
    }
}

impl Drop for Building {
    fn drop(&mut self) {
        BUILDING.with(|building| {
            building.borrow_mut().remove(&self.0);
        });
    }
}

/// A sub-record built from the manager on first use and cached afterwards.
///
/// Implementations usually extract a child block and derive whatever else
/// they need:
///
/// ```
/// use ktp_config::config::{ConfigManager, ConfigRecord, FromConfig, Schema};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct MailSettings { smtp_host: String }
///
/// impl ConfigRecord for MailSettings {
///     fn describe(schema: &mut Schema) {
///         schema.leaf("smtpHost");
///     }
/// }
///
/// impl<C> FromConfig<C> for MailSettings {
///     fn from_config(config: &ConfigManager<C>) -> anyhow::Result<Self> {
///         Ok(config.extract_child::<Self>()?)
///     }
/// }
/// ```
pub trait FromConfig<C>: Sized + Send + Sync + 'static {
    fn from_config(config: &ConfigManager<C>) -> Result<Self>;
}

/// Resolved configuration with typed accessors.
pub struct ConfigManager<C = Value> {
    env: RuntimeEnvironment,
    tree: ResolvedConfigTree,
    config: C,
    fragments: Vec<ConfigFragment>,
    factories: HashMap<TypeId, Factory<C>>,
    cache: DashMap<TypeId, Arc<OnceCell<Shared>>>,
}

impl<C: ConfigRecord> ConfigManager<C> {
    /// Discover fragments and build from the running process.
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    pub fn builder() -> ConfigManagerBuilder<C> {
        ConfigManagerBuilder::new()
    }

    /// Wrap an already resolved tree.
    pub fn from_tree(env: RuntimeEnvironment, tree: ResolvedConfigTree) -> Result<Self, ConfigError> {
        let config = extract::<C>(&tree, "")?;
        Ok(Self {
            env,
            tree,
            config,
            fragments: Vec::new(),
            factories: HashMap::new(),
            cache: DashMap::new(),
        })
    }
}

impl<C> ConfigManager<C> {
    pub fn env(&self) -> &RuntimeEnvironment {
        &self.env
    }

    /// The mandatory top-level record.
    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn tree(&self) -> &ResolvedConfigTree {
        &self.tree
    }

    /// Fragments discovered for this manager, in merge order.
    pub fn fragments(&self) -> &[ConfigFragment] {
        &self.fragments
    }

    pub fn get_value(&self, path: &str) -> Option<&Value> {
        self.tree.get(path)
    }

    pub fn get_string(&self, path: &str) -> Option<String> {
        self.tree.get_string(path)
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.tree.has_path(path)
    }

    /// Deserialize the whole tree into `T`.
    pub fn extract_top<T: ConfigRecord>(&self) -> Result<T, ConfigError> {
        extract::<T>(&self.tree, "")
    }

    /// Deserialize the block at [`ConfigRecord::child_path`] into `T`.
    pub fn extract_child<T: ConfigRecord>(&self) -> Result<T, ConfigError> {
        extract::<T>(&self.tree, &T::child_path())
    }

    /// Get the cached instance of `T`, constructing it on first use.
    ///
    /// Errors returned by [`FromConfig::from_config`] are passed through
    /// unchanged. A factory that requests its own type, directly or through
    /// other factories, fails with [`ConfigError::ConstructionCycle`].
    pub fn get<T: FromConfig<C>>(&self) -> Result<Arc<T>> {
        self.cached::<T>(|| Ok(Arc::new(T::from_config(self)?) as Shared))
    }

    /// Like [`get`](Self::get), for types whose factory was registered on
    /// the builder.
    pub fn get_registered<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let factory = self
            .factories
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or(ConfigError::NoFactory {
                type_name: type_name::<T>(),
            })?;
        self.cached::<T>(|| factory(self))
    }

    fn cached<T: Send + Sync + 'static>(&self, init: impl FnOnce() -> Result<Shared>) -> Result<Arc<T>> {
        // Clone the cell out so the map shard is not locked while `init` runs
        let cell = Arc::clone(self.cache.entry(TypeId::of::<T>()).or_default().value());
        let shared = match cell.get() {
            Some(shared) => Arc::clone(shared),
            None => {
                let _building = Building::enter(self as *const Self as usize, TypeId::of::<T>())
                    .ok_or(ConfigError::ConstructionCycle {
                        type_name: type_name::<T>(),
                    })?;
                Arc::clone(cell.get_or_try_init(init)?)
            }
        };
        shared
            .downcast::<T>()
            .map_err(|_| anyhow!("cached value for {} has an unexpected type", type_name::<T>()))
    }

    /// Every leaf with its rendered value and origin, redacted and sorted.
    pub fn get_all_config(&self) -> BTreeMap<String, ConfigEntry> {
        get_all_config(&self.tree)
    }

    /// Log [`get_all_config`](Self::get_all_config) as a single line.
    pub fn log_all_config(&self) {
        let entries = self.get_all_config();
        match serde_json::to_string(&entries) {
            Ok(json) => info!(env = %self.env, config = %json, "Resolved configuration"),
            Err(e) => warn!(error = %e, "Could not render configuration"),
        }
    }
}

impl<C> fmt::Debug for ConfigManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigManager")
            .field("env", &self.env)
            .field("fragments", &self.fragments.len())
            .field("factories", &self.factories.len())
            .field("cached", &self.cache.len())
            .finish()
    }
}

/// Builder for [`ConfigManager`].
pub struct ConfigManagerBuilder<C = Value> {
    sources: Option<ConfigSources>,
    fragments: Option<Vec<ConfigFragment>>,
    options: Option<BuildOptions>,
    env: Option<RuntimeEnvironment>,
    factories: HashMap<TypeId, Factory<C>>,
}

impl<C: ConfigRecord> Default for ConfigManagerBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ConfigRecord> ConfigManagerBuilder<C> {
    pub fn new() -> Self {
        Self {
            sources: None,
            fragments: None,
            options: None,
            env: None,
            factories: HashMap::new(),
        }
    }

    /// Roots to scan (default: [`ConfigSources::from_environment`]).
    pub fn sources(mut self, sources: ConfigSources) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Use these fragments instead of scanning any roots.
    pub fn fragments(mut self, fragments: Vec<ConfigFragment>) -> Self {
        self.fragments = Some(fragments);
        self
    }

    /// Runtime inputs (default: [`BuildOptions::from_process`]).
    pub fn options(mut self, options: BuildOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Skip environment resolution and use `env`.
    pub fn env(mut self, env: RuntimeEnvironment) -> Self {
        self.env = Some(env);
        self
    }

    /// Register the factory used by [`ConfigManager::get_registered`].
    pub fn register<T, F>(mut self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ConfigManager<C>) -> Result<T> + Send + Sync + 'static,
    {
        let factory: Factory<C> = Arc::new(move |config: &ConfigManager<C>| {
            Ok(Arc::new(factory(config)?) as Shared)
        });
        self.factories.insert(TypeId::of::<T>(), factory);
        self
    }

    /// Discover, merge and extract. Any failure here is fatal for startup.
    pub fn build(self) -> Result<ConfigManager<C>, ConfigError> {
        let mut fragments = match self.fragments {
            Some(fragments) => fragments,
            None => self.sources.unwrap_or_default().discover()?,
        };
        fragments.sort();

        let options = self.options.unwrap_or_else(BuildOptions::from_process);
        let env = match self.env {
            Some(env) => env,
            None => RuntimeEnvironment::resolve(&options.env_vars, &options.system_properties, &fragments)?,
        };
        info!(env = %env, fragments = fragments.len(), "Building configuration");

        let tree = build_config(&env, &fragments, &options)?;
        let config = extract::<C>(&tree, "")?;

        Ok(ConfigManager {
            env,
            tree,
            config,
            fragments,
            factories: self.factories,
            cache: DashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Schema;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize)]
    struct Top {
        name: String,
    }

    impl ConfigRecord for Top {
        fn describe(schema: &mut Schema) {
            schema.leaf("name");
        }
    }

    fn frag(file_name: &str, body: &str) -> ConfigFragment {
        ConfigFragment::new(format!("mem:{file_name}"), file_name, body).unwrap()
    }

    fn manager(body: &str) -> ConfigManager<Top> {
        ConfigManager::<Top>::builder()
            .fragments(vec![frag("0.conf", body)])
            .options(BuildOptions::default())
            .env(RuntimeEnvironment::new("dev").unwrap())
            .build()
            .unwrap()
    }

    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct Counted {
        name: String,
    }

    impl FromConfig<Top> for Counted {
        fn from_config(config: &ConfigManager<Top>) -> Result<Self> {
            BUILDS.fetch_add(1, Ordering::SeqCst);
            Ok(Self {
                name: config.config().name.clone(),
            })
        }
    }

    #[test]
    fn test_top_record_extracted_eagerly() {
        let m = manager("name = demo");
        assert_eq!(m.config().name, "demo");
        assert_eq!(m.env().name(), "dev");
    }

    #[test]
    fn test_missing_top_field_is_fatal() {
        let err = ConfigManager::<Top>::builder()
            .fragments(vec![frag("0.conf", "other = 1")])
            .options(BuildOptions::default())
            .env(RuntimeEnvironment::new("dev").unwrap())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref path } if path == "name"));
    }

    #[test]
    fn test_get_caches_instance() {
        let m = manager("name = demo");
        let before = BUILDS.load(Ordering::SeqCst);
        let a = m.get::<Counted>().unwrap();
        let b = m.get::<Counted>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name, "demo");
        assert_eq!(BUILDS.load(Ordering::SeqCst) - before, 1);
    }

    #[test]
    fn test_get_registered_requires_factory() {
        let m = manager("name = demo");
        let err = m.get_registered::<String>().unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().unwrap();
        assert!(matches!(config_err, ConfigError::NoFactory { .. }));
        assert!(err.to_string().contains("must register a factory"));
    }

    #[test]
    fn test_get_registered_uses_factory_once() {
        let m = ConfigManager::<Top>::builder()
            .fragments(vec![frag("0.conf", "name = demo")])
            .options(BuildOptions::default())
            .env(RuntimeEnvironment::new("dev").unwrap())
            .register(|config: &ConfigManager<Top>| Ok(format!("hello {}", config.config().name)))
            .build()
            .unwrap();
        let a = m.get_registered::<String>().unwrap();
        let b = m.get_registered::<String>().unwrap();
        assert_eq!(a.as_str(), "hello demo");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_factory_error_passes_through() {
        #[derive(Debug, thiserror::Error)]
        #[error("payment provider unavailable")]
        struct ProviderDown;

        #[derive(Debug)]
        struct Failing;
        impl FromConfig<Top> for Failing {
            fn from_config(_: &ConfigManager<Top>) -> Result<Self> {
                Err(ProviderDown.into())
            }
        }

        let m = manager("name = demo");
        let err = m.get::<Failing>().unwrap_err();
        assert!(err.downcast_ref::<ProviderDown>().is_some());
        assert_eq!(err.to_string(), "payment provider unavailable");
    }

    #[derive(Debug)]
    struct Ping;
    #[derive(Debug)]
    struct Pong;

    impl FromConfig<Top> for Ping {
        fn from_config(config: &ConfigManager<Top>) -> Result<Self> {
            config.get::<Pong>()?;
            Ok(Ping)
        }
    }

    impl FromConfig<Top> for Pong {
        fn from_config(config: &ConfigManager<Top>) -> Result<Self> {
            config.get::<Ping>()?;
            Ok(Pong)
        }
    }

    #[test]
    fn test_construction_cycle_is_an_error() {
        let m = manager("name = demo");
        let err = m.get::<Ping>().unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().unwrap();
        assert!(matches!(config_err, ConfigError::ConstructionCycle { type_name } if type_name.ends_with("Ping")));

        // Nothing was cached and the guard was released
        assert!(m.get::<Ping>().is_err());
        assert!(m.get::<Counted>().is_ok());
    }

    #[test]
    fn test_registered_factory_requesting_itself_is_an_error() {
        let m = ConfigManager::<Top>::builder()
            .fragments(vec![frag("0.conf", "name = demo")])
            .options(BuildOptions::default())
            .env(RuntimeEnvironment::new("dev").unwrap())
            .register(|config: &ConfigManager<Top>| {
                let inner = config.get_registered::<u64>()?;
                Ok(*inner + 1)
            })
            .build()
            .unwrap();
        let err = m.get_registered::<u64>().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ConstructionCycle { .. })
        ));
    }

    #[test]
    fn test_value_manager_accepts_any_tree() {
        let m = ConfigManager::<Value>::builder()
            .fragments(vec![frag("0.conf", "a.b = 1")])
            .options(BuildOptions::default())
            .env(RuntimeEnvironment::new("dev").unwrap())
            .build()
            .unwrap();
        assert_eq!(m.get_value("a.b"), Some(&serde_json::json!(1)));
        assert!(m.has_path("ktp.env"));
    }
}
