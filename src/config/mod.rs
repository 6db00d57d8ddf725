//! Configuration management for dynconf.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Section-wise validation
mod store;
mod sync;
mod watcher;
pub use store::*;
pub use sync::*;
pub use watcher::*;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_PATH_PREFIX;
use crate::constants::ENV_PREFIX;
use crate::Error;
use crate::Result;

/// Main configuration container
///
/// Sources are merged with increasing priority:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables prefixed with `DYNCONF__`
#[derive(Serialize, Deserialize, Clone)]
pub struct DynconfConfig {
    /// Key prefix under which the project's settings live,
    /// e.g. `/configs/curiosity/`
    #[serde(default = "default_path")]
    pub path: String,
    /// Remote store connection parameters
    #[serde(default)]
    pub store: StoreConfig,
    /// Watch and reconnect tuning
    #[serde(default)]
    pub sync: SyncConfig,
    /// Watcher binary settings
    #[serde(default)]
    pub watcher: WatcherConfig,
}

impl Default for DynconfConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            store: StoreConfig::default(),
            sync: SyncConfig::default(),
            watcher: WatcherConfig::default(),
        }
    }
}

impl Debug for DynconfConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("DynconfConfig")
            .field("path", &self.path)
            .field("endpoints", &self.store.endpoints)
            .finish()
    }
}

impl DynconfConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Validation is deferred so further overrides can be layered with
    /// [`with_override_config`](Self::with_override_config). Callers must
    /// call [`validate`](Self::validate) before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("DYNCONF__PATH", "/configs/curiosity/");
    /// let cfg = DynconfConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional overrides from a file without validation.
    ///
    /// Environment variables are re-applied last so they keep the highest
    /// priority.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        if self.path.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "path must not be empty".into(),
            )));
        }
        self.store.validate()?;
        self.sync.validate()?;
        self.watcher.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("store.endpoints")
}

fn default_path() -> String {
    DEFAULT_PATH_PREFIX.to_string()
}
