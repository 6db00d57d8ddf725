//! A builder for [`Dynconf`] handles.
//!
//! [`DynconfBuilder`] collects the path prefix, the store factory and the
//! synchronizer tuning, then [`build`](DynconfBuilder::build) connects,
//! performs the initial load and registers the watch before returning.
//!
//! ## Example
//! ```ignore
//! let store = MemoryStore::new();
//! let settings = DynconfBuilder::new("/configs/curiosity/")
//!     .store_factory(store.clone())
//!     .reconnect_backoff(Duration::from_secs(5))
//!     .on_update(|all| tracing::info!(count = all.len(), "settings changed"))
//!     .build()
//!     .await?;
//!
//! let velocity = settings.get_integer("velocity", 5);
//! settings.close().await;
//! ```
//!
//! Without an explicit factory, `build()` connects to etcd using the
//! [`StoreConfig`] (feature `etcd`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use config::ConfigError;
use tracing::debug;

use crate::cache::SettingsCache;
use crate::store::StoreFactory;
use crate::sync::Synchronizer;
use crate::sync::UpdateCallback;
use crate::Dynconf;
use crate::DynconfConfig;
use crate::Error;
use crate::Result;
use crate::StoreConfig;
use crate::SyncConfig;

pub struct DynconfBuilder {
    path: String,
    store: StoreConfig,
    sync: SyncConfig,
    factory: Option<Arc<dyn StoreFactory>>,
    on_update: Option<UpdateCallback>,
}

impl DynconfBuilder {
    /// Starts from default store and sync settings for `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            store: StoreConfig::default(),
            sync: SyncConfig::default(),
            factory: None,
            on_update: None,
        }
    }

    /// Takes path, store and sync sections from a loaded configuration
    pub fn from_config(config: &DynconfConfig) -> Self {
        Self {
            path: config.path.clone(),
            store: config.store.clone(),
            sync: config.sync.clone(),
            factory: None,
            on_update: None,
        }
    }

    /// Store used for the initial connection and every reconnect
    pub fn store_factory(
        self,
        factory: impl StoreFactory,
    ) -> Self {
        self.store_factory_arc(Arc::new(factory))
    }

    pub fn store_factory_arc(
        mut self,
        factory: Arc<dyn StoreFactory>,
    ) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn store_config(
        mut self,
        store: StoreConfig,
    ) -> Self {
        self.store = store;
        self
    }

    pub fn reconnect_backoff(
        mut self,
        backoff: Duration,
    ) -> Self {
        self.sync.reconnect_backoff_in_ms = backoff.as_millis() as u64;
        self
    }

    /// See [`SyncConfig::retry_watch_on_startup`]
    pub fn retry_watch_on_startup(
        mut self,
        retry: bool,
    ) -> Self {
        self.sync.retry_watch_on_startup = retry;
        self
    }

    pub fn event_buffer_size(
        mut self,
        size: usize,
    ) -> Self {
        self.sync.event_buffer_size = size;
        self
    }

    /// Called with a fresh snapshot after every applied watch batch, on
    /// the synchronizer's task. Keep it short.
    pub fn on_update<F>(
        mut self,
        callback: F,
    ) -> Self
    where
        F: Fn(&HashMap<String, String>) + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(callback));
        self
    }

    /// Connects, loads and watches.
    ///
    /// Fails only when the configuration is invalid or no connection
    /// object can be constructed. An unreachable store is not an error:
    /// the handle starts with whatever could be loaded and keeps retrying
    /// in the background.
    pub async fn build(self) -> Result<Dynconf> {
        if self.path.is_empty() {
            return Err(Error::Config(ConfigError::Message("path must not be empty".into())));
        }
        self.sync.validate()?;

        let factory = match self.factory {
            Some(factory) => factory,
            None => default_factory(&self.store)?,
        };

        let cache = Arc::new(SettingsCache::new());
        let synchronizer = Synchronizer::new(
            self.path,
            cache.clone(),
            factory,
            self.sync,
            self.store.request_timeout(),
            self.on_update,
        )?;
        synchronizer.start().await;
        debug!(path = synchronizer.path(), state = %synchronizer.state(), "dynconf built");

        Ok(Dynconf::new(synchronizer, cache))
    }
}

#[cfg(feature = "etcd")]
fn default_factory(store: &StoreConfig) -> Result<Arc<dyn StoreFactory>> {
    store.validate()?;
    Ok(Arc::new(crate::store::EtcdStoreFactory::new(store.clone())))
}

#[cfg(not(feature = "etcd"))]
fn default_factory(_store: &StoreConfig) -> Result<Arc<dyn StoreFactory>> {
    Err(Error::Config(ConfigError::Message(
        "no store factory configured; enable the `etcd` feature or call `store_factory`".into(),
    )))
}
