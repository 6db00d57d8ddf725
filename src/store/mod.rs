//! Remote key-value store abstraction
//!
//! The synchronizer consumes the store only through [`RemoteStore`] (one
//! live connection) and [`StoreFactory`] (how to build a fresh connection
//! after the old one is lost). Implementations:
//!
//! - [`MemoryStore`]: process-local store, used for embedding and tests
//! - `EtcdStore` (feature `etcd`): etcd v3 over gRPC
//!
//! Watch batches are not delivered through a user callback running on the
//! store's own thread. Instead the synchronizer hands the store a bounded
//! channel sender, and the store enqueues [`WatchMessage`]s on it. The
//! synchronizer is the only consumer and the only writer of the cache.

mod memory;
pub use memory::*;

#[cfg(feature = "etcd")]
mod etcd;
#[cfg(feature = "etcd")]
pub use etcd::*;

#[cfg(all(test, feature = "etcd"))]
mod etcd_test;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

use crate::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Identifies a watch registration so it can be cancelled
pub type WatchId = u64;

/// Channel half on which a store delivers watch batches
pub type WatchSender = mpsc::Sender<WatchMessage>;

/// Raw key/value pair as stored remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Event type for watch notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    /// Key was inserted or updated
    Put,
    /// Key was deleted
    Delete,
}

/// Raw key change as delivered by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Full key, path prefix included
    pub key: Vec<u8>,
    /// New value (empty for DELETE events)
    pub value: Vec<u8>,
    pub event_type: WatchEventType,
}

impl WatchEvent {
    pub fn put(
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            event_type: WatchEventType::Put,
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Vec::new(),
            event_type: WatchEventType::Delete,
        }
    }
}

/// One delivery on a watch channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMessage {
    /// Events in the store's delivery order
    Events(Vec<WatchEvent>),
    /// The underlying stream ended abnormally (e.g. store shutdown).
    /// No further messages follow on this channel.
    Terminated(String),
}

/// One connection to the remote store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Returns every key/value pair whose key starts with `prefix`
    async fn fetch_prefix(
        &self,
        prefix: &str,
    ) -> StoreResult<Vec<KeyValue>>;

    /// Registers a watch on every key starting with `prefix`.
    ///
    /// Returns only once the registration is acknowledged; afterwards
    /// batches are sent to `sink` until the watch is cancelled or the
    /// stream terminates.
    async fn watch_prefix(
        &self,
        prefix: &str,
        sink: WatchSender,
    ) -> StoreResult<WatchId>;

    async fn cancel_watch(
        &self,
        watch_id: WatchId,
    ) -> StoreResult<()>;

    /// Closes the connection. Pending watches stop delivering.
    async fn close(&self) -> StoreResult<()>;
}

/// Builds store connections; used at construction and again on every
/// reconnect, since a connection whose watch stream died is not reused.
#[cfg_attr(test, automock)]
pub trait StoreFactory: Send + Sync + 'static {
    fn connect(&self) -> StoreResult<Arc<dyn RemoteStore>>;
}
