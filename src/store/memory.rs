//! Process-local key-value store.
//!
//! [`MemoryStore`] plays the server: it owns the data, accepts writes and
//! fans changes out to prefix watchers. Each [`StoreFactory::connect`]
//! call returns a new [`MemoryConnection`] to the same data, so a
//! synchronizer replacing its connection after a lost watch behaves the
//! way it would against a real remote store. Outages can be simulated
//! with [`MemoryStore::set_available`] and
//! [`MemoryStore::terminate_watches`].

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::KeyValue;
use super::RemoteStore;
use super::StoreFactory;
use super::StoreResult;
use super::WatchEvent;
use super::WatchEventType;
use super::WatchId;
use super::WatchMessage;
use super::WatchSender;
use crate::StoreError;

/// Internal watcher state
#[derive(Debug)]
struct Watcher {
    prefix: Vec<u8>,
    sender: WatchSender,
}

#[derive(Debug)]
struct MemoryStoreInner {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,

    /// Watchers keyed by id (lock-free concurrent HashMap)
    watchers: DashMap<WatchId, Watcher>,

    /// Next watcher ID (monotonically increasing)
    next_watch_id: AtomicU64,

    available: AtomicBool,

    /// Connections handed out so far
    connections: AtomicUsize,
}

/// In-memory store shared by all of its connections
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryStoreInner {
                data: RwLock::new(BTreeMap::new()),
                watchers: DashMap::new(),
                next_watch_id: AtomicU64::new(1),
                available: AtomicBool::new(true),
                connections: AtomicUsize::new(0),
            }),
        }
    }

    pub fn put(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) {
        self.apply_batch(vec![WatchEvent::put(key, value)]);
    }

    pub fn delete(
        &self,
        key: impl Into<Vec<u8>>,
    ) {
        self.apply_batch(vec![WatchEvent::delete(key)]);
    }

    /// Applies `events` atomically and notifies each matching watcher with
    /// a single batch, in order. Deleting an absent key still notifies.
    pub fn apply_batch(
        &self,
        events: Vec<WatchEvent>,
    ) {
        {
            let mut data = self.inner.data.write();
            for event in &events {
                match event.event_type {
                    WatchEventType::Put => {
                        data.insert(event.key.clone(), event.value.clone());
                    }
                    WatchEventType::Delete => {
                        data.remove(&event.key);
                    }
                }
            }
        }

        let mut overflowed = Vec::new();
        for watcher in self.inner.watchers.iter() {
            let batch: Vec<WatchEvent> = events
                .iter()
                .filter(|e| e.key.starts_with(&watcher.prefix))
                .cloned()
                .collect();
            if batch.is_empty() {
                continue;
            }

            match watcher.sender.try_send(WatchMessage::Events(batch)) {
                Ok(()) => trace!(watch_id = *watcher.key(), "watch batch delivered"),
                Err(TrySendError::Full(_)) => {
                    warn!(watch_id = *watcher.key(), "watch buffer full, cancelling watch");
                    overflowed.push(*watcher.key());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(watch_id = *watcher.key(), "watch receiver gone")
                }
            }
        }

        // A watcher that missed a batch is stale. Dropping its sender closes
        // the stream once the buffered batches are drained.
        for id in overflowed {
            self.inner.watchers.remove(&id);
        }
    }

    /// Value currently stored under `key`
    pub fn get(
        &self,
        key: impl AsRef<[u8]>,
    ) -> Option<Vec<u8>> {
        self.inner.data.read().get(key.as_ref()).cloned()
    }

    /// While unavailable, every fetch and watch registration fails with
    /// [`StoreError::Unavailable`]. Existing watches are left alone.
    pub fn set_available(
        &self,
        available: bool,
    ) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Ends every active watch stream with a `Terminated` message, as a
    /// store shutting down would.
    pub fn terminate_watches(
        &self,
        reason: &str,
    ) {
        let ids: Vec<WatchId> = self.inner.watchers.iter().map(|w| *w.key()).collect();
        for id in ids {
            if let Some((_, watcher)) = self.inner.watchers.remove(&id) {
                if let Err(e) = watcher.sender.try_send(WatchMessage::Terminated(reason.to_string())) {
                    debug!(watch_id = id, "terminate not delivered: {}", e);
                }
            }
        }
    }

    /// Simulates a store crash: becomes unavailable and kills all watches.
    pub fn shutdown(&self) {
        self.set_available(false);
        self.terminate_watches("store shut down");
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.len()
    }

    /// Number of connections created through [`StoreFactory::connect`]
    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }
}

impl StoreFactory for MemoryStore {
    fn connect(&self) -> StoreResult<Arc<dyn RemoteStore>> {
        self.inner.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryConnection {
            inner: self.inner.clone(),
            closed: AtomicBool::new(false),
            watches: Mutex::new(Vec::new()),
        }))
    }
}

/// One client connection to a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryConnection {
    inner: Arc<MemoryStoreInner>,
    closed: AtomicBool,
    /// Watches registered through this connection
    watches: Mutex<Vec<WatchId>>,
}

impl MemoryConnection {
    fn ensure_usable(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryConnection {
    async fn fetch_prefix(
        &self,
        prefix: &str,
    ) -> StoreResult<Vec<KeyValue>> {
        self.ensure_usable()?;

        let data = self.inner.data.read();
        Ok(data
            .range(prefix.as_bytes().to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix.as_bytes()))
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect())
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        sink: WatchSender,
    ) -> StoreResult<WatchId> {
        self.ensure_usable()?;

        let id = self.inner.next_watch_id.fetch_add(1, Ordering::SeqCst);
        self.inner.watchers.insert(
            id,
            Watcher {
                prefix: prefix.as_bytes().to_vec(),
                sender: sink,
            },
        );
        self.watches.lock().push(id);
        debug!(watch_id = id, prefix, "watch registered");
        Ok(id)
    }

    async fn cancel_watch(
        &self,
        watch_id: WatchId,
    ) -> StoreResult<()> {
        self.watches.lock().retain(|id| *id != watch_id);
        match self.inner.watchers.remove(&watch_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::WatchNotFound(watch_id)),
        }
    }

    async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // dropping the senders ends the streams of this connection only
        let ids = std::mem::take(&mut *self.watches.lock());
        for id in ids {
            self.inner.watchers.remove(&id);
        }
        Ok(())
    }
}
