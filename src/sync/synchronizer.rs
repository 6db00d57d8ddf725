use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::SyncState;
use super::UpdateCallback;
use crate::cache::SettingsCache;
use crate::codec::decode_setting;
use crate::codec::ChangeEvent;
use crate::store::RemoteStore;
use crate::store::StoreFactory;
use crate::store::WatchEvent;
use crate::store::WatchId;
use crate::store::WatchMessage;
use crate::utils::async_task::spawn_task;
use crate::utils::async_task::with_timeout;
use crate::DecodeError;
use crate::Result;
use crate::StoreError;
use crate::SyncConfig;

/// A store connection plus a counter telling replacements apart in logs
struct Connection {
    store: Arc<dyn RemoteStore>,
    generation: u64,
}

/// Owns the store connection and is the only writer of the settings cache.
///
/// Created by [`DynconfBuilder::build`](crate::DynconfBuilder::build);
/// embedders normally reach it through [`Dynconf`](crate::Dynconf).
pub struct Synchronizer {
    path: String,
    cache: Arc<SettingsCache>,
    factory: Arc<dyn StoreFactory>,
    /// Swapped for a fresh connection on every reconnect
    connection: ArcSwap<Connection>,
    next_generation: AtomicU64,
    config: SyncConfig,
    request_timeout: Duration,
    on_update: Option<UpdateCallback>,
    state_tx: watch::Sender<SyncState>,

    /// Active watch registration, None when not watching
    watch_id: Mutex<Option<WatchId>>,
    ever_watched: AtomicBool,
    closed: AtomicBool,
    /// Observed by the watch loop between every reconnect step
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("generation", &self.connection.load().generation)
            .finish_non_exhaustive()
    }
}

impl Synchronizer {
    /// Connects through `factory`. Nothing is fetched until
    /// [`start`](Self::start).
    pub fn new(
        path: String,
        cache: Arc<SettingsCache>,
        factory: Arc<dyn StoreFactory>,
        config: SyncConfig,
        request_timeout: Duration,
        on_update: Option<UpdateCallback>,
    ) -> Result<Arc<Self>> {
        let store = factory.connect()?;
        let (state_tx, _) = watch::channel(SyncState::Uninitialized);

        Ok(Arc::new(Self {
            path,
            cache,
            factory,
            connection: ArcSwap::from_pointee(Connection { store, generation: 1 }),
            next_generation: AtomicU64::new(2),
            config,
            request_timeout,
            on_update,
            state_tx,
            watch_id: Mutex::new(None),
            ever_watched: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every state transition
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    /// Whether the background watch loop is still alive
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Initial bulk load followed by watch registration.
    ///
    /// A failed load leaves the cache as it is. A failed registration
    /// either hands over to the reconnect loop or, with
    /// `retry_watch_on_startup` disabled, leaves the synchronizer
    /// [`Unwatched`](SyncState::Unwatched).
    pub async fn start(self: &Arc<Self>) {
        if self.state() != SyncState::Uninitialized {
            warn!(path = %self.path, state = %self.state(), "dynconf already started");
            return;
        }
        self.set_state(SyncState::Loading);

        if let Err(e) = self.load().await {
            error!(path = %self.path, err = %e, "dynconf failed to load settings");
        }

        match self.subscribe().await {
            Ok(rx) => {
                self.set_state(SyncState::Watching);
                self.spawn_watch_loop(Some(rx));
            }
            Err(e) => {
                error!(path = %self.path, err = %e, "dynconf failed to watch settings");
                if self.config.retry_watch_on_startup {
                    self.set_state(SyncState::Reconnecting);
                    self.spawn_watch_loop(None);
                } else {
                    self.set_state(SyncState::Unwatched);
                }
            }
        }
    }

    /// Cancels the watch and closes the connection.
    ///
    /// Only the first call has an effect. A reconnect loop in progress
    /// stops at its next step without further reload or watch attempts.
    /// If no watch was ever registered nothing is cancelled or closed.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();

        let watch_id = self.watch_id.lock().take();
        if self.ever_watched.load(Ordering::SeqCst) {
            let connection = self.connection.load_full();
            if let Some(watch_id) = watch_id {
                if let Err(e) = connection.store.cancel_watch(watch_id).await {
                    warn!(path = %self.path, watch_id, err = %e, "dynconf failed to cancel watch");
                }
            }
            if let Err(e) = connection.store.close().await {
                warn!(path = %self.path, err = %e, "dynconf failed to close store connection");
            }
        }

        self.state_tx.send_replace(SyncState::Closed);
        info!(path = %self.path, "dynconf closed");
    }

    /// Stops the watch loop without touching the connection. Used when
    /// the owning handle is dropped without `close`.
    pub(crate) fn abandon(&self) {
        self.shutdown.cancel();
    }

    /// Fetches every setting under the path prefix and makes the cache
    /// match it. All-or-nothing: one undecodable entry rejects the whole
    /// batch and the cache is left untouched.
    pub(crate) async fn load(&self) -> Result<usize> {
        let connection = self.connection.load_full();
        let kvs = with_timeout(self.request_timeout, connection.store.fetch_prefix(&self.path)).await?;

        let prefix_len = self.path.len();
        let settings = kvs
            .iter()
            .map(|kv| decode_setting(&kv.key, &kv.value, prefix_len))
            .collect::<std::result::Result<Vec<_>, DecodeError>>()
            .map_err(|e| {
                error!(path = %self.path, err = %e, "dynconf failed to decode setting");
                e
            })?;

        let fetched: HashSet<&str> = settings.iter().map(|(name, _)| name.as_str()).collect();
        let gone: Vec<String> = self
            .cache
            .snapshot()
            .into_keys()
            .filter(|name| !fetched.contains(name.as_str()))
            .collect();
        for name in gone {
            self.cache.delete(&name);
        }

        let count = settings.len();
        for (name, value) in settings {
            self.cache.put(name, value);
        }
        debug!(path = %self.path, count, generation = connection.generation, "dynconf settings loaded");
        Ok(count)
    }

    /// Registers a prefix watch on the current connection
    async fn subscribe(&self) -> Result<mpsc::Receiver<WatchMessage>> {
        let connection = self.connection.load_full();
        let (tx, rx) = mpsc::channel(self.config.event_buffer_size);
        let watch_id =
            with_timeout(self.request_timeout, connection.store.watch_prefix(&self.path, tx)).await?;

        {
            let mut slot = self.watch_id.lock();
            if !self.shutdown.is_cancelled() {
                *slot = Some(watch_id);
                self.ever_watched.store(true, Ordering::SeqCst);
                debug!(path = %self.path, watch_id, generation = connection.generation, "dynconf watching");
                return Ok(rx);
            }
        }

        // close() ran while the registration was in flight
        if let Err(e) = connection.store.cancel_watch(watch_id).await {
            debug!(path = %self.path, watch_id, err = %e, "dynconf failed to cancel late watch");
        }
        Err(StoreError::Closed.into())
    }

    fn spawn_watch_loop(
        self: &Arc<Self>,
        rx: Option<mpsc::Receiver<WatchMessage>>,
    ) {
        let this = self.clone();
        let handle = spawn_task("dynconf-watch", move || this.run(rx));
        *self.task.lock() = Some(handle);
    }

    /// Watch loop. Without an initial receiver it starts in the reconnect
    /// loop.
    async fn run(
        self: Arc<Self>,
        rx: Option<mpsc::Receiver<WatchMessage>>,
    ) {
        let mut rx = match rx {
            Some(rx) => rx,
            None => match self.reconnect().await {
                Some(rx) => rx,
                None => return,
            },
        };

        loop {
            let message = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                message = rx.recv() => message,
            };

            let reason = match message {
                Some(WatchMessage::Events(events)) => {
                    self.apply_events(&events);
                    continue;
                }
                Some(WatchMessage::Terminated(reason)) => reason,
                None => "watch channel closed".to_string(),
            };

            rx = match self.recover(&reason).await {
                Some(rx) => rx,
                None => return,
            };
        }
    }

    fn apply_events(
        &self,
        events: &[WatchEvent],
    ) {
        let prefix_len = self.path.len();
        let mut applied = 0usize;
        for event in events {
            match ChangeEvent::decode(event, prefix_len) {
                Ok(change) => {
                    trace!(path = %self.path, setting = change.name(), "dynconf applying change");
                    self.cache.apply(change);
                    applied += 1;
                }
                Err(e) => {
                    error!(path = %self.path, err = %e, "dynconf failed to decode setting");
                }
            }
        }
        debug!(path = %self.path, applied, "dynconf applied watch batch");

        if let Some(on_update) = &self.on_update {
            on_update(&self.cache.snapshot());
        }
    }

    /// Handles a terminated watch stream
    async fn recover(
        &self,
        reason: &str,
    ) -> Option<mpsc::Receiver<WatchMessage>> {
        if self.shutdown.is_cancelled() {
            return None;
        }
        error!(path = %self.path, reason, "dynconf watch failed: stream terminated");
        self.watch_id.lock().take();

        // the startup load may have failed; one more try before backing off
        if self.cache.is_empty() {
            if let Err(e) = self.load().await {
                warn!(path = %self.path, err = %e, "dynconf failed to load settings");
            }
        }

        self.reconnect().await
    }

    /// Reconnect loop: fresh connection, then wait / reload / re-watch
    /// until both succeed or the synchronizer is closed.
    async fn reconnect(&self) -> Option<mpsc::Receiver<WatchMessage>> {
        self.set_state(SyncState::Reconnecting);
        let backoff = self.config.reconnect_backoff();
        info!(path = %self.path, ?backoff, "dynconf reconnecting");

        let mut connected = self.replace_connection().await;
        let mut attempt = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!(path = %self.path, attempt, "dynconf reconnect abandoned");
                    return None;
                }
                _ = sleep(backoff) => {}
            }
            attempt += 1;

            if !connected {
                connected = self.replace_connection().await;
                if !connected {
                    continue;
                }
            }

            if let Err(e) = self.load().await {
                warn!(path = %self.path, attempt, err = %e, "dynconf reconnect: reload failed");
                continue;
            }
            if self.shutdown.is_cancelled() {
                return None;
            }

            match self.subscribe().await {
                Ok(rx) => {
                    self.set_state(SyncState::Watching);
                    info!(path = %self.path, attempt, "dynconf reconnected");
                    return Some(rx);
                }
                Err(e) => {
                    if self.shutdown.is_cancelled() {
                        return None;
                    }
                    warn!(path = %self.path, attempt, err = %e, "dynconf reconnect: watch failed");
                }
            }
        }
    }

    /// Swaps in a new connection from the factory; the old one is closed
    /// and never retried.
    async fn replace_connection(&self) -> bool {
        let store = match self.factory.connect() {
            Ok(store) => store,
            Err(e) => {
                error!(path = %self.path, err = %e, "dynconf failed to create store connection");
                return false;
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let old = self.connection.swap(Arc::new(Connection { store, generation }));
        if let Err(e) = old.store.close().await {
            debug!(path = %self.path, generation = old.generation, err = %e, "dynconf failed to close stale connection");
        }
        debug!(path = %self.path, generation, "dynconf replaced store connection");

        if self.shutdown.is_cancelled() {
            let current = self.connection.load_full();
            if let Err(e) = current.store.close().await {
                debug!(path = %self.path, generation, err = %e, "dynconf failed to close connection");
            }
            return false;
        }
        true
    }

    fn set_state(
        &self,
        next: SyncState,
    ) {
        self.state_tx.send_if_modified(|state| {
            if *state == SyncState::Closed || *state == next {
                return false;
            }
            debug!(path = %self.path, from = %state, to = %next, "dynconf state transition");
            *state = next;
            true
        });
    }
}
