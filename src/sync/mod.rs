//! Synchronizer: keeps the settings cache in step with the remote store.
//!
//! ```text
//! Uninitialized -> Loading -> Watching <-> Reconnecting
//!                     |                        |
//!                     +------> Unwatched       +-> Closed
//! ```
//!
//! The initial bulk load and watch registration run on the caller's task.
//! Afterwards a single background task owns the watch channel: it applies
//! batches to the cache in delivery order and, when the stream
//! terminates, runs the reconnect loop inline. Only one watch exists per
//! synchronizer, so blocking that task during backoff is acceptable.
//!
//! Every failure after construction is logged and absorbed.

mod synchronizer;
pub use synchronizer::*;


use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of a synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    /// Initial bulk load in progress
    Loading,
    /// Watch registration failed at startup and retrying is disabled;
    /// the cache goes stale until the synchronizer is closed
    Unwatched,
    Watching,
    /// Watch lost; waiting out the backoff, reloading and re-subscribing
    Reconnecting,
    Closed,
}

impl fmt::Display for SyncState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            SyncState::Uninitialized => "uninitialized",
            SyncState::Loading => "loading",
            SyncState::Unwatched => "unwatched",
            SyncState::Watching => "watching",
            SyncState::Reconnecting => "reconnecting",
            SyncState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Hook invoked with a fresh snapshot after every applied watch batch
pub type UpdateCallback = Arc<dyn Fn(&HashMap<String, String>) + Send + Sync>;
