use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_EVENT_BUFFER_SIZE;
use crate::constants::DEFAULT_RECONNECT_BACKOFF_MS;
use crate::Error;
use crate::Result;

/// Tuning for the synchronizer's watch and reconnect loop
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    /// Fixed wait between reconnect attempts, in milliseconds
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_in_ms: u64,

    /// Capacity of the channel that carries watch batches from the store
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// Enter the reconnect loop when the very first watch registration
    /// fails, instead of staying unwatched until closed
    #[serde(default = "default_retry_watch_on_startup")]
    pub retry_watch_on_startup: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_in_ms: default_reconnect_backoff(),
            event_buffer_size: default_event_buffer_size(),
            retry_watch_on_startup: default_retry_watch_on_startup(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_backoff_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "sync.reconnect_backoff_in_ms must be greater than 0".into(),
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "sync.event_buffer_size must be greater than 0".into(),
            )));
        }

        Ok(())
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_in_ms)
    }
}

fn default_reconnect_backoff() -> u64 {
    DEFAULT_RECONNECT_BACKOFF_MS
}
fn default_event_buffer_size() -> usize {
    DEFAULT_EVENT_BUFFER_SIZE
}
fn default_retry_watch_on_startup() -> bool {
    true
}
