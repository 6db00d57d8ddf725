use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_CONNECT_TIMEOUT_MS;
use crate::constants::DEFAULT_ENDPOINT;
use crate::constants::DEFAULT_REQUEST_TIMEOUT_MS;
use crate::Error;
use crate::Result;

/// Connection parameters for the remote key-value store
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Store endpoints, `host:port` or full URIs
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Bound on a single fetch or watch registration in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "store.endpoints must contain at least one endpoint".into(),
            )));
        }

        if let Some(blank) = self.endpoints.iter().find(|e| e.trim().is_empty()) {
            return Err(Error::Config(ConfigError::Message(format!(
                "store.endpoints contains a blank endpoint: {:?}",
                blank
            ))));
        }

        if self.connect_timeout_in_ms == 0 || self.request_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "store timeouts must be greater than 0".into(),
            )));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_in_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }
}

fn default_endpoints() -> Vec<String> {
    vec![DEFAULT_ENDPOINT.to_string()]
}
fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}
fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}
