//! Dynconf error hierarchy
//!
//! Errors are grouped by where they originate: the remote store, the
//! ingestion path (decoding raw keys and values) and the read path (typed
//! setting lookups). None of them escape the synchronizer after
//! construction; they surface only through logs, or through the
//! `*_required` getters which hand them to the caller on request.

use std::string::FromUtf8Error;
use std::time::Duration;

use config::ConfigError;

use crate::store::WatchId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Remote store connectivity and protocol failures
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Raw key/value payloads that cannot be ingested
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Missing or malformed setting on the read path
    #[error(transparent)]
    Setting(#[from] SettingError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store cannot be reached (connection refused, outage, shutdown)
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// Request did not complete in time
    #[error("Remote store request timed out after {0:?}")]
    Timeout(Duration),

    /// Store refused to register the watch
    #[error("Watch rejected: {0}")]
    WatchRejected(String),

    /// Cancel requested for a watch that is not registered
    #[error("Watch {0} not found")]
    WatchNotFound(WatchId),

    /// Connection has already been closed
    #[error("Connection closed")]
    Closed,

    /// Malformed endpoint address
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// gRPC transport layer errors
    #[cfg(feature = "etcd")]
    #[error(transparent)]
    Transport(#[from] Box<tonic::transport::Error>),

    /// gRPC status code errors
    #[cfg(feature = "etcd")]
    #[error(transparent)]
    Status(#[from] Box<tonic::Status>),
}

/// Ingestion failures. They indicate corruption or an encoding mismatch
/// upstream, not a transient outage.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Key of {key_len} bytes is shorter than the {prefix_len} byte path prefix")]
    KeyOutsidePrefix { key_len: usize, prefix_len: usize },

    #[error("Setting name is not valid UTF-8")]
    InvalidKey(#[source] FromUtf8Error),

    #[error("Value of setting {name} is not valid UTF-8")]
    InvalidValue {
        name: String,
        #[source]
        source: FromUtf8Error,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingError {
    #[error("dynconf setting not found: {0}")]
    NotFound(String),

    #[error("dynconf invalid {kind} setting {setting}: {value:?} ({reason})")]
    Invalid {
        setting: String,
        value: String,
        kind: &'static str,
        reason: String,
    },
}

#[cfg(feature = "etcd")]
impl From<tonic::transport::Error> for StoreError {
    fn from(err: tonic::transport::Error) -> Self {
        StoreError::Transport(Box::new(err))
    }
}

#[cfg(feature = "etcd")]
impl From<tonic::Status> for StoreError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::Unavailable => StoreError::Unavailable(status.message().to_string()),
            _ => StoreError::Status(Box::new(status)),
        }
    }
}
