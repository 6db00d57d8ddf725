use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::accessor;
use crate::accessor::SettingValue;
use crate::cache::SettingsCache;
use crate::sync::SyncState;
use crate::sync::Synchronizer;
use crate::DynconfBuilder;
use crate::SettingError;

/// Live view of the settings under one path prefix.
///
/// Reads never touch the network and never fail: absent or malformed
/// settings are logged and the caller's default is returned. Dropping the
/// handle stops the background task; call [`close`](Self::close) to also
/// cancel the watch and close the store connection.
pub struct Dynconf {
    synchronizer: Arc<Synchronizer>,
    cache: Arc<SettingsCache>,
}

impl fmt::Debug for Dynconf {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Dynconf")
            .field("path", &self.path())
            .field("state", &self.state())
            .field("settings", &self.cache.len())
            .finish()
    }
}

impl Dynconf {
    pub(crate) fn new(
        synchronizer: Arc<Synchronizer>,
        cache: Arc<SettingsCache>,
    ) -> Self {
        Self { synchronizer, cache }
    }

    pub fn builder(path: impl Into<String>) -> DynconfBuilder {
        DynconfBuilder::new(path)
    }

    pub fn path(&self) -> &str {
        self.synchronizer.path()
    }

    pub fn state(&self) -> SyncState {
        self.synchronizer.state()
    }

    /// Observes synchronizer state transitions
    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.synchronizer.subscribe_state()
    }

    /// Cancels the watch and closes the store connection. Only the first
    /// call has an effect; reads keep returning the last known values.
    pub async fn close(&self) {
        self.synchronizer.close().await;
    }

    /// Snapshot copy of every setting as its raw string
    pub fn settings(&self) -> HashMap<String, String> {
        self.cache.snapshot()
    }

    pub fn get_string(
        &self,
        name: &str,
        default: &str,
    ) -> String {
        self.get(name, default.to_string())
    }

    pub fn get_boolean(
        &self,
        name: &str,
        default: bool,
    ) -> bool {
        self.get(name, default)
    }

    pub fn get_integer(
        &self,
        name: &str,
        default: i64,
    ) -> i64 {
        self.get(name, default)
    }

    pub fn get_float(
        &self,
        name: &str,
        default: f64,
    ) -> f64 {
        self.get(name, default)
    }

    pub fn get_timestamp(
        &self,
        name: &str,
        default: DateTime<Utc>,
    ) -> DateTime<Utc> {
        self.get(name, default)
    }

    /// Timestamp in a caller-supplied `strftime` format, e.g. `%d/%m/%Y %H:%M`.
    /// A date-only format yields midnight UTC.
    pub fn get_timestamp_with_format(
        &self,
        name: &str,
        format: &str,
        default: DateTime<Utc>,
    ) -> DateTime<Utc> {
        self.require_timestamp_with_format(name, format).unwrap_or(default)
    }

    pub fn require_timestamp_with_format(
        &self,
        name: &str,
        format: &str,
    ) -> Result<DateTime<Utc>, SettingError> {
        accessor::require_with(&self.cache, self.path(), name, "timestamp", |raw| {
            accessor::parse_timestamp_with_format(raw, format)
        })
    }

    /// Splits on `delimiter` and parses every element with `format`
    pub fn get_timestamp_list_with_format(
        &self,
        name: &str,
        format: &str,
        delimiter: &str,
        default: Vec<DateTime<Utc>>,
    ) -> Vec<DateTime<Utc>> {
        accessor::get_list_with(
            &self.cache,
            self.path(),
            name,
            delimiter,
            "timestamp",
            |raw| accessor::parse_timestamp_with_format(raw, format),
            default,
        )
    }

    pub fn get_duration(
        &self,
        name: &str,
        default: Duration,
    ) -> Duration {
        self.get(name, default)
    }

    /// Converts with `T`'s grammar, falling back to `default`
    pub fn get<T: SettingValue>(
        &self,
        name: &str,
        default: T,
    ) -> T {
        accessor::get_or(&self.cache, self.path(), name, default)
    }

    /// Like [`get`](Self::get) but reports absence or a malformed value
    pub fn require<T: SettingValue>(
        &self,
        name: &str,
    ) -> Result<T, SettingError> {
        accessor::require(&self.cache, self.path(), name)
    }

    /// Splits on `delimiter`; any malformed element yields `default`
    pub fn get_list<T: SettingValue>(
        &self,
        name: &str,
        delimiter: &str,
        default: Vec<T>,
    ) -> Vec<T> {
        accessor::get_list_or(&self.cache, self.path(), name, delimiter, default)
    }

    /// Deserializes a JSON setting
    pub fn get_struct<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<T, SettingError> {
        accessor::get_struct(&self.cache, self.path(), name)
    }
}

impl Drop for Dynconf {
    fn drop(&mut self) {
        self.synchronizer.abandon();
    }
}
