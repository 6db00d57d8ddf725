//! Typed accessors over the settings cache.
//!
//! Type semantics are imposed at read time only. Every getter either
//! converts the cached string with the grammar of the requested type, or
//! logs why it could not and falls back to the caller's default. Getters
//! never mutate the cache and never block on the network.

mod timestamp;
pub use timestamp::*;


use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::error;
use tracing::warn;

use crate::cache::SettingsCache;
use crate::SettingError;

/// A type a raw setting string can be converted into
pub trait SettingValue: Sized {
    /// Name used in "invalid setting" reports
    const KIND: &'static str;

    fn parse_setting(raw: &str) -> std::result::Result<Self, String>;
}

impl SettingValue for String {
    const KIND: &'static str = "string";

    fn parse_setting(raw: &str) -> std::result::Result<Self, String> {
        Ok(raw.to_string())
    }
}

/// Only the exact lowercase literals are accepted
impl SettingValue for bool {
    const KIND: &'static str = "boolean";

    fn parse_setting(raw: &str) -> std::result::Result<Self, String> {
        match raw {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err("expected `true` or `false`".to_string()),
        }
    }
}

/// Base-10 only; float-like strings such as `1.001` are rejected
impl SettingValue for i64 {
    const KIND: &'static str = "integer";

    fn parse_setting(raw: &str) -> std::result::Result<Self, String> {
        raw.parse::<i64>().map_err(|e| e.to_string())
    }
}

impl SettingValue for f64 {
    const KIND: &'static str = "float";

    fn parse_setting(raw: &str) -> std::result::Result<Self, String> {
        raw.parse::<f64>().map_err(|e| e.to_string())
    }
}

impl SettingValue for DateTime<Utc> {
    const KIND: &'static str = "timestamp";

    fn parse_setting(raw: &str) -> std::result::Result<Self, String> {
        parse_timestamp(raw, Utc::now())
    }
}

/// humantime grammar, e.g. `250ms`, `1h 30m`
impl SettingValue for Duration {
    const KIND: &'static str = "duration";

    fn parse_setting(raw: &str) -> std::result::Result<Self, String> {
        humantime::parse_duration(raw).map_err(|e| e.to_string())
    }
}

/// Looks `name` up and converts it, reporting absence or a malformed value
/// as an error. Both outcomes are logged.
pub(crate) fn require<T: SettingValue>(
    cache: &SettingsCache,
    path: &str,
    name: &str,
) -> std::result::Result<T, SettingError> {
    require_with(cache, path, name, T::KIND, T::parse_setting)
}

/// [`require`] with an explicit conversion reported as `kind`.
pub(crate) fn require_with<T>(
    cache: &SettingsCache,
    path: &str,
    name: &str,
    kind: &'static str,
    parse: impl Fn(&str) -> std::result::Result<T, String>,
) -> std::result::Result<T, SettingError> {
    let raw = lookup(cache, path, name)?;
    parse(&raw).map_err(|reason| invalid(path, name, raw, kind, reason))
}

/// Same as [`require`], substituting `default` on any failure.
pub(crate) fn get_or<T: SettingValue>(
    cache: &SettingsCache,
    path: &str,
    name: &str,
    default: T,
) -> T {
    require(cache, path, name).unwrap_or(default)
}

/// Splits the raw value on `delimiter` and converts every element. A
/// single malformed element invalidates the whole list.
pub(crate) fn get_list_or<T: SettingValue>(
    cache: &SettingsCache,
    path: &str,
    name: &str,
    delimiter: &str,
    default: Vec<T>,
) -> Vec<T> {
    get_list_with(cache, path, name, delimiter, T::KIND, T::parse_setting, default)
}

pub(crate) fn get_list_with<T>(
    cache: &SettingsCache,
    path: &str,
    name: &str,
    delimiter: &str,
    kind: &'static str,
    parse: impl Fn(&str) -> std::result::Result<T, String>,
    default: Vec<T>,
) -> Vec<T> {
    let raw = match lookup(cache, path, name) {
        Ok(raw) => raw,
        Err(_) => return default,
    };

    let parsed: std::result::Result<Vec<T>, String> = raw.split(delimiter).map(&parse).collect();
    match parsed {
        Ok(values) => values,
        Err(reason) => {
            invalid(path, name, raw, kind, reason);
            default
        }
    }
}

/// Deserializes a JSON-encoded setting.
pub(crate) fn get_struct<T: DeserializeOwned>(
    cache: &SettingsCache,
    path: &str,
    name: &str,
) -> std::result::Result<T, SettingError> {
    let raw = lookup(cache, path, name)?;
    serde_json::from_str(&raw).map_err(|e| invalid(path, name, raw, "json", e.to_string()))
}

fn lookup(
    cache: &SettingsCache,
    path: &str,
    name: &str,
) -> std::result::Result<String, SettingError> {
    cache.get(name).ok_or_else(|| {
        warn!(path, setting = name, "dynconf setting not found");
        SettingError::NotFound(name.to_string())
    })
}

fn invalid(
    path: &str,
    name: &str,
    value: String,
    kind: &'static str,
    reason: String,
) -> SettingError {
    error!(
        path,
        setting = name,
        value = %value,
        kind,
        err = %reason,
        "dynconf invalid setting"
    );
    SettingError::Invalid {
        setting: name.to_string(),
        value,
        kind,
        reason,
    }
}
