//! Key codec: turns raw store keys and values into setting names and
//! values. Decoding happens exactly once, at ingestion, so the cache only
//! ever holds UTF-8 strings.

use crate::store::WatchEvent;
use crate::store::WatchEventType;
use crate::DecodeError;

/// Decoded change to a single setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Put { name: String, value: String },
    Delete { name: String },
}

impl ChangeEvent {
    /// Setting name the event applies to
    pub fn name(&self) -> &str {
        match self {
            ChangeEvent::Put { name, .. } => name,
            ChangeEvent::Delete { name } => name,
        }
    }

    pub fn decode(
        event: &WatchEvent,
        prefix_len: usize,
    ) -> Result<Self, DecodeError> {
        match event.event_type {
            WatchEventType::Put => {
                let (name, value) = decode_setting(&event.key, &event.value, prefix_len)?;
                Ok(ChangeEvent::Put { name, value })
            }
            WatchEventType::Delete => Ok(ChangeEvent::Delete {
                name: decode_name(&event.key, prefix_len)?,
            }),
        }
    }
}

/// Strips `prefix_len` bytes from `key` and decodes the remainder as the
/// setting name.
pub fn decode_name(
    key: &[u8],
    prefix_len: usize,
) -> Result<String, DecodeError> {
    let name = key.get(prefix_len..).ok_or(DecodeError::KeyOutsidePrefix {
        key_len: key.len(),
        prefix_len,
    })?;
    String::from_utf8(name.to_vec()).map_err(DecodeError::InvalidKey)
}

/// Decodes a raw key/value pair into a `(name, value)` setting.
pub fn decode_setting(
    key: &[u8],
    value: &[u8],
    prefix_len: usize,
) -> Result<(String, String), DecodeError> {
    let name = decode_name(key, prefix_len)?;
    match String::from_utf8(value.to_vec()) {
        Ok(value) => Ok((name, value)),
        Err(source) => Err(DecodeError::InvalidValue { name, source }),
    }
}
