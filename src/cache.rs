//! In-memory settings cache.
//!
//! Maps setting names to their raw string values. The synchronizer is the
//! only writer; getters read concurrently. Entries are never evicted and
//! never cleared on reconnect: stale values are preferred over no values
//! during an outage.

use std::collections::HashMap;

use dashmap::DashMap;

use crate::codec::ChangeEvent;

#[derive(Debug, Default)]
pub struct SettingsCache {
    entries: DashMap<String, String>,
}

impl SettingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<String> {
        self.entries.get(name).map(|v| v.value().clone())
    }

    pub fn put(
        &self,
        name: String,
        value: String,
    ) {
        self.entries.insert(name, value);
    }

    /// Removes `name`; returns whether it was present. Deleting an absent
    /// setting is not an error.
    pub fn delete(
        &self,
        name: &str,
    ) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn apply(
        &self,
        event: ChangeEvent,
    ) {
        match event {
            ChangeEvent::Put { name, value } => self.put(name, value),
            ChangeEvent::Delete { name } => {
                self.delete(&name);
            }
        }
    }

    /// Independent copy of every entry
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
