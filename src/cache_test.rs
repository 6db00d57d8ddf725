use std::sync::Arc;

use crate::cache::SettingsCache;
use crate::codec::ChangeEvent;

fn put(
    name: &str,
    value: &str,
) -> ChangeEvent {
    ChangeEvent::Put {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn delete(name: &str) -> ChangeEvent {
    ChangeEvent::Delete {
        name: name.to_string(),
    }
}

#[test]
fn get_returns_none_for_absent_setting() {
    let cache = SettingsCache::new();

    assert_eq!(cache.get("velocity"), None);
    assert!(cache.is_empty());
}

#[test]
fn put_upserts() {
    let cache = SettingsCache::new();
    cache.apply(put("velocity", "10"));
    cache.apply(put("velocity", "20"));

    assert_eq!(cache.get("velocity").as_deref(), Some("20"));
    assert_eq!(cache.len(), 1);
}

#[test]
fn applying_same_put_twice_is_idempotent() {
    let once = SettingsCache::new();
    once.apply(put("velocity", "10"));

    let twice = SettingsCache::new();
    twice.apply(put("velocity", "10"));
    twice.apply(put("velocity", "10"));

    assert_eq!(once.snapshot(), twice.snapshot());
}

#[test]
fn delete_of_absent_key_is_noop() {
    let cache = SettingsCache::new();
    cache.apply(put("velocity", "10"));

    assert!(!cache.delete("is_camera_enabled"));
    cache.apply(delete("is_camera_enabled"));

    assert_eq!(cache.len(), 1);
}

#[test]
fn events_apply_in_delivery_order() {
    let cache = SettingsCache::new();
    for event in [put("a", "1"), put("a", "2"), delete("a")] {
        cache.apply(event);
    }

    assert_eq!(cache.get("a"), None);
}

#[test]
fn snapshot_holds_puts_minus_deletes() {
    let cache = SettingsCache::new();
    cache.apply(put("velocity", "10"));
    cache.apply(put("is_camera_enabled", "true"));
    cache.apply(put("name", "curiosity"));
    cache.apply(delete("name"));

    let snapshot = cache.snapshot();

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot["velocity"], "10");
    assert_eq!(snapshot["is_camera_enabled"], "true");
}

#[test]
fn snapshot_is_independent_of_later_mutation() {
    let cache = SettingsCache::new();
    cache.apply(put("velocity", "10"));

    let snapshot = cache.snapshot();
    cache.apply(put("velocity", "20"));
    cache.apply(delete("velocity"));

    assert_eq!(snapshot["velocity"], "10");
}

#[test]
fn concurrent_reads_observe_whole_values() {
    let cache = Arc::new(SettingsCache::new());
    cache.apply(put("flag", "aaaa"));

    let writer = {
        let cache = cache.clone();
        std::thread::spawn(move || {
            for i in 0..1000 {
                let value = if i % 2 == 0 { "bbbb" } else { "aaaa" };
                cache.apply(put("flag", value));
            }
        })
    };

    for _ in 0..1000 {
        let value = cache.get("flag").unwrap();
        assert!(value == "aaaa" || value == "bbbb");
    }
    writer.join().unwrap();
}
