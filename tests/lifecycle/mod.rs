use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeZone;
use chrono::Utc;
use dynconf::DynconfBuilder;
use dynconf::MemoryStore;
use dynconf::SettingError;
use dynconf::SyncState;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::commons::build;
use crate::commons::seeded_store;
use crate::commons::wait_until;
use crate::commons::PATH;

#[tokio::test(start_paused = true)]
async fn typed_getters_read_loaded_settings() {
    let store = seeded_store();
    let dynconf = build(&store, Duration::from_secs(10)).await;

    assert_eq!(dynconf.state(), SyncState::Watching);
    assert_eq!(dynconf.path(), PATH);
    assert_eq!(dynconf.get_string("name", "unknown"), "curiosity");
    assert!(dynconf.get_boolean("is_camera_enabled", false));
    assert_eq!(dynconf.get_integer("velocity", 5), 10);
    assert_eq!(dynconf.get_float("ratio", 0.0), 0.75);
    assert_eq!(
        dynconf.get_timestamp("landed_at", Utc::now()),
        Utc.with_ymd_and_hms(2012, 8, 6, 5, 17, 57).unwrap()
    );

    dynconf.close().await;
}

#[tokio::test(start_paused = true)]
async fn getters_fall_back_to_defaults() {
    let store = seeded_store();
    let dynconf = build(&store, Duration::from_secs(10)).await;

    // wrong grammar for the requested type
    assert!(dynconf.get_boolean("velocity", true));
    assert_eq!(dynconf.get_integer("ratio", 7), 7);
    // absent
    assert_eq!(dynconf.get_string("missing", "fallback"), "fallback");
    assert_eq!(
        dynconf.get_duration("missing", Duration::from_secs(2)),
        Duration::from_secs(2)
    );
    assert!(matches!(
        dynconf.require::<i64>("missing"),
        Err(SettingError::NotFound(_))
    ));

    dynconf.close().await;
}

#[tokio::test(start_paused = true)]
async fn timestamps_in_caller_format() {
    let store = MemoryStore::new();
    store.put("/configs/curiosity/launch", "26.11.2011 15:02");
    store.put("/configs/curiosity/windows", "2011-11-25|2011-12-18");
    let dynconf = build(&store, Duration::from_secs(10)).await;
    let default_ts = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();

    assert_eq!(
        dynconf.get_timestamp_with_format("launch", "%d.%m.%Y %H:%M", default_ts),
        Utc.with_ymd_and_hms(2011, 11, 26, 15, 2, 0).unwrap()
    );
    assert_eq!(
        dynconf.get_timestamp_with_format("launch", "%Y-%m-%d", default_ts),
        default_ts
    );
    assert!(matches!(
        dynconf.require_timestamp_with_format("missing", "%Y-%m-%d"),
        Err(SettingError::NotFound(_))
    ));
    assert_eq!(
        dynconf.get_timestamp_list_with_format("windows", "%Y-%m-%d", "|", vec![]),
        vec![
            Utc.with_ymd_and_hms(2011, 11, 25, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2011, 12, 18, 0, 0, 0).unwrap(),
        ]
    );

    dynconf.close().await;
}

#[tokio::test(start_paused = true)]
async fn settings_tracks_puts_and_deletes() {
    let store = seeded_store();
    let dynconf = build(&store, Duration::from_secs(10)).await;
    assert_eq!(dynconf.settings().len(), 5);

    store.put("/configs/curiosity/velocity", "12");
    store.delete("/configs/curiosity/ratio");
    store.delete("/configs/curiosity/never_existed");
    store.put("/configs/curiosity/speeds", "1,2,3");

    assert!(wait_until(|| dynconf.settings().contains_key("speeds")).await);
    let settings = dynconf.settings();
    assert_eq!(settings.get("velocity"), Some(&"12".to_string()));
    assert!(!settings.contains_key("ratio"));
    assert_eq!(settings.len(), 5);
    assert_eq!(dynconf.get_list("speeds", ",", vec![0_i64]), vec![1, 2, 3]);

    dynconf.close().await;
}

#[derive(Debug, Deserialize, PartialEq)]
struct Camera {
    enabled: bool,
    fps: u32,
}

#[tokio::test(start_paused = true)]
async fn struct_setting_is_decoded_from_json() {
    let store = MemoryStore::new();
    store.put("/configs/curiosity/camera", r#"{"enabled":true,"fps":24}"#);
    let dynconf = build(&store, Duration::from_secs(10)).await;

    assert_eq!(
        dynconf.get_struct::<Camera>("camera"),
        Ok(Camera {
            enabled: true,
            fps: 24
        })
    );

    dynconf.close().await;
}

#[tokio::test(start_paused = true)]
async fn on_update_sees_every_batch() {
    let store = MemoryStore::new();
    let seen: Arc<Mutex<Vec<HashMap<String, String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let dynconf = DynconfBuilder::new(PATH)
        .store_factory(store.clone())
        .on_update(move |settings: &HashMap<String, String>| sink.lock().push(settings.clone()))
        .build()
        .await
        .unwrap();

    store.put("/configs/curiosity/velocity", "1");
    store.put("/configs/curiosity/velocity", "2");

    assert!(wait_until(|| seen.lock().len() == 2).await);
    assert_eq!(seen.lock()[1].get("velocity"), Some(&"2".to_string()));

    dynconf.close().await;
}

#[tokio::test(start_paused = true)]
async fn close_cancels_watch_and_keeps_last_values() {
    let store = seeded_store();
    let dynconf = build(&store, Duration::from_secs(10)).await;
    let mut state = dynconf.watch_state();
    assert_eq!(store.watcher_count(), 1);

    dynconf.close().await;
    dynconf.close().await;

    assert_eq!(dynconf.state(), SyncState::Closed);
    assert_eq!(*state.borrow_and_update(), SyncState::Closed);
    assert_eq!(store.watcher_count(), 0);

    store.put("/configs/curiosity/velocity", "99");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(dynconf.get_integer("velocity", 0), 10);
}

#[tokio::test(start_paused = true)]
async fn build_rejects_empty_path() {
    let result = DynconfBuilder::new("")
        .store_factory(MemoryStore::new())
        .build()
        .await;

    assert!(result.is_err());
}
