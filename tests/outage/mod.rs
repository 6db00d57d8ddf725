use std::time::Duration;

use dynconf::DynconfBuilder;
use dynconf::SyncState;
use tokio::time::sleep;

use crate::commons::build;
use crate::commons::seeded_store;
use crate::commons::wait_until;
use crate::commons::PATH;

#[tokio::test(start_paused = true)]
async fn unreachable_store_at_startup_serves_defaults_then_recovers() {
    let store = seeded_store();
    store.set_available(false);

    let dynconf = build(&store, Duration::from_secs(10)).await;

    assert!(dynconf.settings().is_empty());
    assert_eq!(dynconf.get_integer("velocity", 5), 5);
    assert_eq!(dynconf.state(), SyncState::Reconnecting);

    store.set_available(true);

    assert!(wait_until(|| dynconf.state() == SyncState::Watching).await);
    assert_eq!(dynconf.get_integer("velocity", 5), 10);

    dynconf.close().await;
}

#[tokio::test(start_paused = true)]
async fn unreachable_store_without_retry_stays_unwatched() {
    let store = seeded_store();
    store.set_available(false);

    let dynconf = DynconfBuilder::new(PATH)
        .store_factory(store.clone())
        .retry_watch_on_startup(false)
        .build()
        .await
        .unwrap();

    assert_eq!(dynconf.state(), SyncState::Unwatched);
    store.set_available(true);
    sleep(Duration::from_secs(60)).await;
    assert_eq!(dynconf.state(), SyncState::Unwatched);
    assert_eq!(dynconf.get_integer("velocity", 5), 5);

    dynconf.close().await;
}

#[tokio::test(start_paused = true)]
async fn store_restart_keeps_stale_values_until_resynced() {
    let store = seeded_store();
    let dynconf = build(&store, Duration::from_secs(10)).await;

    store.shutdown();
    assert!(wait_until(|| dynconf.state() == SyncState::Reconnecting).await);

    // stale values stay readable during the outage
    assert_eq!(dynconf.get_integer("velocity", 5), 10);
    store.put("/configs/curiosity/velocity", "11");
    sleep(Duration::from_secs(25)).await;
    assert_eq!(dynconf.get_integer("velocity", 5), 10);

    store.set_available(true);
    assert!(wait_until(|| dynconf.state() == SyncState::Watching).await);
    assert_eq!(dynconf.get_integer("velocity", 5), 11);

    store.put("/configs/curiosity/velocity", "12");
    assert!(wait_until(|| dynconf.get_integer("velocity", 5) == 12).await);

    dynconf.close().await;
}

#[tokio::test(start_paused = true)]
async fn close_during_outage_stops_retrying() {
    let store = seeded_store();
    let dynconf = build(&store, Duration::from_secs(10)).await;

    store.shutdown();
    assert!(wait_until(|| dynconf.state() == SyncState::Reconnecting).await);
    dynconf.close().await;

    store.set_available(true);
    sleep(Duration::from_secs(60)).await;

    assert_eq!(dynconf.state(), SyncState::Closed);
    assert_eq!(store.watcher_count(), 0);
}
