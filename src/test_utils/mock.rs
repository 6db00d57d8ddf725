use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::store::MockRemoteStore;
use crate::store::MockStoreFactory;
use crate::store::RemoteStore;
use crate::store::WatchSender;
use crate::StoreError;

/// Factory handing out `stores` in order, then failing with
/// `StoreError::Unavailable` once they are used up.
pub(crate) fn sequenced_factory(stores: Vec<MockRemoteStore>) -> MockStoreFactory {
    let queue: Mutex<VecDeque<Arc<dyn RemoteStore>>> = Mutex::new(
        stores
            .into_iter()
            .map(|store| Arc::new(store) as Arc<dyn RemoteStore>)
            .collect(),
    );

    let mut factory = MockStoreFactory::new();
    factory.expect_connect().returning(move || {
        queue
            .lock()
            .pop_front()
            .ok_or_else(|| StoreError::Unavailable("no more connections".to_string()))
    });
    factory
}

/// Slot capturing the sink a mock store receives on `watch_prefix`
pub(crate) type SinkSlot = Arc<Mutex<Option<WatchSender>>>;

/// Mock store whose `watch_prefix` succeeds with `watch_id` and parks the
/// sink in the returned slot. `cancel_watch` and `close` succeed.
pub(crate) fn watchable_store(watch_id: u64) -> (MockRemoteStore, SinkSlot) {
    let slot: SinkSlot = Arc::new(Mutex::new(None));
    let mut store = MockRemoteStore::new();

    let captured = slot.clone();
    store.expect_watch_prefix().returning(move |_, sink| {
        *captured.lock() = Some(sink);
        Ok(watch_id)
    });
    store.expect_cancel_watch().returning(|_| Ok(()));
    store.expect_close().returning(|| Ok(()));
    (store, slot)
}
