use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::utils::async_task::spawn_task;
use crate::utils::async_task::with_timeout;
use crate::StoreError;

#[tokio::test(start_paused = true)]
async fn test_with_timeout_passes_result_through() {
    let result = with_timeout(Duration::from_secs(1), async { Ok::<_, StoreError>(42) }).await;

    assert_eq!(result.unwrap(), 42);
}

#[tokio::test(start_paused = true)]
async fn test_with_timeout_passes_error_through() {
    let result = with_timeout(Duration::from_secs(1), async {
        Err::<u32, _>(StoreError::Unavailable("down".to_string()))
    })
    .await;

    assert!(matches!(result, Err(StoreError::Unavailable(_))));
}

#[tokio::test(start_paused = true)]
async fn test_with_timeout_elapses() {
    let result = with_timeout(Duration::from_millis(100), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok::<u32, StoreError>(42)
    })
    .await;

    assert!(matches!(result, Err(StoreError::Timeout(d)) if d == Duration::from_millis(100)));
}

#[tokio::test]
async fn test_spawn_task() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let handle = spawn_task("test_task", move || async move {
        counter_clone.fetch_add(1, Ordering::SeqCst);
    });

    handle.await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
