use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::store::StoreResult;
use crate::StoreError;

/// Bounds a single store request; an elapsed deadline becomes
/// [`StoreError::Timeout`].
pub(crate) async fn with_timeout<F, T>(
    duration: Duration,
    request: F,
) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match timeout(duration, request).await {
        Ok(result) => result,
        Err(_) => {
            warn!("store request timed out after {:?}", duration);
            Err(StoreError::Timeout(duration))
        }
    }
}

/// Spawns a named background task and logs when it stops
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
) -> JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        debug!("spawned task: {name} started");
        task_fn().await;
        debug!("spawned task: {name} stopped");
    })
}
