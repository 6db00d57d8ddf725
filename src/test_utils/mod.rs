//! Helpers shared by the unit tests
mod mock;
pub(crate) use mock::*;

use std::time::Duration;

use tokio::time::sleep;

/// Polls `condition` every 10ms for up to a minute of (possibly paused)
/// tokio time.
pub(crate) async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..6_000 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}
