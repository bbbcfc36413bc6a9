//! Background eviction of completed sessions.

use std::sync::Arc;
use std::time::Duration;

use crate::broker::SessionBroker;

/// Spawn a loop that calls [`SessionBroker::reap`] on a fixed interval
/// for as long as the broker is kept alive elsewhere. Returns the
/// `JoinHandle` so callers can abort it on shutdown.
pub fn spawn_reaper(broker: Arc<SessionBroker>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            broker.reap();
        }
    })
}
