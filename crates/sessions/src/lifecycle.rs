//! Idle session eviction.
//!
//! Sessions live until the process exits unless an idle TTL is configured, in
//! which case a background task sweeps the store on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ww_domain::trace::TraceEvent;

use crate::store::SessionStore;

/// Spawn a task that removes sessions idle for at least `ttl`, checking every
/// `interval`.  The task exits when `shutdown` is cancelled.
pub fn spawn_idle_sweeper<H>(
    store: Arc<SessionStore<H>>,
    ttl: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    H: Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let evicted = store.prune_idle(ttl);
            if evicted > 0 {
                TraceEvent::SessionsEvicted {
                    evicted,
                    remaining: store.len(),
                }
                .emit();
            }
        }
        tracing::debug!("idle session sweeper stopped");
    })
}
