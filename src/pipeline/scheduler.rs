//! Periodic sweep scheduler
//!
//! Enqueues a full-wallet refresh on a fixed interval. The timer is a pure
//! producer: it never touches the store, it only feeds the coordinator queue.

use super::ingestion::RefreshCoordinator;
use super::types::RefreshRequest;
use tokio::time::{interval, Duration};

/// Enqueue [`RefreshRequest::All`] every `interval_ms` milliseconds.
///
/// Runs until the coordinator queue closes. The live account stream keeps
/// enqueueing independently of this timer.
pub async fn interval_sweep_task(coordinator: RefreshCoordinator, interval_ms: u64) {
    log::info!("⏰ Starting periodic sweep (interval: {}ms)", interval_ms);

    let mut timer = interval(Duration::from_millis(interval_ms));
    // The first tick completes immediately; the cold-start sweep is enqueued
    // at wiring time, so consume it here.
    timer.tick().await;

    loop {
        timer.tick().await;
        coordinator.request_refresh(RefreshRequest::All);
    }
}
