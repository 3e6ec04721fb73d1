//! Reconciliation scheduler: the eventual-consistency backstop. Polls
//! a full refresh on a fixed interval whether or not push traffic
//! arrives; missed or out-of-order push events are bounded by one
//! period.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::Console;

fn poll_secs() -> u64 {
    std::env::var("GATEDECK_POLL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60)
}

pub(crate) fn spawn(console: Arc<Console>) {
    tokio::spawn(run(console, Duration::from_secs(poll_secs())));
}

/// Poll loop, exposed so shells and tests can drive it with their own
/// period.
pub async fn run(console: Arc<Console>, period: Duration) {
    let mut shutdown = console.shutdown_signal();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(period_secs = period.as_secs(), "reconciliation poll started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                console.refresh_now().await;
            }
            _ = shutdown.changed() => {
                info!("reconciliation poll stopped");
                break;
            }
        }
    }
}
