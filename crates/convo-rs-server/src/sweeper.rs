//! Periodic expiry sweep driven by a tokio interval.

use chrono::Utc;
use convo_rs_memory::MemoryManager;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawn the background sweeper. Returns `None` when `interval` is zero.
///
/// The task exits once `shutdown` observes `true` or its sender is dropped.
pub fn spawn_sweeper(
    manager: Arc<MemoryManager>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        info!("background expiry sweep disabled");
        return None;
    }
    info!("starting background expiry sweep (interval={interval:?})");
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; the first sweep waits a full interval.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match manager.run_expiry_sweep(Utc::now()).await {
                        Ok(purged) => debug!("background sweep purged {purged} users"),
                        Err(err) => error!("background expiry sweep failed: {err}"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("background expiry sweep stopped");
    }))
}
