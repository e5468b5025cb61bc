use std::time::Duration;

use blacklist_sync_core::{BroadcastNotifier, Engine, SyncEvent, SyncResult};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sync now, then again after each returned interval, until shutdown.
///
/// While no cloud is connected the engine is polled every `idle_poll`, so a `connect` issued
/// from another invocation is picked up without a restart.
pub async fn run(engine: Engine, idle_poll: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        let wait = match engine.sync_blacklist().await {
            Ok(Some(interval)) => {
                debug!("Next sync in {} minutes", interval.minutes());
                interval.as_duration()
            }
            Ok(None) => {
                debug!("Not connected, checking again in {:?}", idle_poll);
                idle_poll
            }
            Err(e) => {
                warn!("Sync bookkeeping failed: {}", e);
                idle_poll
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.wait_for(|&stop| stop) => {
                info!("Scheduler stopped");
                return;
            }
        }
    }
}

/// Log every sync event until the notifier goes away.
pub fn log_events(notifier: &BroadcastNotifier) -> JoinHandle<()> {
    let mut events = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SyncEvent::SyncStarted) => info!("Sync started"),
                Ok(SyncEvent::SyncFinished(SyncResult::Success { timestamp })) => {
                    info!("Sync finished at {}", timestamp)
                }
                Ok(SyncEvent::SyncFinished(SyncResult::Error { message })) => {
                    warn!("Sync failed: {}", message)
                }
                Err(RecvError::Lagged(skipped)) => debug!("Skipped {} sync events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    })
}
