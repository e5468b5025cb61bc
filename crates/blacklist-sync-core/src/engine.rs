//! Entry points used by the host: document edits, sync triggers and the connection lifecycle.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{instrument, warn};

use crate::blacklist::{Blacklist, Interval};
use crate::cloud::CloudSync;
use crate::error::Result;
use crate::notify::Notifier;
use crate::persistence::{Items, Persistence};
use crate::provider::{ProviderId, Providers};

/// Handle to a sync launched in the background.
///
/// Awaiting it only waits for completion; the sync's own outcome is reported through the
/// notifier and the stored sync result.
pub type BackgroundSync = JoinHandle<()>;

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Persistence>,
    cloud: Arc<CloudSync>,
    blacklist: Arc<Blacklist>,
}

impl Engine {
    pub fn new(
        providers: Providers,
        store: Arc<dyn Persistence>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let cloud = Arc::new(CloudSync::new(providers, store.clone()));
        let blacklist = Arc::new(Blacklist::new(store.clone(), cloud.clone(), notifier));
        Self {
            store,
            cloud,
            blacklist,
        }
    }

    pub fn providers(&self) -> &Providers {
        self.cloud.providers()
    }

    /// Snapshot of the persisted state, for display.
    pub async fn items(&self) -> Result<Items> {
        self.store.load().await
    }

    /// Replace the blacklist, then sync it in the background.
    pub async fn set_blacklist(&self, blacklist: &str) -> Result<BackgroundSync> {
        self.blacklist.set(blacklist).await?;
        Ok(self.spawn_sync())
    }

    /// Sync now and wait for it. Returns the interval until the next periodic attempt, or
    /// `None` when no cloud is connected.
    pub async fn sync_blacklist(&self) -> Result<Option<Interval>> {
        self.blacklist.sync().await
    }

    pub async fn set_sync_interval(&self, interval: Interval) -> Result<()> {
        self.blacklist.set_sync_interval(interval).await
    }

    /// Connect to a cloud, then sync in the background.
    #[instrument(skip(self), level = "debug")]
    pub async fn connect(&self, id: ProviderId) -> Result<BackgroundSync> {
        self.cloud.connect(id).await?;
        Ok(self.spawn_sync())
    }

    /// Disconnect from the current cloud. No sync follows: without a connection it is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        self.cloud.disconnect().await
    }

    pub fn spawn_sync(&self) -> BackgroundSync {
        let blacklist = self.blacklist.clone();
        tokio::spawn(async move {
            if let Err(e) = blacklist.sync().await {
                warn!("Background blacklist sync failed: {}", e);
            }
        })
    }
}
