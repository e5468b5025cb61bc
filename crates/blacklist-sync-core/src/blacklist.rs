//! The local blacklist document and the bookkeeping around each sync attempt.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::cloud::{CloudSync, SyncOutcome};
use crate::error::{Result, SyncError};
use crate::mutex::CriticalSection;
use crate::notify::{Notifier, SyncEvent, SyncResult};
use crate::persistence::{ItemsPatch, Persistence};

/// Delay between periodic sync attempts, stored as whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Interval {
    #[default]
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FiveHours,
}

impl Interval {
    pub const ALL: [Interval; 6] = [
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::TwoHours,
        Interval::FiveHours,
    ];

    pub fn minutes(&self) -> u32 {
        match self {
            Self::FiveMinutes => 5,
            Self::FifteenMinutes => 15,
            Self::ThirtyMinutes => 30,
            Self::OneHour => 60,
            Self::TwoHours => 2 * 60,
            Self::FiveHours => 5 * 60,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.minutes()) * 60)
    }
}

impl TryFrom<u32> for Interval {
    type Error = SyncError;

    fn try_from(minutes: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|i| i.minutes() == minutes)
            .ok_or(SyncError::InvalidInterval(minutes))
    }
}

impl From<Interval> for u32 {
    fn from(interval: Interval) -> Self {
        interval.minutes()
    }
}

/// Owner of the local blacklist document.
///
/// Edits and sync attempts are serialized on their own critical section, separate from the
/// connection lifecycle one held by [`CloudSync`].
pub struct Blacklist {
    store: Arc<dyn Persistence>,
    cloud: Arc<CloudSync>,
    notifier: Arc<dyn Notifier>,
    section: CriticalSection,
}

impl Blacklist {
    pub fn new(
        store: Arc<dyn Persistence>,
        cloud: Arc<CloudSync>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            cloud,
            notifier,
            section: CriticalSection::new("blacklist"),
        }
    }

    /// Replace the local document and stamp it with the current time.
    #[instrument(skip(self, blacklist), level = "debug", fields(len = blacklist.len()))]
    pub async fn set(&self, blacklist: &str) -> Result<()> {
        self.section
            .lock(|| async move {
                self.store
                    .store(ItemsPatch::new().blacklist(blacklist).timestamp(Utc::now()))
                    .await
            })
            .await
    }

    pub async fn set_sync_interval(&self, interval: Interval) -> Result<()> {
        self.section
            .lock(|| async move {
                self.store
                    .store(ItemsPatch::new().sync_interval(interval))
                    .await
            })
            .await
    }

    /// Run one sync attempt and record its result.
    ///
    /// Returns `None` without emitting events when no cloud is connected, otherwise the
    /// interval after which the next attempt is due. Sync failures are stored and announced,
    /// not returned; only a failure to persist the outcome is.
    #[instrument(skip(self), level = "debug")]
    pub async fn sync(&self) -> Result<Option<Interval>> {
        self.section
            .lock(|| async move {
                let items = self.store.load().await?;
                if items.provider_id.is_none() {
                    debug!("No cloud connected, skipping sync");
                    return Ok(None);
                }

                self.notifier.notify(SyncEvent::SyncStarted);

                // A disconnect may land between the check above and the sync itself
                let outcome = self
                    .cloud
                    .sync_file(&items.blacklist, items.timestamp)
                    .await
                    .and_then(|outcome| match outcome {
                        SyncOutcome::NotConnected => Err(SyncError::NotConnected),
                        other => Ok(other),
                    });

                let (patch, result) = match outcome {
                    Ok(outcome) => {
                        let result = SyncResult::success();
                        let mut patch = ItemsPatch::new().sync_result(result.clone());
                        if let Some(document) = outcome.into_pulled() {
                            patch = patch
                                .blacklist(document.content)
                                .timestamp(document.modified_time);
                        }
                        (patch, result)
                    }
                    Err(e) => {
                        warn!("Blacklist sync failed: {}", e);
                        let result = SyncResult::error(e.to_string());
                        (ItemsPatch::new().sync_result(result.clone()), result)
                    }
                };

                if let Err(e) = self.store.store(patch).await {
                    self.notifier
                        .notify(SyncEvent::SyncFinished(SyncResult::error(e.to_string())));
                    return Err(e);
                }

                self.notifier.notify(SyncEvent::SyncFinished(result));
                Ok(Some(items.sync_interval))
            })
            .await
    }
}
