//! Local persisted state and the adapter trait used to reach it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::blacklist::Interval;
use crate::error::Result;
use crate::notify::SyncResult;
use crate::provider::ProviderId;

/// OAuth credentials of the active connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Every persisted field. Absent fields load as the documented defaults:
/// empty blacklist, epoch timestamp, no connection, no token, 5 minute interval, no result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Items {
    pub blacklist: String,
    pub timestamp: DateTime<Utc>,
    pub provider_id: Option<ProviderId>,
    pub token: Option<Token>,
    pub sync_interval: Interval,
    pub sync_result: Option<SyncResult>,
}

impl Default for Items {
    fn default() -> Self {
        Self {
            blacklist: String::new(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            provider_id: None,
            token: None,
            sync_interval: Interval::default(),
            sync_result: None,
        }
    }
}

/// A partial update. `None` leaves a field untouched; for nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemsPatch {
    pub blacklist: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub provider_id: Option<Option<ProviderId>>,
    pub token: Option<Option<Token>>,
    pub sync_interval: Option<Interval>,
    pub sync_result: Option<Option<SyncResult>>,
}

impl ItemsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blacklist(mut self, blacklist: impl Into<String>) -> Self {
        self.blacklist = Some(blacklist.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn provider_id(mut self, provider_id: Option<ProviderId>) -> Self {
        self.provider_id = Some(provider_id);
        self
    }

    pub fn token(mut self, token: Option<Token>) -> Self {
        self.token = Some(token);
        self
    }

    pub fn sync_interval(mut self, interval: Interval) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    pub fn sync_result(mut self, result: SyncResult) -> Self {
        self.sync_result = Some(Some(result));
        self
    }

    pub fn apply_to(self, items: &mut Items) {
        if let Some(blacklist) = self.blacklist {
            items.blacklist = blacklist;
        }
        if let Some(timestamp) = self.timestamp {
            items.timestamp = timestamp;
        }
        if let Some(provider_id) = self.provider_id {
            items.provider_id = provider_id;
        }
        if let Some(token) = self.token {
            items.token = token;
        }
        if let Some(interval) = self.sync_interval {
            items.sync_interval = interval;
        }
        if let Some(result) = self.sync_result {
            items.sync_result = result;
        }
    }
}

/// Source of truth for the document, connection and token.
///
/// Implementations must apply all fields of one `store` call atomically relative to `load`.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn load(&self) -> Result<Items>;

    async fn store(&self, patch: ItemsPatch) -> Result<()>;
}

/// In-memory persistence, used by tests and embedders without durable storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<Items>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Items) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn load(&self) -> Result<Items> {
        Ok(self.items.read().await.clone())
    }

    async fn store(&self, patch: ItemsPatch) -> Result<()> {
        let mut items = self.items.write().await;
        patch.apply_to(&mut items);
        Ok(())
    }
}
