use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::persistence::Token;

/// Cloud storage backends a blacklist can be synced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderId {
    GoogleDrive,
    Dropbox,
}

impl ProviderId {
    pub const ALL: [ProviderId; 2] = [ProviderId::GoogleDrive, ProviderId::Dropbox];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoogleDrive => "googleDrive",
            Self::Dropbox => "dropbox",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "googleDrive" | "google-drive" | "gdrive" => Ok(Self::GoogleDrive),
            "dropbox" => Ok(Self::Dropbox),
            other => Err(format!(
                "unknown cloud provider '{}', expected one of: googleDrive, dropbox",
                other
            )),
        }
    }
}

/// Granularity at which a provider stores modification times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePrecision {
    Second,
    Millisecond,
}

impl TimePrecision {
    pub fn truncate(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let nanos = match self {
            Self::Second => 0,
            Self::Millisecond => time.nanosecond() / 1_000_000 * 1_000_000,
        };
        time.with_nanosecond(nanos).unwrap_or(time)
    }

    /// Orders `a` relative to `b` after truncating both to this precision.
    pub fn compare(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> Ordering {
        self.truncate(a).cmp(&self.truncate(b))
    }
}

/// Result of exchanging an authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i64,
    pub refresh_token: String,
}

/// Result of a refresh_token grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: i64,
    /// Set when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
}

/// The synced file as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub modified_time: DateTime<Utc>,
}

/// Capability set every cloud backend implements.
///
/// File operations fail with `SyncError::Http { status: 401, .. }` when the access token has
/// expired; `refresh_access_token` fails with status 400 when the refresh token is dead.
/// App identity and endpoint URLs are owned by each implementation.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn modified_time_precision(&self) -> TimePrecision;

    /// Network origins the host must be allowed to reach before connecting.
    fn host_permissions(&self) -> &[&'static str] {
        &[]
    }

    /// Run the interactive OAuth grant and return the authorization code.
    async fn authorize(&self) -> Result<String>;

    async fn get_access_token(&self, authorization_code: &str) -> Result<TokenGrant>;

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken>;

    /// Revoke the connection's grant. Each provider picks which credential to present.
    /// Best-effort; callers ignore failures.
    async fn revoke_token(&self, token: &Token) -> Result<()>;

    async fn find_file(&self, access_token: &str) -> Result<Option<RemoteFile>>;

    async fn create_file(
        &self,
        access_token: &str,
        content: &str,
        modified_time: DateTime<Utc>,
    ) -> Result<()>;

    async fn read_file(&self, access_token: &str, id: &str) -> Result<String>;

    async fn write_file(
        &self,
        access_token: &str,
        id: &str,
        content: &str,
        modified_time: DateTime<Utc>,
    ) -> Result<()>;
}

/// Registry of the providers available to this process.
#[derive(Clone, Default)]
pub struct Providers {
    providers: BTreeMap<ProviderId, Arc<dyn CloudProvider>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn CloudProvider>) -> Self {
        self.insert(provider);
        self
    }

    pub fn insert(&mut self, provider: Arc<dyn CloudProvider>) {
        self.providers.insert(provider.id(), provider);
    }

    pub fn get(&self, id: ProviderId) -> Result<Arc<dyn CloudProvider>> {
        self.providers
            .get(&id)
            .cloned()
            .ok_or(SyncError::ProviderNotConfigured(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.providers.keys().copied()
    }
}
