//! Connection lifecycle and timestamp-based synchronization of the remote file.
//!
//! Connect, disconnect and sync share one critical section, and every section re-loads the
//! connection and token from persistence on entry.

use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::mutex::CriticalSection;
use crate::persistence::{ItemsPatch, Persistence, Token};
use crate::provider::{CloudProvider, ProviderId, Providers};

/// The synced document as pulled from a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub modified_time: DateTime<Utc>,
}

/// What a sync attempt did. Only `Pulled` requires the caller to update local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No cloud is connected; nothing was attempted.
    NotConnected,
    /// The remote file did not exist and was created from the local document.
    Created,
    /// Local and remote timestamps match.
    UpToDate,
    /// The local document was newer and overwrote the remote file.
    Pushed,
    /// The remote file was newer; the caller must overwrite the local document.
    Pulled(Document),
}

impl SyncOutcome {
    pub fn into_pulled(self) -> Option<Document> {
        match self {
            Self::Pulled(document) => Some(document),
            _ => None,
        }
    }
}

/// Connection manager and sync orchestrator for the remote blacklist file.
pub struct CloudSync {
    providers: Providers,
    store: Arc<dyn Persistence>,
    section: CriticalSection,
}

impl CloudSync {
    pub fn new(providers: Providers, store: Arc<dyn Persistence>) -> Self {
        Self {
            providers,
            store,
            section: CriticalSection::new("cloud"),
        }
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Run the OAuth grant for `id` and store the resulting connection and token.
    ///
    /// Fails with `AlreadyConnected` before any network call when a connection exists.
    /// Authorization and token exchange errors are returned unchanged and leave nothing stored.
    #[instrument(skip(self), level = "debug")]
    pub async fn connect(&self, id: ProviderId) -> Result<()> {
        self.section
            .lock(|| async move {
                let items = self.store.load().await?;
                if items.provider_id.is_some() {
                    return Err(SyncError::AlreadyConnected);
                }

                let provider = self.providers.get(id)?;
                let code = provider.authorize().await?;
                let grant = provider.get_access_token(&code).await?;
                let token = Token {
                    access_token: grant.access_token,
                    refresh_token: grant.refresh_token,
                    expires_at: Utc::now() + chrono::Duration::seconds(grant.expires_in),
                };

                self.store
                    .store(ItemsPatch::new().provider_id(Some(id)).token(Some(token)))
                    .await?;

                info!("Connected to {}", id);
                Ok(())
            })
            .await
    }

    /// Forget the connection. Token revocation is best-effort and its failure is discarded.
    #[instrument(skip(self), level = "debug")]
    pub async fn disconnect(&self) -> Result<()> {
        self.section
            .lock(|| async move {
                let items = self.store.load().await?;
                let id = items.provider_id.ok_or(SyncError::NotConnected)?;

                if let Some(token) = &items.token {
                    match self.providers.get(id) {
                        Ok(provider) => {
                            if let Err(e) = provider.revoke_token(token).await {
                                debug!("Ignoring token revocation failure for {}: {}", id, e);
                            }
                        }
                        Err(e) => debug!("Skipping token revocation: {}", e),
                    }
                }

                self.store
                    .store(ItemsPatch::new().provider_id(None).token(None))
                    .await?;

                info!("Disconnected from {}", id);
                Ok(())
            })
            .await
    }

    /// Reconcile the local document with the remote file.
    ///
    /// The newer side wins, compared at the provider's timestamp precision. Pushes and creates
    /// carry the local timestamp to the remote file so the next attempt compares equal.
    #[instrument(skip(self, content), level = "debug", fields(content_len = content.len()))]
    pub async fn sync_file(
        &self,
        content: &str,
        modified_time: DateTime<Utc>,
    ) -> Result<SyncOutcome> {
        self.section
            .lock(|| self.sync_file_locked(content, modified_time))
            .await
    }

    async fn sync_file_locked(
        &self,
        content: &str,
        modified_time: DateTime<Utc>,
    ) -> Result<SyncOutcome> {
        let items = self.store.load().await?;
        let Some(id) = items.provider_id else {
            return Ok(SyncOutcome::NotConnected);
        };
        let token = items.token.ok_or(SyncError::Unauthorized)?;
        let provider = self.providers.get(id)?;
        let provider = provider.as_ref();

        let mut session = Session {
            provider,
            store: self.store.as_ref(),
            token,
        };

        if session.token.is_expired_at(Utc::now()) {
            debug!("Access token for {} expired, refreshing", id);
            session.refresh().await?;
        }

        let remote = session
            .call(|token| async move { provider.find_file(&token).await })
            .await?;

        let Some(remote) = remote else {
            session
                .call(|token| async move {
                    provider.create_file(&token, content, modified_time).await
                })
                .await?;
            info!("Created remote blacklist on {}", id);
            return Ok(SyncOutcome::Created);
        };

        let precision = provider.modified_time_precision();
        match precision.compare(modified_time, remote.modified_time) {
            Ordering::Less => {
                let file_id = remote.id.as_str();
                let remote_content = session
                    .call(|token| async move { provider.read_file(&token, file_id).await })
                    .await?;
                info!(
                    "Pulled blacklist from {} (remote {} > local {})",
                    id, remote.modified_time, modified_time
                );
                Ok(SyncOutcome::Pulled(Document {
                    content: remote_content,
                    modified_time: remote.modified_time,
                }))
            }
            Ordering::Equal => {
                debug!("Blacklist already in sync with {}", id);
                Ok(SyncOutcome::UpToDate)
            }
            Ordering::Greater => {
                let file_id = remote.id.as_str();
                session
                    .call(|token| async move {
                        provider
                            .write_file(&token, file_id, content, modified_time)
                            .await
                    })
                    .await?;
                info!(
                    "Pushed blacklist to {} (local {} > remote {})",
                    id, modified_time, remote.modified_time
                );
                Ok(SyncOutcome::Pushed)
            }
        }
    }
}

/// Token state for one sync attempt. Dropped when the critical section ends.
struct Session<'a> {
    provider: &'a dyn CloudProvider,
    store: &'a dyn Persistence,
    token: Token,
}

impl Session<'_> {
    /// Exchange the refresh token for a new access token and persist it.
    ///
    /// A 400 means the refresh token is dead: the stored token is cleared and the attempt
    /// fails with `Unauthorized`.
    async fn refresh(&mut self) -> Result<()> {
        match self
            .provider
            .refresh_access_token(&self.token.refresh_token)
            .await
        {
            Ok(refreshed) => {
                self.token.access_token = refreshed.access_token;
                self.token.expires_at =
                    Utc::now() + chrono::Duration::seconds(refreshed.expires_in);
                if let Some(refresh_token) = refreshed.refresh_token {
                    self.token.refresh_token = refresh_token;
                }
                self.store
                    .store(ItemsPatch::new().token(Some(self.token.clone())))
                    .await?;
                debug!(
                    "Refreshed access token for {}, expires at {}",
                    self.provider.id(),
                    self.token.expires_at
                );
                Ok(())
            }
            Err(e) if e.status() == Some(400) => {
                warn!(
                    "Refresh token for {} was rejected, clearing stored token",
                    self.provider.id()
                );
                self.store.store(ItemsPatch::new().token(None)).await?;
                Err(SyncError::Unauthorized)
            }
            Err(e) => Err(e),
        }
    }

    /// Run `op` with the current access token; on a 401 refresh once and retry once.
    async fn call<T, F, Fut>(&mut self, op: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match op(self.token.access_token.clone()).await {
            Err(e) if e.status() == Some(401) => {
                debug!("Access token rejected by {}, refreshing", self.provider.id());
                self.refresh().await?;
                op(self.token.access_token.clone()).await
            }
            other => other,
        }
    }
}
