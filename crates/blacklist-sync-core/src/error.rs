//! Error types for cloud connection and blacklist sync.

use thiserror::Error;

use crate::provider::ProviderId;

/// Errors raised by providers, the connection manager and the sync orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The user declined the OAuth grant or the flow yielded no code.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// A provider answered with a non-2xx status.
    #[error("{status} {status_text}")]
    Http { status: u16, status_text: String },

    /// No usable token; the user has to reconnect.
    #[error("unauthorized: reconnect to the cloud to resume syncing")]
    Unauthorized,

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    /// A 2xx response whose body did not match the expected shape.
    #[error("bad response: {0}")]
    BadResponse(String),

    /// The request never produced a status (DNS, TLS, connection reset...).
    #[error("network error: {0}")]
    Transport(String),

    /// Local state could not be loaded or stored.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("cloud provider {0} is not configured")]
    ProviderNotConfigured(ProviderId),

    #[error("invalid sync interval: {0} minutes")]
    InvalidInterval(u32),
}

impl SyncError {
    pub fn http(status: u16, status_text: impl Into<String>) -> Self {
        Self::Http {
            status,
            status_text: status_text.into(),
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
