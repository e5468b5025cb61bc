//! Mapping of reqwest responses onto the provider error contract.

use blacklist_sync_core::{Result, SyncError};
use reqwest::Response;
use serde::de::DeserializeOwned;

pub(crate) fn transport(e: reqwest::Error) -> SyncError {
    SyncError::Transport(e.to_string())
}

/// Turn any non-2xx response into `SyncError::Http`.
pub(crate) fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SyncError::http(
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
        ))
    }
}

pub(crate) async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.text().await.map_err(transport)?;
    serde_json::from_str(&body).map_err(|e| SyncError::BadResponse(e.to_string()))
}

pub(crate) async fn text(response: Response) -> Result<String> {
    response.text().await.map_err(transport)
}
