//! Dropbox API v2 backend.
//!
//! Dropbox stores `client_modified` with one-second resolution, so times are compared at
//! second precision.

use std::sync::Arc;

use async_trait::async_trait;
use blacklist_sync_core::{
    CloudProvider, ProviderId, RefreshedToken, RemoteFile, Result, SyncError, TimePrecision,
    Token, TokenGrant,
};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::http::{check, json, text, transport};
use crate::oauth::{self, AppCredentials, AuthorizationFlow};

const PATH: &str = "/uBlacklist.txt";
const API_ARG: &str = "Dropbox-API-Arg";

#[derive(Debug, Clone)]
pub struct DropboxEndpoints {
    pub authorization: String,
    /// RPC host; also serves `/oauth2/token`.
    pub api: String,
    /// Content host for uploads and downloads.
    pub content: String,
}

impl Default for DropboxEndpoints {
    fn default() -> Self {
        Self {
            authorization: "https://www.dropbox.com/oauth2/authorize".to_string(),
            api: "https://api.dropboxapi.com".to_string(),
            content: "https://content.dropboxapi.com".to_string(),
        }
    }
}

impl DropboxEndpoints {
    pub fn with_base(base: &str) -> Self {
        Self {
            authorization: format!("{}/oauth2/authorize", base),
            api: base.to_string(),
            content: base.to_string(),
        }
    }

    fn token(&self) -> String {
        format!("{}/oauth2/token", self.api)
    }
}

#[derive(Serialize)]
struct GetMetadataArg<'a> {
    path: &'a str,
    include_media_info: bool,
    include_deleted: bool,
    include_has_explicit_shared_members: bool,
}

#[derive(Deserialize)]
struct FileMetadata {
    id: String,
    client_modified: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum WriteMode {
    Add,
    Overwrite,
}

#[derive(Serialize)]
struct UploadArg<'a> {
    path: &'a str,
    mode: WriteMode,
    autorename: bool,
    client_modified: String,
    mute: bool,
    strict_conflict: bool,
}

#[derive(Serialize)]
struct DownloadArg<'a> {
    path: &'a str,
}

/// Error body of a 409 from `get_metadata`:
/// `{"error": {".tag": "path", "path": {".tag": "not_found"}}}`.
#[derive(Deserialize)]
struct ApiError {
    error: TaggedError,
}

#[derive(Deserialize)]
struct TaggedError {
    #[serde(rename = ".tag")]
    tag: String,
    #[serde(default)]
    path: Option<Tag>,
}

#[derive(Deserialize)]
struct Tag {
    #[serde(rename = ".tag")]
    tag: String,
}

impl ApiError {
    fn is_not_found(&self) -> bool {
        self.error.tag == "path"
            && self
                .error
                .path
                .as_ref()
                .is_some_and(|path| path.tag == "not_found")
    }
}

fn to_dropbox_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn api_arg<T: Serialize>(arg: &T) -> Result<String> {
    serde_json::to_string(arg).map_err(|e| SyncError::BadResponse(e.to_string()))
}

pub struct DropboxProvider {
    http: Client,
    credentials: AppCredentials,
    flow: Arc<dyn AuthorizationFlow>,
    endpoints: DropboxEndpoints,
}

impl DropboxProvider {
    pub fn new(credentials: AppCredentials, flow: Arc<dyn AuthorizationFlow>) -> Self {
        Self {
            http: Client::new(),
            credentials,
            flow,
            endpoints: DropboxEndpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: DropboxEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn upload(
        &self,
        access_token: &str,
        mode: WriteMode,
        content: &str,
        modified_time: DateTime<Utc>,
    ) -> Result<()> {
        let arg = UploadArg {
            path: PATH,
            mode,
            autorename: false,
            client_modified: to_dropbox_time(modified_time),
            mute: true,
            strict_conflict: false,
        };
        let response = self
            .http
            .post(format!("{}/2/files/upload", self.endpoints.content))
            .bearer_auth(access_token)
            .header(API_ARG, api_arg(&arg)?)
            .header("Content-Type", "application/octet-stream")
            .body(content.to_string())
            .send()
            .await
            .map_err(transport)?;
        check(response)?;
        Ok(())
    }
}

#[async_trait]
impl CloudProvider for DropboxProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Dropbox
    }

    fn modified_time_precision(&self) -> TimePrecision {
        TimePrecision::Second
    }

    async fn authorize(&self) -> Result<String> {
        oauth::authorize(
            self.flow.as_ref(),
            &self.endpoints.authorization,
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("token_access_type", "offline"),
                ("force_reapprove", "true"),
            ],
        )
        .await
    }

    #[instrument(skip_all, level = "debug")]
    async fn get_access_token(&self, authorization_code: &str) -> Result<TokenGrant> {
        oauth::exchange_code(
            &self.http,
            &self.endpoints.token(),
            &self.credentials,
            &self.flow.redirect_uri(),
            authorization_code,
        )
        .await
    }

    #[instrument(skip_all, level = "debug")]
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken> {
        oauth::refresh(
            &self.http,
            &self.endpoints.token(),
            &self.credentials,
            refresh_token,
        )
        .await
    }

    /// Dropbox revokes the access token that authenticates the call, so an expired one is
    /// refreshed first.
    #[instrument(skip_all, level = "debug")]
    async fn revoke_token(&self, token: &Token) -> Result<()> {
        let access_token = if token.is_expired_at(Utc::now()) {
            debug!("Access token expired, refreshing before revocation");
            self.refresh_access_token(&token.refresh_token)
                .await?
                .access_token
        } else {
            token.access_token.clone()
        };

        let response = self
            .http
            .post(format!("{}/2/auth/token/revoke", self.endpoints.api))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport)?;
        check(response)?;
        Ok(())
    }

    #[instrument(skip_all, level = "debug")]
    async fn find_file(&self, access_token: &str) -> Result<Option<RemoteFile>> {
        let response = self
            .http
            .post(format!("{}/2/files/get_metadata", self.endpoints.api))
            .bearer_auth(access_token)
            .json(&GetMetadataArg {
                path: PATH,
                include_media_info: false,
                include_deleted: false,
                include_has_explicit_shared_members: false,
            })
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::CONFLICT {
            let error: ApiError = json(response).await?;
            if error.is_not_found() {
                debug!("No remote file at {}", PATH);
                return Ok(None);
            }
            return Err(SyncError::http(409, "Conflict"));
        }

        let metadata: FileMetadata = json(check(response)?).await?;
        Ok(Some(RemoteFile {
            id: metadata.id,
            modified_time: metadata.client_modified,
        }))
    }

    #[instrument(skip(self, access_token, content), level = "debug", fields(content_len = content.len()))]
    async fn create_file(
        &self,
        access_token: &str,
        content: &str,
        modified_time: DateTime<Utc>,
    ) -> Result<()> {
        self.upload(access_token, WriteMode::Add, content, modified_time)
            .await
    }

    #[instrument(skip(self, access_token), level = "debug")]
    async fn read_file(&self, access_token: &str, id: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/2/files/download", self.endpoints.content))
            .bearer_auth(access_token)
            .header(API_ARG, api_arg(&DownloadArg { path: id })?)
            .send()
            .await
            .map_err(transport)?;
        text(check(response)?).await
    }

    /// Overwrites by path; Dropbox keeps the file id stable across overwrites.
    #[instrument(skip(self, access_token, content), level = "debug", fields(content_len = content.len()))]
    async fn write_file(
        &self,
        access_token: &str,
        _id: &str,
        content: &str,
        modified_time: DateTime<Utc>,
    ) -> Result<()> {
        self.upload(access_token, WriteMode::Overwrite, content, modified_time)
            .await
    }
}
