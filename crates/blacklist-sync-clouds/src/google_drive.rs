//! Google Drive API v3 backend.
//!
//! The blacklist lives in the app data folder, invisible to the user's Drive listing.
//! Uploads use `multipart/related` so content and `modifiedTime` are written in one request.

use std::sync::Arc;

use async_trait::async_trait;
use blacklist_sync_core::{
    CloudProvider, ProviderId, RefreshedToken, RemoteFile, Result, TimePrecision, Token,
    TokenGrant,
};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::http::{check, json, text, transport};
use crate::oauth::{self, AppCredentials, AuthorizationFlow};

const FILENAME: &str = "uBlacklist.txt";
const SCOPE: &str = "https://www.googleapis.com/auth/drive.appdata";
const MULTIPART_BOUNDARY: &str = "----------BlacklistSyncMultipartRelatedBoundary6f2QvJ8xLw";

/// Endpoint base URLs; overridable so tests can point at a mock server.
#[derive(Debug, Clone)]
pub struct GoogleDriveEndpoints {
    pub authorization: String,
    pub token: String,
    pub revoke: String,
    /// Base for `/drive/v3` and `/upload/drive/v3`.
    pub api: String,
}

impl Default for GoogleDriveEndpoints {
    fn default() -> Self {
        Self {
            authorization: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token: "https://oauth2.googleapis.com/token".to_string(),
            revoke: "https://oauth2.googleapis.com/revoke".to_string(),
            api: "https://www.googleapis.com".to_string(),
        }
    }
}

impl GoogleDriveEndpoints {
    /// All endpoints under one base URL.
    pub fn with_base(base: &str) -> Self {
        Self {
            authorization: format!("{}/o/oauth2/v2/auth", base),
            token: format!("{}/token", base),
            revoke: format!("{}/revoke", base),
            api: base.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    modified_time: DateTime<Utc>,
}

pub struct GoogleDriveProvider {
    http: Client,
    credentials: AppCredentials,
    flow: Arc<dyn AuthorizationFlow>,
    endpoints: GoogleDriveEndpoints,
}

impl GoogleDriveProvider {
    pub fn new(credentials: AppCredentials, flow: Arc<dyn AuthorizationFlow>) -> Self {
        Self {
            http: Client::new(),
            credentials,
            flow,
            endpoints: GoogleDriveEndpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: GoogleDriveEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn upload(&self, metadata: serde_json::Value, content: &str) -> String {
        format!(
            "--{b}\r\n\
             Content-Type: application/json; charset=UTF-8\r\n\
             \r\n\
             {metadata}\r\n\
             --{b}\r\n\
             Content-Type: text/plain; charset=UTF-8\r\n\
             \r\n\
             {content}\r\n\
             --{b}--",
            b = MULTIPART_BOUNDARY,
            metadata = metadata,
            content = content,
        )
    }
}

fn to_drive_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl CloudProvider for GoogleDriveProvider {
    fn id(&self) -> ProviderId {
        ProviderId::GoogleDrive
    }

    fn modified_time_precision(&self) -> TimePrecision {
        TimePrecision::Millisecond
    }

    fn host_permissions(&self) -> &[&'static str] {
        &["https://www.googleapis.com/*", "https://oauth2.googleapis.com/*"]
    }

    async fn authorize(&self) -> Result<String> {
        oauth::authorize(
            self.flow.as_ref(),
            &self.endpoints.authorization,
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("scope", SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent select_account"),
            ],
        )
        .await
    }

    #[instrument(skip_all, level = "debug")]
    async fn get_access_token(&self, authorization_code: &str) -> Result<TokenGrant> {
        oauth::exchange_code(
            &self.http,
            &self.endpoints.token,
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
            &self.endpoints.token,
            &self.credentials,
            refresh_token,
        )
        .await
    }

    /// Revoking the refresh token also invalidates every access token issued from it.
    #[instrument(skip_all, level = "debug")]
    async fn revoke_token(&self, token: &Token) -> Result<()> {
        let response = self
            .http
            .post(&self.endpoints.revoke)
            .form(&[("token", token.refresh_token.as_str())])
            .send()
            .await
            .map_err(transport)?;
        check(response)?;
        Ok(())
    }

    #[instrument(skip_all, level = "debug")]
    async fn find_file(&self, access_token: &str) -> Result<Option<RemoteFile>> {
        let query = format!("name = '{}'", FILENAME);
        let response = self
            .http
            .get(format!("{}/drive/v3/files", self.endpoints.api))
            .bearer_auth(access_token)
            .query(&[
                ("fields", "files(id, modifiedTime)"),
                ("q", query.as_str()),
                ("spaces", "appDataFolder"),
            ])
            .send()
            .await
            .map_err(transport)?;

        let list: FileList = json(check(response)?).await?;
        let file = list.files.into_iter().next().map(|f| RemoteFile {
            id: f.id,
            modified_time: f.modified_time,
        });
        debug!("Found remote file: {:?}", file);
        Ok(file)
    }

    #[instrument(skip(self, access_token, content), level = "debug", fields(content_len = content.len()))]
    async fn create_file(
        &self,
        access_token: &str,
        content: &str,
        modified_time: DateTime<Utc>,
    ) -> Result<()> {
        let metadata = serde_json::json!({
            "modifiedTime": to_drive_time(modified_time),
            "name": FILENAME,
            "parents": ["appDataFolder"],
        });
        let response = self
            .http
            .post(format!("{}/upload/drive/v3/files", self.endpoints.api))
            .bearer_auth(access_token)
            .query(&[("uploadType", "multipart")])
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(self.upload(metadata, content))
            .send()
            .await
            .map_err(transport)?;
        check(response)?;
        Ok(())
    }

    #[instrument(skip(self, access_token), level = "debug")]
    async fn read_file(&self, access_token: &str, id: &str) -> Result<String> {
        let response = self
            .http
            .get(format!("{}/drive/v3/files/{}", self.endpoints.api, id))
            .bearer_auth(access_token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(transport)?;
        text(check(response)?).await
    }

    #[instrument(skip(self, access_token, content), level = "debug", fields(content_len = content.len()))]
    async fn write_file(
        &self,
        access_token: &str,
        id: &str,
        content: &str,
        modified_time: DateTime<Utc>,
    ) -> Result<()> {
        let metadata = serde_json::json!({ "modifiedTime": to_drive_time(modified_time) });
        let response = self
            .http
            .patch(format!("{}/upload/drive/v3/files/{}", self.endpoints.api, id))
            .bearer_auth(access_token)
            .query(&[("uploadType", "multipart")])
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(self.upload(metadata, content))
            .send()
            .await
            .map_err(transport)?;
        check(response)?;
        Ok(())
    }
}
