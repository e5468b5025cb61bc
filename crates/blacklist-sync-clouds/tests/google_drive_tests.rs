use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use blacklist_sync_clouds::{
    AppCredentials, AuthorizationFlow, GoogleDriveEndpoints, GoogleDriveProvider,
};
use blacklist_sync_core::{CloudProvider, ProviderId, Result, SyncError, TimePrecision, Token};
use chrono::{DateTime, Utc};
use reqwest::Url;
use wiremock::matchers::{
    bearer_token, body_string, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REDIRECT: &str = "http://127.0.0.1:8085/callback";

/// Answers the consent step with a fixed redirect and records the URL it was shown.
struct StaticFlow {
    redirect: String,
    launched: Mutex<Option<Url>>,
}

impl StaticFlow {
    fn new(redirect: &str) -> Arc<Self> {
        Arc::new(Self {
            redirect: redirect.to_string(),
            launched: Mutex::new(None),
        })
    }

    fn launched(&self) -> Url {
        self.launched.lock().unwrap().clone().unwrap()
    }
}

#[async_trait]
impl AuthorizationFlow for StaticFlow {
    fn redirect_uri(&self) -> String {
        REDIRECT.to_string()
    }

    async fn launch(&self, authorization_url: Url) -> Result<Url> {
        *self.launched.lock().unwrap() = Some(authorization_url);
        Ok(Url::parse(&self.redirect).unwrap())
    }
}

fn provider(server: &MockServer, flow: Arc<StaticFlow>) -> GoogleDriveProvider {
    GoogleDriveProvider::new(AppCredentials::new("client-id", "client-secret"), flow)
        .with_endpoints(GoogleDriveEndpoints::with_base(&server.uri()))
}

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

// --- Identity ---

#[tokio::test]
async fn identity_and_precision() {
    let server = MockServer::start().await;
    let drive = provider(&server, StaticFlow::new(REDIRECT));
    assert_eq!(drive.id(), ProviderId::GoogleDrive);
    assert_eq!(drive.modified_time_precision(), TimePrecision::Millisecond);
    assert!(!drive.host_permissions().is_empty());
}

// --- OAuth ---

#[tokio::test]
async fn authorize_requests_offline_appdata_consent() {
    let server = MockServer::start().await;
    let flow = StaticFlow::new(&format!("{}?code=auth-code", REDIRECT));
    let drive = provider(&server, flow.clone());

    let code = drive.authorize().await.unwrap();

    assert_eq!(code, "auth-code");
    let url = flow.launched();
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let param = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    assert_eq!(param("client_id"), Some("client-id"));
    assert_eq!(
        param("scope"),
        Some("https://www.googleapis.com/auth/drive.appdata")
    );
    assert_eq!(param("access_type"), Some("offline"));
    assert_eq!(param("prompt"), Some("consent select_account"));
    assert_eq!(param("redirect_uri"), Some(REDIRECT));
    assert_eq!(param("response_type"), Some("code"));
}

#[tokio::test]
async fn authorize_denied_is_authorization_error() {
    let server = MockServer::start().await;
    let flow = StaticFlow::new(&format!("{}?error=access_denied", REDIRECT));
    let drive = provider(&server, flow);

    let err = drive.authorize().await.unwrap_err();
    assert_eq!(err, SyncError::Authorization("access_denied".to_string()));
}

#[tokio::test]
async fn exchange_code_for_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .and(body_string_contains("client_secret=client-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-1",
            "expires_in": 3599,
            "refresh_token": "rt-1",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let drive = provider(&server, StaticFlow::new(REDIRECT));
    let grant = drive.get_access_token("auth-code").await.unwrap();

    assert_eq!(grant.access_token, "at-1");
    assert_eq!(grant.expires_in, 3599);
    assert_eq!(grant.refresh_token, "rt-1");
}

#[tokio::test]
async fn exchange_without_refresh_token_is_bad_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-1",
            "expires_in": 3599
        })))
        .mount(&server)
        .await;

    let drive = provider(&server, StaticFlow::new(REDIRECT));
    let err = drive.get_access_token("auth-code").await.unwrap_err();
    assert!(matches!(err, SyncError::BadResponse(_)));
}

#[tokio::test]
async fn refresh_access_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-2",
            "expires_in": 3599
        })))
        .mount(&server)
        .await;

    let drive = provider(&server, StaticFlow::new(REDIRECT));
    let refreshed = drive.refresh_access_token("rt-1").await.unwrap();

    assert_eq!(refreshed.access_token, "at-2");
    assert_eq!(refreshed.refresh_token, None);
}

#[tokio::test]
async fn revoked_refresh_token_is_http_400() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant"
        })))
        .mount(&server)
        .await;

    let drive = provider(&server, StaticFlow::new(REDIRECT));
    let err = drive.refresh_access_token("rt-dead").await.unwrap_err();
    assert_eq!(err, SyncError::http(400, "Bad Request"));
}

#[tokio::test]
async fn revoke_posts_refresh_token_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/revoke"))
        .and(body_string("token=rt-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let drive = provider(&server, StaticFlow::new(REDIRECT));
    drive
        .revoke_token(&Token {
            access_token: "at-1".to_string(),
            refresh_token: "rt-1".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
        .await
        .unwrap();
}

// --- Files ---

#[tokio::test]
async fn find_file_in_app_data_folder() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(bearer_token("at-1"))
        .and(query_param("spaces", "appDataFolder"))
        .and(query_param("q", "name = 'uBlacklist.txt'"))
        .and(query_param("fields", "files(id, modifiedTime)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [
                { "id": "file-a", "modifiedTime": "2024-03-01T10:00:00.123Z" },
                { "id": "file-b", "modifiedTime": "2024-02-01T10:00:00.000Z" }
            ]
        })))
        .mount(&server)
        .await;

    let drive = provider(&server, StaticFlow::new(REDIRECT));
    let file = drive.find_file("at-1").await.unwrap().unwrap();

    assert_eq!(file.id, "file-a");
    assert_eq!(file.modified_time, at("2024-03-01T10:00:00.123Z"));
}

#[tokio::test]
async fn find_file_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": [] })),
        )
        .mount(&server)
        .await;

    let drive = provider(&server, StaticFlow::new(REDIRECT));
    assert_eq!(drive.find_file("at-1").await.unwrap(), None);
}

#[tokio::test]
async fn expired_access_token_is_http_401() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let drive = provider(&server, StaticFlow::new(REDIRECT));
    let err = drive.find_file("at-stale").await.unwrap_err();
    assert_eq!(err, SyncError::http(401, "Unauthorized"));
}

#[tokio::test]
async fn create_file_uploads_multipart_with_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .and(bearer_token("at-1"))
        .and(body_string_contains(r#""name":"uBlacklist.txt""#))
        .and(body_string_contains(r#""parents":["appDataFolder"]"#))
        .and(body_string_contains(r#""modifiedTime":"2024-03-01T10:00:00.123Z""#))
        .and(body_string_contains("*://*.example.com/*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "new" })))
        .expect(1)
        .mount(&server)
        .await;

    let drive = provider(&server, StaticFlow::new(REDIRECT));
    drive
        .create_file("at-1", "*://*.example.com/*", at("2024-03-01T10:00:00.123Z"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("multipart/related; boundary="));
}

#[tokio::test]
async fn read_file_downloads_media() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/file-a"))
        .and(query_param("alt", "media"))
        .and(bearer_token("at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("*://*.example.net/*\n"))
        .mount(&server)
        .await;

    let drive = provider(&server, StaticFlow::new(REDIRECT));
    let content = drive.read_file("at-1", "file-a").await.unwrap();
    assert_eq!(content, "*://*.example.net/*\n");
}

#[tokio::test]
async fn write_file_patches_content_and_time() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/file-a"))
        .and(query_param("uploadType", "multipart"))
        .and(header("authorization", "Bearer at-1"))
        .and(body_string_contains(r#""modifiedTime":"2024-03-02T00:00:00.000Z""#))
        .and(body_string_contains("updated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "file-a" })))
        .expect(1)
        .mount(&server)
        .await;

    let drive = provider(&server, StaticFlow::new(REDIRECT));
    drive
        .write_file("at-1", "file-a", "updated", at("2024-03-02T00:00:00Z"))
        .await
        .unwrap();
}

#[tokio::test]
async fn server_error_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/file-a"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let drive = provider(&server, StaticFlow::new(REDIRECT));
    let err = drive.read_file("at-1", "file-a").await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}
