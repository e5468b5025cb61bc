//! OAuth2 authorization-code flow shared by the providers.

use std::fmt;

use async_trait::async_trait;
use blacklist_sync_core::{RefreshedToken, Result, SyncError, TokenGrant};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use crate::http::{check, json, transport};

/// App identity registered with a provider.
#[derive(Clone, PartialEq, Eq)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl AppCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Interactive consent step of the authorization-code grant.
///
/// `launch` shows the authorization URL to the user and returns the URL the provider
/// redirected to afterwards.
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    fn redirect_uri(&self) -> String;

    async fn launch(&self, authorization_url: Url) -> Result<Url>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Build the authorization URL, run the flow and extract the code from the redirect.
pub(crate) async fn authorize(
    flow: &dyn AuthorizationFlow,
    endpoint: &str,
    params: &[(&str, &str)],
) -> Result<String> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| SyncError::Authorization(format!("invalid authorization endpoint: {}", e)))?;
    url.query_pairs_mut()
        .extend_pairs(params)
        .append_pair("redirect_uri", &flow.redirect_uri())
        .append_pair("response_type", "code");

    let redirect = flow.launch(url).await?;
    code_from_redirect(&redirect)
}

/// Extract the authorization code from the redirect URL.
pub fn code_from_redirect(redirect: &Url) -> Result<String> {
    let mut code = None;
    for (key, value) in redirect.query_pairs() {
        match key.as_ref() {
            "error" => return Err(SyncError::Authorization(value.into_owned())),
            "code" => code = Some(value.into_owned()),
            _ => {}
        }
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| SyncError::Authorization("no authorization code in redirect".to_string()))
}

/// Exchange a one-time authorization code for tokens.
pub(crate) async fn exchange_code(
    http: &Client,
    token_url: &str,
    credentials: &AppCredentials,
    redirect_uri: &str,
    code: &str,
) -> Result<TokenGrant> {
    let response = http
        .post(token_url)
        .form(&[
            ("code", code),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(transport)?;

    let token: TokenResponse = json(check(response)?).await?;
    let refresh_token = token.refresh_token.ok_or_else(|| {
        SyncError::BadResponse("token response has no refresh_token".to_string())
    })?;

    debug!("Exchanged authorization code, expires in {}s", token.expires_in);
    Ok(TokenGrant {
        access_token: token.access_token,
        expires_in: token.expires_in,
        refresh_token,
    })
}

/// Run the refresh_token grant. A dead refresh token surfaces as HTTP 400.
pub(crate) async fn refresh(
    http: &Client,
    token_url: &str,
    credentials: &AppCredentials,
    refresh_token: &str,
) -> Result<RefreshedToken> {
    let response = http
        .post(token_url)
        .form(&[
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await
        .map_err(transport)?;

    let token: TokenResponse = json(check(response)?).await?;
    Ok(RefreshedToken {
        access_token: token.access_token,
        expires_in: token.expires_in,
        refresh_token: token.refresh_token,
    })
}
