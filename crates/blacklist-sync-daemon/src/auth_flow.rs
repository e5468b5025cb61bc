use async_trait::async_trait;
use blacklist_sync_clouds::AuthorizationFlow;
use blacklist_sync_core::{Result, SyncError};
use reqwest::Url;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Consent through the terminal: print the authorization URL, read back the redirect URL the
/// browser landed on.
#[derive(Debug, Clone)]
pub struct ConsoleAuthFlow {
    redirect_uri: String,
}

impl ConsoleAuthFlow {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
        }
    }
}

#[async_trait]
impl AuthorizationFlow for ConsoleAuthFlow {
    fn redirect_uri(&self) -> String {
        self.redirect_uri.clone()
    }

    async fn launch(&self, authorization_url: Url) -> Result<Url> {
        eprintln!("Open this URL in a browser and grant access:\n\n  {}\n", authorization_url);
        eprintln!("Then paste the full URL you were redirected to:");

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| SyncError::Authorization(format!("failed to read redirect URL: {}", e)))?;
        debug!("Read redirect URL ({} bytes)", line.len());

        parse_redirect(&line)
    }
}

fn parse_redirect(line: &str) -> Result<Url> {
    let line = line.trim();
    if line.is_empty() {
        return Err(SyncError::Authorization("authorization cancelled".to_string()));
    }
    Url::parse(line).map_err(|e| SyncError::Authorization(format!("invalid redirect URL: {}", e)))
}
