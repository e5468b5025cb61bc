use std::path::PathBuf;

use blacklist_sync_clouds::{AppCredentials, CloudsConfig};
use blacklist_sync_core::ProviderId;
use clap::{Parser, Subcommand};

/// Configuration for the blacklist-sync host.
#[derive(Parser, Debug, Clone)]
#[command(name = "blacklist-sync")]
#[command(about = "Keep a local blacklist in sync with Google Drive or Dropbox")]
pub struct Config {
    /// Directory holding the persisted state (state.json)
    #[arg(long, env = "BLACKLIST_SYNC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Google OAuth2 Client ID
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    /// Google OAuth2 Client Secret
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub google_client_secret: Option<String>,

    /// Dropbox app key
    #[arg(long, env = "DROPBOX_APP_KEY")]
    pub dropbox_app_key: Option<String>,

    /// Dropbox app secret
    #[arg(long, env = "DROPBOX_APP_SECRET", hide_env_values = true)]
    pub dropbox_app_secret: Option<String>,

    /// Redirect URI registered with both providers
    #[arg(long, default_value = "http://127.0.0.1:8085/callback", env = "OAUTH_REDIRECT_URI")]
    pub redirect_uri: String,

    /// How often `run` checks for a connection while disconnected (seconds)
    #[arg(long, default_value = "60", env = "IDLE_POLL_INTERVAL")]
    pub idle_poll_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sync now and then periodically until interrupted
    Run,
    /// Authorize a cloud and run the first sync
    Connect {
        /// googleDrive or dropbox
        provider: ProviderId,
    },
    /// Forget the connected cloud and revoke its token
    Disconnect,
    /// Sync once
    Sync,
    /// Replace the blacklist and sync it
    Set {
        /// Read the blacklist from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Set the periodic sync interval (5, 15, 30, 60, 120 or 300 minutes)
    Interval { minutes: u32 },
    /// Show the connection and the last sync result
    Status,
}

impl Config {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("blacklist-sync")
        })
    }

    /// Credentials of every provider whose id and secret are both set.
    pub fn clouds(&self) -> CloudsConfig {
        fn pair(id: &Option<String>, secret: &Option<String>) -> Option<AppCredentials> {
            match (id, secret) {
                (Some(id), Some(secret)) => Some(AppCredentials::new(id, secret)),
                _ => None,
            }
        }

        CloudsConfig {
            google_drive: pair(&self.google_client_id, &self.google_client_secret),
            dropbox: pair(&self.dropbox_app_key, &self.dropbox_app_secret),
        }
    }
}
