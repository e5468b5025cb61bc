//! Cloud backends for blacklist synchronization.
//!
//! Each backend implements [`blacklist_sync_core::CloudProvider`] over the vendor's REST API
//! and the OAuth2 authorization-code grant. The interactive consent step is delegated to an
//! [`AuthorizationFlow`] supplied by the host.

mod dropbox;
mod google_drive;
mod http;
mod oauth;

use std::sync::Arc;

use blacklist_sync_core::Providers;
use tracing::debug;

pub use dropbox::{DropboxEndpoints, DropboxProvider};
pub use google_drive::{GoogleDriveEndpoints, GoogleDriveProvider};
pub use oauth::{code_from_redirect, AppCredentials, AuthorizationFlow};

/// App credentials per backend. A backend without credentials is not registered.
#[derive(Debug, Clone, Default)]
pub struct CloudsConfig {
    pub google_drive: Option<AppCredentials>,
    pub dropbox: Option<AppCredentials>,
}

/// Registry of every backend that has credentials configured.
pub fn supported_clouds(config: &CloudsConfig, flow: Arc<dyn AuthorizationFlow>) -> Providers {
    let mut providers = Providers::new();
    if let Some(credentials) = &config.google_drive {
        providers.insert(Arc::new(GoogleDriveProvider::new(
            credentials.clone(),
            flow.clone(),
        )));
    }
    if let Some(credentials) = &config.dropbox {
        providers.insert(Arc::new(DropboxProvider::new(credentials.clone(), flow)));
    }
    debug!(
        "Registered clouds: {:?}",
        providers.ids().collect::<Vec<_>>()
    );
    providers
}
