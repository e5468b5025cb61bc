mod auth_flow;
mod config;
mod scheduler;
mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use blacklist_sync_clouds::supported_clouds;
use blacklist_sync_core::{BroadcastNotifier, Engine, Interval, Items, SyncResult};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tokio::signal;
use tokio::sync::watch as tokio_watch;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use auth_flow::ConsoleAuthFlow;
use config::{Command, Config};
use store::JsonFileStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    let data_dir = config.data_dir();

    let store = Arc::new(JsonFileStore::new(&data_dir));
    debug!("State file: {}", store.path().display());

    let flow = Arc::new(ConsoleAuthFlow::new(config.redirect_uri.clone()));
    let providers = supported_clouds(&config.clouds(), flow);

    let notifier = BroadcastNotifier::default();
    let engine = Engine::new(providers, store, Arc::new(notifier.clone()));

    match config.command {
        Command::Run => {
            info!("Starting blacklist-sync");
            info!("  Data directory: {}", data_dir.display());
            info!(
                "  Clouds: {:?}",
                engine.providers().ids().collect::<Vec<_>>()
            );

            let events = scheduler::log_events(&notifier);
            let shutdown_rx = create_shutdown_signal();
            scheduler::run(
                engine,
                Duration::from_secs(config.idle_poll_secs),
                shutdown_rx,
            )
            .await;
            events.abort();

            info!("Shutdown complete");
        }
        Command::Connect { provider } => {
            let cloud = engine.providers().get(provider)?;
            debug!("{} needs access to {:?}", provider, cloud.host_permissions());

            let events = scheduler::log_events(&notifier);
            engine
                .connect(provider)
                .await
                .with_context(|| format!("Failed to connect to {}", provider))?
                .await
                .context("First sync task panicked")?;
            events.abort();

            println!("Connected to {}", provider);
            print_status(&engine.items().await?);
        }
        Command::Disconnect => {
            engine
                .disconnect()
                .await
                .context("Failed to disconnect")?;
            println!("Disconnected");
        }
        Command::Sync => {
            let events = scheduler::log_events(&notifier);
            let next = engine.sync_blacklist().await?;
            events.abort();

            match next {
                Some(_) => print_status(&engine.items().await?),
                None => println!("Not connected to a cloud; nothing to sync"),
            }
        }
        Command::Set { file } => {
            let blacklist = match &file {
                Some(path) => tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut buf)
                        .await
                        .context("Failed to read blacklist from stdin")?;
                    buf
                }
            };

            let events = scheduler::log_events(&notifier);
            engine
                .set_blacklist(&blacklist)
                .await?
                .await
                .context("Sync task panicked")?;
            events.abort();

            println!("Blacklist updated ({} lines)", blacklist.lines().count());
        }
        Command::Interval { minutes } => {
            let interval = Interval::try_from(minutes)?;
            engine.set_sync_interval(interval).await?;
            println!("Sync interval set to {} minutes", interval.minutes());
        }
        Command::Status => print_status(&engine.items().await?),
    }

    Ok(())
}

fn print_status(items: &Items) {
    match &items.provider_id {
        Some(id) if items.token.is_some() => println!("Cloud:         {}", id),
        Some(id) => println!("Cloud:         {} (authorization expired, reconnect)", id),
        None => println!("Cloud:         not connected"),
    }
    println!("Sync interval: {} minutes", items.sync_interval.minutes());
    println!("Modified:      {}", items.timestamp);
    println!("Entries:       {}", items.blacklist.lines().count());
    match &items.sync_result {
        Some(SyncResult::Success { timestamp }) => println!("Last sync:     ok at {}", timestamp),
        Some(SyncResult::Error { message }) => println!("Last sync:     failed: {}", message),
        None => println!("Last sync:     never"),
    }
}

/// Create a shutdown signal that triggers on Ctrl+C or SIGTERM.
fn create_shutdown_signal() -> tokio_watch::Receiver<bool> {
    let (tx, rx) = tokio_watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, initiating shutdown");
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, initiating shutdown");
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        let _ = tx.send(true);
    });

    rx
}
