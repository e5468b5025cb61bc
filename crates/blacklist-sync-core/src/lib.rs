//! Core traits and types for blacklist cloud synchronization.
//!
//! This crate defines the abstractions shared between the cloud providers and the host process:
//! - `CloudProvider`: OAuth calls and CRUD on the single synced file
//! - `Persistence`: Local key-value state with explicit defaults
//! - `Notifier`: Fire-and-forget sync progress events
//! - `CriticalSection`: FIFO serialization of operations on one logical resource
//! - `CloudSync`: Connection lifecycle and the timestamp-based sync algorithm
//! - `Blacklist` / `Engine`: Document updates, sync bookkeeping and background sync

mod blacklist;
mod cloud;
mod engine;
mod error;
mod mutex;
mod notify;
mod persistence;
mod provider;

#[cfg(test)]
mod testing;

pub use blacklist::{Blacklist, Interval};
pub use cloud::{CloudSync, Document, SyncOutcome};
pub use engine::{BackgroundSync, Engine};
pub use error::{Result, SyncError};
pub use mutex::CriticalSection;
pub use notify::{BroadcastNotifier, Notifier, SyncEvent, SyncResult};
pub use persistence::{Items, ItemsPatch, MemoryStore, Persistence, Token};
pub use provider::{
    CloudProvider, ProviderId, Providers, RefreshedToken, RemoteFile, TimePrecision, TokenGrant,
};
