//! FIFO serialization of critical sections on one logical resource.

use std::future::Future;

use tokio::sync::Mutex;
use tracing::trace;

/// Runs queued operations one at a time, in the order they were queued.
///
/// An operation is queued when the future returned by [`CriticalSection::lock`] is first
/// polled. It starts once every earlier operation has finished, whatever its outcome, and its
/// result is handed back only to its own caller. Separate instances never wait on each other.
#[derive(Debug)]
pub struct CriticalSection {
    name: &'static str,
    queue: Mutex<()>,
}

impl CriticalSection {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            queue: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn lock<F, Fut, T>(&self, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // tokio's mutex grants the lock to waiters in FIFO order
        let _guard = self.queue.lock().await;
        trace!(section = self.name, "entered critical section");
        let output = operation().await;
        trace!(section = self.name, "left critical section");
        output
    }
}
