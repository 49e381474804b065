//! Conflict resolution seam.
//!
//! When a load finds that both the in-memory session and the remote copy
//! changed since the last sync, the manager asks a [`ConflictResolver`].
//! In the app this prompts the user; headless callers and tests use
//! [`FixedResolver`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use sync_types::ActiveSession;

pub use sync_core::Resolution;

/// Decides between a local and a remote copy of the same session.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Pick one of [`Resolution::UseRemote`], [`Resolution::UseLocal`] or
    /// [`Resolution::Merge`].
    async fn resolve(&self, local: &ActiveSession, remote: &ActiveSession) -> Resolution;
}

/// Always answers with the same resolution and counts how often it was asked.
#[derive(Debug)]
pub struct FixedResolver {
    resolution: Resolution,
    calls: AtomicUsize,
}

impl FixedResolver {
    /// Create a resolver that always answers `resolution`.
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of conflicts resolved so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConflictResolver for FixedResolver {
    async fn resolve(&self, _local: &ActiveSession, _remote: &ActiveSession) -> Resolution {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.resolution
    }
}
