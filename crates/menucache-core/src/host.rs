//! Host-side lifecycle controls.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

#[async_trait]
pub trait ClientHost: Send + Sync {
    /// Proceed to activation without waiting for existing pages to close.
    async fn skip_waiting(&self) -> Result<()>;

    /// Take control of every open client page. Returns how many were claimed.
    async fn claim_clients(&self) -> Result<usize>;
}

/// In-process host that tracks open pages and which of them the agent
/// controls.
#[derive(Debug, Default)]
pub struct LocalHost {
    open_clients: AtomicUsize,
    controlled: AtomicUsize,
    waiting_skipped: AtomicBool,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clients(open: usize) -> Self {
        let host = Self::default();
        host.open_clients.store(open, Ordering::SeqCst);
        host
    }

    /// A new page opened. It stays uncontrolled until the next claim.
    pub fn open_client(&self) {
        self.open_clients.fetch_add(1, Ordering::SeqCst);
    }

    pub fn open_clients(&self) -> usize {
        self.open_clients.load(Ordering::SeqCst)
    }

    pub fn controlled_clients(&self) -> usize {
        self.controlled.load(Ordering::SeqCst)
    }

    pub fn waiting_skipped(&self) -> bool {
        self.waiting_skipped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientHost for LocalHost {
    async fn skip_waiting(&self) -> Result<()> {
        self.waiting_skipped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn claim_clients(&self) -> Result<usize> {
        let open = self.open_clients.load(Ordering::SeqCst);
        self.controlled.store(open, Ordering::SeqCst);
        debug!(clients = open, "Claimed clients");
        Ok(open)
    }
}
