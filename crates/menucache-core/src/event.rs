//! Lifecycle events and the "hold the event open" contract.
//!
//! Work a handler starts but does not await (such as the data-partition
//! write of the network-first strategy) is registered with
//! [`ExtendableEvent::wait_until`]. The host must await
//! [`ExtendableEvent::settle`] before it treats the event as finished;
//! dropping the event instead leaves those tasks running detached.

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::Result;
use crate::http::Request;

#[derive(Debug, Default)]
pub struct ExtendableEvent {
    pending: Mutex<Vec<JoinHandle<Result<()>>>>,
}

/// Outcome of settling an event's extended work.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Settled {
    pub completed: usize,
    pub failed: usize,
}

impl ExtendableEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `work` and keep the event open until it resolves.
    ///
    /// Must be called from within a tokio runtime.
    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handle);
    }

    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Await every registered task. A task that errors or panics counts as
    /// failed; it never aborts the others.
    pub async fn settle(&self) -> Settled {
        let handles: Vec<_> = std::mem::take(
            &mut *self
                .pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        let mut settled = Settled::default();
        for result in futures::future::join_all(handles).await {
            match result {
                Ok(Ok(())) => settled.completed += 1,
                Ok(Err(e)) => {
                    warn!(error = %e, "Extended event work failed");
                    settled.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Extended event task did not finish");
                    settled.failed += 1;
                }
            }
        }
        settled
    }
}

/// A request intercepted from a controlled page.
#[derive(Debug)]
pub struct FetchEvent {
    pub request: Request,
    pub lifetime: ExtendableEvent,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            lifetime: ExtendableEvent::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_settle_waits_for_registered_work() {
        let event = ExtendableEvent::new();
        let done = Arc::new(AtomicUsize::new(0));

        for delay in [5, 15] {
            let done = Arc::clone(&done);
            event.wait_until(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<(), CacheError>(())
            });
        }
        assert_eq!(event.pending(), 2);

        let settled = event.settle().await;
        assert_eq!(settled, Settled { completed: 2, failed: 0 });
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(event.pending(), 0);
    }

    #[tokio::test]
    async fn test_settle_counts_failures_independently() {
        let event = ExtendableEvent::new();
        event.wait_until(async { Err::<(), _>(CacheError::Network("offline".to_string())) });
        event.wait_until(async { Ok::<(), CacheError>(()) });
        event.wait_until(async {
            let blow_up = true;
            if blow_up {
                panic!("task blew up");
            }
            Ok::<(), CacheError>(())
        });

        let settled = event.settle().await;
        assert_eq!(settled, Settled { completed: 1, failed: 2 });
    }

    #[tokio::test]
    async fn test_settle_without_work() {
        let event = ExtendableEvent::new();
        assert_eq!(event.settle().await, Settled::default());
    }
}
