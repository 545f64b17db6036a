//! Admission control for outbound AI calls
//!
//! Bounds the number of in-flight requests. Waiters are served in strict
//! FIFO order (tokio's semaphore is fair), so no caller can be skipped
//! while slots keep going to newer arrivals.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Concurrency cap shared by every caller of the gateway
#[derive(Debug)]
pub struct Dispatcher {
    slots: Semaphore,
    max_concurrent: usize,
    waiting: AtomicUsize,
}

impl Dispatcher {
    pub const DEFAULT_MAX_CONCURRENT: usize = 3;

    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            slots: Semaphore::new(max_concurrent),
            max_concurrent,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Run `task` once a slot is free, releasing the slot when it finishes.
    ///
    /// The slot is an RAII permit: it is returned whether the task
    /// succeeds, fails, panics, or the returned future is dropped.
    pub async fn submit<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = {
            let _waiting = WaitingGuard::enter(&self.waiting);
            if self.slots.available_permits() == 0 {
                tracing::debug!(
                    in_flight = self.in_flight(),
                    waiting = self.waiting(),
                    "Dispatcher full, waiting for a slot"
                );
            }
            self.slots
                .acquire()
                .await
                .expect("dispatcher semaphore is never closed")
        };

        task().await
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Tasks currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.slots.available_permits()
    }

    /// Callers suspended waiting for a slot
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_CONCURRENT)
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
