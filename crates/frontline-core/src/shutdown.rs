//! Cooperative shutdown signal shared by every background loop.
//!
//! Loops check [`ShutdownSignal::is_triggered`] at each iteration boundary
//! and race their suspension points (channel receive, interval sleep)
//! against [`ShutdownSignal::cancelled`] so they exit promptly without
//! holding any lock.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot, process-wide stop flag.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Resolve once shutdown has been requested.
    pub async fn cancelled(&self) {
        loop {
            // Register interest before checking the flag so a trigger between
            // the check and the await is not missed.
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}
