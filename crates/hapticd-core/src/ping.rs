//! Ping watchdog.
//!
//! The supervisor sleeps until the current deadline (last ping plus the
//! allowed interval). If no ping moved the deadline in the meantime it fires
//! its timeout callback once and exits.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{trace, warn};

/// Timestamp of the last liveness signal. Clones share the timestamp.
#[derive(Debug, Clone)]
pub struct Liveness {
    last: Arc<Mutex<Instant>>,
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn touch(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    #[must_use]
    pub fn last(&self) -> Instant {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.last().elapsed()
    }
}

/// Background task enforcing the ping interval. Aborted on drop.
#[derive(Debug)]
pub struct PingSupervisor {
    handle: JoinHandle<()>,
}

impl PingSupervisor {
    /// Start watching `liveness`; `on_timeout` runs at most once.
    pub fn spawn<F>(max_interval: Duration, liveness: Liveness, on_timeout: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep_until(liveness.last() + max_interval).await;

                let elapsed = liveness.elapsed();
                if elapsed >= max_interval {
                    warn!(
                        "No ping for {}ms (limit {}ms)",
                        elapsed.as_millis(),
                        max_interval.as_millis()
                    );
                    on_timeout();
                    return;
                }
                trace!("Ping deadline moved, {}ms since last", elapsed.as_millis());
            }
        });

        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PingSupervisor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
