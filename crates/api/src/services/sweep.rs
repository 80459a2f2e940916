//! Periodic purge of expired one-time codes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::db::{OtpLedger, RepositoryError};
use crate::services::clock::Clock;

/// Deletes expired ledger records on a fixed interval.
#[derive(Clone)]
pub struct OtpSweeper {
    ledger: Arc<dyn OtpLedger>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl OtpSweeper {
    /// Create a sweeper that runs every `interval`.
    #[must_use]
    pub fn new(ledger: Arc<dyn OtpLedger>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            ledger,
            clock,
            interval,
        }
    }

    /// Run a single pass. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger delete fails.
    pub async fn sweep_once(&self) -> Result<u64, RepositoryError> {
        let removed = self.ledger.delete_all_expired(self.clock.now()).await?;
        if removed > 0 {
            tracing::debug!(removed, "expired OTP records swept");
        }
        Ok(removed)
    }

    /// Start sweeping in the background until the handle is shut down.
    ///
    /// A failed pass is logged and the loop keeps going.
    #[must_use]
    pub fn spawn(self) -> SweeperHandle {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so startup is quiet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = signal.notified() => {
                        tracing::debug!("OTP sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            tracing::error!(error = %e, "OTP sweep failed");
                        }
                    }
                }
            }
        });

        SweeperHandle { shutdown, task }
    }
}

/// Handle to a running sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the current pass to finish.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "OTP sweeper task ended abnormally");
        }
    }
}
