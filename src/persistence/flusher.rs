//! Snapshot flusher loop.
//!
//! The flusher follows a simple cycle:
//! 1. On every interval tick, capture a snapshot from the store
//! 2. Write it to disk (temp file + rename)
//! 3. On `FlushNow`, do the same immediately
//! 4. On `Shutdown` or a closed channel, flush one last time and stop

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::error::EconomyError;
use crate::ledger::{LedgerStore, SnapshotError};

/// Messages that can be sent to the flusher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlusherMessage {
    /// Write a snapshot right away.
    FlushNow,
    /// Write a final snapshot and stop.
    Shutdown,
}

/// Errors from a single flush.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("Failed to capture ledger: {0}")]
    Capture(#[from] EconomyError),

    #[error(transparent)]
    Write(#[from] SnapshotError),
}

/// Shortest accepted interval between background flushes.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically writes the ledger to its snapshot file.
pub struct SnapshotFlusher {
    store: Arc<LedgerStore>,
    path: PathBuf,
    flush_interval: Duration,
}

impl SnapshotFlusher {
    #[must_use]
    pub fn new(store: Arc<LedgerStore>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
            flush_interval: Duration::from_secs(30),
        }
    }

    /// Sets the interval between background flushes, raised to at least
    /// [`MIN_FLUSH_INTERVAL`].
    #[must_use]
    pub fn with_interval(mut self, flush_interval: Duration) -> Self {
        if flush_interval < MIN_FLUSH_INTERVAL {
            warn!(
                "Flush interval {:?} is too short, using {:?}",
                flush_interval, MIN_FLUSH_INTERVAL
            );
        }
        self.flush_interval = flush_interval.max(MIN_FLUSH_INTERVAL);
        self
    }

    /// Runs the flusher loop until shutdown.
    pub async fn run(&self, mut rx: mpsc::Receiver<FlusherMessage>) {
        info!("Snapshot flusher started ({:?} interval)", self.flush_interval);

        let mut timer = interval(self.flush_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing has changed yet.
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.flush_logged().await;
                }
                msg = rx.recv() => {
                    match msg {
                        Some(FlusherMessage::FlushNow) => {
                            debug!("Received flush request");
                            self.flush_logged().await;
                        }
                        Some(FlusherMessage::Shutdown) | None => {
                            info!("Snapshot flusher shutting down");
                            self.flush_logged().await;
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Writes one snapshot and returns the number of accounts saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be captured in time or the file
    /// cannot be written. The previous snapshot stays intact in both cases.
    pub async fn flush(&self) -> Result<usize, FlushError> {
        let snapshot = self.store.snapshot().await?;
        let path = self.path.clone();
        let accounts = snapshot.accounts.len();
        let transactions = snapshot.transaction_count();

        tokio::task::spawn_blocking(move || snapshot.save(path))
            .await
            .map_err(|e| SnapshotError::Io(std::io::Error::other(e)))??;

        debug!(
            "Snapshot written to {} ({} accounts, {} transactions)",
            self.path.display(),
            accounts,
            transactions
        );
        Ok(accounts)
    }

    async fn flush_logged(&self) {
        if let Err(e) = self.flush().await {
            error!("Failed to write snapshot: {}", e);
        }
    }
}

impl std::fmt::Debug for SnapshotFlusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotFlusher")
            .field("path", &self.path)
            .field("flush_interval", &self.flush_interval)
            .finish_non_exhaustive()
    }
}
