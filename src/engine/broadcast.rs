//! Admin broadcast fan-out.
//!
//! Delivery itself belongs to the front-end, which implements [`Notifier`].
//! Deliveries are paced by a [`RateLimiter`] and a failing recipient never
//! aborts the batch.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::EconomyConfig;
use crate::error::EconomyError;
use crate::ledger::{LedgerStore, UserId};

/// Failure reported by a [`Notifier`] for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Sends a message to a single user.
pub trait Notifier: Send + Sync {
    fn deliver(&self, user: UserId, text: &str) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Enforces a minimum interval between deliveries.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_operation: Mutex<Option<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_operation: Mutex::new(None),
        }
    }

    /// Waits until the next delivery is allowed and marks it as performed.
    ///
    /// Returns the duration waited.
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut last = self.last_operation.lock().await;
        let wait = (*last).map_or(Duration::ZERO, |at| self.min_interval.saturating_sub(at.elapsed()));

        if !wait.is_zero() {
            debug!("Rate limiter: waiting {:?} before next delivery", wait);
            tokio::time::sleep(wait).await;
        }

        *last = Some(Instant::now());
        wait
    }

    /// Time remaining until the next delivery is allowed.
    pub async fn time_until_allowed(&self) -> Duration {
        let last = self.last_operation.lock().await;
        (*last).map_or(Duration::ZERO, |at| self.min_interval.saturating_sub(at.elapsed()))
    }
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

/// Fans a message out to every reachable account.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    store: Arc<LedgerStore>,
    config: Arc<EconomyConfig>,
    limiter: Arc<RateLimiter>,
    delivery_timeout: Duration,
}

impl Broadcaster {
    #[must_use]
    pub fn new(
        store: Arc<LedgerStore>,
        config: Arc<EconomyConfig>,
        interval: Duration,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            config,
            limiter: Arc::new(RateLimiter::new(interval)),
            delivery_timeout,
        }
    }

    /// Delivers `text` to every non-banned account with notifications on.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admins, `InvalidInput` for a blank message and
    /// `Storage` if the account listing times out. Individual delivery
    /// failures and timeouts are only counted.
    pub async fn broadcast<N: Notifier>(
        &self,
        actor: UserId,
        notifier: &N,
        text: &str,
    ) -> Result<BroadcastReport, EconomyError> {
        self.config.authorize(actor)?;
        if text.trim().is_empty() {
            return Err(EconomyError::invalid("broadcast text must not be empty"));
        }

        let recipients: Vec<UserId> = self
            .store
            .all_accounts()
            .await?
            .into_iter()
            .filter(|a| !a.banned && a.notifications)
            .map(|a| a.id)
            .collect();
        info!("Broadcast by {} to {} recipients", actor, recipients.len());

        let mut report = BroadcastReport::default();
        for user in recipients {
            self.limiter.wait_and_acquire().await;
            match tokio::time::timeout(self.delivery_timeout, notifier.deliver(user, text)).await {
                Ok(Ok(())) => report.sent += 1,
                Ok(Err(e)) => {
                    warn!("Broadcast to {} failed: {}", user, e);
                    report.failed += 1;
                }
                Err(_) => {
                    warn!("Broadcast to {} timed out after {:?}", user, self.delivery_timeout);
                    report.failed += 1;
                }
            }
        }

        info!("Broadcast finished: {} sent, {} failed", report.sent, report.failed);
        Ok(report)
    }
}
