//! Error taxonomy shared by the ledger and every engine.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by ledger and engine operations.
///
/// Every rejection leaves the ledger unchanged. Only [`EconomyError::Storage`]
/// is worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EconomyError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: i64, available: i64 },

    #[error("Daily bonus already claimed, next one in {}", format_remaining(.remaining))]
    CooldownActive { remaining: Duration },

    #[error("Promo code has expired")]
    Expired,

    #[error("Promo code has reached its usage limit")]
    ExhaustedUses,

    #[error("Promo code already redeemed by this account")]
    AlreadyRedeemed,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage unavailable: {0}")]
    Storage(String),

    #[error("Access denied")]
    Forbidden,
}

impl EconomyError {
    /// Returns true if the caller may retry the operation.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        Self::InvalidInput(what.into())
    }
}

/// Remaining time split into whole hours, minutes and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl From<Duration> for Cooldown {
    fn from(remaining: Duration) -> Self {
        let total = remaining.as_secs();
        Self {
            hours: total / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
        }
    }
}

fn format_remaining(remaining: &Duration) -> String {
    let c = Cooldown::from(*remaining);
    format!("{}h {}m {}s", c.hours, c.minutes, c.seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_breakdown() {
        let c = Cooldown::from(Duration::from_secs(3 * 3600 + 25 * 60 + 7));
        assert_eq!(c, Cooldown { hours: 3, minutes: 25, seconds: 7 });
    }

    #[test]
    fn test_cooldown_message() {
        let err = EconomyError::CooldownActive {
            remaining: Duration::from_secs(3661),
        };
        assert_eq!(
            err.to_string(),
            "Daily bonus already claimed, next one in 1h 1m 1s"
        );
    }

    #[test]
    fn test_only_storage_is_transient() {
        assert!(EconomyError::Storage("down".to_owned()).is_transient());
        assert!(!EconomyError::Forbidden.is_transient());
        assert!(!EconomyError::Expired.is_transient());
    }
}
