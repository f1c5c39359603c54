//! Economy engines.
//!
//! Each engine reads and mutates accounts only through the
//! [`LedgerStore`](crate::ledger::LedgerStore); engines never call each other.

mod accounts;
mod bonus;
mod broadcast;
mod games;
mod promo;
mod random;
mod shop;
mod support;

#[cfg(test)]
pub(crate) mod test_support;

pub use accounts::{AccountService, Registration};
pub use bonus::{BonusEngine, BonusModifier, DailyReward};
pub use broadcast::{BroadcastReport, Broadcaster, DeliveryError, Notifier, RateLimiter};
pub use games::{BetOutcome, CoinSide, GameEngine, GameKind, OutcomeTier, Resolution, payout, resolve};
pub use promo::{PromoEngine, PromoRedeemed};
pub use random::{FixedSequence, RandomSource, SeededRandom, SharedRandom};
pub use shop::{AppliedEffect, Purchase, ShopEngine};
pub use support::SupportDesk;

use crate::error::EconomyError;
use crate::ledger::Account;

/// Rejects banned accounts.
pub(crate) const fn ensure_active(account: &Account) -> Result<(), EconomyError> {
    if account.banned {
        return Err(EconomyError::Forbidden);
    }
    Ok(())
}
