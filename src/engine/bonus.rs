//! Time-gated daily bonus.
//!
//! An account is either Available or Cooling-down. Nothing but the stored
//! last-claim timestamp is persisted; the state is computed at query time.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::ensure_active;
use super::random::SharedRandom;
use crate::config::{DAILY_COOLDOWN_SECS, EconomyConfig};
use crate::error::EconomyError;
use crate::ledger::{Account, AccountPatch, LedgerStore, LevelUp, UserId};

pub(crate) const REASON_DAILY: &str = "daily bonus";

/// Multiplier applied on top of the base daily amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusModifier {
    /// x2 from the double-bonus item.
    DoubleBonus,
    /// x1.5 from VIP status.
    Vip,
    /// x2 from Premium status.
    Premium,
}

/// Result of a successful daily claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyReward {
    /// Amount drawn before multipliers.
    pub base: i64,
    /// Amount credited.
    pub amount: i64,
    /// Multipliers applied, in application order.
    pub modifiers: Vec<BonusModifier>,
    pub balance: i64,
    pub level_up: LevelUp,
}

/// Applies active multipliers to `base` in the fixed order double, VIP, Premium.
///
/// # Errors
///
/// Returns `InvalidInput` if the stacked amount overflows.
pub fn stack_multipliers(
    base: i64,
    account: &Account,
    now: DateTime<Utc>,
) -> Result<(i64, Vec<BonusModifier>), EconomyError> {
    let overflow = || EconomyError::invalid("daily bonus overflow");
    let mut amount = base;
    let mut modifiers = Vec::new();

    if account.double_bonus.is_active_at(now) {
        amount = amount.checked_mul(2).ok_or_else(overflow)?;
        modifiers.push(BonusModifier::DoubleBonus);
    }
    if account.vip.is_active_at(now) {
        amount = amount.checked_mul(3).ok_or_else(overflow)? / 2;
        modifiers.push(BonusModifier::Vip);
    }
    if account.premium.is_active_at(now) {
        amount = amount.checked_mul(2).ok_or_else(overflow)?;
        modifiers.push(BonusModifier::Premium);
    }

    Ok((amount, modifiers))
}

/// Remaining cooldown at `now`, or `None` if the bonus is available.
#[must_use]
pub fn remaining_cooldown(last_daily: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<StdDuration> {
    let elapsed = now - last_daily?;
    let cooldown = Duration::seconds(DAILY_COOLDOWN_SECS);
    if elapsed >= cooldown {
        return None;
    }
    Some((cooldown - elapsed).to_std().unwrap_or(StdDuration::from_secs(
        DAILY_COOLDOWN_SECS.unsigned_abs(),
    )))
}

/// Daily bonus engine.
#[derive(Debug, Clone)]
pub struct BonusEngine {
    store: Arc<LedgerStore>,
    config: Arc<EconomyConfig>,
    random: SharedRandom,
}

impl BonusEngine {
    #[must_use]
    pub const fn new(store: Arc<LedgerStore>, config: Arc<EconomyConfig>, random: SharedRandom) -> Self {
        Self {
            store,
            config,
            random,
        }
    }

    /// Claims the daily bonus.
    ///
    /// # Errors
    ///
    /// Returns `CooldownActive` with the remaining time if the last claim
    /// was less than 24 hours ago, `Forbidden` for banned accounts and
    /// `NotFound` for unknown ones. Rejections change nothing.
    pub async fn claim_daily(&self, id: UserId) -> Result<DailyReward, EconomyError> {
        let range = self.config.daily_bonus;
        let xp = self.config.xp.daily;

        let reward = self
            .store
            .transact(id, |tx| {
                ensure_active(tx.account())?;
                let now = tx.now();
                if let Some(remaining) = remaining_cooldown(tx.account().last_daily, now) {
                    return Err(EconomyError::CooldownActive { remaining });
                }

                let base = self.random.draw(range.min, range.max);
                let (amount, modifiers) = stack_multipliers(base, tx.account(), now)?;
                if amount > 0 {
                    tx.apply_delta(amount, REASON_DAILY)?;
                }
                tx.apply(AccountPatch {
                    last_daily: Some(Some(now)),
                    ..AccountPatch::default()
                });
                let level_up = tx.grant_experience(xp);

                Ok(DailyReward {
                    base,
                    amount,
                    modifiers,
                    balance: tx.account().balance,
                    level_up,
                })
            })
            .await?;

        info!("Daily bonus: {} claimed {} (base {})", id, reward.amount, reward.base);
        Ok(reward)
    }

    /// Time until the next claim, or `None` if available now.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown accounts.
    pub async fn next_claim_in(&self, id: UserId) -> Result<Option<StdDuration>, EconomyError> {
        let account = self.store.get_account(id).await?;
        Ok(remaining_cooldown(account.last_daily, self.store.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BonusRange, EconomyConfig};
    use crate::engine::test_support::{ADMIN, draws, fixture, fixture_with};
    use crate::error::Cooldown;
    use crate::ledger::StatusKind;

    fn engine(fx: &crate::engine::test_support::Fixture, values: Vec<i64>) -> BonusEngine {
        BonusEngine::new(Arc::clone(&fx.store), Arc::clone(&fx.config), draws(values))
    }

    #[tokio::test]
    async fn test_first_claim_credits_and_starts_cooldown() {
        let fx = fixture();
        fx.register(1).await;
        let bonus = engine(&fx, vec![120]);

        let reward = bonus.claim_daily(UserId(1)).await.unwrap();
        assert_eq!(reward.amount, 120);
        assert!(reward.modifiers.is_empty());
        assert_eq!(reward.balance, 220);

        let account = fx.accounts.get_account(UserId(1)).await.unwrap();
        assert_eq!(account.xp, 20);
        let entries = fx.accounts.list_transactions(UserId(1), 10).await.unwrap();
        assert_eq!(entries[0].reason, REASON_DAILY);
        assert!(bonus.next_claim_in(UserId(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_claim_before_24h_rejected_without_mutation() {
        let fx = fixture();
        fx.register(1).await;
        let bonus = engine(&fx, vec![100, 100]);
        bonus.claim_daily(UserId(1)).await.unwrap();
        let before = fx.accounts.get_account(UserId(1)).await.unwrap();

        fx.clock.advance(Duration::seconds(DAILY_COOLDOWN_SECS - 3661));
        let err = bonus.claim_daily(UserId(1)).await.unwrap_err();
        let EconomyError::CooldownActive { remaining } = &err else {
            panic!("expected cooldown, got {err:?}");
        };
        assert_eq!(Cooldown::from(*remaining), Cooldown { hours: 1, minutes: 1, seconds: 1 });

        assert_eq!(fx.accounts.get_account(UserId(1)).await.unwrap(), before);
        assert_eq!(fx.accounts.list_transactions(UserId(1), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_at_exactly_24h_succeeds() {
        let fx = fixture();
        fx.register(1).await;
        let bonus = engine(&fx, vec![100, 60]);
        bonus.claim_daily(UserId(1)).await.unwrap();

        fx.clock.advance(Duration::seconds(DAILY_COOLDOWN_SECS - 1));
        assert!(bonus.claim_daily(UserId(1)).await.is_err());
        fx.clock.advance(Duration::seconds(1));
        let reward = bonus.claim_daily(UserId(1)).await.unwrap();
        assert_eq!(reward.amount, 60);
        assert!(bonus.next_claim_in(UserId(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_double_and_vip_stack_multiplicatively() {
        let fx = fixture();
        fx.register(1).await;
        for kind in [StatusKind::DoubleBonus, StatusKind::Vip] {
            fx.accounts
                .set_status_flag(ADMIN, UserId(1), kind, true, Some(Duration::days(7)))
                .await
                .unwrap();
        }
        let reward = engine(&fx, vec![100]).claim_daily(UserId(1)).await.unwrap();
        assert_eq!(reward.amount, 300);
        assert_eq!(reward.modifiers, vec![BonusModifier::DoubleBonus, BonusModifier::Vip]);
    }

    #[tokio::test]
    async fn test_vip_truncates_and_expired_flags_ignored() {
        let fx = fixture();
        fx.register(1).await;
        fx.accounts
            .set_status_flag(ADMIN, UserId(1), StatusKind::Vip, true, None)
            .await
            .unwrap();
        fx.accounts
            .set_status_flag(ADMIN, UserId(1), StatusKind::Premium, true, Some(Duration::hours(1)))
            .await
            .unwrap();
        fx.clock.advance(Duration::hours(2));

        let reward = engine(&fx, vec![51]).claim_daily(UserId(1)).await.unwrap();
        assert_eq!(reward.amount, 76);
        assert_eq!(reward.modifiers, vec![BonusModifier::Vip]);
    }

    #[tokio::test]
    async fn test_all_modifiers() {
        let fx = fixture();
        fx.register(1).await;
        for kind in [StatusKind::DoubleBonus, StatusKind::Vip, StatusKind::Premium] {
            fx.accounts
                .set_status_flag(ADMIN, UserId(1), kind, true, Some(Duration::days(1)))
                .await
                .unwrap();
        }
        let reward = engine(&fx, vec![50]).claim_daily(UserId(1)).await.unwrap();
        assert_eq!(reward.amount, 300);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_only_one_succeeds() {
        let fx = fixture();
        fx.register(1).await;
        let bonus = engine(&fx, vec![100; 8]);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let bonus = bonus.clone();
            handles.push(tokio::spawn(async move { bonus.claim_daily(UserId(1)).await }));
        }
        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(fx.accounts.get_account(UserId(1)).await.unwrap().balance, 200);
    }

    #[tokio::test]
    async fn test_overflowing_bonus_rejected_without_cooldown() {
        let huge = i64::MAX / 2 + 1;
        let fx = fixture_with(EconomyConfig {
            daily_bonus: BonusRange { min: huge, max: huge },
            ..EconomyConfig::default()
        });
        fx.register(1).await;
        fx.accounts
            .set_status_flag(ADMIN, UserId(1), StatusKind::Premium, true, None)
            .await
            .unwrap();
        let bonus = engine(&fx, vec![huge]);

        let err = bonus.claim_daily(UserId(1)).await.unwrap_err();
        assert!(matches!(err, EconomyError::InvalidInput(_)));
        assert_eq!(bonus.next_claim_in(UserId(1)).await.unwrap(), None);
        assert_eq!(fx.accounts.get_account(UserId(1)).await.unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_banned_account_cannot_claim() {
        let fx = fixture();
        fx.register(1).await;
        fx.accounts.ban_toggle(ADMIN, UserId(1)).await.unwrap();
        let err = engine(&fx, vec![100]).claim_daily(UserId(1)).await.unwrap_err();
        assert_eq!(err, EconomyError::Forbidden);
    }
}
