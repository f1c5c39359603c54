//! Account lifecycle: registration, referrals, experience and status flags.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};

use crate::config::EconomyConfig;
use crate::error::EconomyError;
use crate::ledger::{
    Account, AccountPatch, InventoryItem, LevelUp, LedgerStore, Profile, StatusFlag, StatusKind,
    TopOrder, Transaction, UserId,
};

pub(crate) const REASON_REFERRAL_INVITER: &str = "referral bonus (inviter)";
pub(crate) const REASON_REFERRAL_INVITED: &str = "referral bonus (invited)";
pub(crate) const REASON_ADMIN_ADJUSTMENT: &str = "admin adjustment";

/// Outcome of [`AccountService::register_or_fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub account: Account,
    /// True only for the call that created the account.
    pub created: bool,
    /// Referrer credited by this registration, if any.
    pub referrer: Option<UserId>,
}

/// Account lifecycle operations.
#[derive(Debug, Clone)]
pub struct AccountService {
    store: Arc<LedgerStore>,
    config: Arc<EconomyConfig>,
}

impl AccountService {
    #[must_use]
    pub const fn new(store: Arc<LedgerStore>, config: Arc<EconomyConfig>) -> Self {
        Self { store, config }
    }

    /// Returns the existing account or creates it, crediting a valid referrer.
    ///
    /// Self-referrals and unknown referrers are dropped silently.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the ledger is unavailable.
    pub async fn register_or_fetch(
        &self,
        id: UserId,
        profile: Profile,
        referrer: Option<UserId>,
    ) -> Result<Registration, EconomyError> {
        if self.store.contains(id).await? {
            return Ok(Registration {
                account: self.store.get_account(id).await?,
                created: false,
                referrer: None,
            });
        }

        let referrer = match referrer {
            Some(r) if r != id && self.store.contains(r).await? => Some(r),
            Some(r) => {
                debug!("Dropping invalid referrer {} for {}", r, id);
                None
            }
            None => None,
        };

        let bonus = self.config.referral;
        let starting_balance = self.config.starting_balance;
        let created = match referrer {
            Some(referrer) => {
                self.store
                    .create_referred_account(id, profile, referrer, starting_balance, |invited, inviter| {
                        if bonus.invited > 0 {
                            invited.apply_delta(bonus.invited, REASON_REFERRAL_INVITED)?;
                        }
                        if bonus.inviter > 0 {
                            inviter.apply_delta(bonus.inviter, REASON_REFERRAL_INVITER)?;
                        }
                        inviter.increment_referrals();
                        Ok(())
                    })
                    .await
            }
            None => {
                self.store
                    .create_account_if_absent(id, profile, None, starting_balance)
                    .await
            }
        };
        let account = match created {
            Ok(account) => account,
            Err(EconomyError::AlreadyExists(_)) => {
                // lost a registration race; the winner handled referral credit
                return Ok(Registration {
                    account: self.store.get_account(id).await?,
                    created: false,
                    referrer: None,
                });
            }
            Err(e) => return Err(e),
        };

        match referrer {
            Some(referrer) => info!("Registered account {} (referred by {})", id, referrer),
            None => info!("Registered account {}", id),
        }
        Ok(Registration {
            account,
            created: true,
            referrer,
        })
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn get_account(&self, id: UserId) -> Result<Account, EconomyError> {
        self.store.get_account(id).await
    }

    /// Adds experience and reports promotions.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn grant_experience(&self, id: UserId, amount: u64) -> Result<LevelUp, EconomyError> {
        self.store.transact(id, |tx| Ok(tx.grant_experience(amount))).await
    }

    /// Replaces the display profile.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn update_profile(&self, id: UserId, profile: Profile) -> Result<Account, EconomyError> {
        let patch = AccountPatch {
            profile: Some(profile),
            ..AccountPatch::default()
        };
        self.store.set_fields(id, patch).await
    }

    /// Flips the notification preference and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn toggle_notifications(&self, id: UserId) -> Result<bool, EconomyError> {
        self.store
            .transact(id, |tx| {
                let enabled = !tx.account().notifications;
                tx.apply(AccountPatch {
                    notifications: Some(enabled),
                    ..AccountPatch::default()
                });
                Ok(enabled)
            })
            .await
    }

    /// Zeroes games played and won. Balance and level are untouched.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn reset_game_stats(&self, id: UserId) -> Result<Account, EconomyError> {
        let patch = AccountPatch {
            games_played: Some(0),
            games_won: Some(0),
            ..AccountPatch::default()
        };
        self.store.set_fields(id, patch).await
    }

    /// Sets a status flag. `duration = None` makes an active flag permanent.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for non-admins and `NotFound` for unknown targets.
    pub async fn set_status_flag(
        &self,
        actor: UserId,
        target: UserId,
        kind: StatusKind,
        active: bool,
        duration: Option<Duration>,
    ) -> Result<Account, EconomyError> {
        self.config.authorize(actor)?;
        let account = self
            .store
            .transact(target, |tx| {
                let flag = match (active, duration) {
                    (false, _) => StatusFlag::default(),
                    (true, Some(d)) => StatusFlag::until(tx.now() + d),
                    (true, None) => StatusFlag::permanent(),
                };
                tx.apply(AccountPatch {
                    status: vec![(kind, flag)],
                    ..AccountPatch::default()
                });
                Ok(tx.account().clone())
            })
            .await?;
        info!("Admin {} set {} = {} for {}", actor, kind, active, target);
        Ok(account)
    }

    /// Bans or unbans `target`. Returns the new banned state.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for non-admins and `NotFound` for unknown targets.
    pub async fn ban_toggle(&self, actor: UserId, target: UserId) -> Result<bool, EconomyError> {
        self.config.authorize(actor)?;
        let banned = self
            .store
            .transact(target, |tx| {
                let banned = !tx.account().banned;
                tx.apply(AccountPatch {
                    banned: Some(banned),
                    ..AccountPatch::default()
                });
                Ok(banned)
            })
            .await?;
        info!("Admin {} {} account {}", actor, if banned { "banned" } else { "unbanned" }, target);
        Ok(banned)
    }

    /// Credits (positive) or debits (negative) an account on an admin's behalf.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for non-admins, `InvalidInput` for zero, and
    /// `InsufficientFunds` if a debit exceeds the balance.
    pub async fn adjust_balance(
        &self,
        actor: UserId,
        target: UserId,
        amount: i64,
    ) -> Result<Account, EconomyError> {
        self.config.authorize(actor)?;
        let account = self
            .store
            .apply_balance_delta(target, amount, REASON_ADMIN_ADJUSTMENT)
            .await?;
        info!("Admin {} adjusted balance of {} by {}", actor, target, amount);
        Ok(account)
    }

    /// Admin lookup of any account.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for non-admins and `NotFound` for unknown targets.
    pub async fn find_account(&self, actor: UserId, target: UserId) -> Result<Account, EconomyError> {
        self.config.authorize(actor)?;
        self.store.get_account(target).await
    }

    /// # Errors
    ///
    /// Returns `Storage` if the ledger is unavailable.
    pub async fn top_accounts(&self, order: TopOrder, limit: usize) -> Result<Vec<Account>, EconomyError> {
        self.store.top_accounts(order, limit).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn list_transactions(&self, id: UserId, limit: usize) -> Result<Vec<Transaction>, EconomyError> {
        self.store.list_transactions(id, limit).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn list_inventory(&self, id: UserId) -> Result<Vec<InventoryItem>, EconomyError> {
        self.store.list_inventory(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::engine::test_support::{ADMIN, fixture};

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let fx = fixture();
        let first = fx
            .accounts
            .register_or_fetch(UserId(1), Profile::named("Ann"), None)
            .await
            .unwrap();
        assert!(first.created);
        assert_eq!(first.account.balance, 100);

        let second = fx
            .accounts
            .register_or_fetch(UserId(1), Profile::named("Changed"), Some(UserId(2)))
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.account, first.account);
    }

    #[tokio::test]
    async fn test_referral_credits_both_sides() {
        let fx = fixture();
        fx.accounts
            .register_or_fetch(UserId(1), Profile::named("Inviter"), None)
            .await
            .unwrap();
        let reg = fx
            .accounts
            .register_or_fetch(UserId(2), Profile::named("Invited"), Some(UserId(1)))
            .await
            .unwrap();

        assert_eq!(reg.referrer, Some(UserId(1)));
        assert_eq!(reg.account.referrer, Some(UserId(1)));
        assert_eq!(reg.account.balance, 200);

        let inviter = fx.accounts.get_account(UserId(1)).await.unwrap();
        assert_eq!(inviter.balance, 250);
        assert_eq!(inviter.referral_count, 1);

        let entries = fx.accounts.list_transactions(UserId(1), 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, REASON_REFERRAL_INVITER);
    }

    #[tokio::test]
    async fn test_referral_retry_after_storage_timeout() {
        let fx = fixture();
        let store = Arc::new(LedgerStore::new(fx.clock.clone(), std::time::Duration::from_millis(50)));
        let accounts = AccountService::new(Arc::clone(&store), Arc::clone(&fx.config));
        accounts
            .register_or_fetch(UserId(1), Profile::named("Inviter"), None)
            .await
            .unwrap();

        let inviter_lock = store.hold_account(UserId(1)).await;
        let first = accounts
            .register_or_fetch(UserId(2), Profile::named("Invited"), Some(UserId(1)))
            .await
            .unwrap_err();
        assert!(first.is_transient());
        drop(inviter_lock);

        let retry = accounts
            .register_or_fetch(UserId(2), Profile::named("Invited"), Some(UserId(1)))
            .await
            .unwrap();
        assert!(retry.created);
        assert_eq!(retry.referrer, Some(UserId(1)));
        assert_eq!(retry.account.balance, 200);

        let inviter = accounts.get_account(UserId(1)).await.unwrap();
        assert_eq!((inviter.balance, inviter.referral_count), (250, 1));
    }

    #[tokio::test]
    async fn test_self_and_unknown_referrers_dropped() {
        let fx = fixture();
        let own = fx
            .accounts
            .register_or_fetch(UserId(5), Profile::named("Self"), Some(UserId(5)))
            .await
            .unwrap();
        assert_eq!(own.account.referrer, None);
        assert_eq!(own.account.balance, 100);

        let ghost = fx
            .accounts
            .register_or_fetch(UserId(6), Profile::named("Ghost"), Some(UserId(404)))
            .await
            .unwrap();
        assert_eq!(ghost.referrer, None);
        assert!(fx.accounts.list_transactions(UserId(6), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grant_experience_250_from_fresh_account() {
        let fx = fixture();
        fx.register(1).await;
        let result = fx.accounts.grant_experience(UserId(1), 250).await.unwrap();
        assert!(result.leveled_up);
        assert_eq!(result.level, 2);
        assert_eq!(fx.accounts.get_account(UserId(1)).await.unwrap().xp, 150);
    }

    #[tokio::test]
    async fn test_admin_operations_require_admin() {
        let fx = fixture();
        fx.register(1).await;
        assert_eq!(
            fx.accounts.ban_toggle(UserId(1), UserId(1)).await,
            Err(EconomyError::Forbidden)
        );
        assert_eq!(
            fx.accounts.adjust_balance(UserId(1), UserId(1), 1000).await.unwrap_err(),
            EconomyError::Forbidden
        );
        assert_eq!(fx.accounts.get_account(UserId(1)).await.unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_ban_toggle_flips() {
        let fx = fixture();
        fx.register(1).await;
        assert!(fx.accounts.ban_toggle(ADMIN, UserId(1)).await.unwrap());
        assert!(!fx.accounts.ban_toggle(ADMIN, UserId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_adjust_balance_cannot_go_negative() {
        let fx = fixture();
        fx.register(1).await;
        let err = fx.accounts.adjust_balance(ADMIN, UserId(1), -101).await.unwrap_err();
        assert!(matches!(err, EconomyError::InsufficientFunds { .. }));

        let account = fx.accounts.adjust_balance(ADMIN, UserId(1), -100).await.unwrap();
        assert_eq!(account.balance, 0);
        assert_eq!(account.total_spent, 100);
    }

    #[tokio::test]
    async fn test_set_status_flag_with_expiry() {
        let fx = fixture();
        fx.register(1).await;
        let account = fx
            .accounts
            .set_status_flag(ADMIN, UserId(1), StatusKind::Vip, true, Some(Duration::days(3)))
            .await
            .unwrap();
        assert!(account.vip.is_active_at(fx.clock.now()));
        fx.clock.advance(Duration::days(3));
        assert!(!fx.accounts.get_account(UserId(1)).await.unwrap().vip.is_active_at(fx.clock.now()));
    }

    #[tokio::test]
    async fn test_toggle_notifications_and_reset_stats() {
        let fx = fixture();
        fx.register(1).await;
        assert!(!fx.accounts.toggle_notifications(UserId(1)).await.unwrap());
        assert!(fx.accounts.toggle_notifications(UserId(1)).await.unwrap());

        fx.store
            .transact(UserId(1), |tx| {
                tx.record_game(true);
                Ok(())
            })
            .await
            .unwrap();
        let account = fx.accounts.reset_game_stats(UserId(1)).await.unwrap();
        assert_eq!((account.games_played, account.games_won), (0, 0));
        assert_eq!(account.balance, 100);
    }
}
