//! Shop catalog and purchases.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::ensure_active;
use super::random::SharedRandom;
use crate::config::{EconomyConfig, ItemEffect, ShopItem};
use crate::error::EconomyError;
use crate::ledger::{AccountPatch, LedgerStore, LevelUp, StatusFlag, StatusKind, UserId};

pub(crate) const REASON_LOOTBOX: &str = "lootbox";

/// What a purchase did to the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedEffect {
    /// A time-limited status, active until the given instant.
    Status { status: StatusKind, until: DateTime<Utc> },
    /// Lootbox prize credited on top of the purchase.
    Lootbox { prize: i64 },
    /// A permanent cosmetic flag.
    Cosmetic { status: StatusKind },
}

/// Result of a successful purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    pub item: ShopItem,
    pub effect: AppliedEffect,
    pub balance: i64,
    pub level_up: LevelUp,
}

/// Shop engine.
#[derive(Debug, Clone)]
pub struct ShopEngine {
    store: Arc<LedgerStore>,
    config: Arc<EconomyConfig>,
    random: SharedRandom,
}

impl ShopEngine {
    #[must_use]
    pub const fn new(store: Arc<LedgerStore>, config: Arc<EconomyConfig>, random: SharedRandom) -> Self {
        Self {
            store,
            config,
            random,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &[ShopItem] {
        &self.config.shop
    }

    /// Buys `item_id` for the account.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown items or accounts, `InsufficientFunds` when the
    /// price exceeds the balance and `Forbidden` for banned accounts. A
    /// rejected purchase neither debits nor adds an inventory row.
    pub async fn purchase(&self, id: UserId, item_id: &str) -> Result<Purchase, EconomyError> {
        let item = self
            .config
            .item(item_id)
            .cloned()
            .ok_or_else(|| EconomyError::not_found(format!("shop item {item_id}")))?;
        let xp = self.config.xp.purchase;

        let purchase = self
            .store
            .transact(id, |tx| {
                ensure_active(tx.account())?;
                tx.require_funds(item.price)?;
                let mut balance = tx.apply_delta(-item.price, format!("purchase: {}", item.name))?;

                let effect = match item.effect {
                    ItemEffect::Status { status, days } => {
                        let until = tx.now() + Duration::days(i64::from(days));
                        tx.apply(AccountPatch {
                            status: vec![(status, StatusFlag::until(until))],
                            ..AccountPatch::default()
                        });
                        AppliedEffect::Status { status, until }
                    }
                    ItemEffect::Lootbox { min, max } => {
                        let prize = self.random.draw(min, max);
                        if prize > 0 {
                            balance = tx.apply_delta(prize, REASON_LOOTBOX)?;
                        }
                        AppliedEffect::Lootbox { prize }
                    }
                    ItemEffect::Cosmetic { status } => {
                        tx.apply(AccountPatch {
                            status: vec![(status, StatusFlag::permanent())],
                            ..AccountPatch::default()
                        });
                        AppliedEffect::Cosmetic { status }
                    }
                };

                tx.append_inventory_item(&item.id, &item.name);
                let level_up = tx.grant_experience(xp);

                Ok(Purchase {
                    item: item.clone(),
                    effect,
                    balance,
                    level_up,
                })
            })
            .await?;

        info!("Shop: {} bought {} for {}", id, purchase.item.id, purchase.item.price);
        Ok(purchase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{Fixture, draws, fixture};

    fn engine(fx: &Fixture, values: Vec<i64>) -> ShopEngine {
        ShopEngine::new(Arc::clone(&fx.store), Arc::clone(&fx.config), draws(values))
    }

    #[tokio::test]
    async fn test_over_balance_purchase_rejected() {
        let fx = fixture();
        fx.register(1).await;
        let before = fx.accounts.get_account(UserId(1)).await.unwrap();

        let err = engine(&fx, vec![]).purchase(UserId(1), "vip").await.unwrap_err();
        assert!(matches!(err, EconomyError::InsufficientFunds { needed: 5000, .. }));
        assert_eq!(fx.accounts.get_account(UserId(1)).await.unwrap(), before);
        assert!(fx.accounts.list_inventory(UserId(1)).await.unwrap().is_empty());
        assert!(fx.accounts.list_transactions(UserId(1), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_item_sets_expiry() {
        let fx = fixture();
        fx.register_with_balance(1, 6000).await;
        let purchase = engine(&fx, vec![]).purchase(UserId(1), "vip").await.unwrap();

        let expected_until = fx.store.now() + Duration::days(30);
        assert_eq!(
            purchase.effect,
            AppliedEffect::Status {
                status: StatusKind::Vip,
                until: expected_until
            }
        );
        assert_eq!(purchase.balance, 1000);

        let account = fx.accounts.get_account(UserId(1)).await.unwrap();
        assert!(account.vip.is_active_at(fx.store.now()));
        assert_eq!(account.xp, 25);
        assert_eq!(account.total_spent, 5000);

        let inventory = fx.accounts.list_inventory(UserId(1)).await.unwrap();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].item_id, "vip");
        let entries = fx.accounts.list_transactions(UserId(1), 1).await.unwrap();
        assert_eq!(entries[0].reason, "purchase: VIP Status");
    }

    #[tokio::test]
    async fn test_lootbox_credits_prize() {
        let fx = fixture();
        fx.register_with_balance(1, 500).await;
        let purchase = engine(&fx, vec![750]).purchase(UserId(1), "lootbox").await.unwrap();

        assert_eq!(purchase.effect, AppliedEffect::Lootbox { prize: 750 });
        assert_eq!(purchase.balance, 750);
        let entries = fx.accounts.list_transactions(UserId(1), 2).await.unwrap();
        assert_eq!((entries[0].amount, entries[0].reason.as_str()), (750, REASON_LOOTBOX));
        assert_eq!(entries[1].amount, -500);
    }

    #[tokio::test]
    async fn test_cosmetic_is_permanent() {
        let fx = fixture();
        fx.register_with_balance(1, 2000).await;
        engine(&fx, vec![]).purchase(UserId(1), "nickname_color").await.unwrap();

        fx.clock.advance(Duration::days(3650));
        let account = fx.accounts.get_account(UserId(1)).await.unwrap();
        assert!(account.color_nick.is_active_at(fx.store.now()));
        assert_eq!(account.balance, 0);
    }

    #[tokio::test]
    async fn test_unknown_item() {
        let fx = fixture();
        fx.register(1).await;
        assert!(matches!(
            engine(&fx, vec![]).purchase(UserId(1), "rocket").await,
            Err(EconomyError::NotFound(_))
        ));
        assert_eq!(engine(&fx, vec![]).catalog().len(), 5);
    }
}
