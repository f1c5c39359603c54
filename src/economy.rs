//! Front-end facing entry point.
//!
//! [`Economy`] wires every engine to one shared store and configuration and
//! exposes the operations a chat front-end calls.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::config::{EconomyConfig, ShopItem};
use crate::engine::{
    AccountService, BetOutcome, BonusEngine, BroadcastReport, Broadcaster, DailyReward, GameEngine,
    GameKind, Notifier, PromoEngine, PromoRedeemed, Purchase, Registration, SharedRandom, ShopEngine,
    SupportDesk,
};
use crate::error::EconomyError;
use crate::ledger::{
    Account, InventoryItem, LedgerStore, LevelUp, Profile, PromoCode, StatusKind, SupportTicket, TopOrder,
    Transaction, UserId,
};

/// Admin overview counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EconomyStats {
    pub accounts: usize,
    /// Codes that are active, unexpired and not exhausted.
    pub active_promos: usize,
    pub open_tickets: usize,
}

/// The economy service.
#[derive(Debug, Clone)]
pub struct Economy {
    store: Arc<LedgerStore>,
    accounts: AccountService,
    bonus: BonusEngine,
    promo: PromoEngine,
    games: GameEngine,
    shop: ShopEngine,
    support: SupportDesk,
    broadcaster: Broadcaster,
    config: Arc<EconomyConfig>,
}

impl Economy {
    /// Builds every engine on top of `store`.
    ///
    /// Deliveries in [`Economy::broadcast`] are spaced by `broadcast_interval`
    /// and each one is bounded by the store timeout.
    #[must_use]
    pub fn new(
        store: Arc<LedgerStore>,
        config: Arc<EconomyConfig>,
        random: SharedRandom,
        broadcast_interval: StdDuration,
    ) -> Self {
        Self {
            accounts: AccountService::new(Arc::clone(&store), Arc::clone(&config)),
            bonus: BonusEngine::new(Arc::clone(&store), Arc::clone(&config), random.clone()),
            promo: PromoEngine::new(Arc::clone(&store), Arc::clone(&config)),
            games: GameEngine::new(Arc::clone(&store), Arc::clone(&config), random.clone()),
            shop: ShopEngine::new(Arc::clone(&store), Arc::clone(&config), random),
            support: SupportDesk::new(Arc::clone(&store), Arc::clone(&config)),
            broadcaster: Broadcaster::new(
                Arc::clone(&store),
                Arc::clone(&config),
                broadcast_interval,
                store.timeout(),
            ),
            store,
            config,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    #[must_use]
    pub const fn config(&self) -> &Arc<EconomyConfig> {
        &self.config
    }

    #[must_use]
    pub const fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    // ==================== Accounts ====================

    /// See [`AccountService::register_or_fetch`].
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
        self.accounts.register_or_fetch(id, profile, referrer).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn get_account(&self, id: UserId) -> Result<Account, EconomyError> {
        self.accounts.get_account(id).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn grant_experience(&self, id: UserId, amount: u64) -> Result<LevelUp, EconomyError> {
        self.accounts.grant_experience(id, amount).await
    }

    /// # Errors
    ///
    /// See [`AccountService::set_status_flag`].
    pub async fn set_status_flag(
        &self,
        actor: UserId,
        target: UserId,
        kind: StatusKind,
        active: bool,
        duration: Option<Duration>,
    ) -> Result<Account, EconomyError> {
        self.accounts
            .set_status_flag(actor, target, kind, active, duration)
            .await
    }

    /// # Errors
    ///
    /// See [`AccountService::ban_toggle`].
    pub async fn ban_toggle(&self, actor: UserId, target: UserId) -> Result<bool, EconomyError> {
        self.accounts.ban_toggle(actor, target).await
    }

    /// # Errors
    ///
    /// Returns `Storage` if the ledger is unavailable.
    pub async fn top_accounts(&self, order: TopOrder, limit: usize) -> Result<Vec<Account>, EconomyError> {
        self.accounts.top_accounts(order, limit).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn list_transactions(&self, id: UserId, limit: usize) -> Result<Vec<Transaction>, EconomyError> {
        self.accounts.list_transactions(id, limit).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn list_inventory(&self, id: UserId) -> Result<Vec<InventoryItem>, EconomyError> {
        self.accounts.list_inventory(id).await
    }

    // ==================== Earning and spending ====================

    /// # Errors
    ///
    /// See [`BonusEngine::claim_daily`].
    pub async fn claim_daily(&self, id: UserId) -> Result<DailyReward, EconomyError> {
        self.bonus.claim_daily(id).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the account does not exist.
    pub async fn next_daily_in(&self, id: UserId) -> Result<Option<StdDuration>, EconomyError> {
        self.bonus.next_claim_in(id).await
    }

    /// # Errors
    ///
    /// See [`PromoEngine::redeem`].
    pub async fn redeem_promo(&self, id: UserId, code: &str) -> Result<PromoRedeemed, EconomyError> {
        self.promo.redeem(id, code).await
    }

    /// # Errors
    ///
    /// See [`PromoEngine::create`].
    pub async fn create_promo(
        &self,
        actor: UserId,
        code: &str,
        reward: i64,
        max_uses: u32,
        expires_in_hours: Option<u32>,
    ) -> Result<PromoCode, EconomyError> {
        self.promo
            .create(actor, code, reward, max_uses, expires_in_hours)
            .await
    }

    /// # Errors
    ///
    /// See [`PromoEngine::delete`].
    pub async fn delete_promo(&self, actor: UserId, code: &str) -> Result<bool, EconomyError> {
        self.promo.delete(actor, code).await
    }

    /// # Errors
    ///
    /// `Forbidden` for non-admins.
    pub async fn list_promos(&self, actor: UserId) -> Result<Vec<PromoCode>, EconomyError> {
        self.promo.list(actor).await
    }

    /// # Errors
    ///
    /// See [`GameEngine::place_bet`].
    pub async fn place_bet(&self, id: UserId, kind: GameKind, stake: i64) -> Result<BetOutcome, EconomyError> {
        self.games.place_bet(id, kind, stake).await
    }

    #[must_use]
    pub fn stake_tiers(&self) -> &[i64] {
        self.games.stake_tiers()
    }

    /// # Errors
    ///
    /// See [`ShopEngine::purchase`].
    pub async fn purchase(&self, id: UserId, item_id: &str) -> Result<Purchase, EconomyError> {
        self.shop.purchase(id, item_id).await
    }

    #[must_use]
    pub fn catalog(&self) -> &[ShopItem] {
        self.shop.catalog()
    }

    // ==================== Support and admin ====================

    /// # Errors
    ///
    /// See [`SupportDesk::create_ticket`].
    pub async fn create_ticket(&self, user: UserId, message: &str) -> Result<SupportTicket, EconomyError> {
        self.support.create_ticket(user, message).await
    }

    /// # Errors
    ///
    /// `Forbidden` for non-admins.
    pub async fn list_open_tickets(&self, actor: UserId) -> Result<Vec<SupportTicket>, EconomyError> {
        self.support.list_open_tickets(actor).await
    }

    /// # Errors
    ///
    /// See [`SupportDesk::reply_ticket`].
    pub async fn reply_ticket(&self, actor: UserId, ticket: u64, reply: &str) -> Result<SupportTicket, EconomyError> {
        self.support.reply_ticket(actor, ticket, reply).await
    }

    /// # Errors
    ///
    /// See [`Broadcaster::broadcast`].
    pub async fn broadcast<N: Notifier>(
        &self,
        actor: UserId,
        notifier: &N,
        text: &str,
    ) -> Result<BroadcastReport, EconomyError> {
        self.broadcaster.broadcast(actor, notifier, text).await
    }

    /// Admin overview.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admins and `Storage` if the ledger is unavailable.
    pub async fn stats(&self, actor: UserId) -> Result<EconomyStats, EconomyError> {
        self.config.authorize(actor)?;
        let now = self.store.now();
        let active_promos = self
            .store
            .list_promos()
            .await?
            .iter()
            .filter(|p| p.active && !p.is_expired_at(now) && !p.is_exhausted())
            .count();

        Ok(EconomyStats {
            accounts: self.store.account_count().await?,
            active_promos,
            open_tickets: self.store.list_open_tickets().await?.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::{CoinSide, FixedSequence};
    use chrono::{TimeZone, Utc};

    const ADMIN: UserId = UserId(1);

    fn economy(draws: Vec<i64>) -> (Arc<ManualClock>, Economy) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
        let store = Arc::new(LedgerStore::new(clock.clone(), StdDuration::from_secs(2)));
        let config = Arc::new(EconomyConfig::default().with_admins([ADMIN]));
        let random = SharedRandom::new(FixedSequence::new(draws));
        (clock, Economy::new(store, config, random, StdDuration::ZERO))
    }

    #[tokio::test]
    async fn test_referral_then_daily_then_bet() {
        let (clock, economy) = economy(vec![100, 0]);

        economy
            .register_or_fetch(UserId(10), Profile::named("Ann"), None)
            .await
            .unwrap();
        let bob = economy
            .register_or_fetch(UserId(11), Profile::named("Bob"), Some(UserId(10)))
            .await
            .unwrap();
        assert!(bob.created);
        assert_eq!(bob.account.balance, 200);
        assert_eq!(bob.account.referrer, Some(UserId(10)));

        let ann = economy.get_account(UserId(10)).await.unwrap();
        assert_eq!((ann.balance, ann.referral_count), (250, 1));

        let reward = economy.claim_daily(UserId(11)).await.unwrap();
        assert_eq!(reward.balance, 300);

        let outcome = economy
            .place_bet(UserId(11), GameKind::Coin(CoinSide::Heads), 300)
            .await
            .unwrap();
        assert!(outcome.won);
        assert_eq!(outcome.balance, 600);

        clock.advance(Duration::hours(1));
        assert!(economy.next_daily_in(UserId(11)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let (clock, economy) = economy(vec![]);
        economy
            .register_or_fetch(UserId(2), Profile::named("Cy"), None)
            .await
            .unwrap();
        economy.create_promo(ADMIN, "LIVE", 10, 5, None).await.unwrap();
        economy.create_promo(ADMIN, "SHORT", 10, 5, Some(1)).await.unwrap();
        economy.create_ticket(UserId(2), "help").await.unwrap();

        clock.advance(Duration::hours(2));
        let stats = economy.stats(ADMIN).await.unwrap();
        assert_eq!(
            stats,
            EconomyStats {
                accounts: 1,
                active_promos: 1,
                open_tickets: 1
            }
        );
        assert_eq!(economy.stats(UserId(2)).await.unwrap_err(), EconomyError::Forbidden);
    }
}
