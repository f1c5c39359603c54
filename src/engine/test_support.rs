//! Shared fixtures for engine tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use super::accounts::AccountService;
use super::random::{FixedSequence, SharedRandom};
use crate::clock::ManualClock;
use crate::config::EconomyConfig;
use crate::ledger::{Account, LedgerStore, Profile, UserId};

pub(crate) const ADMIN: UserId = UserId(999);

pub(crate) struct Fixture {
    pub clock: Arc<ManualClock>,
    pub store: Arc<LedgerStore>,
    pub config: Arc<EconomyConfig>,
    pub accounts: AccountService,
}

impl Fixture {
    /// Registers a referrer-less account with the configured starting balance.
    pub async fn register(&self, id: i64) -> Account {
        self.accounts
            .register_or_fetch(UserId(id), Profile::named(format!("user{id}")), None)
            .await
            .unwrap()
            .account
    }

    /// Registers an account and moves its balance to exactly `balance`.
    pub async fn register_with_balance(&self, id: i64, balance: i64) -> Account {
        let account = self.register(id).await;
        let delta = balance - account.balance;
        if delta == 0 {
            return account;
        }
        self.store
            .apply_balance_delta(UserId(id), delta, "test setup")
            .await
            .unwrap()
    }
}

pub(crate) fn fixture() -> Fixture {
    fixture_with(EconomyConfig::default())
}

pub(crate) fn fixture_with(config: EconomyConfig) -> Fixture {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    ));
    let store = Arc::new(LedgerStore::new(clock.clone(), Duration::from_secs(2)));
    let config = Arc::new(config.with_admins([ADMIN]));
    let accounts = AccountService::new(Arc::clone(&store), Arc::clone(&config));
    Fixture {
        clock,
        store,
        config,
        accounts,
    }
}

pub(crate) fn draws(values: impl IntoIterator<Item = i64>) -> SharedRandom {
    SharedRandom::new(FixedSequence::new(values))
}
