//! In-memory ledger store with per-account and per-code serialization.
//!
//! Every account lives behind its own async mutex. A unit of work runs a
//! synchronous closure against an [`AccountTx`] working copy while that lock
//! is held and commits only when the closure succeeds, so the check and the
//! mutation of a read-modify-write sequence can never interleave with another
//! call for the same account. Different accounts never contend.
//!
//! Every mutation also holds a store-wide write gate in shared mode, which
//! [`LedgerStore::snapshot`] takes exclusively so a snapshot never observes
//! half of a unit of work spanning a promo code and an account, or two
//! accounts.
//!
//! Lock acquisition is bounded by the configured storage timeout; a timeout
//! surfaces as [`EconomyError::Storage`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, RwLockReadGuard};
use tracing::debug;

use super::models::{
    Account, AccountPatch, InventoryItem, LevelUp, Profile, PromoCode, PromoRedemption,
    SupportTicket, TicketStatus, TopOrder, Transaction, UserId,
};
use super::snapshot::LedgerSnapshot;
use crate::clock::Clock;
use crate::error::EconomyError;

/// Everything stored for a single account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBook {
    pub account: Account,
    pub transactions: Vec<Transaction>,
    pub inventory: Vec<InventoryItem>,
    pub redemptions: Vec<PromoRedemption>,
}

impl AccountBook {
    fn new(account: Account) -> Self {
        Self {
            account,
            transactions: Vec::new(),
            inventory: Vec::new(),
            redemptions: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct TicketBook {
    tickets: Vec<SupportTicket>,
    next_id: u64,
}

/// Working copy of one account inside a unit of work.
///
/// Balance can only move through [`AccountTx::apply_delta`], which also
/// updates the lifetime totals and stages a ledger entry.
#[derive(Debug)]
pub struct AccountTx<'a> {
    account: Account,
    committed: &'a AccountBook,
    entries: Vec<(i64, String)>,
    inventory: Vec<InventoryItem>,
    redemptions: Vec<PromoRedemption>,
    now: DateTime<Utc>,
}

struct TxChanges {
    now: DateTime<Utc>,
    account: Account,
    entries: Vec<(i64, String)>,
    inventory: Vec<InventoryItem>,
    redemptions: Vec<PromoRedemption>,
}

impl<'a> AccountTx<'a> {
    fn new(committed: &'a AccountBook, now: DateTime<Utc>) -> Self {
        Self {
            account: committed.account.clone(),
            committed,
            entries: Vec::new(),
            inventory: Vec::new(),
            redemptions: Vec::new(),
            now,
        }
    }

    /// The account as modified so far in this unit of work.
    #[must_use]
    pub const fn account(&self) -> &Account {
        &self.account
    }

    /// Timestamp shared by every change in this unit of work.
    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Fails with `InsufficientFunds` unless the balance covers `amount`.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` when `amount` exceeds the balance.
    pub const fn require_funds(&self, amount: i64) -> Result<(), EconomyError> {
        if amount > self.account.balance {
            return Err(EconomyError::InsufficientFunds {
                needed: amount,
                available: self.account.balance,
            });
        }
        Ok(())
    }

    /// Moves the balance by `amount` and stages the matching ledger entry.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` if the balance would go negative and
    /// `InvalidInput` for a zero or overflowing amount.
    pub fn apply_delta(&mut self, amount: i64, reason: impl Into<String>) -> Result<i64, EconomyError> {
        if amount == 0 {
            return Err(EconomyError::invalid("amount must not be zero"));
        }
        let balance = self
            .account
            .balance
            .checked_add(amount)
            .ok_or_else(|| EconomyError::invalid("balance overflow"))?;
        if balance < 0 {
            return Err(EconomyError::InsufficientFunds {
                needed: amount.saturating_neg(),
                available: self.account.balance,
            });
        }

        self.account.balance = balance;
        if amount > 0 {
            self.account.total_earned = self.account.total_earned.saturating_add(amount);
        } else {
            self.account.total_spent = self.account.total_spent.saturating_add(amount.saturating_neg());
        }
        self.entries.push((amount, reason.into()));
        Ok(balance)
    }

    /// Grants experience, see [`Account::grant_experience`].
    pub fn grant_experience(&mut self, amount: u64) -> LevelUp {
        self.account.grant_experience(amount)
    }

    /// Applies a typed partial update.
    pub fn apply(&mut self, patch: AccountPatch) {
        patch.apply(&mut self.account);
    }

    /// Bumps the game counters.
    pub fn record_game(&mut self, won: bool) {
        self.account.games_played += 1;
        if won {
            self.account.games_won += 1;
        }
    }

    pub fn increment_referrals(&mut self) {
        self.account.referral_count += 1;
    }

    /// Whether this account has already redeemed `code`.
    #[must_use]
    pub fn has_redeemed(&self, code: &str) -> bool {
        self.committed
            .redemptions
            .iter()
            .chain(&self.redemptions)
            .any(|r| r.code == code)
    }

    pub fn record_promo_redemption(&mut self, code: &str) {
        self.redemptions.push(PromoRedemption {
            account: self.account.id,
            code: code.to_owned(),
            used_at: self.now,
        });
    }

    pub fn append_inventory_item(&mut self, item_id: &str, item_name: &str) {
        self.inventory.push(InventoryItem {
            account: self.account.id,
            item_id: item_id.to_owned(),
            item_name: item_name.to_owned(),
            purchased_at: self.now,
        });
    }

    fn into_changes(self) -> TxChanges {
        TxChanges {
            now: self.now,
            account: self.account,
            entries: self.entries,
            inventory: self.inventory,
            redemptions: self.redemptions,
        }
    }
}

/// Durable-state owner for accounts, ledger entries, promo codes and tickets.
pub struct LedgerStore {
    accounts: RwLock<BTreeMap<UserId, Arc<Mutex<AccountBook>>>>,
    promos: RwLock<BTreeMap<String, Arc<Mutex<PromoCode>>>>,
    tickets: Mutex<TicketBook>,
    next_transaction_id: AtomicU64,
    write_gate: RwLock<()>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl LedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            accounts: RwLock::new(BTreeMap::new()),
            promos: RwLock::new(BTreeMap::new()),
            tickets: Mutex::new(TicketBook {
                tickets: Vec::new(),
                next_id: 1,
            }),
            next_transaction_id: AtomicU64::new(1),
            write_gate: RwLock::new(()),
            clock,
            timeout,
        }
    }

    /// Restores a store from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: LedgerSnapshot, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        let accounts = snapshot
            .accounts
            .into_iter()
            .map(|book| (book.account.id, Arc::new(Mutex::new(book))))
            .collect();
        let promos = snapshot
            .promos
            .into_iter()
            .map(|promo| (promo.code.clone(), Arc::new(Mutex::new(promo))))
            .collect();

        Self {
            accounts: RwLock::new(accounts),
            promos: RwLock::new(promos),
            tickets: Mutex::new(TicketBook {
                tickets: snapshot.tickets,
                next_id: snapshot.next_ticket_id.max(1),
            }),
            next_transaction_id: AtomicU64::new(snapshot.next_transaction_id.max(1)),
            write_gate: RwLock::new(()),
            clock,
            timeout,
        }
    }

    /// Captures a consistent copy of every account, code and ticket.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if a lock cannot be acquired in time.
    pub async fn snapshot(&self) -> Result<LedgerSnapshot, EconomyError> {
        let _quiesced = self.bounded("write gate", self.write_gate.write()).await?;

        let mut accounts = Vec::new();
        for book in self.account_handles().await? {
            let book = self.bounded("account", book.lock_owned()).await?;
            accounts.push(book.clone());
        }

        let mut promos = Vec::new();
        for promo in self.promo_handles().await? {
            promos.push(self.bounded("promo code", promo.lock_owned()).await?.clone());
        }

        let tickets = self.bounded("tickets", self.tickets.lock()).await?;

        Ok(LedgerSnapshot {
            accounts,
            promos,
            tickets: tickets.tickets.clone(),
            next_transaction_id: self.next_transaction_id.load(Ordering::SeqCst),
            next_ticket_id: tickets.next_id,
            saved_at: Some(self.now()),
        })
    }

    /// Upper bound on any single lock wait.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current time according to the store's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ==================== Accounts ====================

    /// Inserts a new account with `starting_balance`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the id is taken.
    pub async fn create_account_if_absent(
        &self,
        id: UserId,
        profile: Profile,
        referrer: Option<UserId>,
        starting_balance: i64,
    ) -> Result<Account, EconomyError> {
        let _gate = self.enter().await?;
        let mut accounts = self.bounded("account index", self.accounts.write()).await?;
        if accounts.contains_key(&id) {
            return Err(EconomyError::AlreadyExists(format!("account {id}")));
        }

        let account = Account::new(id, profile, referrer, starting_balance, self.now());
        accounts.insert(id, Arc::new(Mutex::new(AccountBook::new(account.clone()))));
        debug!("Inserted account {}", id);
        Ok(account)
    }

    /// Inserts a new account invited by `referrer` and runs `f` over the new
    /// account and the referrer as one unit of work.
    ///
    /// The referrer is locked before anything is inserted, so a failure
    /// leaves neither account changed.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the id is taken, `NotFound` for an unknown
    /// referrer, `Storage` on lock timeout, or whatever `f` returns.
    pub async fn create_referred_account<F>(
        &self,
        id: UserId,
        profile: Profile,
        referrer: UserId,
        starting_balance: i64,
        f: F,
    ) -> Result<Account, EconomyError>
    where
        F: FnOnce(&mut AccountTx<'_>, &mut AccountTx<'_>) -> Result<(), EconomyError>,
    {
        let _gate = self.enter().await?;
        let mut inviter = self.lock_account(referrer).await?;
        let mut accounts = self.bounded("account index", self.accounts.write()).await?;
        if accounts.contains_key(&id) {
            return Err(EconomyError::AlreadyExists(format!("account {id}")));
        }

        let now = self.now();
        let mut book = AccountBook::new(Account::new(id, profile, Some(referrer), starting_balance, now));
        let (invited_changes, inviter_changes) = {
            let mut invited_tx = AccountTx::new(&book, now);
            let mut inviter_tx = AccountTx::new(&inviter, now);
            f(&mut invited_tx, &mut inviter_tx)?;
            (invited_tx.into_changes(), inviter_tx.into_changes())
        };

        self.commit(&mut book, invited_changes);
        self.commit(&mut inviter, inviter_changes);
        let account = book.account.clone();
        accounts.insert(id, Arc::new(Mutex::new(book)));
        debug!("Inserted account {} referred by {}", id, referrer);
        Ok(account)
    }

    /// Returns a copy of the account.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such account exists.
    pub async fn get_account(&self, id: UserId) -> Result<Account, EconomyError> {
        let book = self.lock_account(id).await?;
        Ok(book.account.clone())
    }

    /// Whether the account exists.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the index lock times out.
    pub async fn contains(&self, id: UserId) -> Result<bool, EconomyError> {
        let accounts = self.bounded("account index", self.accounts.read()).await?;
        Ok(accounts.contains_key(&id))
    }

    /// Runs `f` as one atomic unit of work on the account.
    ///
    /// Changes made through the [`AccountTx`] are committed only if `f`
    /// returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`/`Storage` from the lookup, or whatever `f` returns.
    pub async fn transact<T, F>(&self, id: UserId, f: F) -> Result<T, EconomyError>
    where
        F: FnOnce(&mut AccountTx<'_>) -> Result<T, EconomyError>,
    {
        let _gate = self.enter().await?;
        let mut book = self.lock_account(id).await?;
        let (value, changes) = {
            let mut tx = AccountTx::new(&book, self.now());
            let value = f(&mut tx)?;
            (value, tx.into_changes())
        };
        self.commit(&mut book, changes);
        Ok(value)
    }

    /// Credits or debits the account and logs the entry.
    ///
    /// # Errors
    ///
    /// See [`AccountTx::apply_delta`].
    pub async fn apply_balance_delta(
        &self,
        id: UserId,
        amount: i64,
        reason: &str,
    ) -> Result<Account, EconomyError> {
        self.transact(id, |tx| {
            tx.apply_delta(amount, reason)?;
            Ok(tx.account().clone())
        })
        .await
    }

    /// Applies a typed partial update.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such account exists.
    pub async fn set_fields(&self, id: UserId, patch: AccountPatch) -> Result<Account, EconomyError> {
        self.transact(id, |tx| {
            tx.apply(patch);
            Ok(tx.account().clone())
        })
        .await
    }

    /// Non-banned accounts ordered by `order`, best first.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if a lock times out.
    pub async fn top_accounts(&self, order: TopOrder, limit: usize) -> Result<Vec<Account>, EconomyError> {
        let mut accounts = Vec::new();
        for book in self.account_handles().await? {
            let book = self.bounded("account", book.lock_owned()).await?;
            if !book.account.banned {
                accounts.push(book.account.clone());
            }
        }

        accounts.sort_by(|a, b| {
            let key = match order {
                TopOrder::Balance => b.balance.cmp(&a.balance),
                TopOrder::Level => b.level.cmp(&a.level).then(b.xp.cmp(&a.xp)),
                TopOrder::GamesWon => b.games_won.cmp(&a.games_won),
                TopOrder::Referrals => b.referral_count.cmp(&a.referral_count),
            };
            key.then(a.id.cmp(&b.id))
        });
        accounts.truncate(limit);
        Ok(accounts)
    }

    /// Every account in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if a lock times out.
    pub async fn all_accounts(&self) -> Result<Vec<Account>, EconomyError> {
        let mut accounts = Vec::new();
        for book in self.account_handles().await? {
            accounts.push(self.bounded("account", book.lock_owned()).await?.account.clone());
        }
        Ok(accounts)
    }

    /// Number of registered accounts.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the index lock times out.
    pub async fn account_count(&self) -> Result<usize, EconomyError> {
        Ok(self.bounded("account index", self.accounts.read()).await?.len())
    }

    /// Newest ledger entries first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such account exists.
    pub async fn list_transactions(&self, id: UserId, limit: usize) -> Result<Vec<Transaction>, EconomyError> {
        let book = self.lock_account(id).await?;
        Ok(book.transactions.iter().rev().take(limit).cloned().collect())
    }

    /// Newest purchases first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such account exists.
    pub async fn list_inventory(&self, id: UserId) -> Result<Vec<InventoryItem>, EconomyError> {
        let book = self.lock_account(id).await?;
        Ok(book.inventory.iter().rev().cloned().collect())
    }

    // ==================== Promo codes ====================

    /// Inserts a new promo code.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the code is taken.
    pub async fn create_promo(&self, promo: PromoCode) -> Result<(), EconomyError> {
        let _gate = self.enter().await?;
        let mut promos = self.bounded("promo index", self.promos.write()).await?;
        if promos.contains_key(&promo.code) {
            return Err(EconomyError::AlreadyExists(format!("promo code {}", promo.code)));
        }
        promos.insert(promo.code.clone(), Arc::new(Mutex::new(promo)));
        Ok(())
    }

    /// Removes a promo code. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the index lock times out.
    pub async fn delete_promo(&self, code: &str) -> Result<bool, EconomyError> {
        let _gate = self.enter().await?;
        let mut promos = self.bounded("promo index", self.promos.write()).await?;
        Ok(promos.remove(code).is_some())
    }

    /// Every promo code, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if a lock times out.
    pub async fn list_promos(&self) -> Result<Vec<PromoCode>, EconomyError> {
        let mut promos = Vec::new();
        for promo in self.promo_handles().await? {
            promos.push(self.bounded("promo code", promo.lock_owned()).await?.clone());
        }
        promos.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.code.cmp(&b.code)));
        Ok(promos)
    }

    /// Runs `f` atomically over a promo code and an account.
    ///
    /// The code is locked before the account, so concurrent redemptions of
    /// one code serialize even across different accounts.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the code or account is missing, `Storage` on
    /// lock timeout, or whatever `f` returns.
    pub async fn redeem_with<T, F>(&self, code: &str, id: UserId, f: F) -> Result<T, EconomyError>
    where
        F: FnOnce(&mut PromoCode, &mut AccountTx<'_>) -> Result<T, EconomyError>,
    {
        let _gate = self.enter().await?;
        let handle = {
            let promos = self.bounded("promo index", self.promos.read()).await?;
            promos
                .get(code)
                .cloned()
                .ok_or_else(|| EconomyError::not_found(format!("promo code {code}")))?
        };
        let mut promo = self.bounded("promo code", handle.lock_owned()).await?;
        let mut book = self.lock_account(id).await?;

        let mut working = promo.clone();
        let (value, changes) = {
            let mut tx = AccountTx::new(&book, self.now());
            let value = f(&mut working, &mut tx)?;
            (value, tx.into_changes())
        };

        *promo = working;
        self.commit(&mut book, changes);
        Ok(value)
    }

    // ==================== Support tickets ====================

    /// Opens a ticket and returns it.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the ticket lock times out.
    pub async fn create_ticket(&self, account: UserId, message: String) -> Result<SupportTicket, EconomyError> {
        let _gate = self.enter().await?;
        let mut book = self.bounded("tickets", self.tickets.lock()).await?;
        let ticket = SupportTicket {
            id: book.next_id,
            account,
            message,
            status: TicketStatus::Open,
            admin_reply: None,
            created_at: self.now(),
            replied_at: None,
        };
        book.next_id += 1;
        book.tickets.push(ticket.clone());
        Ok(ticket)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if no such ticket exists.
    pub async fn get_ticket(&self, id: u64) -> Result<SupportTicket, EconomyError> {
        let book = self.bounded("tickets", self.tickets.lock()).await?;
        book.tickets
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| EconomyError::not_found(format!("ticket #{id}")))
    }

    /// Open tickets, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the ticket lock times out.
    pub async fn list_open_tickets(&self) -> Result<Vec<SupportTicket>, EconomyError> {
        let book = self.bounded("tickets", self.tickets.lock()).await?;
        Ok(book
            .tickets
            .iter()
            .rev()
            .filter(|t| t.status == TicketStatus::Open)
            .cloned()
            .collect())
    }

    /// Closes an open ticket with an admin reply.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown tickets and `InvalidInput` if the
    /// ticket is already closed.
    pub async fn close_ticket(&self, id: u64, reply: String) -> Result<SupportTicket, EconomyError> {
        let now = self.now();
        let _gate = self.enter().await?;
        let mut book = self.bounded("tickets", self.tickets.lock()).await?;
        let ticket = book
            .tickets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| EconomyError::not_found(format!("ticket #{id}")))?;
        if ticket.status == TicketStatus::Closed {
            return Err(EconomyError::invalid(format!("ticket #{id} is already closed")));
        }
        ticket.status = TicketStatus::Closed;
        ticket.admin_reply = Some(reply);
        ticket.replied_at = Some(now);
        Ok(ticket.clone())
    }

    // ==================== Internals ====================

    fn commit(&self, book: &mut AccountBook, changes: TxChanges) {
        let now = changes.now;
        let id = changes.account.id;
        book.account = changes.account;
        for (amount, reason) in changes.entries {
            book.transactions.push(Transaction {
                id: self.next_transaction_id.fetch_add(1, Ordering::SeqCst),
                account: id,
                amount,
                reason,
                created_at: now,
            });
        }
        book.inventory.extend(changes.inventory);
        book.redemptions.extend(changes.redemptions);
    }

    /// Shared hold on the write gate for one mutation.
    async fn enter(&self) -> Result<RwLockReadGuard<'_, ()>, EconomyError> {
        self.bounded("write gate", self.write_gate.read()).await
    }

    /// Holds an account lock for as long as the guard lives.
    #[cfg(test)]
    pub(crate) async fn hold_account(&self, id: UserId) -> OwnedMutexGuard<AccountBook> {
        self.lock_account(id).await.unwrap()
    }

    async fn lock_account(&self, id: UserId) -> Result<OwnedMutexGuard<AccountBook>, EconomyError> {
        let handle = {
            let accounts = self.bounded("account index", self.accounts.read()).await?;
            accounts
                .get(&id)
                .cloned()
                .ok_or_else(|| EconomyError::not_found(format!("account {id}")))?
        };
        self.bounded("account", handle.lock_owned()).await
    }

    async fn account_handles(&self) -> Result<Vec<Arc<Mutex<AccountBook>>>, EconomyError> {
        let accounts = self.bounded("account index", self.accounts.read()).await?;
        Ok(accounts.values().cloned().collect())
    }

    async fn promo_handles(&self) -> Result<Vec<Arc<Mutex<PromoCode>>>, EconomyError> {
        let promos = self.bounded("promo index", self.promos.read()).await?;
        Ok(promos.values().cloned().collect())
    }

    async fn bounded<F: Future>(&self, what: &str, fut: F) -> Result<F::Output, EconomyError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| EconomyError::Storage(format!("timed out waiting for {what} lock")))
    }
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
