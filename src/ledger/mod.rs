//! Ledger store module.
//!
//! Owns persisted economy state: accounts with their ledger entries,
//! inventory and promo redemptions, plus promo codes and support tickets.

mod models;
mod snapshot;
mod store;

pub use models::{
    Account, AccountPatch, InventoryItem, LevelUp, Profile, PromoCode, PromoRedemption,
    StatusFlag, StatusKind, SupportTicket, TicketStatus, TopOrder, Transaction, UserId,
};
pub use snapshot::{LedgerSnapshot, SnapshotError};
pub use store::{AccountBook, AccountTx, LedgerStore};
