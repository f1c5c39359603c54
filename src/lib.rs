//! Bot Economy Library
//!
//! The virtual economy behind a chat bot: balances, experience, daily
//! bonuses, promo codes, mini-games, a shop and support tickets.
//!
//! This crate provides the core functionality for:
//! - Loading and validating the economy configuration
//! - Keeping a consistent per-account ledger with bounded lock waits
//! - Resolving games and bonuses through an injectable random source
//! - Persisting the ledger to a JSON snapshot in the background

pub mod clock;
pub mod config;
pub mod economy;
pub mod engine;
pub mod error;
pub mod health;
pub mod ledger;
pub mod persistence;

pub use economy::{Economy, EconomyStats};
pub use error::EconomyError;
