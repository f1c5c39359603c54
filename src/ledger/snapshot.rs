//! Durable JSON snapshot of the ledger.

use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::models::{PromoCode, SupportTicket};
use super::store::AccountBook;

/// Errors reading or writing a snapshot file.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to access snapshot file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse snapshot file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Complete ledger state that survives restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub accounts: Vec<AccountBook>,
    pub promos: Vec<PromoCode>,
    pub tickets: Vec<SupportTicket>,
    #[serde(default)]
    pub next_transaction_id: u64,
    #[serde(default)]
    pub next_ticket_id: u64,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl LedgerSnapshot {
    /// Loads a snapshot, returning an empty one if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the snapshot next to `path` and renames it into place.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Total number of ledger entries across all accounts.
    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.accounts.iter().map(|b| b.transactions.len()).sum()
    }
}
