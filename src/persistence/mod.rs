//! Background snapshot persistence.
//!
//! Keeps the on-disk ledger snapshot fresh while the service runs and
//! writes a final snapshot on shutdown.

mod flusher;

pub use flusher::{FlushError, FlusherMessage, SnapshotFlusher};
