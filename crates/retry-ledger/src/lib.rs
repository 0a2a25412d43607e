//! Durable record of failed outbound operations awaiting retry.
//!
//! The registration flow writes an entry when a best-effort integration
//! fails; the sync worker drains due entries. Entries move
//! `pending -> pending` (rescheduled) or `pending -> resolved` (replayed, or
//! abandoned with the last error kept) and are never deleted.

mod error;
mod ledger;

pub use error::{LedgerError, LedgerResult};
pub use ledger::RetryLedger;
