//! Sync processor error types.

use thiserror::Error;

/// Sync processor error type.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Ledger read or write failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] retry_ledger::LedgerError),

    /// `start` called while a processor task is running
    #[error("Sync processor is already running")]
    AlreadyRunning,

    /// Sweep interval must be non-zero
    #[error("Sync interval must be greater than zero")]
    ZeroInterval,
}

/// Result type alias using SyncError.
pub type SyncResult<T> = Result<T, SyncError>;
