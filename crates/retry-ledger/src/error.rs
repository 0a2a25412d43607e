//! Retry ledger error types.

use thiserror::Error;

/// Retry ledger error type.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rsvp_database::DatabaseError),

    /// Entry not found
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(String),

    /// Backoff delay does not fit a timestamp
    #[error("Delay out of range: {0:?}")]
    DelayOutOfRange(std::time::Duration),
}

/// Result type alias using LedgerError.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LedgerError::EntryNotFound("l-1".to_string());
        assert_eq!(err.to_string(), "Ledger entry not found: l-1");

        let err = LedgerError::Database(rsvp_database::DatabaseError::NotFound("x".into()));
        assert_eq!(err.to_string(), "Database error: Not found: x");
    }
}
