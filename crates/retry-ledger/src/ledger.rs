//! Retry ledger backed by the `retry_ledger` table.

use crate::{LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use rsvp_config_and_utils::SharedClock;
use rsvp_database::{
    queries, AsyncDatabase, LedgerOperation, LedgerPayload, NewRetryLedgerEntry, RetryLedgerEntry,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Facade over the ledger queries, timestamped by an injected clock.
#[derive(Clone)]
pub struct RetryLedger {
    db: AsyncDatabase,
    clock: SharedClock,
    initial_delay: Duration,
}

impl RetryLedger {
    /// Create a ledger. Fresh entries become due `initial_delay` after they
    /// are recorded.
    pub fn new(db: AsyncDatabase, clock: SharedClock, initial_delay: Duration) -> Self {
        Self {
            db,
            clock,
            initial_delay,
        }
    }

    /// Current time according to the ledger's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Record a failed operation for later replay.
    pub async fn record_failure(
        &self,
        attendee_id: &str,
        payload: LedgerPayload,
        error: &str,
    ) -> LedgerResult<RetryLedgerEntry> {
        let now = self.clock.now();
        let operation = payload.operation();
        let entry = NewRetryLedgerEntry {
            id: uuid::Uuid::new_v4().to_string(),
            attendee_id: attendee_id.to_string(),
            payload,
            last_error: error.to_string(),
            next_retry_at: offset(now, self.initial_delay)?,
        };

        let stored = self
            .db
            .call(move |conn| queries::insert_ledger_entry(conn, &entry, now))
            .await?;

        info!(
            entry_id = %stored.id,
            attendee_id = %stored.attendee_id,
            operation = operation.as_str(),
            error = %error,
            "Recorded failed operation for retry"
        );
        Ok(stored)
    }

    /// Unresolved entries due now, oldest-due first, at most `limit`.
    pub async fn due_entries(&self, limit: usize) -> LedgerResult<Vec<RetryLedgerEntry>> {
        let now = self.clock.now();
        let entries = self
            .db
            .call(move |conn| queries::list_due_ledger_entries(conn, now, limit))
            .await?;
        debug!(count = entries.len(), "Loaded due ledger entries");
        Ok(entries)
    }

    /// Mark a replayed entry resolved and flip the attendee flag for its
    /// operation.
    pub async fn resolve(
        &self,
        entry: &RetryLedgerEntry,
        operation: LedgerOperation,
    ) -> LedgerResult<()> {
        let now = self.clock.now();
        let id = entry.id.clone();
        let attendee_id = entry.attendee_id.clone();
        let resolved = self
            .db
            .call(move |conn| {
                queries::resolve_ledger_entry(conn, &id, &attendee_id, operation.flag(), now)
            })
            .await?;

        if !resolved {
            warn!(entry_id = %entry.id, "Ledger entry was already resolved");
        }
        Ok(())
    }

    /// Store a failed replay and push the entry `delay` into the future.
    ///
    /// Returns the new `next_retry_at`.
    pub async fn reschedule(
        &self,
        entry_id: &str,
        retry_count: u32,
        error: &str,
        delay: Duration,
    ) -> LedgerResult<DateTime<Utc>> {
        let next_retry_at = offset(self.clock.now(), delay)?;
        let id = entry_id.to_string();
        let error = error.to_string();
        let updated = self
            .db
            .call(move |conn| {
                queries::reschedule_ledger_entry(conn, &id, retry_count, &error, next_retry_at)
            })
            .await?;

        if !updated {
            return Err(LedgerError::EntryNotFound(entry_id.to_string()));
        }
        Ok(next_retry_at)
    }

    /// Give up on an entry permanently, keeping the last error.
    pub async fn abandon(&self, entry_id: &str, retry_count: u32, error: &str) -> LedgerResult<()> {
        let now = self.clock.now();
        let id = entry_id.to_string();
        let error = error.to_string();
        let updated = self
            .db
            .call(move |conn| queries::abandon_ledger_entry(conn, &id, retry_count, &error, now))
            .await?;

        if !updated {
            return Err(LedgerError::EntryNotFound(entry_id.to_string()));
        }
        Ok(())
    }

    /// Full history for one attendee, resolved entries included.
    pub async fn entries_for_attendee(&self, attendee_id: &str) -> LedgerResult<Vec<RetryLedgerEntry>> {
        let attendee_id = attendee_id.to_string();
        Ok(self
            .db
            .call(move |conn| queries::list_ledger_entries_for_attendee(conn, &attendee_id))
            .await?)
    }

    /// Look up one entry.
    pub async fn get(&self, entry_id: &str) -> LedgerResult<Option<RetryLedgerEntry>> {
        let id = entry_id.to_string();
        Ok(self
            .db
            .call(move |conn| queries::get_ledger_entry(conn, &id))
            .await?)
    }

    /// Number of unresolved entries.
    pub async fn pending_count(&self) -> LedgerResult<i64> {
        Ok(self.db.call(queries::count_pending_ledger_entries).await?)
    }
}

fn offset(now: DateTime<Utc>, delay: Duration) -> LedgerResult<DateTime<Utc>> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or(LedgerError::DelayOutOfRange(delay))
}
