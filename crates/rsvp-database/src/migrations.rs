//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_events_and_attendees(conn)?;
    }
    if current_version < 2 {
        migrate_v2_retry_ledger(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: events and attendees.
fn migrate_v1_events_and_attendees(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: events and attendees");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT,
            date TEXT NOT NULL,
            company_name TEXT NOT NULL,
            lifecycle_trigger TEXT NOT NULL,
            interest_options TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'draft',
            created_at TEXT NOT NULL
        );
        ",
    )?;

    // (event_id, email) uniqueness is the only cross-request invariant.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS attendees (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(id),
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            company TEXT,
            role TEXT,
            interests TEXT NOT NULL DEFAULT '[]',
            segment TEXT NOT NULL,
            personalized_intro TEXT,
            personalized_cta TEXT,
            personalized_subject TEXT,
            contact_synced INTEGER NOT NULL DEFAULT 0,
            lifecycle_event_fired INTEGER NOT NULL DEFAULT 0,
            registered_at TEXT NOT NULL,
            UNIQUE (event_id, email)
        );

        CREATE INDEX IF NOT EXISTS idx_attendees_email
            ON attendees(email);
        CREATE INDEX IF NOT EXISTS idx_attendees_event_id
            ON attendees(event_id, registered_at);
        ",
    )?;

    record_migration(conn, 1, "events_and_attendees")?;
    Ok(())
}

/// V2: retry ledger for failed best-effort integrations.
fn migrate_v2_retry_ledger(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: retry ledger");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS retry_ledger (
            id TEXT PRIMARY KEY,
            attendee_id TEXT NOT NULL REFERENCES attendees(id),
            operation TEXT NOT NULL,
            payload TEXT NOT NULL,
            last_error TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            next_retry_at TEXT,
            resolved_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_retry_ledger_due
            ON retry_ledger(next_retry_at) WHERE resolved_at IS NULL;
        CREATE INDEX IF NOT EXISTS idx_retry_ledger_attendee
            ON retry_ledger(attendee_id, created_at);
        ",
    )?;

    record_migration(conn, 2, "retry_ledger")?;
    Ok(())
}
