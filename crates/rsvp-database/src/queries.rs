//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` as its first parameter so it can run
//! inside `AsyncDatabase::call`.

use crate::{
    Attendee, AttendeeFlag, DatabaseError, DatabaseResult, Event, EventStatus,
    NewAttendee, NewEvent, NewRetryLedgerEntry, PersonalizedFields, RetryLedgerEntry,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

// ==========================================
// Events
// ==========================================

const EVENT_COLUMNS: &str = "id, slug, name, description, date, company_name, lifecycle_trigger, interest_options, status, created_at";

/// Insert a new event.
pub fn insert_event(conn: &Connection, event: &NewEvent) -> DatabaseResult<Event> {
    let now = format_datetime(Utc::now());
    let interest_options = serde_json::to_string(&event.interest_options)?;
    conn.execute(
        "INSERT INTO events (id, slug, name, description, date, company_name, lifecycle_trigger, interest_options, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            event.id,
            event.slug,
            event.name,
            event.description,
            format_datetime(event.date),
            event.company_name,
            event.lifecycle_trigger,
            interest_options,
            event.status.as_str(),
            now,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    get_event(conn, &event.id)?
        .ok_or_else(|| DatabaseError::NotFound("Event not found after insert".to_string()))
}

/// Get an event by ID.
pub fn get_event(conn: &Connection, id: &str) -> DatabaseResult<Option<Event>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"
    ))?;
    Ok(stmt.query_row(params![id], event_from_row).optional()?)
}

/// Get an event by its public slug.
pub fn get_event_by_slug(conn: &Connection, slug: &str) -> DatabaseResult<Option<Event>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE slug = ?1"
    ))?;
    Ok(stmt.query_row(params![slug], event_from_row).optional()?)
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        date: parse_datetime(row.get::<_, String>(4)?),
        company_name: row.get(5)?,
        lifecycle_trigger: row.get(6)?,
        interest_options: parse_string_list(row.get::<_, String>(7)?),
        status: EventStatus::parse(&row.get::<_, String>(8)?),
        created_at: parse_datetime(row.get::<_, String>(9)?),
    })
}

// ==========================================
// Attendees
// ==========================================

const ATTENDEE_COLUMNS: &str = "id, event_id, name, email, company, role, interests, segment, personalized_intro, personalized_cta, personalized_subject, contact_synced, lifecycle_event_fired, registered_at";

/// Insert a new attendee.
///
/// A second registration with the same email for the same event fails with
/// [`DatabaseError::UniqueViolation`].
pub fn insert_attendee(conn: &Connection, attendee: &NewAttendee) -> DatabaseResult<Attendee> {
    let now = format_datetime(Utc::now());
    let interests = serde_json::to_string(&attendee.interests)?;
    conn.execute(
        "INSERT INTO attendees (id, event_id, name, email, company, role, interests, segment, registered_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            attendee.id,
            attendee.event_id,
            attendee.name,
            attendee.email,
            attendee.company,
            attendee.role,
            interests,
            attendee.segment,
            now,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    debug!(attendee_id = %attendee.id, event_id = %attendee.event_id, "Attendee inserted");
    get_attendee(conn, &attendee.id)?
        .ok_or_else(|| DatabaseError::NotFound("Attendee not found after insert".to_string()))
}

/// Get an attendee by ID.
pub fn get_attendee(conn: &Connection, id: &str) -> DatabaseResult<Option<Attendee>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ATTENDEE_COLUMNS} FROM attendees WHERE id = ?1"
    ))?;
    Ok(stmt.query_row(params![id], attendee_from_row).optional()?)
}

/// List attendees of an event, oldest registration first.
pub fn list_attendees_for_event(conn: &Connection, event_id: &str) -> DatabaseResult<Vec<Attendee>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ATTENDEE_COLUMNS} FROM attendees WHERE event_id = ?1 ORDER BY registered_at ASC"
    ))?;
    let attendees = stmt
        .query_map(params![event_id], attendee_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(attendees)
}

/// Store personalization fields on an attendee.
pub fn update_attendee_personalization(
    conn: &Connection,
    id: &str,
    fields: &PersonalizedFields,
) -> DatabaseResult<bool> {
    let count = conn.execute(
        "UPDATE attendees SET personalized_intro = ?1, personalized_cta = ?2, personalized_subject = ?3
         WHERE id = ?4",
        params![fields.intro, fields.cta, fields.subject_line, id],
    )?;
    Ok(count > 0)
}

/// Set one of the attendee sync flags to true.
pub fn set_attendee_flag(conn: &Connection, id: &str, flag: AttendeeFlag) -> DatabaseResult<bool> {
    let sql = format!("UPDATE attendees SET {} = 1 WHERE id = ?1", flag.column());
    let count = conn.execute(&sql, params![id])?;
    debug!(attendee_id = %id, flag = flag.column(), "Attendee flag set");
    Ok(count > 0)
}

/// Most recent stored personalization for an email, across all events.
pub fn find_cached_personalization(
    conn: &Connection,
    email: &str,
) -> DatabaseResult<Option<PersonalizedFields>> {
    let mut stmt = conn.prepare_cached(
        "SELECT personalized_subject, personalized_intro, personalized_cta
         FROM attendees
         WHERE email = ?1
           AND personalized_intro IS NOT NULL
           AND personalized_cta IS NOT NULL
           AND personalized_subject IS NOT NULL
         ORDER BY registered_at DESC
         LIMIT 1",
    )?;
    let fields = stmt
        .query_row(params![email], |row| {
            Ok(PersonalizedFields {
                subject_line: row.get(0)?,
                intro: row.get(1)?,
                cta: row.get(2)?,
            })
        })
        .optional()?;
    Ok(fields)
}

fn attendee_from_row(row: &Row<'_>) -> rusqlite::Result<Attendee> {
    Ok(Attendee {
        id: row.get(0)?,
        event_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        company: row.get(4)?,
        role: row.get(5)?,
        interests: parse_string_list(row.get::<_, String>(6)?),
        segment: row.get(7)?,
        personalized_intro: row.get(8)?,
        personalized_cta: row.get(9)?,
        personalized_subject: row.get(10)?,
        contact_synced: row.get(11)?,
        lifecycle_event_fired: row.get(12)?,
        registered_at: parse_datetime(row.get::<_, String>(13)?),
    })
}

// ==========================================
// Retry Ledger
// ==========================================

const LEDGER_COLUMNS: &str = "id, attendee_id, operation, payload, last_error, retry_count, next_retry_at, resolved_at, created_at";

/// Record a failed operation.
pub fn insert_ledger_entry(
    conn: &Connection,
    entry: &NewRetryLedgerEntry,
    created_at: DateTime<Utc>,
) -> DatabaseResult<RetryLedgerEntry> {
    let payload = serde_json::to_string(&entry.payload)?;
    conn.execute(
        "INSERT INTO retry_ledger (id, attendee_id, operation, payload, last_error, retry_count, next_retry_at, resolved_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, NULL, ?7)",
        params![
            entry.id,
            entry.attendee_id,
            entry.payload.operation().as_str(),
            payload,
            entry.last_error,
            format_datetime(entry.next_retry_at),
            format_datetime(created_at),
        ],
    )?;
    get_ledger_entry(conn, &entry.id)?
        .ok_or_else(|| DatabaseError::NotFound("Ledger entry not found after insert".to_string()))
}

/// Get a ledger entry by ID.
pub fn get_ledger_entry(conn: &Connection, id: &str) -> DatabaseResult<Option<RetryLedgerEntry>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {LEDGER_COLUMNS} FROM retry_ledger WHERE id = ?1"
    ))?;
    Ok(stmt.query_row(params![id], ledger_entry_from_row).optional()?)
}

/// Unresolved entries whose retry time has elapsed, oldest-due first.
pub fn list_due_ledger_entries(
    conn: &Connection,
    now: DateTime<Utc>,
    limit: usize,
) -> DatabaseResult<Vec<RetryLedgerEntry>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {LEDGER_COLUMNS} FROM retry_ledger
         WHERE resolved_at IS NULL AND next_retry_at IS NOT NULL AND next_retry_at <= ?1
         ORDER BY next_retry_at ASC
         LIMIT ?2"
    ))?;
    let entries = stmt
        .query_map(
            params![format_datetime(now), limit as i64],
            ledger_entry_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// All entries for an attendee, oldest first. Includes resolved entries.
pub fn list_ledger_entries_for_attendee(
    conn: &Connection,
    attendee_id: &str,
) -> DatabaseResult<Vec<RetryLedgerEntry>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {LEDGER_COLUMNS} FROM retry_ledger WHERE attendee_id = ?1 ORDER BY created_at ASC"
    ))?;
    let entries = stmt
        .query_map(params![attendee_id], ledger_entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Count unresolved entries.
pub fn count_pending_ledger_entries(conn: &Connection) -> DatabaseResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM retry_ledger WHERE resolved_at IS NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Mark an entry resolved after a successful replay and set the matching
/// attendee flag, atomically.
///
/// Returns false if the entry was already resolved.
pub fn resolve_ledger_entry(
    conn: &Connection,
    id: &str,
    attendee_id: &str,
    flag: AttendeeFlag,
    now: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let tx = conn.unchecked_transaction()?;
    let count = tx.execute(
        "UPDATE retry_ledger SET resolved_at = ?1, next_retry_at = NULL
         WHERE id = ?2 AND resolved_at IS NULL",
        params![format_datetime(now), id],
    )?;
    if count > 0 {
        set_attendee_flag(&tx, attendee_id, flag)?;
    }
    tx.commit()?;
    Ok(count > 0)
}

/// Record a failed replay and push the next attempt out.
pub fn reschedule_ledger_entry(
    conn: &Connection,
    id: &str,
    retry_count: u32,
    last_error: &str,
    next_retry_at: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let count = conn.execute(
        "UPDATE retry_ledger SET retry_count = ?1, last_error = ?2, next_retry_at = ?3
         WHERE id = ?4 AND resolved_at IS NULL",
        params![retry_count, last_error, format_datetime(next_retry_at), id],
    )?;
    Ok(count > 0)
}

/// Give up on an entry: resolved, error retained.
pub fn abandon_ledger_entry(
    conn: &Connection,
    id: &str,
    retry_count: u32,
    last_error: &str,
    now: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let count = conn.execute(
        "UPDATE retry_ledger SET retry_count = ?1, last_error = ?2, resolved_at = ?3, next_retry_at = NULL
         WHERE id = ?4 AND resolved_at IS NULL",
        params![retry_count, last_error, format_datetime(now), id],
    )?;
    Ok(count > 0)
}

fn ledger_entry_from_row(row: &Row<'_>) -> rusqlite::Result<RetryLedgerEntry> {
    Ok(RetryLedgerEntry {
        id: row.get(0)?,
        attendee_id: row.get(1)?,
        operation: row.get(2)?,
        payload: row.get(3)?,
        last_error: row.get(4)?,
        retry_count: row.get(5)?,
        next_retry_at: row.get::<_, Option<String>>(6)?.map(parse_datetime),
        resolved_at: row.get::<_, Option<String>>(7)?.map(parse_datetime),
        created_at: parse_datetime(row.get::<_, String>(8)?),
    })
}

// ==========================================
// Helpers
// ==========================================

/// Format a timestamp for storage. Fixed width so stored values sort
/// lexicographically in time order.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC3339 datetime string, falling back to current time on error.
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a JSON string array column, treating malformed data as empty.
fn parse_string_list(s: String) -> Vec<String> {
    serde_json::from_str(&s).unwrap_or_default()
}
