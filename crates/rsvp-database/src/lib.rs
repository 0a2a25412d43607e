//! SQLite storage for events, attendees and the retry ledger.
//!
//! `AsyncDatabase` runs every statement on one dedicated thread. Queries are
//! plain functions in [`queries`] taking a `&Connection`:
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let event = db.call(move |conn| queries::get_event_by_slug(conn, &slug)).await?;
//! ```
//!
//! Only SQL belongs inside `db.call()`. Network calls happen outside.

mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;

pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::run_migrations;
pub use models::*;
