//! Async SQLite executor using a dedicated background thread.
//!
//! - One thread owns the connection; statements run in FIFO order
//! - Callers await results without blocking the Tokio runtime
//! - Only SQL runs inside `call()`; gateway calls stay outside

use crate::{migrations, DatabaseError, DatabaseResult};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// Convert a tokio_rusqlite::Error to DatabaseError.
fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> DatabaseError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => DatabaseError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => DatabaseError::Connection("Connection closed".to_string()),
        other => DatabaseError::Connection(other.to_string()),
    }
}

/// Async SQLite database with a dedicated executor thread.
#[derive(Clone)]
pub struct AsyncDatabase {
    conn: Connection,
    path: String,
}

impl AsyncDatabase {
    /// Open a database file, creating it and its parent directory if needed,
    /// then apply pragmas and pending migrations.
    pub async fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening async database");

        let conn = Connection::open(path_str.clone())
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA temp_store = MEMORY;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        let db = Self {
            conn,
            path: path_str,
        };
        db.migrate().await?;

        info!(path = %db.path, "Async database initialized with WAL mode");
        Ok(db)
    }

    /// Open a private in-memory database with the full schema.
    pub async fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        let db = Self {
            conn,
            path: ":memory:".to_string(),
        };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> DatabaseResult<()> {
        self.call(|conn| {
            migrations::run_migrations(conn)
                .map_err(|e| DatabaseError::Migration(e.to_string()))
        })
        .await
    }

    /// Execute a closure on the database connection.
    ///
    /// The closure runs on the dedicated SQLite thread. Keep it to SQL and
    /// light row mapping; anything slow inside starves every other query.
    pub async fn call<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // Our own result rides inside tokio_rusqlite's Ok; its Err is only
        // for executor failures.
        let outer_result = self
            .conn
            .call(move |conn| Ok(f(conn)))
            .await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Execute a closure that returns a rusqlite::Result.
    pub async fn call_sqlite<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| Ok(f(conn)?))
            .await
            .map_err(from_tokio_rusqlite)
    }

    /// Get the database file path (`:memory:` for in-memory databases).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check if the database is healthy by executing a simple query.
    pub async fn health_check(&self) -> DatabaseResult<()> {
        self.call_sqlite(|conn| conn.execute_batch("SELECT 1"))
            .await?;
        debug!("Database health check passed");
        Ok(())
    }

    /// Close the database connection after pending operations finish.
    pub async fn close(self) -> DatabaseResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to close database: {:?}", e)))?;
        info!(path = %self.path, "Database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{queries, EventStatus, NewEvent};
    use chrono::Utc;
    use tempfile::tempdir;

    fn event(id: &str, slug: &str) -> NewEvent {
        NewEvent {
            id: id.to_string(),
            slug: slug.to_string(),
            name: "Launch Night".to_string(),
            description: None,
            date: Utc::now(),
            company_name: "Colare".to_string(),
            lifecycle_trigger: "launch_registered".to_string(),
            interest_options: vec![],
            status: EventStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_async_database_open() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("rsvp.sqlite");

        let db = AsyncDatabase::open(&db_path).await.unwrap();
        assert!(db.health_check().await.is_ok());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("rsvp.sqlite");

        let db = AsyncDatabase::open(&db_path).await.unwrap();
        db.call(|conn| queries::insert_event(conn, &event("e1", "launch")))
            .await
            .unwrap();
        db.close().await.unwrap();

        let db = AsyncDatabase::open(&db_path).await.unwrap();
        let found = db
            .call(|conn| queries::get_event_by_slug(conn, "launch"))
            .await
            .unwrap();
        assert_eq!(found.map(|e| e.id), Some("e1".to_string()));
    }

    #[tokio::test]
    async fn test_in_memory_databases_are_isolated() {
        let a = AsyncDatabase::open_in_memory().await.unwrap();
        let b = AsyncDatabase::open_in_memory().await.unwrap();
        assert_eq!(a.path(), ":memory:");

        a.call(|conn| queries::insert_event(conn, &event("e1", "launch")))
            .await
            .unwrap();

        let in_b = b
            .call(|conn| queries::get_event(conn, "e1"))
            .await
            .unwrap();
        assert!(in_b.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_inserts() {
        let db = AsyncDatabase::open_in_memory().await.unwrap();

        let mut handles = vec![];
        for i in 0..10 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                db.call(move |conn| {
                    queries::insert_event(conn, &event(&format!("e{i}"), &format!("slug-{i}")))
                })
                .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let count: i64 = db
            .call_sqlite(|conn| conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(count, 10);
    }
}
