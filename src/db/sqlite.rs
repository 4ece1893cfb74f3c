use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use super::migrations::{run_migrations, MigrationContext};
use super::DatabaseError;

pub use super::migrations::count_tables;

/// How long a writer waits on a locked store before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Open the store at `path` and bring its schema up to date.
///
/// Called once at startup. Workers open their own connections with
/// [`open_connection`], which skips migration.
pub fn open_database(path: &Path, default_court: &str) -> Result<Connection, DatabaseError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = open_connection(path)?;
    let report = run_migrations(
        &conn,
        &MigrationContext {
            default_court,
            database_path: Some(path),
        },
    )?;
    if !report.is_noop() {
        tracing::info!(
            steps = ?report.applied,
            backup = ?report.backup,
            "Store migrated"
        );
    }
    Ok(conn)
}

/// Open a connection to an already-migrated store.
pub fn open_connection(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database(default_court: &str) -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(
        &conn,
        &MigrationContext {
            default_court,
            database_path: None,
        },
    )?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    // WAL lets the poller's workers read while one of them commits.
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}
