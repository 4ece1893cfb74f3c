//! Structural, additive schema evolution.
//!
//! There is no version counter: each step inspects `sqlite_master` and
//! `PRAGMA table_info` to decide whether it still has work to do. Steps only
//! ever create tables, add columns, add indexes, or fill newly added columns
//! from the legacy columns they replace, so running the chain against a
//! legacy store keeps every existing row intact, and running it against a
//! current store changes nothing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use super::DatabaseError;

/// Inputs a migration run needs besides the connection.
#[derive(Debug, Clone, Copy)]
pub struct MigrationContext<'a> {
    /// Court assigned to history rows written before courts existed.
    pub default_court: &'a str,
    /// File backing the store. `None` for in-memory stores (no backup taken).
    pub database_path: Option<&'a Path>,
}

/// What a migration run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<&'static str>,
    pub backup: Option<PathBuf>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

type CheckFn = fn(&Connection) -> rusqlite::Result<bool>;
type ApplyFn = fn(&Connection, &MigrationContext<'_>) -> rusqlite::Result<()>;

struct MigrationStep {
    name: &'static str,
    is_applied: CheckFn,
    apply: ApplyFn,
}

/// Every history column the repository writes besides the court and router ones.
/// `processed_at` gets no default when added: SQLite only accepts constants there.
const HISTORY_COLUMNS: &[(&str, &str)] = &[
    ("file_name", "TEXT NOT NULL DEFAULT ''"),
    ("processed_at", "TEXT"),
    ("validation_status", "TEXT"),
    ("total_lines", "INTEGER"),
    ("id_lines", "INTEGER"),
    ("valid_lines", "INTEGER"),
    ("failed_lines", "INTEGER"),
    ("success_rate", "REAL"),
    ("csv_path", "TEXT"),
    ("file_hash", "TEXT"),
];

const ROUTER_COLUMNS: &[(&str, &str)] = &[
    ("routed_court_code", "TEXT"),
    ("routing_confidence", "INTEGER"),
    ("routing_explanation", "TEXT"),
    ("router_scores", "TEXT"),
    ("idempotency_key", "TEXT"),
    ("router_mode", "TEXT"),
    ("quarantined", "INTEGER NOT NULL DEFAULT 0"),
];

/// Ledger columns the repository reads and writes. Legacy ledgers keyed rows by
/// `remote_path` and stamped them with `processed_at`.
const LEDGER_COLUMNS: &[(&str, &str)] = &[
    ("file_path", "TEXT"),
    ("file_size", "INTEGER"),
    ("file_mtime", "TEXT"),
    ("outcome", "TEXT"),
    ("court_code", "TEXT"),
    ("processing_id", "INTEGER REFERENCES processing_history(id)"),
    ("recorded_at", "TEXT"),
];

const INDEXES: &[(&str, &str, &str)] = &[
    ("idx_processing_history_court", "processing_history", "court_code"),
    ("idx_processing_history_routed", "processing_history", "routed_court_code"),
    ("idx_processing_history_key", "processing_history", "idempotency_key"),
    ("idx_processing_history_ts", "processing_history", "processed_at"),
    ("idx_processed_ledger_file_path", "processed_ledger", "file_path"),
    ("idx_processed_ledger_recorded_at", "processed_ledger", "recorded_at"),
    ("idx_equipment_records_court", "equipment_records", "court_code"),
    ("idx_equipment_records_processing", "equipment_records", "processing_id"),
    ("idx_routing_decisions_key", "routing_decisions", "idempotency_key"),
];

const STEPS: &[MigrationStep] = &[
    MigrationStep {
        name: "processing_history",
        is_applied: |conn| table_exists(conn, "processing_history"),
        apply: |conn, _| {
            conn.execute_batch(
                "CREATE TABLE processing_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    file_name TEXT NOT NULL,
                    processed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    validation_status TEXT,
                    total_lines INTEGER,
                    id_lines INTEGER,
                    valid_lines INTEGER,
                    failed_lines INTEGER,
                    success_rate REAL,
                    csv_path TEXT,
                    file_hash TEXT
                );",
            )
        },
    },
    MigrationStep {
        name: "history_columns",
        is_applied: |conn| {
            let existing = column_names(conn, "processing_history")?;
            if !HISTORY_COLUMNS.iter().all(|(c, _)| existing.contains(*c)) {
                return Ok(false);
            }
            if !existing.contains("kem_lines") {
                return Ok(true);
            }
            let unfilled: i64 = conn.query_row(
                "SELECT COUNT(*) FROM processing_history
                 WHERE id_lines IS NULL AND kem_lines IS NOT NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(unfilled == 0)
        },
        apply: |conn, _| {
            add_missing_columns(conn, "processing_history", HISTORY_COLUMNS)?;
            if column_names(conn, "processing_history")?.contains("kem_lines") {
                let filled = conn.execute(
                    "UPDATE processing_history SET id_lines = kem_lines
                     WHERE id_lines IS NULL AND kem_lines IS NOT NULL",
                    [],
                )?;
                tracing::info!(rows = filled, "Copied kem_lines into id_lines");
            }
            Ok(())
        },
    },
    MigrationStep {
        name: "court_designator",
        is_applied: |conn| Ok(column_names(conn, "processing_history")?.contains("court_code")),
        apply: |conn, ctx| {
            let literal = sql_literal(ctx.default_court);
            conn.execute_batch(&format!(
                "ALTER TABLE processing_history ADD COLUMN court_code TEXT DEFAULT {literal};"
            ))?;
            conn.execute(
                "UPDATE processing_history SET court_code = ?1 WHERE court_code IS NULL",
                params![ctx.default_court],
            )?;
            Ok(())
        },
    },
    MigrationStep {
        name: "router_columns",
        is_applied: |conn| {
            let existing = column_names(conn, "processing_history")?;
            Ok(ROUTER_COLUMNS.iter().all(|(c, _)| existing.contains(*c)))
        },
        apply: |conn, _| {
            add_missing_columns(conn, "processing_history", ROUTER_COLUMNS)?;
            if column_names(conn, "processing_history")?.contains("router_scores_json") {
                conn.execute(
                    "UPDATE processing_history SET router_scores = router_scores_json
                     WHERE router_scores IS NULL",
                    [],
                )?;
            }
            Ok(())
        },
    },
    MigrationStep {
        name: "processed_ledger",
        is_applied: |conn| table_exists(conn, "processed_ledger"),
        apply: |conn, _| {
            conn.execute_batch(
                "CREATE TABLE processed_ledger (
                    idempotency_key TEXT PRIMARY KEY,
                    file_path TEXT NOT NULL,
                    file_size INTEGER NOT NULL,
                    file_mtime TEXT NOT NULL,
                    outcome TEXT NOT NULL,
                    court_code TEXT,
                    processing_id INTEGER REFERENCES processing_history(id),
                    recorded_at TEXT NOT NULL
                );",
            )
        },
    },
    MigrationStep {
        name: "ledger_columns",
        is_applied: |conn| {
            let existing = column_names(conn, "processed_ledger")?;
            if !LEDGER_COLUMNS.iter().all(|(c, _)| existing.contains(*c)) {
                return Ok(false);
            }
            if !existing.contains("remote_path") {
                return Ok(true);
            }
            let unfilled: i64 = conn.query_row(
                "SELECT COUNT(*) FROM processed_ledger
                 WHERE file_path IS NULL OR outcome IS NULL OR recorded_at IS NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(unfilled == 0)
        },
        apply: |conn, _| {
            add_missing_columns(conn, "processed_ledger", LEDGER_COLUMNS)?;
            let existing = column_names(conn, "processed_ledger")?;
            if existing.contains("remote_path") {
                conn.execute(
                    "UPDATE processed_ledger SET file_path = remote_path WHERE file_path IS NULL",
                    [],
                )?;
            }
            if existing.contains("processing_status") {
                conn.execute(
                    "UPDATE processed_ledger
                     SET outcome = CASE WHEN lower(processing_status) LIKE 'quarantin%'
                                        THEN 'quarantined' ELSE 'validated' END
                     WHERE outcome IS NULL",
                    [],
                )?;
            }
            if existing.contains("processed_at") {
                conn.execute(
                    "UPDATE processed_ledger SET recorded_at = processed_at
                     WHERE recorded_at IS NULL AND processed_at IS NOT NULL",
                    [],
                )?;
            }
            // Rows without any legacy stamp are dated by the migration itself.
            conn.execute(
                "UPDATE processed_ledger SET recorded_at = CURRENT_TIMESTAMP
                 WHERE recorded_at IS NULL",
                [],
            )?;
            Ok(())
        },
    },
    MigrationStep {
        name: "equipment_records",
        is_applied: |conn| table_exists(conn, "equipment_records"),
        apply: |conn, _| {
            conn.execute_batch(
                "CREATE TABLE equipment_records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    processing_id INTEGER NOT NULL REFERENCES processing_history(id),
                    equipment_id TEXT NOT NULL,
                    digits TEXT NOT NULL,
                    digit_count INTEGER NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL,
                    error_reason TEXT,
                    source_file TEXT NOT NULL,
                    line_number INTEGER NOT NULL,
                    court_code TEXT NOT NULL,
                    processed_at TEXT NOT NULL
                );",
            )
        },
    },
    MigrationStep {
        name: "routing_decisions",
        is_applied: |conn| table_exists(conn, "routing_decisions"),
        apply: |conn, _| {
            conn.execute_batch(
                "CREATE TABLE routing_decisions (
                    id TEXT PRIMARY KEY,
                    idempotency_key TEXT NOT NULL,
                    file_path TEXT NOT NULL,
                    file_name TEXT NOT NULL,
                    outcome TEXT NOT NULL,
                    chosen_court TEXT,
                    confidence INTEGER NOT NULL,
                    margin INTEGER NOT NULL,
                    threshold INTEGER NOT NULL,
                    required_margin INTEGER NOT NULL,
                    mode TEXT NOT NULL,
                    action TEXT NOT NULL,
                    explanation TEXT NOT NULL,
                    scores_json TEXT NOT NULL,
                    decided_at TEXT NOT NULL
                );",
            )
        },
    },
    MigrationStep {
        name: "file_failures",
        is_applied: |conn| table_exists(conn, "file_failures"),
        apply: |conn, _| {
            conn.execute_batch(
                "CREATE TABLE file_failures (
                    idempotency_key TEXT PRIMARY KEY,
                    file_path TEXT NOT NULL,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    last_error TEXT NOT NULL DEFAULT '',
                    manual_intervention INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL
                );",
            )
        },
    },
    MigrationStep {
        name: "indexes",
        is_applied: |conn| {
            for (name, table, _) in INDEXES {
                if !index_exists(conn, name, table)? {
                    return Ok(false);
                }
            }
            Ok(true)
        },
        apply: |conn, _| {
            for (name, table, column) in INDEXES {
                conn.execute_batch(&format!(
                    "CREATE INDEX IF NOT EXISTS {name} ON {table}({column});"
                ))?;
            }
            Ok(())
        },
    },
];

/// Bring the store up to the current structure.
///
/// Takes a backup first when the store is file-backed, already holds tables,
/// and at least one step is pending. Any failure is fatal to the caller.
pub fn run_migrations(
    conn: &Connection,
    ctx: &MigrationContext<'_>,
) -> Result<MigrationReport, DatabaseError> {
    let pending = pending_steps(conn)?;
    let mut report = MigrationReport::default();

    if pending.is_empty() {
        tracing::debug!("Store schema is current, no migration needed");
        return Ok(report);
    }

    if let Some(path) = ctx.database_path {
        if count_tables(conn)? > 0 {
            let dest = backup_path_for(path);
            backup_database(conn, &dest)?;
            tracing::info!(backup = %dest.display(), "Store backed up before migration");
            report.backup = Some(dest);
        }
    }

    for step in pending {
        tracing::info!(step = step.name, "Applying migration step");
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| migration_failed(step.name, e))?;
        (step.apply)(&tx, ctx).map_err(|e| migration_failed(step.name, e))?;
        tx.commit().map_err(|e| migration_failed(step.name, e))?;
        report.applied.push(step.name);
    }

    Ok(report)
}

/// Names of the steps that still have work to do, in application order.
pub fn pending_step_names(conn: &Connection) -> Result<Vec<&'static str>, DatabaseError> {
    Ok(pending_steps(conn)?.into_iter().map(|s| s.name).collect())
}

fn pending_steps(conn: &Connection) -> Result<Vec<&'static MigrationStep>, DatabaseError> {
    let mut pending = Vec::new();
    for step in STEPS {
        // Later steps depend on earlier ones; once a step is pending, everything
        // after it is evaluated against a store that does not have it yet.
        let applied = if pending.is_empty() {
            (step.is_applied)(conn).map_err(|e| migration_failed(step.name, e))?
        } else {
            (step.is_applied)(conn).unwrap_or(false)
        };
        if !applied {
            pending.push(step);
        }
    }
    Ok(pending)
}

fn migration_failed(step: &str, e: rusqlite::Error) -> DatabaseError {
    DatabaseError::MigrationFailed {
        step: step.to_string(),
        reason: e.to_string(),
    }
}

/// Copy the whole store to `dest` through SQLite itself.
pub fn backup_database(conn: &Connection, dest: &Path) -> Result<(), DatabaseError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DatabaseError::BackupFailed(e.to_string()))?;
    }
    let dest_str = dest
        .to_str()
        .ok_or_else(|| DatabaseError::BackupFailed(format!("non UTF-8 path {}", dest.display())))?;
    conn.execute("VACUUM INTO ?1", params![dest_str])
        .map_err(|e| DatabaseError::BackupFailed(e.to_string()))?;
    Ok(())
}

fn backup_path_for(db_path: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%3f");
    let file_name = db_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store.db".into());
    db_path.with_file_name(format!("{file_name}.backup-{stamp}"))
}

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
}

pub fn index_exists(conn: &Connection, index: &str, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1 AND tbl_name = ?2",
        params![index, table],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
}

fn add_missing_columns(
    conn: &Connection,
    table: &str,
    columns: &[(&str, &str)],
) -> rusqlite::Result<()> {
    let existing = column_names(conn, table)?;
    for (column, ty) in columns {
        if !existing.contains(*column) {
            conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {ty};"))?;
            tracing::info!(table, column, "Added column");
        }
    }
    Ok(())
}

/// Column names of `table`; empty when the table does not exist.
pub fn column_names(conn: &Connection, table: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    rows.collect()
}

/// Count user tables in the store.
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

/// `(type, name, sql)` for every schema object, sorted. Used to compare stores.
pub fn schema_snapshot(conn: &Connection) -> Result<Vec<(String, String, String)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT type, name, COALESCE(sql, '') FROM sqlite_master
         WHERE name NOT LIKE 'sqlite_%' ORDER BY type, name",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
