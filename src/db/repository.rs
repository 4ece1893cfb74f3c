use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;
use crate::models::*;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(field: &str, raw: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|_| DatabaseError::InvalidTimestamp {
            field: field.to_string(),
            value: raw.to_string(),
        })
}

fn now_ts() -> NaiveDateTime {
    Utc::now().naive_utc()
}

// ═══════════════════════════════════════════
// Processing History
// ═══════════════════════════════════════════

/// Insert one history row and return its id.
pub fn insert_processing_record(
    conn: &Connection,
    record: &ProcessingRecord,
) -> Result<i64, DatabaseError> {
    let summary = record.summary.as_ref();
    conn.execute(
        "INSERT INTO processing_history (file_name, processed_at, validation_status, total_lines,
         id_lines, valid_lines, failed_lines, success_rate, csv_path, file_hash, court_code,
         routed_court_code, routing_confidence, routing_explanation, router_scores,
         idempotency_key, router_mode, quarantined)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            record.file_name,
            format_ts(&now_ts()),
            summary.map(|s| s.status.as_str()),
            summary.map(|s| s.total_lines),
            summary.map(|s| s.id_lines),
            summary.map(|s| s.valid_lines),
            summary.map(|s| s.failed_lines),
            summary.map(|s| s.success_rate),
            record.csv_path,
            record.file_hash,
            record.court_code,
            record.routed_court_code,
            record.routing_confidence,
            record.routing_explanation,
            record.router_scores,
            record.idempotency_key,
            record.router_mode.as_str(),
            record.quarantined as i32,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent history row written for an idempotency key.
pub fn get_processing_record_by_key(
    conn: &Connection,
    key: &str,
) -> Result<Option<ProcessingRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT file_name, validation_status, total_lines, id_lines, valid_lines, failed_lines,
         success_rate, csv_path, file_hash, court_code, routed_court_code, routing_confidence,
         routing_explanation, router_scores, idempotency_key, router_mode, quarantined
         FROM processing_history WHERE idempotency_key = ?1 ORDER BY id DESC LIMIT 1",
    )?;

    let row = stmt
        .query_row(params![key], |row| {
            Ok(HistoryRow {
                file_name: row.get(0)?,
                validation_status: row.get(1)?,
                total_lines: row.get(2)?,
                id_lines: row.get(3)?,
                valid_lines: row.get(4)?,
                failed_lines: row.get(5)?,
                success_rate: row.get(6)?,
                csv_path: row.get(7)?,
                file_hash: row.get(8)?,
                court_code: row.get(9)?,
                routed_court_code: row.get(10)?,
                routing_confidence: row.get(11)?,
                routing_explanation: row.get(12)?,
                router_scores: row.get(13)?,
                idempotency_key: row.get(14)?,
                router_mode: row.get(15)?,
                quarantined: row.get(16)?,
            })
        })
        .optional()?;

    row.map(history_from_row).transpose()
}

/// Point a history row at the export written for it.
pub fn set_history_csv_path(
    conn: &Connection,
    processing_id: i64,
    csv_path: &str,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE processing_history SET csv_path = ?1 WHERE id = ?2",
        params![csv_path, processing_id],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "ProcessingRecord".into(),
            id: processing_id.to_string(),
        });
    }
    Ok(())
}

struct HistoryRow {
    file_name: String,
    validation_status: Option<String>,
    total_lines: Option<u32>,
    id_lines: Option<u32>,
    valid_lines: Option<u32>,
    failed_lines: Option<u32>,
    success_rate: Option<f64>,
    csv_path: Option<String>,
    file_hash: Option<String>,
    court_code: Option<String>,
    routed_court_code: Option<String>,
    routing_confidence: Option<u32>,
    routing_explanation: Option<String>,
    router_scores: Option<String>,
    idempotency_key: Option<String>,
    router_mode: Option<String>,
    quarantined: i32,
}

fn history_from_row(row: HistoryRow) -> Result<ProcessingRecord, DatabaseError> {
    let summary = match row.validation_status {
        Some(status) => Some(ValidationSummary {
            total_lines: row.total_lines.unwrap_or(0),
            id_lines: row.id_lines.unwrap_or(0),
            valid_lines: row.valid_lines.unwrap_or(0),
            failed_lines: row.failed_lines.unwrap_or(0),
            info_lines: row
                .total_lines
                .unwrap_or(0)
                .saturating_sub(row.id_lines.unwrap_or(0)),
            status: ValidationStatus::from_str(&status)?,
            success_rate: row.success_rate.unwrap_or(0.0),
        }),
        None => None,
    };
    Ok(ProcessingRecord {
        file_name: row.file_name,
        summary,
        csv_path: row.csv_path,
        file_hash: row.file_hash,
        court_code: row.court_code.unwrap_or_default(),
        routed_court_code: row.routed_court_code,
        routing_confidence: row.routing_confidence,
        routing_explanation: row.routing_explanation,
        router_scores: row.router_scores,
        idempotency_key: row.idempotency_key.unwrap_or_default(),
        router_mode: row
            .router_mode
            .as_deref()
            .map(RouterMode::from_str)
            .transpose()?
            .unwrap_or_default(),
        quarantined: row.quarantined != 0,
    })
}

// ═══════════════════════════════════════════
// Equipment Records
// ═══════════════════════════════════════════

/// Insert every record of one file under its history row. Returns rows written.
pub fn insert_equipment_records(
    conn: &Connection,
    processing_id: i64,
    records: &[EquipmentRecord],
) -> Result<usize, DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO equipment_records (processing_id, equipment_id, digits, digit_count,
         description, status, error_reason, source_file, line_number, court_code, processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    for rec in records {
        stmt.execute(params![
            processing_id,
            rec.equipment_id,
            rec.digits,
            rec.digit_count,
            rec.description,
            rec.status.as_str(),
            rec.error_reason.map(|r| r.as_str()),
            rec.source_file,
            rec.line_number,
            rec.court_code,
            format_ts(&rec.processed_at),
        ])?;
    }
    Ok(records.len())
}

pub fn list_equipment_records(
    conn: &Connection,
    processing_id: i64,
) -> Result<Vec<EquipmentRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT equipment_id, digits, digit_count, description, status, error_reason,
         source_file, line_number, court_code, processed_at
         FROM equipment_records WHERE processing_id = ?1 ORDER BY line_number",
    )?;
    let rows = stmt.query_map(params![processing_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, u32>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, u32>(7)?,
            row.get::<_, String>(8)?,
            row.get::<_, String>(9)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (equipment_id, digits, digit_count, description, status, reason, source_file, line_number, court_code, processed_at) =
            row?;
        records.push(EquipmentRecord {
            equipment_id,
            digits,
            digit_count,
            description,
            status: RecordStatus::from_str(&status)?,
            error_reason: reason.as_deref().map(ErrorReason::from_str).transpose()?,
            source_file,
            line_number,
            court_code,
            processed_at: parse_ts("equipment_records.processed_at", &processed_at)?,
        });
    }
    Ok(records)
}

// ═══════════════════════════════════════════
// Routing Decisions
// ═══════════════════════════════════════════

/// Stored shape of a routing decision, as read back for audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionAudit {
    pub id: String,
    pub idempotency_key: String,
    pub file_name: String,
    pub outcome: RoutingOutcome,
    pub chosen_court: Option<String>,
    pub confidence: u32,
    pub margin: u32,
    pub mode: RouterMode,
    pub action: RoutingAction,
    pub explanation: String,
    pub scores_json: String,
}

pub fn insert_routing_decision(
    conn: &Connection,
    decision: &RoutingDecision,
) -> Result<(), DatabaseError> {
    let class = &decision.classification;
    conn.execute(
        "INSERT INTO routing_decisions (id, idempotency_key, file_path, file_name, outcome,
         chosen_court, confidence, margin, threshold, required_margin, mode, action,
         explanation, scores_json, decided_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            decision.id.to_string(),
            decision.idempotency_key,
            decision.file_path,
            decision.file_name,
            class.outcome.as_str(),
            decision.chosen_court(),
            decision.confidence(),
            class.margin,
            class.threshold,
            class.required_margin,
            decision.mode.as_str(),
            decision.action.as_str(),
            class.explanation,
            class.scores_json()?,
            format_ts(&decision.decided_at),
        ],
    )?;
    Ok(())
}

pub fn list_routing_decisions(
    conn: &Connection,
    key: &str,
) -> Result<Vec<DecisionAudit>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, idempotency_key, file_name, outcome, chosen_court, confidence, margin,
         mode, action, explanation, scores_json
         FROM routing_decisions WHERE idempotency_key = ?1 ORDER BY decided_at, rowid",
    )?;
    let rows = stmt.query_map(params![key], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, u32>(5)?,
            row.get::<_, u32>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, String>(8)?,
            row.get::<_, String>(9)?,
            row.get::<_, String>(10)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, idempotency_key, file_name, outcome, chosen_court, confidence, margin, mode, action, explanation, scores_json) =
            row?;
        out.push(DecisionAudit {
            id,
            idempotency_key,
            file_name,
            outcome: RoutingOutcome::from_str(&outcome)?,
            chosen_court,
            confidence,
            margin,
            mode: RouterMode::from_str(&mode)?,
            action: RoutingAction::from_str(&action)?,
            explanation,
            scores_json,
        });
    }
    Ok(out)
}

// ═══════════════════════════════════════════
// Processed Ledger
// ═══════════════════════════════════════════

pub fn ledger_contains(conn: &Connection, key: &str) -> Result<bool, DatabaseError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM processed_ledger WHERE idempotency_key = ?1",
        params![key],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

/// Record a terminal outcome. Returns `false` when the key was already present;
/// the existing row is left untouched.
pub fn insert_ledger_entry(
    conn: &Connection,
    entry: &LedgerEntry,
    processing_id: Option<i64>,
) -> Result<bool, DatabaseError> {
    let sql = if ledger_has_remote_path(conn)? {
        "INSERT OR IGNORE INTO processed_ledger (idempotency_key, file_path, file_size,
         file_mtime, outcome, court_code, processing_id, recorded_at, remote_path, processing_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?2, ?5)"
    } else {
        "INSERT OR IGNORE INTO processed_ledger (idempotency_key, file_path, file_size,
         file_mtime, outcome, court_code, processing_id, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    };
    let changed = conn.execute(
        sql,
        params![
            entry.idempotency_key,
            entry.file_path,
            entry.file_size as i64,
            entry.modified_at.to_rfc3339(),
            entry.outcome.as_str(),
            entry.court_code,
            processing_id,
            format_ts(&entry.recorded_at),
        ],
    )?;
    Ok(changed == 1)
}

/// Ledgers carried over from the path-keyed layout keep its NOT NULL
/// `remote_path` column, which every insert must still fill.
fn ledger_has_remote_path(conn: &Connection) -> Result<bool, DatabaseError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('processed_ledger') WHERE name = 'remote_path'",
        [],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

pub fn get_ledger_entry(conn: &Connection, key: &str) -> Result<Option<LedgerEntry>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT idempotency_key, file_path, file_size, file_mtime, outcome, court_code, recorded_at
             FROM processed_ledger WHERE idempotency_key = ?1",
            params![key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((idempotency_key, file_path, size, mtime, outcome, court_code, recorded_at)) = row else {
        return Ok(None);
    };
    Ok(Some(LedgerEntry {
        idempotency_key,
        file_path,
        file_size: size.max(0) as u64,
        modified_at: parse_mtime(&mtime)?,
        outcome: LedgerOutcome::from_str(&outcome)?,
        court_code,
        recorded_at: parse_ts("processed_ledger.recorded_at", &recorded_at)?,
    }))
}

/// RFC 3339, or epoch seconds as written by path-keyed ledgers.
fn parse_mtime(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(d) = DateTime::parse_from_rfc3339(raw) {
        return Ok(d.with_timezone(&Utc));
    }
    raw.parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite())
        .and_then(|secs| DateTime::from_timestamp(secs.trunc() as i64, (secs.fract() * 1e9) as u32))
        .ok_or_else(|| DatabaseError::InvalidTimestamp {
            field: "processed_ledger.file_mtime".into(),
            value: raw.to_string(),
        })
}

pub fn count_ledger_entries(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM processed_ledger", [], |row| row.get(0))?)
}

// ═══════════════════════════════════════════
// File Failures
// ═══════════════════════════════════════════

/// Count one more failed attempt. Once `max_attempts` is reached the file is
/// flagged for manual intervention and the poller stops picking it up.
pub fn record_failure(
    conn: &Connection,
    key: &str,
    file_path: &str,
    error: &str,
    max_attempts: u32,
) -> Result<FileFailure, DatabaseError> {
    let now = format_ts(&now_ts());
    conn.execute(
        "INSERT INTO file_failures (idempotency_key, file_path, attempts, last_error,
         manual_intervention, updated_at)
         VALUES (?1, ?2, 1, ?3, 0, ?4)
         ON CONFLICT(idempotency_key) DO UPDATE SET
            attempts = attempts + 1,
            last_error = excluded.last_error,
            file_path = excluded.file_path,
            updated_at = excluded.updated_at",
        params![key, file_path, error, now],
    )?;
    conn.execute(
        "UPDATE file_failures SET manual_intervention = 1
         WHERE idempotency_key = ?1 AND attempts >= ?2",
        params![key, max_attempts.max(1)],
    )?;
    get_failure(conn, key)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "FileFailure".into(),
        id: key.into(),
    })
}

pub fn get_failure(conn: &Connection, key: &str) -> Result<Option<FileFailure>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT idempotency_key, file_path, attempts, last_error, manual_intervention, updated_at
             FROM file_failures WHERE idempotency_key = ?1",
            params![key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i32>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((idempotency_key, file_path, attempts, last_error, manual, updated_at)) = row else {
        return Ok(None);
    };
    Ok(Some(FileFailure {
        idempotency_key,
        file_path,
        attempts,
        last_error,
        manual_intervention: manual != 0,
        updated_at: parse_ts("file_failures.updated_at", &updated_at)?,
    }))
}

pub fn clear_failure(conn: &Connection, key: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM file_failures WHERE idempotency_key = ?1",
        params![key],
    )?;
    Ok(())
}

pub fn is_manual_intervention(conn: &Connection, key: &str) -> Result<bool, DatabaseError> {
    Ok(get_failure(conn, key)?.is_some_and(|f| f.manual_intervention))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn test_db() -> Connection {
        open_memory_database("KEM").unwrap()
    }

    fn record(key: &str) -> ProcessingRecord {
        ProcessingRecord {
            file_name: "SEA_0101.txt".into(),
            summary: Some(ValidationSummary {
                total_lines: 4,
                id_lines: 3,
                valid_lines: 2,
                failed_lines: 1,
                info_lines: 1,
                status: ValidationStatus::Failed,
                success_rate: 66.67,
            }),
            csv_path: Some("/out/SEA_SEA_0101_failed_20260101_000000.csv".into()),
            file_hash: Some("abc".into()),
            court_code: "SEA".into(),
            routed_court_code: Some("SEA".into()),
            routing_confidence: Some(93),
            routing_explanation: Some("best=SEA(93) second=KEM(0) margin=93 >= required 20".into()),
            router_scores: Some("{}".into()),
            idempotency_key: key.into(),
            router_mode: RouterMode::Enforce,
            quarantined: false,
        }
    }

    fn ledger_entry(key: &str, outcome: LedgerOutcome) -> LedgerEntry {
        LedgerEntry {
            idempotency_key: key.into(),
            file_path: "sea/SEA_0101.txt".into(),
            file_size: 42,
            modified_at: DateTime::parse_from_rfc3339("2026-01-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            outcome,
            court_code: Some("SEA".into()),
            recorded_at: now_ts(),
        }
    }

    #[test]
    fn history_row_round_trips_routing_fields() {
        let conn = test_db();
        let id = insert_processing_record(&conn, &record("k1")).unwrap();
        assert!(id > 0);

        let fetched = get_processing_record_by_key(&conn, "k1").unwrap().unwrap();
        assert_eq!(fetched.court_code, "SEA");
        assert_eq!(fetched.routing_confidence, Some(93));
        assert_eq!(fetched.router_mode, RouterMode::Enforce);
        let summary = fetched.summary.unwrap();
        assert_eq!(summary.status, ValidationStatus::Failed);
        assert_eq!(summary.info_lines, 1);
    }

    #[test]
    fn missing_history_returns_none() {
        let conn = test_db();
        assert!(get_processing_record_by_key(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn equipment_records_are_listed_by_line() {
        let conn = test_db();
        let pid = insert_processing_record(&conn, &record("k1")).unwrap();
        let mk = |line: u32, status: RecordStatus, reason: Option<ErrorReason>| EquipmentRecord {
            equipment_id: format!("12345678{line}"),
            digits: format!("12345678{line}"),
            digit_count: 9,
            description: "Laptop".into(),
            status,
            error_reason: reason,
            source_file: "SEA_0101.txt".into(),
            line_number: line,
            court_code: "SEA".into(),
            processed_at: now_ts(),
        };
        let written = insert_equipment_records(
            &conn,
            pid,
            &[
                mk(3, RecordStatus::Invalid, Some(ErrorReason::TooShort)),
                mk(1, RecordStatus::Valid, None),
            ],
        )
        .unwrap();
        assert_eq!(written, 2);

        let listed = list_equipment_records(&conn, pid).unwrap();
        assert_eq!(listed[0].line_number, 1);
        assert_eq!(listed[1].error_reason, Some(ErrorReason::TooShort));
    }

    #[test]
    fn ledger_insert_is_first_writer_wins() {
        let conn = test_db();
        assert!(!ledger_contains(&conn, "k1").unwrap());
        assert!(insert_ledger_entry(&conn, &ledger_entry("k1", LedgerOutcome::Validated), None).unwrap());
        assert!(!insert_ledger_entry(&conn, &ledger_entry("k1", LedgerOutcome::Quarantined), None).unwrap());

        let entry = get_ledger_entry(&conn, "k1").unwrap().unwrap();
        assert_eq!(entry.outcome, LedgerOutcome::Validated);
        assert_eq!(entry.file_size, 42);
        assert_eq!(entry.modified_at.to_rfc3339(), "2026-01-01T10:00:00+00:00");
        assert_eq!(count_ledger_entries(&conn).unwrap(), 1);
    }

    #[test]
    fn failures_escalate_to_manual_intervention() {
        let conn = test_db();
        let first = record_failure(&conn, "k1", "a.txt", "boom", 3).unwrap();
        assert_eq!(first.attempts, 1);
        assert!(!first.manual_intervention);

        record_failure(&conn, "k1", "a.txt", "boom", 3).unwrap();
        let third = record_failure(&conn, "k1", "a.txt", "still boom", 3).unwrap();
        assert_eq!(third.attempts, 3);
        assert_eq!(third.last_error, "still boom");
        assert!(is_manual_intervention(&conn, "k1").unwrap());

        clear_failure(&conn, "k1").unwrap();
        assert!(get_failure(&conn, "k1").unwrap().is_none());
        assert!(!is_manual_intervention(&conn, "k1").unwrap());
    }

    #[test]
    fn csv_path_is_set_after_export() {
        let conn = test_db();
        let mut rec = record("k1");
        rec.csv_path = None;
        let pid = insert_processing_record(&conn, &rec).unwrap();
        set_history_csv_path(&conn, pid, "/out/SEA_x_passed.csv").unwrap();

        let fetched = get_processing_record_by_key(&conn, "k1").unwrap().unwrap();
        assert_eq!(fetched.csv_path.as_deref(), Some("/out/SEA_x_passed.csv"));
        assert!(matches!(
            set_history_csv_path(&conn, pid + 100, "x"),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn unreadable_timestamps_are_errors() {
        let conn = test_db();
        insert_ledger_entry(&conn, &ledger_entry("k1", LedgerOutcome::Validated), None).unwrap();
        conn.execute(
            "UPDATE processed_ledger SET file_mtime = 'yesterday' WHERE idempotency_key = 'k1'",
            [],
        )
        .unwrap();
        let err = get_ledger_entry(&conn, "k1").unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::InvalidTimestamp { ref field, ref value }
                if field == "processed_ledger.file_mtime" && value == "yesterday"
        ));

        record_failure(&conn, "k2", "a.txt", "boom", 3).unwrap();
        conn.execute("UPDATE file_failures SET updated_at = '' WHERE idempotency_key = 'k2'", [])
            .unwrap();
        assert!(matches!(
            get_failure(&conn, "k2"),
            Err(DatabaseError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn stored_timestamp_shapes_parse() {
        let plain = parse_ts("t", "2025-01-01 09:00:00").unwrap();
        assert_eq!(parse_ts("t", "2025-01-01T09:00:00").unwrap(), plain);
        let micros = parse_ts("t", "2025-01-01 09:00:00.250000").unwrap();
        assert_eq!((micros - plain).num_milliseconds(), 250);
        assert!(parse_ts("t", "01/01/2025").is_err());
    }

    #[test]
    fn epoch_mtime_from_older_ledgers_is_read() {
        let conn = test_db();
        insert_ledger_entry(&conn, &ledger_entry("k1", LedgerOutcome::Validated), None).unwrap();
        conn.execute(
            "UPDATE processed_ledger SET file_mtime = '1735722060.5' WHERE idempotency_key = 'k1'",
            [],
        )
        .unwrap();
        let entry = get_ledger_entry(&conn, "k1").unwrap().unwrap();
        assert_eq!(entry.modified_at.timestamp(), 1_735_722_060);
        assert_eq!(entry.modified_at.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn ledger_insert_fills_legacy_path_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE processed_ledger (
                idempotency_key TEXT PRIMARY KEY,
                remote_path TEXT NOT NULL,
                file_size INTEGER,
                file_mtime TEXT,
                court_code TEXT,
                processed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                processing_status TEXT,
                processing_id INTEGER,
                file_path TEXT,
                outcome TEXT,
                recorded_at TEXT
            );",
        )
        .unwrap();

        assert!(insert_ledger_entry(&conn, &ledger_entry("k1", LedgerOutcome::Quarantined), None).unwrap());
        let (remote, status): (String, String) = conn
            .query_row(
                "SELECT remote_path, processing_status FROM processed_ledger WHERE idempotency_key = 'k1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(remote, "sea/SEA_0101.txt");
        assert_eq!(status, "quarantined");
        assert_eq!(get_ledger_entry(&conn, "k1").unwrap().unwrap().outcome, LedgerOutcome::Quarantined);
    }
}
