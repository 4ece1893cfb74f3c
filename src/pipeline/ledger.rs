//! Idempotency ledger: at most one terminal outcome per file identity.
//!
//! Identity is inbox root, relative path, size and mtime. A file whose size or
//! mtime changes gets a new key and is processed again; the same relative path
//! under two inboxes names two files.

use base64::Engine;
use chrono::Utc;
use rusqlite::Connection;
use sha2::{Digest, Sha256};

use crate::db::{self, DatabaseError};
use crate::models::{FileObservation, LedgerEntry, LedgerOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerCheck {
    Seen,
    NotSeen,
}

/// SHA-256 over `"{inbox}|{relative_path}|{size}|{mtime_secs}"`, base64url unpadded.
pub fn idempotency_key(observation: &FileObservation) -> String {
    let material = format!(
        "{}|{}|{}|{}",
        observation.inbox_str(),
        observation.relative_path,
        observation.size,
        observation.modified_at.timestamp()
    );
    let digest = Sha256::digest(material.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

pub fn check(conn: &Connection, key: &str) -> Result<LedgerCheck, DatabaseError> {
    if db::ledger_contains(conn, key)? {
        Ok(LedgerCheck::Seen)
    } else {
        Ok(LedgerCheck::NotSeen)
    }
}

/// Record the file's terminal outcome. Returns `false` when another worker
/// recorded the key first; the caller must then roll back its own writes.
pub fn record(
    conn: &Connection,
    observation: &FileObservation,
    key: &str,
    outcome: LedgerOutcome,
    court_code: Option<&str>,
    processing_id: Option<i64>,
) -> Result<bool, DatabaseError> {
    let entry = LedgerEntry {
        idempotency_key: key.to_string(),
        file_path: observation.qualified_path(),
        file_size: observation.size,
        modified_at: observation.modified_at,
        outcome,
        court_code: court_code.map(str::to_string),
        recorded_at: Utc::now().naive_utc(),
    };
    let inserted = db::insert_ledger_entry(conn, &entry, processing_id)?;
    if !inserted {
        tracing::info!(file = %observation.relative_path, "Ledger already holds this file, skipping");
    }
    Ok(inserted)
}
