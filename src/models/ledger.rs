use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::LedgerOutcome;

/// One row of the processed-file ledger. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub idempotency_key: String,
    pub file_path: String,
    pub file_size: u64,
    pub modified_at: DateTime<Utc>,
    pub outcome: LedgerOutcome,
    pub court_code: Option<String>,
    pub recorded_at: NaiveDateTime,
}

/// Consecutive failure bookkeeping for a file that has not reached the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub idempotency_key: String,
    pub file_path: String,
    pub attempts: u32,
    pub last_error: String,
    pub manual_intervention: bool,
    pub updated_at: NaiveDateTime,
}
