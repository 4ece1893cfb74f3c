use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::{ErrorReason, RecordStatus, ValidationStatus};

/// One identifier line extracted from a file. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentRecord {
    /// Identifier token as it appeared on the line.
    pub equipment_id: String,
    /// Digits extracted from the identifier, letters stripped.
    pub digits: String,
    pub digit_count: u32,
    pub description: String,
    pub status: RecordStatus,
    pub error_reason: Option<ErrorReason>,
    pub source_file: String,
    pub line_number: u32,
    pub court_code: String,
    pub processed_at: NaiveDateTime,
}

impl EquipmentRecord {
    pub fn is_valid(&self) -> bool {
        self.status == RecordStatus::Valid
    }
}

/// Per-file totals persisted on the processing-history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_lines: u32,
    pub id_lines: u32,
    pub valid_lines: u32,
    pub failed_lines: u32,
    pub info_lines: u32,
    pub status: ValidationStatus,
    /// Percentage of identifier lines that passed, 0.0 when there are none.
    pub success_rate: f64,
}
