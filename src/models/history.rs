use serde::{Deserialize, Serialize};

use super::enums::RouterMode;
use super::equipment::ValidationSummary;

/// One processing-history row: the per-file audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub file_name: String,
    /// Absent for quarantined files, which are never validated.
    pub summary: Option<ValidationSummary>,
    pub csv_path: Option<String>,
    /// Content digest of the file as read, for audit.
    pub file_hash: Option<String>,
    /// Court whose rule the file was validated under (or the default court).
    pub court_code: String,
    pub routed_court_code: Option<String>,
    pub routing_confidence: Option<u32>,
    pub routing_explanation: Option<String>,
    pub router_scores: Option<String>,
    pub idempotency_key: String,
    pub router_mode: RouterMode,
    pub quarantined: bool,
}
