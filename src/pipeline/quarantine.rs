//! Holding area for files the router could not place with confidence.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::archive::{move_file, reserve_path};
use super::validation::export::write_csv;
use crate::models::{Classification, FileObservation};

pub const REPORT_HEADER: [&str; 9] = [
    "file_name",
    "court_code",
    "score",
    "is_best",
    "is_second",
    "margin",
    "threshold",
    "timestamp",
    "explanation",
];

/// Where a quarantined file and its report ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineReceipt {
    pub file: PathBuf,
    pub report: PathBuf,
}

/// One report row per candidate court, header first.
pub fn report_rows(
    file_name: &str,
    classification: &Classification,
    now: DateTime<Utc>,
) -> Vec<Vec<String>> {
    let timestamp = now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let mut rows = vec![REPORT_HEADER.iter().map(|h| h.to_string()).collect()];
    for (i, score) in classification.ranked.iter().enumerate() {
        rows.push(vec![
            file_name.to_string(),
            score.court_code.clone(),
            score.total.to_string(),
            (i == 0).to_string(),
            (i == 1).to_string(),
            classification.margin.to_string(),
            classification.threshold.to_string(),
            timestamp.clone(),
            classification.explanation.clone(),
        ]);
    }
    rows
}

/// Write the diagnostic report, then move the file beside it.
///
/// The file's name is reserved first, so a second file with the same name in
/// the same second lands beside it with a `-<n>` suffix. A failed move
/// removes both the report and the reservation.
pub fn quarantine_file(
    observation: &FileObservation,
    classification: &Classification,
    quarantine_dir: &Path,
    now: DateTime<Utc>,
) -> io::Result<QuarantineReceipt> {
    let file = reserve_path(&quarantine_dir.join(format!(
        "{}_{}",
        now.format("%Y%m%d%H%M%SZ"),
        observation.file_name()
    )))?;
    let mut report_name = file.file_name().unwrap_or_default().to_os_string();
    report_name.push(".report.csv");
    let report = file.with_file_name(report_name);

    let placed = write_csv(
        &report,
        &report_rows(observation.file_name(), classification, now),
    )
    .and_then(|()| move_file(&observation.absolute_path, &file));
    if let Err(e) = placed {
        let _ = std::fs::remove_file(&report);
        let _ = std::fs::remove_file(&file);
        return Err(e);
    }

    tracing::warn!(
        file = %observation.relative_path,
        outcome = %classification.outcome,
        explanation = %classification.explanation,
        dest = %file.display(),
        "File quarantined"
    );
    Ok(QuarantineReceipt { file, report })
}
