use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::engine::{error_message, ValidationReport};
use crate::pipeline::archive::reserve_path;
use crate::models::CourtProfile;

pub const EXPORT_HEADER: [&str; 7] = [
    "equipment_id",
    "description",
    "status",
    "error_message",
    "file_name",
    "processed_date",
    "court_code",
];

/// File name of a validation export: `<COURT>_<stem>_<passed|failed>_<UTCstamp>.csv`.
pub fn export_file_name(court: &str, source_file: &str, status: &str, now: DateTime<Utc>) -> String {
    let stem = Path::new(source_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_file.to_string());
    format!("{court}_{stem}_{status}_{}.csv", now.format("%Y%m%d%H%M%SZ"))
}

/// Render the export rows, header first.
pub fn export_rows(report: &ValidationReport, profile: &CourtProfile) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(report.records.len() + 1);
    rows.push(EXPORT_HEADER.iter().map(|h| h.to_string()).collect());
    for rec in &report.records {
        rows.push(vec![
            rec.equipment_id.clone(),
            rec.description.clone(),
            rec.status.as_str().to_string(),
            error_message(rec, &profile.rule),
            rec.source_file.clone(),
            rec.processed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            rec.court_code.clone(),
        ]);
    }
    rows
}

/// Where [`write_export`] wants to put the export for this report. A name
/// already taken gets a `-<n>` suffix.
pub fn export_path(
    report: &ValidationReport,
    profile: &CourtProfile,
    source_file: &str,
    now: DateTime<Utc>,
) -> PathBuf {
    profile.directories.output_dir.join(export_file_name(
        &profile.code,
        source_file,
        report.summary.status.as_str(),
        now,
    ))
}

/// Write the export into the court's output directory. Returns its path.
pub fn write_export(
    report: &ValidationReport,
    profile: &CourtProfile,
    source_file: &str,
    now: DateTime<Utc>,
) -> std::io::Result<PathBuf> {
    let path = reserve_path(&export_path(report, profile, source_file, now))?;
    if let Err(e) = write_csv(&path, &export_rows(report, profile)) {
        let _ = std::fs::remove_file(&path);
        return Err(e);
    }
    tracing::debug!(court = %profile.code, path = %path.display(), "Wrote validation export");
    Ok(path)
}

/// Write rows as RFC 4180 CSV through a temporary file, then rename into place.
pub(crate) fn write_csv(path: &Path, rows: &[Vec<String>]) -> std::io::Result<()> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut out = std::io::BufWriter::new(std::fs::File::create(&tmp)?);
        for row in rows {
            let line: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
            out.write_all(line.join(",").as_bytes())?;
            out.write_all(b"\r\n")?;
        }
        out.flush()?;
    }
    std::fs::rename(&tmp, path)
}

/// Quote a field when it holds a comma, quote, or line break.
pub(crate) fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r', '\t']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::validation::engine::tests::profile;
    use crate::pipeline::validation::engine::validate_text;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T08:30:05Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn file_name_carries_court_stem_and_status() {
        assert_eq!(
            export_file_name("SEA", "SEA_0301.txt", "passed", now()),
            "SEA_SEA_0301_passed_20260301083005Z.csv"
        );
    }

    #[test]
    fn fields_with_separators_are_quoted() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn export_written_to_court_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut kem = profile("KEM", 9, 13, true);
        kem.directories.output_dir = dir.path().join("kem-results");

        let report = validate_text(
            "KEM\t123456789\tDesk, oak\nKEM\t12\tChair",
            &kem,
            &[],
            "KEM_0301.txt",
            now().naive_utc(),
        );
        let path = write_export(&report, &kem, "KEM_0301.txt", now()).unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "KEM_KEM_0301_failed_20260301083005Z.csv"
        );
        let body = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = body.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(
            lines[0],
            "equipment_id,description,status,error_message,file_name,processed_date,court_code"
        );
        assert_eq!(
            lines[1],
            "123456789,\"Desk, oak\",valid,,KEM_0301.txt,2026-03-01 08:30:05,KEM"
        );
        assert!(lines[2].starts_with("12,Chair,invalid,\"2 digits, minimum is 9\""));
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn second_export_in_same_second_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let mut kem = profile("KEM", 9, 13, true);
        kem.directories.output_dir = dir.path().join("kem-results");

        let first = validate_text("KEM\t123456789\tA", &kem, &[], "KEM_1.txt", now().naive_utc());
        let second = validate_text("KEM\t987654321\tB", &kem, &[], "KEM_1.txt", now().naive_utc());
        let a = write_export(&first, &kem, "KEM_1.txt", now()).unwrap();
        let b = write_export(&second, &kem, "KEM_1.txt", now()).unwrap();

        assert_ne!(a, b);
        assert_eq!(
            b.file_name().unwrap().to_str().unwrap(),
            "KEM_KEM_1_passed_20260301083005Z-1.csv"
        );
        assert!(std::fs::read_to_string(&a).unwrap().contains("123456789"));
        assert!(std::fs::read_to_string(&b).unwrap().contains("987654321"));
    }
}
