use chrono::NaiveDateTime;

use super::tokenize::{numbered_lines, tokenize, LineTokens};
use crate::models::{
    CourtProfile, EquipmentRecord, ErrorReason, RecordStatus, ValidationRule, ValidationStatus,
    ValidationSummary,
};

/// Records and totals for one file validated under one court.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub court_code: String,
    pub records: Vec<EquipmentRecord>,
    pub summary: ValidationSummary,
}

/// Validate every line of `text` under `profile`. Record order follows the
/// source lines.
///
/// `known_prefixes` are the line prefixes of every configured court; the
/// profile's own prefix is always recognised.
pub fn validate_text(
    text: &str,
    profile: &CourtProfile,
    known_prefixes: &[String],
    source_file: &str,
    processed_at: NaiveDateTime,
) -> ValidationReport {
    let mut records = Vec::new();
    let mut total_lines = 0u32;
    let mut prefixes = known_prefixes.to_vec();
    prefixes.push(profile.rule.prefix.clone());

    for (line_number, line) in numbered_lines(text) {
        if line.trim().is_empty() {
            continue;
        }
        total_lines += 1;

        let Some(tokens) = tokenize(line, &prefixes) else {
            continue;
        };

        let (status, error_reason) = match check_line(&tokens, &profile.rule) {
            None => (RecordStatus::Valid, None),
            Some(reason) => (RecordStatus::Invalid, Some(reason)),
        };

        records.push(EquipmentRecord {
            equipment_id: tokens.identifier.to_string(),
            digits: tokens.digits(),
            digit_count: tokens.digit_count(),
            description: tokens.description.clone(),
            status,
            error_reason,
            source_file: source_file.to_string(),
            line_number,
            court_code: profile.code.clone(),
            processed_at,
        });
    }

    let summary = summarize(&records, total_lines);
    tracing::debug!(
        file = source_file,
        court = %profile.code,
        id_lines = summary.id_lines,
        failed = summary.failed_lines,
        "Validated file"
    );

    ValidationReport {
        court_code: profile.code.clone(),
        records,
        summary,
    }
}

/// First rule the line violates, in reporting order.
pub fn check_line(tokens: &LineTokens<'_>, rule: &ValidationRule) -> Option<ErrorReason> {
    if let Some(pattern) = &rule.pattern {
        if !pattern.is_full_match(tokens.identifier) {
            return Some(ErrorReason::PatternMismatch);
        }
        return check_prefix(tokens, rule);
    }

    let count = tokens.digit_count();
    if count < rule.min_digits {
        return Some(ErrorReason::TooShort);
    }
    if count > rule.max_digits {
        return Some(ErrorReason::TooLong);
    }
    if !rule.allow_alphanumeric && !tokens.identifier.chars().all(|c| c.is_ascii_digit()) {
        return Some(ErrorReason::NonNumeric);
    }
    check_prefix(tokens, rule)
}

fn check_prefix(tokens: &LineTokens<'_>, rule: &ValidationRule) -> Option<ErrorReason> {
    if rule.prefix_required && !tokens.prefix.is_some_and(|p| rule.prefix_matches(p)) {
        return Some(ErrorReason::MissingPrefix);
    }
    None
}

/// Totals over a file's records. `total_lines` counts non-blank lines,
/// informational ones included.
pub fn summarize(records: &[EquipmentRecord], total_lines: u32) -> ValidationSummary {
    let id_lines = records.len() as u32;
    let valid_lines = records.iter().filter(|r| r.is_valid()).count() as u32;
    let failed_lines = id_lines - valid_lines;

    let status = if failed_lines == 0 && id_lines > 0 {
        ValidationStatus::Passed
    } else {
        ValidationStatus::Failed
    };
    let success_rate = if id_lines > 0 {
        (f64::from(valid_lines) / f64::from(id_lines) * 10_000.0).round() / 100.0
    } else {
        0.0
    };

    ValidationSummary {
        total_lines,
        id_lines,
        valid_lines,
        failed_lines,
        info_lines: total_lines.saturating_sub(id_lines),
        status,
        success_rate,
    }
}

/// Operator-facing text for an invalid record.
pub fn error_message(record: &EquipmentRecord, rule: &ValidationRule) -> String {
    match record.error_reason {
        None => String::new(),
        Some(ErrorReason::TooShort) => format!(
            "{} digits, minimum is {}",
            record.digit_count, rule.min_digits
        ),
        Some(ErrorReason::TooLong) => format!(
            "{} digits, maximum is {}",
            record.digit_count, rule.max_digits
        ),
        Some(ErrorReason::NonNumeric) => "identifier contains non-digit characters".into(),
        Some(ErrorReason::MissingPrefix) => format!("expected prefix {}", rule.prefix),
        Some(ErrorReason::PatternMismatch) => format!(
            "identifier does not match pattern {}",
            rule.pattern.as_ref().map_or("", |p| p.as_str())
        ),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::models::{ArchivePolicy, CourtDirectories, FtpPaths, TextPattern};

    pub(crate) fn profile(code: &str, min: u32, max: u32, prefix_required: bool) -> CourtProfile {
        CourtProfile {
            code: code.into(),
            name: format!("{code} Court"),
            enabled: true,
            rule: ValidationRule {
                min_digits: min,
                max_digits: max,
                prefix_required,
                prefix: code.into(),
                allow_alphanumeric: true,
                case_sensitive: false,
                pattern: None,
            },
            directories: CourtDirectories {
                input_dir: PathBuf::from(format!("/in/{code}")),
                output_dir: PathBuf::from(format!("/out/{code}")),
                processed_dir: PathBuf::from("/processed"),
                invalid_dir: PathBuf::from("/invalid"),
            },
            archive: ArchivePolicy::default(),
            ftp: FtpPaths::default(),
            content_tokens: vec![code.into()],
            routing_hints: Default::default(),
        }
    }

    fn ts() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn kem_thirteen_digits_is_valid() {
        let kem = profile("KEM", 9, 13, true);
        let report = validate_text("KEM\t4152500182618\tX", &kem, &[], "a.txt", ts());
        assert_eq!(report.records.len(), 1);
        let rec = &report.records[0];
        assert_eq!(rec.digit_count, 13);
        assert_eq!(rec.status, RecordStatus::Valid);
        assert_eq!(rec.court_code, "KEM");
        assert_eq!(report.summary.status, ValidationStatus::Passed);
    }

    #[test]
    fn kem_eight_digits_is_too_short() {
        let kem = profile("KEM", 9, 13, true);
        let report = validate_text("KEM\t12345678\tX", &kem, &[], "a.txt", ts());
        let rec = &report.records[0];
        assert_eq!(rec.digit_count, 8);
        assert_eq!(rec.status, RecordStatus::Invalid);
        assert_eq!(rec.error_reason, Some(ErrorReason::TooShort));
        assert_eq!(report.summary.status, ValidationStatus::Failed);
    }

    #[test]
    fn sea_eight_digits_is_valid() {
        let sea = profile("SEA", 8, 12, false);
        let report = validate_text("SEA\t12345678\tX", &sea, &[], "a.txt", ts());
        assert_eq!(report.records[0].status, RecordStatus::Valid);
        assert_eq!(report.records[0].court_code, "SEA");
    }

    #[test]
    fn error_reasons_follow_rule_order() {
        let mut rule = profile("KEM", 9, 13, true).rule;
        rule.allow_alphanumeric = false;

        let short = tokenize("TAC 1234", &[]).unwrap();
        assert_eq!(check_line(&short, &rule), Some(ErrorReason::TooShort));

        let long = tokenize("KEM 12345678901234", &[]).unwrap();
        assert_eq!(check_line(&long, &rule), Some(ErrorReason::TooLong));

        let alpha = tokenize("TAC X123456789", &[]).unwrap();
        assert_eq!(check_line(&alpha, &rule), Some(ErrorReason::NonNumeric));

        let unprefixed = tokenize("TAC 123456789", &[]).unwrap();
        assert_eq!(check_line(&unprefixed, &rule), Some(ErrorReason::MissingPrefix));

        let bare = tokenize("123456789 desk", &[]).unwrap();
        assert_eq!(check_line(&bare, &rule), Some(ErrorReason::MissingPrefix));
    }

    #[test]
    fn alphanumeric_identifiers_count_only_digits() {
        let kem = profile("KEM", 9, 13, true);
        let report = validate_text("KEM AB-123456789 printer", &kem, &[], "a.txt", ts());
        let rec = &report.records[0];
        assert_eq!(rec.digits, "123456789");
        assert!(rec.is_valid());
    }

    #[test]
    fn prefix_case_follows_rule() {
        let mut kem = profile("KEM", 9, 13, true);
        let line = "kem 123456789";
        assert!(validate_text(line, &kem, &[], "a.txt", ts()).records[0].is_valid());

        kem.rule.case_sensitive = true;
        let rec = &validate_text(line, &kem, &[], "a.txt", ts()).records[0];
        assert_eq!(rec.error_reason, Some(ErrorReason::MissingPrefix));
    }

    #[test]
    fn informational_lines_counted_not_recorded() {
        let kem = profile("KEM", 9, 13, true);
        let text = "Inventory batch 7\n\nKEM\t123456789\tDesk\nnotes: none\nKEM\t1234\tChair\n";
        let report = validate_text(text, &kem, &[], "a.txt", ts());

        let lines: Vec<u32> = report.records.iter().map(|r| r.line_number).collect();
        assert_eq!(lines, vec![3, 5]);
        let s = &report.summary;
        assert_eq!((s.total_lines, s.id_lines, s.info_lines), (4, 2, 2));
        assert_eq!((s.valid_lines, s.failed_lines), (1, 1));
        assert_eq!(s.success_rate, 50.0);
        assert_eq!(s.status, ValidationStatus::Failed);
    }

    #[test]
    fn file_without_identifiers_fails() {
        let kem = profile("KEM", 9, 13, true);
        let report = validate_text("just a memo\n", &kem, &[], "a.txt", ts());
        assert!(report.records.is_empty());
        assert_eq!(report.summary.status, ValidationStatus::Failed);
        assert_eq!(report.summary.success_rate, 0.0);
    }

    #[test]
    fn court_code_with_digits_is_a_prefix() {
        let kc9 = profile("KC9", 9, 13, true);
        let report = validate_text("KC9\t4152500182618\tX", &kc9, &[], "a.txt", ts());
        let rec = &report.records[0];
        assert_eq!(rec.equipment_id, "4152500182618");
        assert!(rec.is_valid());

        // Another court's prefix is recognised as a prefix, then rejected.
        let kem = profile("KEM", 9, 13, true);
        let known = vec!["KEM".to_string(), "KC9".to_string()];
        let rec = &validate_text("KC9 123456789", &kem, &known, "a.txt", ts()).records[0];
        assert_eq!(rec.equipment_id, "123456789");
        assert_eq!(rec.error_reason, Some(ErrorReason::MissingPrefix));
    }

    #[test]
    fn pattern_rule_replaces_digit_range() {
        let mut tac = profile("TAC", 9, 13, true);
        tac.rule.pattern = Some(TextPattern::new(r"[A-Z]{2}-\d{4}", false).unwrap());
        let text = "TAC ab-1234 scanner\nTAC AB-12345 dock\nXY-1234 loose\n";
        let report = validate_text(text, &tac, &[], "a.txt", ts());

        let reasons: Vec<Option<ErrorReason>> =
            report.records.iter().map(|r| r.error_reason).collect();
        assert_eq!(
            reasons,
            vec![None, Some(ErrorReason::PatternMismatch), Some(ErrorReason::MissingPrefix)]
        );
        assert_eq!(
            error_message(&report.records[1], &tac.rule),
            r"identifier does not match pattern [A-Z]{2}-\d{4}"
        );

        tac.rule.pattern = Some(TextPattern::new(r"[A-Z]{2}-\d{4}", true).unwrap());
        let rec = &validate_text("TAC ab-1234", &tac, &[], "a.txt", ts()).records[0];
        assert_eq!(rec.error_reason, Some(ErrorReason::PatternMismatch));
    }

    #[test]
    fn messages_name_the_limit() {
        let kem = profile("KEM", 9, 13, true);
        let report = validate_text("KEM 1234", &kem, &[], "a.txt", ts());
        assert_eq!(
            error_message(&report.records[0], &kem.rule),
            "4 digits, minimum is 9"
        );
    }
}
