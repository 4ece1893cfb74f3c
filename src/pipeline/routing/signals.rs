//! Raw classification signals for one file against each candidate court.
//!
//! Everything here is a pure function of the observation, the decoded text,
//! the court profile, the router settings and `now`. A court's routing hints
//! replace the code-based filename and path rules when configured.

use chrono::{DateTime, Duration, Utc};

use crate::config::RouterSettings;
use crate::models::{CourtProfile, FileObservation, RoutingSignal};
use crate::pipeline::validation::{numbered_lines, tokenize};

pub const WEIGHT_FILENAME: u32 = 50;
pub const WEIGHT_PATH: u32 = 30;
pub const WEIGHT_CONTENT_PER_MATCH: u32 = 3;
pub const WEIGHT_CONTENT_MAX: u32 = 10;
pub const WEIGHT_VALID_RATIO: u32 = 100;
pub const WEIGHT_RECENCY: u32 = 10;

/// Everything the extractor reads about one file.
#[derive(Debug, Clone, Copy)]
pub struct SignalInput<'a> {
    pub observation: &'a FileObservation,
    pub text: &'a str,
    /// Line prefixes of every configured court.
    pub known_prefixes: &'a [String],
    pub now: DateTime<Utc>,
}

pub fn extract_signal(
    input: &SignalInput<'_>,
    court: &CourtProfile,
    settings: &RouterSettings,
) -> RoutingSignal {
    RoutingSignal {
        filename_score: filename_score(
            input.observation.file_name(),
            &court.code,
            &court.routing_hints.filename_prefixes,
        ),
        path_score: path_score(input.observation, court),
        content_score: content_score(input.text, &court.content_tokens, settings.content_scan_lines),
        validation_ratio_score: validation_ratio_score(input.text, court, input.known_prefixes),
        recency_score: recency_score(
            input.observation.modified_at,
            input.now,
            settings.recency_window_days,
        ),
    }
}

/// Signals for every enabled court, in registry order.
pub fn extract_signals<'c>(
    input: &SignalInput<'_>,
    courts: impl IntoIterator<Item = &'c CourtProfile>,
    settings: &RouterSettings,
) -> Vec<(String, RoutingSignal)> {
    courts
        .into_iter()
        .filter(|c| c.enabled)
        .map(|c| (c.code.clone(), extract_signal(input, c, settings)))
        .collect()
}

/// +50 when the name starts with any configured prefix, or with the court
/// code when none are configured.
pub fn filename_score(file_name: &str, code: &str, prefixes: &[String]) -> u32 {
    let hit = if prefixes.is_empty() {
        starts_with_ignore_case(file_name, code)
    } else {
        prefixes.iter().any(|p| starts_with_ignore_case(file_name, p))
    };
    if hit {
        WEIGHT_FILENAME
    } else {
        0
    }
}

/// +30 when a configured path pattern is found in the inbox-qualified path,
/// or, with no patterns configured, when any segment of it contains the code.
pub fn path_score(observation: &FileObservation, court: &CourtProfile) -> u32 {
    let patterns = &court.routing_hints.path_patterns;
    let hit = if patterns.is_empty() {
        let needle = court.code.to_lowercase();
        observation
            .path_segments()
            .iter()
            .any(|seg| seg.to_lowercase().contains(&needle))
    } else {
        let path = observation.qualified_path();
        patterns.iter().any(|p| p.is_match(&path))
    };
    if hit {
        WEIGHT_PATH
    } else {
        0
    }
}

/// +3 per token occurrence in the scanned head of the text, capped.
pub fn content_score(text: &str, tokens: &[String], scan_lines: usize) -> u32 {
    let head = text
        .split('\n')
        .take(scan_lines)
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();

    let mut score = 0u32;
    for token in tokens.iter().filter(|t| !t.is_empty()) {
        let matches = head.matches(token.to_lowercase().as_str()).count() as u32;
        score = score.saturating_add(matches.saturating_mul(WEIGHT_CONTENT_PER_MATCH));
        if score >= WEIGHT_CONTENT_MAX {
            return WEIGHT_CONTENT_MAX;
        }
    }
    score
}

/// Share of digit-bearing lines whose identifier fits the court's rule, 0-100.
pub fn validation_ratio_score(text: &str, court: &CourtProfile, known_prefixes: &[String]) -> u32 {
    let mut candidates = 0u64;
    let mut in_range = 0u64;
    for (_, line) in numbered_lines(text) {
        if let Some(tokens) = tokenize(line, known_prefixes) {
            candidates += 1;
            if court.rule.accepts_identifier(tokens.identifier, tokens.digit_count()) {
                in_range += 1;
            }
        }
    }
    if candidates == 0 {
        return 0;
    }
    (in_range * u64::from(WEIGHT_VALID_RATIO) / candidates) as u32
}

/// Full points inside the window. Future mtimes count as recent.
pub fn recency_score(modified_at: DateTime<Utc>, now: DateTime<Utc>, window_days: u32) -> u32 {
    if now - modified_at <= Duration::days(i64::from(window_days)) {
        WEIGHT_RECENCY
    } else {
        0
    }
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack.is_char_boundary(prefix.len())
        && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::models::TextPattern;
    use crate::pipeline::validation::engine::tests::profile;

    fn obs(rel: &str, modified_at: DateTime<Utc>) -> FileObservation {
        obs_in("/inbox", rel, modified_at)
    }

    fn obs_in(inbox: &str, rel: &str, modified_at: DateTime<Utc>) -> FileObservation {
        FileObservation {
            inbox: PathBuf::from(inbox),
            relative_path: rel.into(),
            absolute_path: PathBuf::from(inbox).join(rel),
            size: 64,
            modified_at,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn filename_prefix_is_case_insensitive() {
        assert_eq!(filename_score("sea_0301.txt", "SEA", &[]), 50);
        assert_eq!(filename_score("SEATTLE.txt", "SEA", &[]), 50);
        assert_eq!(filename_score("report_SEA.txt", "SEA", &[]), 0);
        assert_eq!(filename_score("SE", "SEA", &[]), 0);
        assert_eq!(filename_score("ßEA.txt", "SEA", &[]), 0);
    }

    #[test]
    fn configured_filename_prefixes_replace_the_code() {
        let prefixes = vec!["SEA_".to_string(), "seattle-".to_string()];
        assert_eq!(filename_score("sea_0301.txt", "SEA", &prefixes), 50);
        assert_eq!(filename_score("Seattle-0301.txt", "SEA", &prefixes), 50);
        assert_eq!(filename_score("SEATTLE.txt", "SEA", &prefixes), 0);
    }

    #[test]
    fn path_covers_inbox_and_file_name() {
        let sea = profile("SEA", 8, 12, false);
        assert_eq!(path_score(&obs("drop/sea-court/x.txt", now()), &sea), 30);
        assert_eq!(path_score(&obs("drop/x_SEA.txt", now()), &sea), 30);
        assert_eq!(path_score(&obs("SEA.txt", now()), &sea), 30);
        assert_eq!(path_score(&obs("drop/x.txt", now()), &sea), 0);
        // A file directly in a court-named inbox.
        assert_eq!(path_score(&obs_in("/data/sea-inbox", "batch.txt", now()), &sea), 30);
    }

    #[test]
    fn configured_path_patterns_replace_the_code() {
        let mut sea = profile("SEA", 8, 12, false);
        sea.routing_hints.path_patterns = vec![TextPattern::new(r"/seattle/", false).unwrap()];
        assert_eq!(path_score(&obs_in("/srv/Seattle", "x.txt", now()), &sea), 30);
        assert_eq!(path_score(&obs_in("/data/sea-inbox", "x.txt", now()), &sea), 0);
    }

    #[test]
    fn content_counts_tokens_and_caps() {
        let tokens = vec!["SEA".to_string()];
        assert_eq!(content_score("sea 1\nSEA 2\n", &tokens, 100), 6);
        assert_eq!(content_score("SEA SEA SEA SEA", &tokens, 100), 10);
        assert_eq!(content_score("KEM 1", &tokens, 100), 0);
        // Only the scanned head counts.
        assert_eq!(content_score("x\ny\nSEA 3", &tokens, 2), 0);
    }

    #[test]
    fn content_matches_do_not_overlap() {
        let tokens = vec!["AA".to_string()];
        assert_eq!(content_score("AAA", &tokens, 100), 3);
    }

    #[test]
    fn ratio_uses_digit_bearing_lines() {
        let sea = profile("SEA", 8, 12, false);
        let text = "header\nSEA 12345678\nSEA 1234\nSEA 123456789012\nSEA 9\n";
        // 2 of 4 candidates in range.
        assert_eq!(validation_ratio_score(text, &sea, &[]), 50);
        assert_eq!(validation_ratio_score("no ids here", &sea, &[]), 0);

        let thirds = "SEA 12345678\nSEA 12345678\nSEA 1\n";
        assert_eq!(validation_ratio_score(thirds, &sea, &[]), 66);
    }

    #[test]
    fn ratio_honours_pattern_rules_and_known_prefixes() {
        let mut tac = profile("TAC", 8, 12, false);
        tac.rule.pattern = Some(TextPattern::new(r"T-\d{3}", false).unwrap());
        assert_eq!(validation_ratio_score("TAC t-123\nTAC T-12\n", &tac, &[]), 50);

        let kc9 = profile("KC9", 8, 12, false);
        let known = vec!["KC9".to_string()];
        assert_eq!(validation_ratio_score("KC9 12345678\n", &kc9, &known), 100);
        assert_eq!(validation_ratio_score("KC9 12345678\n", &kc9, &[]), 0);
    }

    #[test]
    fn recency_window_and_future_mtime() {
        let n = now();
        assert_eq!(recency_score(n - Duration::days(7), n, 7), 10);
        assert_eq!(recency_score(n - Duration::days(8), n, 7), 0);
        assert_eq!(recency_score(n + Duration::days(2), n, 7), 10);
    }

    #[test]
    fn signals_skip_disabled_courts_and_are_deterministic() {
        let sea = profile("SEA", 8, 12, false);
        let mut tac = profile("TAC", 8, 12, false);
        tac.enabled = false;
        let o = obs("sea/SEA_0301.txt", now());
        let input = SignalInput {
            observation: &o,
            text: "SEA\t12345678\tX",
            known_prefixes: &[],
            now: now(),
        };
        let settings = RouterSettings::default();

        let first = extract_signals(&input, [&sea, &tac], &settings);
        let second = extract_signals(&input, [&sea, &tac], &settings);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        let (code, signal) = &first[0];
        assert_eq!(code, "SEA");
        assert_eq!(
            *signal,
            RoutingSignal {
                filename_score: 50,
                path_score: 30,
                content_score: 3,
                validation_ratio_score: 100,
                recency_score: 10,
            }
        );
        assert_eq!(signal.total(), 193);
    }
}
