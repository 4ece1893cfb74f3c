use std::path::PathBuf;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// A configured regular expression, compiled once.
///
/// Compares and serializes as its source text and case flag.
#[derive(Debug, Clone)]
pub struct TextPattern {
    source: String,
    case_sensitive: bool,
    search: Regex,
    whole: Regex,
}

#[derive(Clone, Serialize, Deserialize)]
struct PatternSource {
    pattern: String,
    case_sensitive: bool,
}

impl TextPattern {
    pub fn new(source: &str, case_sensitive: bool) -> Result<Self, regex::Error> {
        let build = |expr: &str| {
            RegexBuilder::new(expr)
                .case_insensitive(!case_sensitive)
                .build()
        };
        Ok(Self {
            source: source.to_string(),
            case_sensitive,
            search: build(source)?,
            whole: build(&format!("^(?:{source})$"))?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the pattern matches anywhere in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.search.is_match(text)
    }

    /// True when the pattern matches all of `text`.
    pub fn is_full_match(&self, text: &str) -> bool {
        self.whole.is_match(text)
    }
}

impl PartialEq for TextPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.case_sensitive == other.case_sensitive
    }
}

impl Eq for TextPattern {}

impl Serialize for TextPattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PatternSource {
            pattern: self.source.clone(),
            case_sensitive: self.case_sensitive,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TextPattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = PatternSource::deserialize(deserializer)?;
        Self::new(&raw.pattern, raw.case_sensitive).map_err(serde::de::Error::custom)
    }
}

/// Rule applied to every identifier line of a court's files.
///
/// With a `pattern` the identifier must match it in full and the digit range
/// is not consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub min_digits: u32,
    pub max_digits: u32,
    pub prefix_required: bool,
    /// Token expected in front of each identifier. Defaults to the court code.
    pub prefix: String,
    /// When false, identifiers holding anything but digits fail as `non_numeric`.
    pub allow_alphanumeric: bool,
    pub case_sensitive: bool,
    pub pattern: Option<TextPattern>,
}

impl ValidationRule {
    pub fn accepts_digit_count(&self, count: u32) -> bool {
        (self.min_digits..=self.max_digits).contains(&count)
    }

    /// Whether an identifier passes the rule's shape check: the pattern when
    /// one is set, the digit range otherwise.
    pub fn accepts_identifier(&self, identifier: &str, digit_count: u32) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.is_full_match(identifier),
            None => self.accepts_digit_count(digit_count),
        }
    }

    pub fn prefix_matches(&self, token: &str) -> bool {
        if self.case_sensitive {
            token == self.prefix
        } else {
            token.eq_ignore_ascii_case(&self.prefix)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtDirectories {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub invalid_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivePolicy {
    /// Move validated files out of the inbox into the court archive.
    pub archive_processed: bool,
    pub retention_days: u32,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            archive_processed: true,
            retention_days: 365,
        }
    }
}

/// Remote locations used by the FTP transport. Carried for completeness;
/// the transport itself lives outside this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FtpPaths {
    pub enabled: bool,
    pub inbox: Option<String>,
    pub results: Option<String>,
    pub processed: Option<String>,
    pub invalid: Option<String>,
}

/// Per-court overrides for the filename and path signals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingHints {
    /// Filename prefixes matched case-insensitively. Empty means the court code.
    pub filename_prefixes: Vec<String>,
    /// Searched in the inbox-qualified path, case-insensitively. Empty means
    /// any path segment containing the court code.
    pub path_patterns: Vec<TextPattern>,
}

/// A court processing profile. Immutable once the registry is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtProfile {
    pub code: String,
    pub name: String,
    pub enabled: bool,
    pub rule: ValidationRule,
    pub directories: CourtDirectories,
    pub archive: ArchivePolicy,
    pub ftp: FtpPaths,
    /// Literal tokens counted by the content signal.
    pub content_tokens: Vec<String>,
    pub routing_hints: RoutingHints,
}

/// The resolved, ordered set of courts for one process lifetime.
///
/// Order is the configured court priority and doubles as the classifier's
/// tie-break order.
#[derive(Debug, Clone)]
pub struct CourtRegistry {
    courts: Vec<Arc<CourtProfile>>,
    default_index: usize,
}

impl CourtRegistry {
    /// Returns `None` when `courts` is empty or `default_code` is not among them.
    pub fn new(courts: Vec<CourtProfile>, default_code: &str) -> Option<Self> {
        let default_index = courts.iter().position(|c| c.code == default_code)?;
        Some(Self {
            courts: courts.into_iter().map(Arc::new).collect(),
            default_index,
        })
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<CourtProfile>> {
        self.courts.iter()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Arc<CourtProfile>> {
        self.courts.iter().filter(|c| c.enabled)
    }

    pub fn get(&self, code: &str) -> Option<&Arc<CourtProfile>> {
        self.courts.iter().find(|c| c.code.eq_ignore_ascii_case(code))
    }

    /// Line prefixes of every configured court, enabled or not.
    pub fn prefixes(&self) -> Vec<String> {
        self.courts.iter().map(|c| c.rule.prefix.clone()).collect()
    }

    pub fn default_code(&self) -> &str {
        &self.courts[self.default_index].code
    }

    pub fn default_court(&self) -> &Arc<CourtProfile> {
        &self.courts[self.default_index]
    }

    /// Position in the configured order; unknown codes sort last.
    pub fn rank(&self, code: &str) -> usize {
        self.courts
            .iter()
            .position(|c| c.code == code)
            .unwrap_or(usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.courts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courts.is_empty()
    }
}
