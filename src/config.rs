//! Application constants and the court configuration document.
//!
//! The JSON document is read once at startup and resolved into an immutable
//! [`ResolvedConfig`]; nothing re-reads it while the process runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    ArchivePolicy, CourtDirectories, CourtProfile, CourtRegistry, FtpPaths, RouterMode,
    RoutingHints, TextPattern, ValidationRule,
};

/// Application-level constants
pub const APP_NAME: &str = "Courtgate";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "COURTGATE_CONFIG";
pub const CONFIG_FILE_NAME: &str = "courts_config.json";
pub const DATABASE_FILE_NAME: &str = "courtgate.db";

/// Court used when no configuration file exists.
pub const FALLBACK_COURT: &str = "KEM";

/// Default tracing filter when RUST_LOG is not set.
pub fn default_log_filter() -> &'static str {
    "info,courtgate_lib=debug"
}

/// Get the application data directory
/// ~/Courtgate/ when a home directory exists, the working directory otherwise.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Where the configuration document is looked up.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| app_data_dir().join(CONFIG_FILE_NAME))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No courts configured")]
    NoCourts,

    #[error("Default court '{0}' not found in courts configuration")]
    UnknownDefaultCourt(String),

    #[error("Invalid court code '{0}': need 3+ ASCII letters, digits or underscores")]
    InvalidCourtCode(String),

    #[error("Court {code} has invalid digit range {min}-{max}")]
    InvalidDigitRange { code: String, min: u32, max: u32 },

    #[error("Court {code} has FTP enabled but is missing {field}")]
    MissingFtpPath { code: String, field: &'static str },

    #[error("Court '{0}' listed in court_priority is not configured")]
    UnknownPriorityCourt(String),

    #[error("Court {code} has invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        code: String,
        pattern: String,
        reason: String,
    },

    #[error("Invalid router setting: {0}")]
    InvalidRouter(String),
}

// ═══════════════════════════════════════════
// Document shape
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub default_court: String,
    #[serde(default)]
    pub court_priority: Vec<String>,
    pub courts: BTreeMap<String, CourtConfig>,
    #[serde(default)]
    pub router: RouterSettings,
    #[serde(default)]
    pub processing: ProcessingSettings,
    #[serde(default, alias = "global_settings")]
    pub global: GlobalSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourtConfig {
    pub name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    pub validation_rules: ValidationRulesConfig,
    pub directories: DirectoriesConfig,
    #[serde(default)]
    pub ftp_config: FtpConfig,
    #[serde(default)]
    pub archive: ArchivePolicy,
    /// Tokens the content signal counts. Defaults to the court code.
    #[serde(default)]
    pub content_tokens: Option<Vec<String>>,
    #[serde(default)]
    pub routing_hints: RoutingHintsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRulesConfig {
    pub min_digits: u32,
    pub max_digits: u32,
    pub prefix_required: bool,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_true")]
    pub allow_alphanumeric: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    /// Regular expression each identifier must match in full. Replaces the
    /// digit-range check when set.
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingHintsConfig {
    pub filename_prefixes: Vec<String>,
    pub path_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoriesConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub invalid_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FtpConfig {
    pub enabled: bool,
    pub base_path: Option<String>,
    pub inbox_path: Option<String>,
    pub results_path: Option<String>,
    pub processed_path: Option<String>,
    pub invalid_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    pub enable_content_based_routing: bool,
    pub router_mode: RouterMode,
    pub quarantine_dir: PathBuf,
    pub routing_threshold: u32,
    pub routing_margin: u32,
    pub recency_window_days: u32,
    pub content_scan_lines: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            enable_content_based_routing: false,
            router_mode: RouterMode::Off,
            quarantine_dir: PathBuf::from("quarantine"),
            routing_threshold: 80,
            routing_margin: 20,
            recency_window_days: 7,
            content_scan_lines: 100,
        }
    }
}

impl RouterSettings {
    /// Mode actually in force: the routing switch overrides the named mode.
    pub fn effective_mode(&self) -> RouterMode {
        if self.enable_content_based_routing {
            self.router_mode
        } else {
            RouterMode::Off
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    pub poll_interval_secs: u64,
    pub batch_size: usize,
    pub file_timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            batch_size: 10,
            file_timeout_secs: 120,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    /// Base for every relative directory in the document. Defaults to the
    /// directory holding the configuration file.
    pub archive_base_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

// ═══════════════════════════════════════════
// Resolution
// ═══════════════════════════════════════════

/// Validated configuration with absolute paths, shared read-only.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub registry: CourtRegistry,
    pub router: RouterSettings,
    pub processing: ProcessingSettings,
    pub database_path: PathBuf,
    pub base_dir: PathBuf,
}

/// Load the configuration at `path`, or the built-in single-court
/// configuration when no file exists there.
pub fn load_config(path: &Path) -> Result<ResolvedConfig, ConfigError> {
    let fallback_base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(app_data_dir);

    if !path.exists() {
        tracing::warn!(path = %path.display(), "Courts config not found, using default court");
        return AppConfig::fallback().resolve(&fallback_base);
    }

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: AppConfig = serde_json::from_str(&raw)?;
    let resolved = config.resolve(&fallback_base)?;
    tracing::info!(
        path = %path.display(),
        courts = resolved.registry.len(),
        default = resolved.registry.default_code(),
        mode = %resolved.router.effective_mode(),
        "Loaded courts configuration"
    );
    Ok(resolved)
}

impl AppConfig {
    /// Single enabled KEM court: 9–13 digits, prefix required.
    pub fn fallback() -> Self {
        let mut courts = BTreeMap::new();
        courts.insert(
            FALLBACK_COURT.to_string(),
            CourtConfig {
                name: Some("Kirkland Court".into()),
                full_name: Some("Kirkland Equipment Management".into()),
                enabled: true,
                validation_rules: ValidationRulesConfig {
                    min_digits: 9,
                    max_digits: 13,
                    prefix_required: true,
                    prefix: Some(FALLBACK_COURT.into()),
                    allow_alphanumeric: true,
                    case_sensitive: false,
                    pattern: None,
                },
                directories: DirectoriesConfig {
                    input_dir: "kem-inbox".into(),
                    output_dir: "kem-results".into(),
                    processed_dir: "processed-archive".into(),
                    invalid_dir: "invalid-archive".into(),
                },
                ftp_config: FtpConfig::default(),
                archive: ArchivePolicy::default(),
                content_tokens: None,
                routing_hints: RoutingHintsConfig::default(),
            },
        );
        Self {
            default_court: FALLBACK_COURT.into(),
            court_priority: Vec::new(),
            courts,
            router: RouterSettings::default(),
            processing: ProcessingSettings::default(),
            global: GlobalSettings::default(),
        }
    }

    /// Validate every court and turn the document into a [`ResolvedConfig`].
    /// `fallback_base` anchors relative paths when `archive_base_dir` is unset.
    pub fn resolve(self, fallback_base: &Path) -> Result<ResolvedConfig, ConfigError> {
        if self.courts.is_empty() {
            return Err(ConfigError::NoCourts);
        }
        if !self.courts.contains_key(&self.default_court) {
            return Err(ConfigError::UnknownDefaultCourt(self.default_court));
        }
        for code in &self.court_priority {
            if !self.courts.contains_key(code) {
                return Err(ConfigError::UnknownPriorityCourt(code.clone()));
            }
        }
        if self.processing.batch_size == 0 {
            return Err(ConfigError::InvalidRouter("batch_size must be at least 1".into()));
        }

        let base_dir = match &self.global.archive_base_dir {
            Some(dir) => absolutize(fallback_base, dir),
            None => fallback_base.to_path_buf(),
        };

        // court_priority first, then the rest alphabetically (BTreeMap order).
        let mut order: Vec<&String> = self.court_priority.iter().collect();
        for code in self.courts.keys() {
            if !order.contains(&code) {
                order.push(code);
            }
        }

        let mut profiles = Vec::with_capacity(order.len());
        for code in order {
            let court = &self.courts[code];
            profiles.push(court.to_profile(code, &base_dir)?);
        }

        let registry = CourtRegistry::new(profiles, &self.default_court)
            .ok_or_else(|| ConfigError::UnknownDefaultCourt(self.default_court.clone()))?;

        let mut router = self.router;
        router.quarantine_dir = absolutize(&base_dir, &router.quarantine_dir);

        let database_path = match &self.global.database_path {
            Some(p) => absolutize(&base_dir, p),
            None => base_dir.join(DATABASE_FILE_NAME),
        };

        Ok(ResolvedConfig {
            registry,
            router,
            processing: self.processing,
            database_path,
            base_dir,
        })
    }
}

impl CourtConfig {
    fn to_profile(&self, code: &str, base_dir: &Path) -> Result<CourtProfile, ConfigError> {
        if code.len() < 3 || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::InvalidCourtCode(code.to_string()));
        }

        let rules = &self.validation_rules;
        if rules.min_digits < 1 || rules.max_digits < rules.min_digits {
            return Err(ConfigError::InvalidDigitRange {
                code: code.to_string(),
                min: rules.min_digits,
                max: rules.max_digits,
            });
        }

        let ftp = &self.ftp_config;
        if ftp.enabled {
            for (field, value) in [
                ("base_path", &ftp.base_path),
                ("inbox_path", &ftp.inbox_path),
                ("results_path", &ftp.results_path),
            ] {
                if value.is_none() {
                    return Err(ConfigError::MissingFtpPath {
                        code: code.to_string(),
                        field,
                    });
                }
            }
        }

        let compile = |source: &str, case_sensitive: bool| {
            TextPattern::new(source, case_sensitive).map_err(|e| ConfigError::InvalidPattern {
                code: code.to_string(),
                pattern: source.to_string(),
                reason: e.to_string(),
            })
        };
        let pattern = rules
            .pattern
            .as_deref()
            .map(|p| compile(p, rules.case_sensitive))
            .transpose()?;
        let path_patterns = self
            .routing_hints
            .path_patterns
            .iter()
            .map(|p| compile(p, false))
            .collect::<Result<Vec<_>, _>>()?;

        let dirs = &self.directories;
        Ok(CourtProfile {
            code: code.to_string(),
            name: self.name.clone().unwrap_or_else(|| code.to_string()),
            enabled: self.enabled,
            rule: ValidationRule {
                min_digits: rules.min_digits,
                max_digits: rules.max_digits,
                prefix_required: rules.prefix_required,
                prefix: rules.prefix.clone().unwrap_or_else(|| code.to_string()),
                allow_alphanumeric: rules.allow_alphanumeric,
                case_sensitive: rules.case_sensitive,
                pattern,
            },
            directories: CourtDirectories {
                input_dir: absolutize(base_dir, &dirs.input_dir),
                output_dir: absolutize(base_dir, &dirs.output_dir),
                processed_dir: absolutize(base_dir, &dirs.processed_dir),
                invalid_dir: absolutize(base_dir, &dirs.invalid_dir),
            },
            archive: self.archive.clone(),
            ftp: FtpPaths {
                enabled: ftp.enabled,
                inbox: ftp.inbox_path.clone(),
                results: ftp.results_path.clone(),
                processed: ftp.processed_path.clone(),
                invalid: ftp.invalid_path.clone(),
            },
            content_tokens: self
                .content_tokens
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| vec![code.to_string()]),
            routing_hints: RoutingHints {
                filename_prefixes: self
                    .routing_hints
                    .filename_prefixes
                    .iter()
                    .filter(|p| !p.is_empty())
                    .cloned()
                    .collect(),
                path_patterns,
            },
        })
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
