//! File processing orchestrator.
//!
//! Drives one observed file through the lifecycle
//! `Received → Scored → {Routed | Quarantined | ShadowLogged} → Ledgered → Done`
//! (`Received → Routed` directly when routing is off). All store writes for a
//! file share one transaction with its ledger entry, so a worker that loses
//! the ledger race leaves nothing behind. Exports, archives and quarantine
//! moves happen inside that transaction and are undone if it does not commit.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::config::ResolvedConfig;
use crate::db::{self, DatabaseError};
use crate::models::{
    Classification, CourtProfile, FileObservation, LedgerOutcome, ProcessingRecord, RouterMode,
    RoutingAction, RoutingDecision, RoutingOutcome, ValidationSummary,
};
use crate::pipeline::archive::{archive_file, move_file};
use crate::pipeline::intake::{ImportError, TextExtractor};
use crate::pipeline::ledger::{self, LedgerCheck};
use crate::pipeline::quarantine::quarantine_file;
use crate::pipeline::routing::{route, SignalInput};
use crate::pipeline::validation::{validate_text, write_export, ValidationReport};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during file processing.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Processing cancelled before commit")]
    Cancelled,

    #[error("Illegal lifecycle transition {from:?} -> {to:?}")]
    IllegalTransition { from: Stage, to: Stage },

    #[error("Court {0} is not configured")]
    UnknownCourt(String),
}

impl From<rusqlite::Error> for ProcessingError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Received,
    Scored,
    Routed,
    Quarantined,
    ShadowLogged,
    Ledgered,
    Done,
}

/// Per-file state machine. Rejects any step the mode does not allow.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    mode: RouterMode,
    stages: Vec<Stage>,
}

impl Lifecycle {
    pub fn new(mode: RouterMode) -> Self {
        Self {
            mode,
            stages: vec![Stage::Received],
        }
    }

    pub fn current(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Received)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn advance(&mut self, to: Stage) -> Result<(), ProcessingError> {
        let from = self.current();
        let routing_off = self.mode == RouterMode::Off;
        let allowed = match (from, to) {
            (Stage::Received, Stage::Routed) => routing_off,
            (Stage::Received, Stage::Scored) => !routing_off,
            (Stage::Scored, Stage::ShadowLogged) => self.mode == RouterMode::Shadow,
            (Stage::Scored, Stage::Routed | Stage::Quarantined) => self.mode == RouterMode::Enforce,
            (Stage::Routed | Stage::Quarantined | Stage::ShadowLogged, Stage::Ledgered) => true,
            (Stage::Ledgered, Stage::Done) => true,
            _ => false,
        };
        if !allowed {
            return Err(ProcessingError::IllegalTransition { from, to });
        }
        self.stages.push(to);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Disposition {
    /// Validated and ledgered by this call.
    Validated,
    /// Moved to quarantine and ledgered by this call.
    Quarantined,
    /// Key was already in the ledger; no work done.
    AlreadyProcessed,
    /// Another worker ledgered the key first; this call's writes rolled back.
    LostRace,
}

/// Summary of one `process` call.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub idempotency_key: String,
    pub file: String,
    pub disposition: Disposition,
    pub court_code: Option<String>,
    pub action: Option<RoutingAction>,
    pub summary: Option<ValidationSummary>,
    pub records: usize,
    pub stages: Vec<Stage>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Filesystem changes made for a file whose transaction is still open.
#[derive(Debug, Default)]
struct Placed {
    created: Vec<PathBuf>,
    /// `(original, destination)` of the source file.
    moved: Option<(PathBuf, PathBuf)>,
}

impl Placed {
    /// Put the source file back and delete what was written.
    fn revert(self) {
        if let Some((original, dest)) = &self.moved {
            if let Err(e) = move_file(dest, original) {
                tracing::error!(
                    file = %original.display(),
                    from = %dest.display(),
                    error = %e,
                    "Could not restore file after rollback"
                );
            }
        }
        for path in &self.created {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "Could not remove output after rollback");
            }
        }
    }
}

/// Where the file goes after routing.
enum Placement {
    Validate { court: Arc<CourtProfile> },
    Quarantine,
}

/// Processes observed files against the resolved court configuration.
///
/// Holds no connection: each call gets one from its worker.
pub struct FileProcessor {
    config: Arc<ResolvedConfig>,
    extractor: Box<dyn TextExtractor + Send + Sync>,
}

impl FileProcessor {
    pub fn new(config: Arc<ResolvedConfig>, extractor: Box<dyn TextExtractor + Send + Sync>) -> Self {
        Self { config, extractor }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn extractor(&self) -> &(dyn TextExtractor + Send + Sync) {
        self.extractor.as_ref()
    }

    /// Process one file end to end.
    ///
    /// `cancel` is checked before the first filesystem change and again just
    /// before commit; once set, nothing is ledgered and the file stays in the
    /// inbox.
    pub fn process(
        &self,
        conn: &Connection,
        observation: &FileObservation,
        cancel: &AtomicBool,
        now: DateTime<Utc>,
    ) -> Result<FileOutcome, ProcessingError> {
        let key = ledger::idempotency_key(observation);
        let mode = self.config.router.effective_mode();
        let mut lifecycle = Lifecycle::new(mode);

        if ledger::check(conn, &key)? == LedgerCheck::Seen {
            tracing::debug!(file = %observation.relative_path, "Already ledgered");
            return Ok(self.outcome(&key, observation, Disposition::AlreadyProcessed, None, None, None, &lifecycle));
        }

        tracing::info!(file = %observation.relative_path, mode = %mode, "Processing file");
        let extracted = self.extractor.extract(observation)?;

        let registry = &self.config.registry;
        let prefixes = registry.prefixes();
        let (placement, decision) = if mode == RouterMode::Off {
            lifecycle.advance(Stage::Routed)?;
            (
                Placement::Validate {
                    court: registry.default_court().clone(),
                },
                None,
            )
        } else {
            lifecycle.advance(Stage::Scored)?;
            let classification = route(
                &SignalInput {
                    observation,
                    text: &extracted.text,
                    known_prefixes: &prefixes,
                    now,
                },
                registry,
                &self.config.router,
            );
            self.place(mode, classification, observation, &key, now, &mut lifecycle)?
        };

        if cancel.load(Ordering::Relaxed) {
            return Err(ProcessingError::Cancelled);
        }

        let tx = conn.unchecked_transaction()?;
        if let Some(decision) = &decision {
            db::insert_routing_decision(&tx, decision)?;
        }

        let routed = decision
            .as_ref()
            .and_then(|d| d.chosen_court())
            .map(str::to_string);
        let router_scores = decision
            .as_ref()
            .map(|d| d.classification.scores_json())
            .transpose()?;

        let (disposition, court_code, summary, record_count, placed) = match placement {
            Placement::Quarantine => {
                let record = ProcessingRecord {
                    file_name: observation.file_name().to_string(),
                    summary: None,
                    csv_path: None,
                    file_hash: Some(extracted.content_hash.clone()),
                    court_code: registry.default_code().to_string(),
                    routed_court_code: None,
                    routing_confidence: decision.as_ref().map(|d| d.confidence()),
                    routing_explanation: decision.as_ref().map(|d| d.explanation().to_string()),
                    router_scores,
                    idempotency_key: key.clone(),
                    router_mode: mode,
                    quarantined: true,
                };
                let processing_id = db::insert_processing_record(&tx, &record)?;
                if !ledger::record(&tx, observation, &key, LedgerOutcome::Quarantined, None, Some(processing_id))? {
                    return Ok(self.lost_race(tx, &key, observation, decision, &lifecycle));
                }
                db::clear_failure(&tx, &key)?;
                if cancel.load(Ordering::Relaxed) {
                    return Err(ProcessingError::Cancelled);
                }
                let classification = decision
                    .as_ref()
                    .map(|d| &d.classification)
                    .ok_or(ProcessingError::IllegalTransition {
                        from: Stage::Scored,
                        to: Stage::Quarantined,
                    })?;
                let receipt =
                    quarantine_file(observation, classification, &self.config.router.quarantine_dir, now)?;
                let placed = Placed {
                    created: vec![receipt.report],
                    moved: Some((observation.absolute_path.clone(), receipt.file)),
                };
                (Disposition::Quarantined, None, None, 0, placed)
            }
            Placement::Validate { court } => {
                let report = validate_text(
                    &extracted.text,
                    &court,
                    &prefixes,
                    observation.file_name(),
                    now.naive_utc(),
                );
                let record = ProcessingRecord {
                    file_name: observation.file_name().to_string(),
                    summary: Some(report.summary.clone()),
                    csv_path: None,
                    file_hash: Some(extracted.content_hash.clone()),
                    court_code: court.code.clone(),
                    routed_court_code: routed.clone(),
                    routing_confidence: decision.as_ref().map(|d| d.confidence()),
                    routing_explanation: decision.as_ref().map(|d| d.explanation().to_string()),
                    router_scores,
                    idempotency_key: key.clone(),
                    router_mode: mode,
                    quarantined: false,
                };
                let processing_id = db::insert_processing_record(&tx, &record)?;
                db::insert_equipment_records(&tx, processing_id, &report.records)?;
                if !ledger::record(
                    &tx,
                    observation,
                    &key,
                    LedgerOutcome::Validated,
                    Some(&court.code),
                    Some(processing_id),
                )? {
                    return Ok(self.lost_race(tx, &key, observation, decision, &lifecycle));
                }
                db::clear_failure(&tx, &key)?;
                if cancel.load(Ordering::Relaxed) {
                    return Err(ProcessingError::Cancelled);
                }
                let placed = self.finish_validated(&tx, processing_id, &report, &court, observation, now)?;
                (
                    Disposition::Validated,
                    Some(court.code.clone()),
                    Some(report.summary),
                    report.records.len(),
                    placed,
                )
            }
        };

        if cancel.load(Ordering::Relaxed) {
            placed.revert();
            return Err(ProcessingError::Cancelled);
        }
        if let Err(e) = tx.commit() {
            placed.revert();
            return Err(e.into());
        }
        lifecycle.advance(Stage::Ledgered)?;
        lifecycle.advance(Stage::Done)?;

        tracing::info!(
            file = %observation.relative_path,
            court = court_code.as_deref().unwrap_or("-"),
            disposition = ?disposition,
            records = record_count,
            "File processed"
        );

        Ok(FileOutcome {
            idempotency_key: key,
            file: observation.relative_path.clone(),
            disposition,
            court_code,
            action: decision.map(|d| d.action),
            summary,
            records: record_count,
            stages: lifecycle.stages().to_vec(),
        })
    }

    /// Turn a classification into a placement under `shadow` or `enforce`.
    fn place(
        &self,
        mode: RouterMode,
        classification: Classification,
        observation: &FileObservation,
        key: &str,
        now: DateTime<Utc>,
        lifecycle: &mut Lifecycle,
    ) -> Result<(Placement, Option<RoutingDecision>), ProcessingError> {
        let registry = &self.config.registry;
        let (placement, action) = match (mode, classification.outcome) {
            (RouterMode::Enforce, RoutingOutcome::Confirmed) => {
                lifecycle.advance(Stage::Routed)?;
                let code = classification.chosen_court().unwrap_or_default();
                let court = registry
                    .get(code)
                    .cloned()
                    .ok_or_else(|| ProcessingError::UnknownCourt(code.to_string()))?;
                (Placement::Validate { court }, RoutingAction::Routed)
            }
            (RouterMode::Enforce, RoutingOutcome::Unknown | RoutingOutcome::Ambiguous) => {
                lifecycle.advance(Stage::Quarantined)?;
                (Placement::Quarantine, RoutingAction::Quarantined)
            }
            _ => {
                lifecycle.advance(Stage::ShadowLogged)?;
                (
                    Placement::Validate {
                        court: registry.default_court().clone(),
                    },
                    RoutingAction::ShadowLogged,
                )
            }
        };

        tracing::info!(
            file = %observation.relative_path,
            outcome = %classification.outcome,
            action = %action,
            explanation = %classification.explanation,
            "Routing decision"
        );

        let decision = RoutingDecision {
            id: Uuid::new_v4(),
            idempotency_key: key.to_string(),
            file_path: observation.relative_path.clone(),
            file_name: observation.file_name().to_string(),
            classification,
            mode,
            action,
            decided_at: now.naive_utc(),
        };
        Ok((placement, Some(decision)))
    }

    /// Write the export, point the history row at it, then archive the source.
    /// Anything already placed is undone when a later step fails.
    fn finish_validated(
        &self,
        conn: &Connection,
        processing_id: i64,
        report: &ValidationReport,
        court: &CourtProfile,
        observation: &FileObservation,
        now: DateTime<Utc>,
    ) -> Result<Placed, ProcessingError> {
        let mut placed = Placed::default();
        let result = (|| -> Result<(), ProcessingError> {
            let csv_path = write_export(report, court, observation.file_name(), now)?;
            placed.created.push(csv_path.clone());
            db::set_history_csv_path(conn, processing_id, &csv_path.to_string_lossy())?;
            if court.archive.archive_processed {
                let dest = archive_file(
                    &observation.absolute_path,
                    observation.file_name(),
                    court,
                    report.summary.status,
                    now,
                )?;
                placed.moved = Some((observation.absolute_path.clone(), dest));
            }
            Ok(())
        })();
        match result {
            Ok(()) => Ok(placed),
            Err(e) => {
                placed.revert();
                Err(e)
            }
        }
    }

    fn lost_race(
        &self,
        tx: rusqlite::Transaction<'_>,
        key: &str,
        observation: &FileObservation,
        decision: Option<RoutingDecision>,
        lifecycle: &Lifecycle,
    ) -> FileOutcome {
        drop(tx);
        let decision = decision.map(|mut d| {
            d.action = RoutingAction::Skipped;
            d
        });
        if let Some(d) = &decision {
            tracing::info!(
                file = %observation.relative_path,
                decision = %d.id,
                action = %d.action,
                "Lost ledger race, decision discarded"
            );
        }
        self.outcome(
            key,
            observation,
            Disposition::LostRace,
            None,
            None,
            decision.map(|d| d.action),
            lifecycle,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn outcome(
        &self,
        key: &str,
        observation: &FileObservation,
        disposition: Disposition,
        court_code: Option<String>,
        summary: Option<ValidationSummary>,
        action: Option<RoutingAction>,
        lifecycle: &Lifecycle,
    ) -> FileOutcome {
        FileOutcome {
            idempotency_key: key.to_string(),
            file: observation.relative_path.clone(),
            disposition,
            court_code,
            action,
            summary,
            records: 0,
            stages: lifecycle.stages().to_vec(),
        }
    }
}
