//! Inbox poller: periodic cycles over every enabled court's inbox.
//!
//! A background thread owns a tokio runtime and wakes every
//! `poll_interval_secs`. Each cycle feeds unledgered files to a worker pool
//! bounded by `batch_size`; every file runs on the blocking pool with its own
//! SQLite connection under `file_timeout_secs`.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::archive::sweep_expired;
use super::intake::scan_inbox;
use super::ledger::idempotency_key;
use super::processor::{Disposition, FileOutcome, FileProcessor, ProcessingError};
use crate::db::{self, open_connection};
use crate::models::FileObservation;

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY_SECS: u64 = 1;

/// Tallies for one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub skipped: usize,
    pub validated: usize,
    pub quarantined: usize,
    pub already_processed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub swept: usize,
}

enum FileResult {
    Done(FileOutcome),
    Failed,
    TimedOut,
}

/// Handle for the poller thread. Dropping it stops the poller and waits for
/// the current cycle to finish.
pub struct PollerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop scheduling new cycles. A cycle in progress runs to completion.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Start polling on a separate thread. The first cycle runs immediately.
pub fn start_poller(processor: Arc<FileProcessor>) -> PollerHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("courtgate-worker")
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start worker runtime, poller not running");
                return;
            }
        };
        tracing::info!(
            interval_secs = processor.config().processing.poll_interval_secs,
            batch_size = processor.config().processing.batch_size,
            "Inbox poller started"
        );
        poller_loop(&runtime, &processor, &flag);
    });

    PollerHandle {
        shutdown,
        handle: Some(handle),
    }
}

fn poller_loop(runtime: &tokio::runtime::Runtime, processor: &Arc<FileProcessor>, shutdown: &AtomicBool) {
    let interval = processor.config().processing.poll_interval_secs.max(1);
    while !shutdown.load(Ordering::Relaxed) {
        let report = runtime.block_on(run_cycle(processor.clone()));
        if report.scanned > 0 || report.swept > 0 {
            tracing::info!(?report, "Poll cycle finished");
        }

        for _ in 0..(interval / SLEEP_GRANULARITY_SECS) {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            std::thread::sleep(Duration::from_secs(SLEEP_GRANULARITY_SECS));
        }
    }
    tracing::info!("Inbox poller shutting down");
}

/// Run one polling cycle to completion.
pub async fn run_cycle(processor: Arc<FileProcessor>) -> CycleReport {
    let mut report = CycleReport::default();

    let scan = {
        let p = processor.clone();
        tokio::task::spawn_blocking(move || collect_candidates(&p)).await
    };
    let candidates = match scan {
        Ok(Ok((candidates, scanned))) => {
            report.scanned = scanned;
            report.skipped = scanned - candidates.len();
            candidates
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Inbox scan failed");
            return report;
        }
        Err(e) => {
            tracing::error!(error = %e, "Inbox scan task panicked");
            return report;
        }
    };

    let permits = Arc::new(Semaphore::new(processor.config().processing.batch_size.max(1)));
    let mut jobs = JoinSet::new();
    for observation in candidates {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let p = processor.clone();
        jobs.spawn(async move {
            let _permit = permit;
            run_file(p, observation).await
        });
    }

    while let Some(joined) = jobs.join_next().await {
        match joined {
            Ok(FileResult::Done(outcome)) => match outcome.disposition {
                Disposition::Validated => report.validated += 1,
                Disposition::Quarantined => report.quarantined += 1,
                Disposition::AlreadyProcessed | Disposition::LostRace => {
                    report.already_processed += 1
                }
            },
            Ok(FileResult::Failed) => report.failed += 1,
            Ok(FileResult::TimedOut) => report.timed_out += 1,
            Err(e) => {
                tracing::error!(error = %e, "File job panicked");
                report.failed += 1;
            }
        }
    }

    let p = processor.clone();
    match tokio::task::spawn_blocking(move || sweep_archives(&p)).await {
        Ok(swept) => report.swept = swept,
        Err(e) => tracing::error!(error = %e, "Archive sweep panicked"),
    }

    report
}

/// Scan every distinct inbox and keep files that still need work.
/// Returns the candidates and how many files were seen in total.
fn collect_candidates(
    processor: &FileProcessor,
) -> Result<(Vec<FileObservation>, usize), ProcessingError> {
    let config = processor.config();
    let conn = open_connection(&config.database_path)?;

    let inboxes: BTreeSet<PathBuf> = config
        .registry
        .enabled()
        .map(|c| c.directories.input_dir.clone())
        .collect();

    let mut scanned = 0;
    let mut candidates = Vec::new();
    for inbox in inboxes {
        for observation in scan_inbox(&inbox)? {
            scanned += 1;
            if !processor.extractor().accepts(&observation.absolute_path) {
                tracing::debug!(file = %observation.relative_path, "No extractor for file, leaving it");
                continue;
            }
            let key = idempotency_key(&observation);
            if db::ledger_contains(&conn, &key)? {
                continue;
            }
            if db::is_manual_intervention(&conn, &key)? {
                tracing::debug!(file = %observation.relative_path, "Awaiting manual intervention");
                continue;
            }
            candidates.push(observation);
        }
    }
    Ok((candidates, scanned))
}

async fn run_file(processor: Arc<FileProcessor>, observation: FileObservation) -> FileResult {
    let limit = Duration::from_secs(processor.config().processing.file_timeout_secs.max(1));
    let cancel = Arc::new(AtomicBool::new(false));

    let job = {
        let p = processor.clone();
        let obs = observation.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_connection(&p.config().database_path)?;
            p.process(&conn, &obs, &cancel, Utc::now())
        })
    };

    let (result, error) = match tokio::time::timeout(limit, job).await {
        Ok(Ok(Ok(outcome))) => return FileResult::Done(outcome),
        Ok(Ok(Err(e))) => (FileResult::Failed, e.to_string()),
        Ok(Err(e)) => (FileResult::Failed, format!("worker panicked: {e}")),
        Err(_) => {
            cancel.store(true, Ordering::Relaxed);
            (
                FileResult::TimedOut,
                format!("timed out after {}s", limit.as_secs()),
            )
        }
    };

    tracing::warn!(file = %observation.relative_path, error = %error, "File processing failed");
    let max_attempts = processor.config().processing.retry_attempts;
    let bookkeeping = tokio::task::spawn_blocking(move || {
        let conn = open_connection(&processor.config().database_path)?;
        let key = idempotency_key(&observation);
        db::record_failure(&conn, &key, &observation.qualified_path(), &error, max_attempts)
    })
    .await;
    match bookkeeping {
        Ok(Ok(failure)) if failure.manual_intervention => tracing::error!(
            file = %failure.file_path,
            attempts = failure.attempts,
            "Retry limit reached, file needs manual intervention"
        ),
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Could not record file failure"),
        Err(e) => tracing::error!(error = %e, "Failure bookkeeping panicked"),
    }
    result
}

fn sweep_archives(processor: &FileProcessor) -> usize {
    let now = Utc::now();
    processor
        .config()
        .registry
        .enabled()
        .map(|court| match sweep_expired(court, now) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(court = %court.code, error = %e, "Archive sweep failed");
                0
            }
        })
        .sum()
}
