//! Placement of finished files: per-court monthly archives and retention.
//!
//! Layout: `<processed_dir|invalid_dir>/<COURT>/<YYYY-MM>/<COURT>_<stamp>_<status>_<file>`.
//! A name already taken gets a `-<n>` suffix on its stem; nothing is overwritten.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::models::{CourtProfile, ValidationStatus};

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// Monthly archive directory for a court and validation status.
pub fn archive_dir(profile: &CourtProfile, status: ValidationStatus, now: DateTime<Utc>) -> PathBuf {
    let base = match status {
        ValidationStatus::Passed => &profile.directories.processed_dir,
        ValidationStatus::Failed => &profile.directories.invalid_dir,
    };
    base.join(profile.code.to_uppercase())
        .join(now.format("%Y-%m").to_string())
}

/// Move a validated file into its court archive. Returns the new path.
pub fn archive_file(
    source: &Path,
    file_name: &str,
    profile: &CourtProfile,
    status: ValidationStatus,
    now: DateTime<Utc>,
) -> io::Result<PathBuf> {
    let dir = archive_dir(profile, status, now);
    let dest = reserve_path(&dir.join(format!(
        "{}_{}_{}_{}",
        profile.code,
        now.format(STAMP_FORMAT),
        status.as_str(),
        file_name
    )))?;
    if let Err(e) = move_file(source, &dest) {
        let _ = std::fs::remove_file(&dest);
        return Err(e);
    }
    tracing::info!(court = %profile.code, dest = %dest.display(), "File archived");
    Ok(dest)
}

/// Claim `wanted`, or the first free `<stem>-<n>.<ext>` beside it, by creating
/// it empty. Two callers never get the same path; the caller renames or
/// writes over the placeholder.
pub fn reserve_path(wanted: &Path) -> io::Result<PathBuf> {
    if let Some(parent) = wanted.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let stem = wanted
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = wanted.extension().map(|e| e.to_string_lossy().into_owned());

    for n in 0..MAX_NAME_ATTEMPTS {
        let candidate = match (n, &ext) {
            (0, _) => wanted.to_path_buf(),
            (_, Some(ext)) => wanted.with_file_name(format!("{stem}-{n}.{ext}")),
            (_, None) => wanted.with_file_name(format!("{stem}-{n}")),
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name left for {}", wanted.display()),
    ))
}

/// Rename, falling back to copy and remove when the rename crosses filesystems.
pub fn move_file(source: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(error = %rename_err, "Rename failed, copying instead");
            std::fs::copy(source, dest)?;
            std::fs::remove_file(source)
        }
    }
}

/// Delete archived files of `profile` older than its retention period.
///
/// Age comes from the stamp in the archived name; files without one are left
/// alone. Returns how many files were removed.
pub fn sweep_expired(profile: &CourtProfile, now: DateTime<Utc>) -> io::Result<usize> {
    let cutoff = now.naive_utc() - Duration::days(i64::from(profile.archive.retention_days));
    let mut removed = 0;
    for base in [&profile.directories.processed_dir, &profile.directories.invalid_dir] {
        let court_dir = base.join(profile.code.to_uppercase());
        if !court_dir.is_dir() {
            continue;
        }
        for month in std::fs::read_dir(&court_dir)? {
            let month = month?;
            if !month.file_type()?.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(month.path())? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                let Some(stamp) = archived_stamp(&name, &profile.code) else {
                    continue;
                };
                if stamp < cutoff {
                    std::fs::remove_file(entry.path())?;
                    removed += 1;
                }
            }
        }
    }
    if removed > 0 {
        tracing::info!(court = %profile.code, removed, "Removed expired archives");
    }
    Ok(removed)
}

fn archived_stamp(name: &str, code: &str) -> Option<NaiveDateTime> {
    let rest = name.strip_prefix(code)?.strip_prefix('_')?;
    let stamp = rest.get(..14)?;
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::pipeline::validation::engine::tests::profile;

    fn setup(root: &Path) -> CourtProfile {
        let mut p = profile("SEA", 8, 12, false);
        p.directories.processed_dir = root.join("processed-archive");
        p.directories.invalid_dir = root.join("invalid-archive");
        p.archive.retention_days = 30;
        p
    }

    #[test]
    fn archives_into_court_month_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sea = setup(dir.path());
        let src = dir.path().join("SEA_0301.txt");
        std::fs::write(&src, "SEA 12345678").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 5).unwrap();

        let dest = archive_file(&src, "SEA_0301.txt", &sea, ValidationStatus::Passed, now).unwrap();

        assert_eq!(
            dest,
            dir.path()
                .join("processed-archive/SEA/2026-03/SEA_20260301083005_passed_SEA_0301.txt")
        );
        assert!(dest.exists());
        assert!(!src.exists());

        let failed_dir = archive_dir(&sea, ValidationStatus::Failed, now);
        assert_eq!(failed_dir, dir.path().join("invalid-archive/SEA/2026-03"));
    }

    #[test]
    fn same_name_in_same_second_gets_a_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let sea = setup(dir.path());
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 5).unwrap();
        let mut dests = Vec::new();
        for sub in ["a", "b"] {
            let src = dir.path().join(sub).join("SEA_0301.txt");
            std::fs::create_dir_all(src.parent().unwrap()).unwrap();
            std::fs::write(&src, sub).unwrap();
            dests.push(archive_file(&src, "SEA_0301.txt", &sea, ValidationStatus::Passed, now).unwrap());
        }

        assert_eq!(
            dests[1].file_name().unwrap(),
            "SEA_20260301083005_passed_SEA_0301-1.txt"
        );
        assert_eq!(std::fs::read_to_string(&dests[0]).unwrap(), "a");
        assert_eq!(std::fs::read_to_string(&dests[1]).unwrap(), "b");
        // Suffixed names keep their stamp for the retention sweep.
        let later = now + Duration::days(31);
        assert_eq!(sweep_expired(&sea, later).unwrap(), 2);
    }

    #[test]
    fn failed_move_releases_the_reserved_name() {
        let dir = tempfile::tempdir().unwrap();
        let sea = setup(dir.path());
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 5).unwrap();
        let missing = dir.path().join("gone.txt");

        assert!(archive_file(&missing, "gone.txt", &sea, ValidationStatus::Failed, now).is_err());
        let month = archive_dir(&sea, ValidationStatus::Failed, now);
        assert_eq!(std::fs::read_dir(month).unwrap().count(), 0);
    }

    #[test]
    fn sweep_removes_only_expired_stamped_files() {
        let dir = tempfile::tempdir().unwrap();
        let sea = setup(dir.path());
        let month = dir.path().join("invalid-archive/SEA/2026-01");
        std::fs::create_dir_all(&month).unwrap();
        std::fs::write(month.join("SEA_20260101000000_failed_old.txt"), "x").unwrap();
        std::fs::write(month.join("SEA_20260228000000_failed_new.txt"), "x").unwrap();
        std::fs::write(month.join("notes.txt"), "x").unwrap();

        let now = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(sweep_expired(&sea, now).unwrap(), 1);
        assert!(!month.join("SEA_20260101000000_failed_old.txt").exists());
        assert!(month.join("SEA_20260228000000_failed_new.txt").exists());
        assert!(month.join("notes.txt").exists());
    }
}
