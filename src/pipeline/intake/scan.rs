use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::ImportError;
use crate::models::FileObservation;

/// Walk `root` recursively and observe every regular, non-hidden file.
///
/// Results are sorted by relative path so a cycle always visits files in the
/// same order. A missing inbox yields an empty list.
pub fn scan_inbox(root: &Path) -> Result<Vec<FileObservation>, ImportError> {
    let mut found = Vec::new();
    if !root.is_dir() {
        tracing::debug!(inbox = %root.display(), "Inbox does not exist yet");
        return Ok(found);
    }

    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                match observe(root, &entry.path()) {
                    Ok(obs) => found.push(obs),
                    // Vanished between listing and stat; next cycle sees the truth.
                    Err(ImportError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }
    }

    found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(found)
}

/// Build the observation for one file under `root`.
pub fn observe(root: &Path, path: &Path) -> Result<FileObservation, ImportError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| ImportError::OutsideInbox {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })?;
    let relative_path = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    let metadata = std::fs::metadata(path)?;
    let modified_at: DateTime<Utc> = metadata.modified()?.into();

    Ok(FileObservation {
        inbox: root.to_path_buf(),
        relative_path,
        absolute_path: path.to_path_buf(),
        size: metadata.len(),
        modified_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_lists_nested_files_sorted_and_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("sea/2026")).unwrap();
        std::fs::write(root.join("b.txt"), "x").unwrap();
        std::fs::write(root.join("sea/2026/SEA_1.txt"), "yy").unwrap();
        std::fs::write(root.join(".partial.txt"), "z").unwrap();
        std::fs::create_dir_all(root.join(".staging")).unwrap();
        std::fs::write(root.join(".staging/a.txt"), "z").unwrap();

        let found = scan_inbox(root).unwrap();
        let rels: Vec<&str> = found.iter().map(|o| o.relative_path.as_str()).collect();
        assert_eq!(rels, vec!["b.txt", "sea/2026/SEA_1.txt"]);
        assert_eq!(found[1].size, 2);
        assert_eq!(found[1].file_name(), "SEA_1.txt");
        assert_eq!(found[1].inbox, root);
    }

    #[test]
    fn missing_inbox_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_inbox(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn observe_rejects_path_outside_root() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let file = b.path().join("x.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            observe(a.path(), &file),
            Err(ImportError::OutsideInbox { .. })
        ));
    }
}
