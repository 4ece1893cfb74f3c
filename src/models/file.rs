use std::path::{Component, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four facts the core consumes about a file, plus where to read it from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileObservation {
    /// Inbox root the file was observed under.
    pub inbox: PathBuf,
    /// Path relative to `inbox`, `/`-separated.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

impl FileObservation {
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// Inbox root as a `/`-separated string.
    pub fn inbox_str(&self) -> String {
        self.inbox_segments().join("/")
    }

    /// `<inbox>/<relative_path>`, `/`-separated.
    pub fn qualified_path(&self) -> String {
        format!("{}/{}", self.inbox_str(), self.relative_path)
    }

    /// Named components of the inbox root, then every segment of the
    /// relative path, file name included.
    pub fn path_segments(&self) -> Vec<String> {
        let mut segments = self.inbox_segments();
        segments.extend(
            self.relative_path
                .split('/')
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        );
        segments
    }

    fn inbox_segments(&self) -> Vec<String> {
        let mut segments = Vec::new();
        for component in self.inbox.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
                Component::RootDir if segments.is_empty() => segments.push(String::new()),
                Component::RootDir => {}
                Component::Prefix(prefix) => {
                    segments.push(prefix.as_os_str().to_string_lossy().into_owned())
                }
                Component::CurDir | Component::ParentDir => {}
            }
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(rel: &str) -> FileObservation {
        FileObservation {
            inbox: PathBuf::from("/data/sea-inbox"),
            relative_path: rel.into(),
            absolute_path: PathBuf::from("/data/sea-inbox").join(rel),
            size: 10,
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(observation("shared/sea/SEA_0101.txt").file_name(), "SEA_0101.txt");
        assert_eq!(observation("plain.txt").file_name(), "plain.txt");
    }

    #[test]
    fn segments_cover_inbox_and_file_name() {
        let obs = observation("shared/SEA_0101.txt");
        let segs: Vec<String> = obs.path_segments().into_iter().filter(|s| !s.is_empty()).collect();
        assert_eq!(segs, vec!["data", "sea-inbox", "shared", "SEA_0101.txt"]);
        assert_eq!(obs.qualified_path(), "/data/sea-inbox/shared/SEA_0101.txt");
        assert_eq!(obs.inbox_str(), "/data/sea-inbox");
    }
}
