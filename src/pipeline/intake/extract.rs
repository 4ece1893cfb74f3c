use std::path::Path;

use super::hash::content_hash;
use super::ImportError;
use crate::models::FileObservation;

/// Decoded content of one observed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub content_hash: String,
}

/// Turns an observed file into text. OCR and PDF engines plug in here.
pub trait TextExtractor {
    /// Whether this extractor handles the file at all. Unaccepted files are
    /// left in the inbox untouched.
    fn accepts(&self, path: &Path) -> bool;

    fn extract(&self, observation: &FileObservation) -> Result<ExtractedText, ImportError>;
}

/// Strict UTF-8 reader for `.txt` files.
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("txt"))
    }

    fn extract(&self, observation: &FileObservation) -> Result<ExtractedText, ImportError> {
        if !self.accepts(&observation.absolute_path) {
            return Err(ImportError::UnsupportedFormat(
                observation.file_name().to_string(),
            ));
        }

        let bytes = std::fs::read(&observation.absolute_path)?;
        if bytes.len() as u64 != observation.size {
            return Err(ImportError::ChangedDuringRead(
                observation.relative_path.clone(),
            ));
        }

        let digest = content_hash(&bytes);
        let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes[..]);
        let text = std::str::from_utf8(body)
            .map_err(|e| ImportError::Undecodable {
                file: observation.relative_path.clone(),
                offset: e.valid_up_to(),
            })?
            .to_string();

        Ok(ExtractedText {
            text,
            content_hash: digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::intake::scan::observe;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> FileObservation {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        observe(dir, &path).unwrap()
    }

    #[test]
    fn reads_utf8_and_strips_bom() {
        let dir = tempfile::tempdir().unwrap();
        let obs = write(dir.path(), "KEM_1.txt", b"\xEF\xBB\xBFKEM\t123456789\tDesk\n");
        let out = PlainTextExtractor.extract(&obs).unwrap();
        assert_eq!(out.text, "KEM\t123456789\tDesk\n");
        assert!(!out.content_hash.is_empty());
    }

    #[test]
    fn invalid_utf8_is_undecodable() {
        let dir = tempfile::tempdir().unwrap();
        let obs = write(dir.path(), "bad.txt", b"KEM 1234\xFF\xFE");
        let err = PlainTextExtractor.extract(&obs).unwrap_err();
        assert!(matches!(err, ImportError::Undecodable { offset: 8, .. }));
    }

    #[test]
    fn non_text_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let obs = write(dir.path(), "scan.pdf", b"%PDF-1.7");
        assert!(!PlainTextExtractor.accepts(&obs.absolute_path));
        assert!(matches!(
            PlainTextExtractor.extract(&obs),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn size_mismatch_means_file_still_being_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut obs = write(dir.path(), "KEM_2.txt", b"KEM 123456789");
        obs.size += 5;
        assert!(matches!(
            PlainTextExtractor.extract(&obs),
            Err(ImportError::ChangedDuringRead(_))
        ));
    }
}
