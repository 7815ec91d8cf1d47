//! Seams to the collaborators that decode uploads: archive listing and
//! template text extraction.

use crate::error::ArchiveError;

/// One file entry inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub is_dir: bool,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    pub fn file(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            bytes: bytes.into(),
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            bytes: Vec::new(),
        }
    }
}

/// Lists the entries of an archive payload.
pub trait ArchiveReader: Send + Sync {
    fn list_entries(&self, archive: &[u8]) -> Result<Vec<ArchiveEntry>, ArchiveError>;
}

/// Extracts plain text from a template document.
///
/// Never fails: an unreadable document yields an empty string.
pub trait TextExtractor: Send + Sync {
    /// `kind` is the lower-cased file extension without the dot (`"md"`, `"pdf"`).
    fn extract_text(&self, bytes: &[u8], kind: &str) -> String;
}
