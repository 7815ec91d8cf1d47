//! Zip archive reader.

use docsmith_core::error::ArchiveError;
use docsmith_core::extract::{ArchiveEntry, ArchiveReader};
use std::io::{Cursor, Read};
use zip::ZipArchive;
use zip::result::ZipError;

/// Reads `.zip` payloads fully into memory.
///
/// Entries larger than `max_entry_bytes` are skipped without being
/// decompressed past the limit.
#[derive(Debug, Clone, Default)]
pub struct ZipArchiveReader {
    max_entry_bytes: Option<u64>,
}

impl ZipArchiveReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry_limit(mut self, max_entry_bytes: u64) -> Self {
        self.max_entry_bytes = Some(max_entry_bytes);
        self
    }
}

fn map_zip_error(err: ZipError) -> ArchiveError {
    match err {
        ZipError::InvalidArchive(msg) => ArchiveError::Invalid(msg.to_string()),
        ZipError::UnsupportedArchive(msg) => ArchiveError::Invalid(msg.to_string()),
        other => ArchiveError::Unreadable(other.to_string()),
    }
}

impl ArchiveReader for ZipArchiveReader {
    fn list_entries(&self, archive: &[u8]) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        if archive.is_empty() {
            return Err(ArchiveError::Unreadable("empty payload".into()));
        }

        let mut zip = ZipArchive::new(Cursor::new(archive)).map_err(map_zip_error)?;
        let mut entries = Vec::with_capacity(zip.len());

        for i in 0..zip.len() {
            let mut file = match zip.by_index(i) {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!(index = i, error = %e, "Skipping unreadable archive entry");
                    continue;
                }
            };

            let path = file.name().to_string();
            if file.is_dir() {
                entries.push(ArchiveEntry::dir(path));
                continue;
            }

            if let Some(limit) = self.max_entry_bytes {
                if file.size() > limit {
                    tracing::debug!(path = %path, size = file.size(), "Skipping oversized entry");
                    continue;
                }
            }

            let mut bytes = Vec::new();
            let read = match self.max_entry_bytes {
                Some(limit) => (&mut file).take(limit + 1).read_to_end(&mut bytes),
                None => file.read_to_end(&mut bytes),
            };
            if let Err(e) = read {
                tracing::warn!(path = %path, error = %e, "Skipping entry that failed to decompress");
                continue;
            }
            if self
                .max_entry_bytes
                .is_some_and(|limit| bytes.len() as u64 > limit)
            {
                tracing::debug!(path = %path, "Entry exceeded its declared size, skipping");
                continue;
            }

            entries.push(ArchiveEntry::file(path, bytes));
        }

        tracing::debug!(entries = entries.len(), "Archive listed");
        Ok(entries)
    }
}
