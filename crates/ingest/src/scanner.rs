//! Archive scanner — turns archive entries into accepted [`RawFile`]s.

use docsmith_config::ScannerConfig;
use docsmith_core::context::{FileClass, RawFile, base_name};
use docsmith_core::error::ArchiveError;
use docsmith_core::extract::{ArchiveEntry, ArchiveReader};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::archive::ZipArchiveReader;

/// Path and content rules applied to every archive entry.
#[derive(Debug, Clone)]
pub struct ScanPolicy {
    ignored_dirs: HashSet<String>,
    allowed_extensions: HashSet<String>,
    priority_files: HashSet<String>,
    pub max_file_bytes: usize,
    pub sparse_file_bytes: usize,
    pub min_newlines: usize,
}

impl ScanPolicy {
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self {
            ignored_dirs: config.ignored_dirs.iter().cloned().collect(),
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            priority_files: config.priority_files.iter().cloned().collect(),
            max_file_bytes: config.max_file_bytes,
            sparse_file_bytes: config.sparse_file_bytes,
            min_newlines: config.min_newlines,
        }
    }

    /// True if any segment of `path` is an ignored directory name.
    pub fn is_ignored(&self, path: &str) -> bool {
        path.split('/').any(|segment| self.ignored_dirs.contains(segment))
    }

    pub fn is_priority(&self, base_name: &str) -> bool {
        self.priority_files.contains(base_name)
    }

    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        self.allowed_extensions.contains(extension)
    }

    /// Too large, or moderately large with too few newlines (minified, generated, binary).
    pub fn is_noise(&self, bytes: &[u8]) -> bool {
        if bytes.len() > self.max_file_bytes {
            return true;
        }
        bytes.len() > self.sparse_file_bytes
            && newline_count(bytes) < self.min_newlines
    }
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self::from_config(&ScannerConfig::default())
    }
}

fn newline_count(bytes: &[u8]) -> usize {
    bytes.iter().filter(|b| **b == b'\n').count()
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.is_empty() || ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

/// Forward slashes, no leading `./` or `/`.
fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut trimmed = path.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.to_string()
}

/// Lower-cased extension with the dot, empty when there is none.
pub fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Walks an archive and yields the files worth reading, sorted by path.
pub struct ArchiveScanner {
    reader: Arc<dyn ArchiveReader>,
    policy: ScanPolicy,
}

impl ArchiveScanner {
    pub fn new(reader: Arc<dyn ArchiveReader>, policy: ScanPolicy) -> Self {
        Self { reader, policy }
    }

    /// Zip reader whose entry limit matches the policy's file cap.
    pub fn zip(policy: ScanPolicy) -> Self {
        let reader = ZipArchiveReader::new().with_entry_limit(policy.max_file_bytes as u64);
        Self::new(Arc::new(reader), policy)
    }

    pub fn policy(&self) -> &ScanPolicy {
        &self.policy
    }

    /// Read and filter an archive payload.
    ///
    /// Fails with [`ArchiveError::Empty`] when nothing survives filtering.
    pub fn scan(&self, archive: &[u8]) -> Result<Vec<RawFile>, ArchiveError> {
        let entries = self.reader.list_entries(archive)?;
        let total = entries.len();
        let files = self.scan_entries(entries);

        tracing::info!(entries = total, accepted = files.len(), "Archive scanned");

        if files.is_empty() {
            return Err(ArchiveError::Empty);
        }
        Ok(files)
    }

    /// Filter already-listed entries.
    pub fn scan_entries(&self, entries: Vec<ArchiveEntry>) -> Vec<RawFile> {
        let mut files: Vec<RawFile> = entries
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .filter_map(|entry| self.accept(entry))
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.dedup_by(|a, b| a.path == b.path);
        files
    }

    fn accept(&self, entry: ArchiveEntry) -> Option<RawFile> {
        let path = normalize_path(&entry.path);
        if path.is_empty() || path.ends_with('/') || self.policy.is_ignored(&path) {
            return None;
        }

        let extension = extension_of(&path);
        let priority = self.policy.is_priority(base_name(&path));

        if !priority && !self.policy.is_allowed_extension(&extension) {
            return None;
        }

        if self.policy.is_noise(&entry.bytes) {
            tracing::debug!(path = %path, size = entry.bytes.len(), "Rejected as noise");
            return None;
        }

        let size = entry.bytes.len();
        let content = String::from_utf8_lossy(&entry.bytes).into_owned();

        Some(RawFile {
            path,
            extension,
            content,
            size,
            class: if priority {
                FileClass::Priority
            } else {
                FileClass::General
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::zip_of;

    fn scanner() -> ArchiveScanner {
        ArchiveScanner::zip(ScanPolicy::default())
    }

    fn paths(files: &[RawFile]) -> Vec<&str> {
        files.iter().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn node_modules_never_appear() {
        let bytes = zip_of(&[
            ("src/app.js", "const a = 1;\n"),
            ("package.json", "{\"name\": \"demo\"}\n"),
            ("node_modules/x.js", "module.exports = 1;\n"),
        ]);
        let files = scanner().scan(&bytes).unwrap();
        assert_eq!(paths(&files), ["package.json", "src/app.js"]);
        assert_eq!(files[0].class, FileClass::Priority);
        assert_eq!(files[1].class, FileClass::General);
    }

    #[test]
    fn nested_ignored_segment() {
        let files = scanner().scan_entries(vec![
            ArchiveEntry::file("app/.git/config.json", "{}\n"),
            ArchiveEntry::file("web/dist/bundle.js", "x\n"),
            ArchiveEntry::file("web/src/index.js", "x\n"),
        ]);
        assert_eq!(paths(&files), ["web/src/index.js"]);
    }

    #[test]
    fn nested_manifest_is_priority_by_base_name() {
        let files = scanner().scan_entries(vec![
            ArchiveEntry::file("services/api/package.json", "{\"name\": \"api\"}\n"),
            ArchiveEntry::file("services/api/package.js", "x\n"),
        ]);
        assert_eq!(files[0].path, "services/api/package.js");
        assert_eq!(files[0].class, FileClass::General);
        assert_eq!(files[1].class, FileClass::Priority);
    }

    #[test]
    fn extension_outside_allow_list_is_rejected() {
        let files = scanner().scan_entries(vec![
            ArchiveEntry::file("logo.png", vec![0u8, 1, 2]),
            ArchiveEntry::file("notes.txt", "hello\n"),
            ArchiveEntry::file("Dockerfile", "FROM rust\n"),
            ArchiveEntry::file("main.PY", "print(1)\n"),
        ]);
        assert_eq!(paths(&files), ["Dockerfile", "main.PY"]);
        assert_eq!(files[1].extension, ".py");
    }

    #[test]
    fn oversized_and_sparse_files_are_noise() {
        let huge = "a\n".repeat(7000);
        let minified = "x".repeat(600);
        let small_sparse = "y".repeat(400);
        let files = scanner().scan_entries(vec![
            ArchiveEntry::file("huge.js", huge),
            ArchiveEntry::file("min.js", minified),
            ArchiveEntry::file("small.js", small_sparse),
        ]);
        assert_eq!(paths(&files), ["small.js"]);
    }

    #[test]
    fn invalid_utf8_is_substituted() {
        let files = scanner().scan_entries(vec![ArchiveEntry::file(
            "a.py",
            vec![b'x', 0xff, b'\n'],
        )]);
        assert_eq!(files.len(), 1);
        assert!(files[0].content.starts_with('x'));
        assert!(files[0].content.contains('\u{FFFD}'));
        assert_eq!(files[0].size, 3);
    }

    #[test]
    fn output_is_sorted_and_normalized() {
        let files = scanner().scan_entries(vec![
            ArchiveEntry::file("./z.py", "z\n"),
            ArchiveEntry::file("src\\b.py", "b\n"),
            ArchiveEntry::file("/a.py", "a\n"),
            ArchiveEntry::dir("src/"),
        ]);
        assert_eq!(paths(&files), ["a.py", "src/b.py", "z.py"]);
    }

    #[test]
    fn archive_with_only_noise_is_empty() {
        let bytes = zip_of(&[("node_modules/a.js", "x\n"), ("image.png", "png")]);
        assert!(matches!(scanner().scan(&bytes), Err(ArchiveError::Empty)));
    }

    #[test]
    fn policy_normalizes_configured_extensions() {
        let config = ScannerConfig {
            allowed_extensions: vec!["RS".into(), ".Go".into()],
            ..ScannerConfig::default()
        };
        let policy = ScanPolicy::from_config(&config);
        assert!(policy.is_allowed_extension(".rs"));
        assert!(policy.is_allowed_extension(".go"));
        assert!(!policy.is_allowed_extension(".py"));
    }
}
