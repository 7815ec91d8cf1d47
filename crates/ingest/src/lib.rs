//! Archive ingestion for docsmith.
//!
//! Turns an uploaded archive into the bounded, immutable
//! [`ProjectContext`](docsmith_core::ProjectContext) every pipeline stage reads:
//!
//! - [`ZipArchiveReader`] — lists archive entries
//! - [`ArchiveScanner`] — path/extension policy, noise rejection, classification
//! - [`ContextBuilder`] — bounded accumulators and module detection
//! - [`RecognizerTable`] — per-language import and declaration patterns
//! - [`analyze`] — language counts and folder tree

pub mod analysis;
pub mod archive;
pub mod builder;
pub mod recognizers;
pub mod scanner;

pub use analysis::{TreeLimits, analyze, folder_tree};
pub use archive::ZipArchiveReader;
pub use builder::{ContextBuilder, ContextLimits};
pub use recognizers::{LanguageRecognizer, RecognizerTable};
pub use scanner::{ArchiveScanner, ScanPolicy};

use docsmith_config::AppConfig;
use docsmith_core::context::ProjectContext;
use docsmith_core::document::AnalysisSummary;
use docsmith_core::error::ArchiveError;
use std::sync::Arc;

/// Everything extracted from one archive.
#[derive(Debug, Clone)]
pub struct IngestedProject {
    pub context: ProjectContext,
    pub analysis: AnalysisSummary,
}

/// Scanner, builder and analysis wired to one recognizer table.
pub struct Ingestor {
    scanner: ArchiveScanner,
    builder: ContextBuilder,
    recognizers: Arc<RecognizerTable>,
}

impl Ingestor {
    pub fn new(scanner: ArchiveScanner, limits: ContextLimits) -> Self {
        let recognizers = Arc::new(RecognizerTable::builtin());
        Self {
            scanner,
            builder: ContextBuilder::new(limits).with_recognizers(recognizers.clone()),
            recognizers,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ArchiveScanner::zip(ScanPolicy::from_config(&config.scanner)),
            ContextLimits::from(&config.context),
        )
    }

    pub fn with_recognizers(mut self, recognizers: RecognizerTable) -> Self {
        let recognizers = Arc::new(recognizers);
        self.builder = ContextBuilder::new(self.builder.limits()).with_recognizers(recognizers.clone());
        self.recognizers = recognizers;
        self
    }

    /// Scan, build and summarize. Only archive problems fail.
    pub fn ingest(&self, archive: &[u8]) -> Result<IngestedProject, ArchiveError> {
        let files = self.scanner.scan(archive)?;
        let context = self.builder.build(&files);
        let analysis = analyze(&files, &self.recognizers);
        Ok(IngestedProject { context, analysis })
    }
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}
