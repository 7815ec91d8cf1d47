//! # docsmith Core
//!
//! Domain types, traits, and error definitions for the docsmith documentation
//! pipeline. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external capability (model backends, archive readers, template text
//! extraction) is a trait here. Implementations live in their respective
//! crates, so the pipeline can be exercised end to end with scripted stand-ins.

pub mod context;
pub mod document;
pub mod error;
pub mod extract;
pub mod heading;
pub mod provider;
pub mod tokens;

// Re-export key types at crate root for ergonomics
pub use context::{FileClass, ProjectContext, RawFile};
pub use document::{
    AnalysisSummary, Diagram, DiagramKind, DocumentMetadata, DocumentPayload, ResourceSummary,
    Sections, StageOutcome, StageStatus, StageUsage,
};
pub use error::{ArchiveError, Error, GenerationError, ProviderError, Result, StageError};
pub use extract::{ArchiveEntry, ArchiveReader, TextExtractor};
pub use heading::{DEFAULT_HEADINGS, SectionHeadings};
pub use provider::{
    Generation, GenerationProvider, GenerationRequest, ModelHandle, SamplingConfig, Usage,
};
pub use tokens::{TokenEstimate, estimate_tokens};
