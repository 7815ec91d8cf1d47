//! Generation provider implementations for docsmith.
//!
//! All providers implement the `docsmith_core::GenerationProvider` trait.
//! The router builds the single provider a process uses from configuration.

#[cfg(feature = "local")]
pub mod local;
pub mod openai_compat;
pub mod router;

#[cfg(feature = "local")]
pub use local::LocalProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
