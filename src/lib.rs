//! Semantic duplicate detection for code symbols.
//!
//! Symbols come from an external parser through a [`SymbolSource`]. The
//! [`DuplicateFinder`] embeds them, searches a similarity index for near
//! neighbors, classifies each pair by severity and records processed symbols
//! in an on-disk registry for incremental runs.

pub mod config;
pub mod display;
pub mod duplicates;
pub mod embedding;
pub mod error;
pub mod io;
pub mod logging;
pub mod registry;
pub mod symbol;
pub mod types;
pub mod vector;

pub use config::Settings;
pub use duplicates::{
    DuplicateFinder, DuplicateReport, DuplicateResult, ProgressStage, Severity, Thresholds,
};
pub use embedding::{EmbeddingBackend, EmbeddingError, SymbolEmbedder};
pub use error::{Component, ComponentError, ConfigError, FinderError, FinderResult};
pub use registry::{ChangeType, RegistryError, RegistryStore};
pub use symbol::{JsonSymbolSource, SourceError, Symbol, SymbolSource};
pub use types::SymbolKind;
pub use vector::{BackendTier, SimilarityDetector, VectorError};
