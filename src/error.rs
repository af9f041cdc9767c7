//! Error types for the duplicate finder
//!
//! Each component has its own error enum next to its code; this module holds
//! the configuration error and the orchestrator-level [`FinderError`], which
//! records which component failed and which capability was missing.

use crate::duplicates::ProgressStage;
use crate::embedding::EmbeddingError;
use crate::registry::RegistryError;
use crate::symbol::SourceError;
use crate::vector::VectorError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline dependency named in fatal diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Configuration,
    SymbolSource,
    Embedder,
    SimilarityIndex,
    Registry,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Configuration => "configuration",
            Component::SymbolSource => "symbol source",
            Component::Embedder => "embedder",
            Component::SimilarityIndex => "similarity index",
            Component::Registry => "registry",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration validation and loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Invalid similarity thresholds: {reason}\nSuggestion: Thresholds must satisfy 0 <= low < medium < high < exact <= 1"
    )]
    InvalidThresholds { reason: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Failed to load configuration: {0}")]
    Load(Box<figment::Error>),

    #[error("Failed to save configuration to '{}': {reason}", path.display())]
    Save { path: PathBuf, reason: String },

    #[error(
        "Configuration file already exists at '{}'\nSuggestion: Use --force to overwrite",
        path.display()
    )]
    AlreadyExists { path: PathBuf },
}

/// Underlying failure of a single component.
#[derive(Error, Debug)]
pub enum ComponentError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Main error type for duplicate-finder runs
#[derive(Error, Debug)]
pub enum FinderError {
    /// A required component could not be constructed
    #[error("{component} failed to initialize (missing capability: {capability})\nCause: {source}")]
    ComponentInit {
        component: Component,
        capability: &'static str,
        source: ComponentError,
    },

    /// A component was constructed but is not operational
    #[error("{component} failed health check (missing capability: {capability}): {reason}")]
    HealthCheck {
        component: Component,
        capability: &'static str,
        reason: String,
    },

    /// A pipeline stage raised an error
    #[error("Stage '{stage}' failed in {component}: {source}")]
    StageFailed {
        stage: ProgressStage,
        component: Component,
        source: ComponentError,
    },

    /// Cache or registry maintenance failed
    #[error("Cleanup failed in {component}: {source}")]
    Cleanup {
        component: Component,
        source: ComponentError,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("No symbols found in {origin}")]
    NoSymbols { origin: String },

    #[error("No symbols remain after filtering ({extracted} extracted)")]
    NoSymbolsAfterFilter { extracted: usize },

    #[error("No file changes detected for incremental analysis")]
    NoChangedFiles,
}

impl FinderError {
    pub fn stage(stage: ProgressStage, component: Component, source: impl Into<ComponentError>) -> Self {
        Self::StageFailed {
            stage,
            component,
            source: source.into(),
        }
    }

    pub fn cleanup(component: Component, source: impl Into<ComponentError>) -> Self {
        Self::Cleanup {
            component,
            source: source.into(),
        }
    }

    pub fn init(
        component: Component,
        capability: &'static str,
        source: impl Into<ComponentError>,
    ) -> Self {
        Self::ComponentInit {
            component,
            capability,
            source: source.into(),
        }
    }

    /// Component blamed by this error, if any.
    pub fn component(&self) -> Option<Component> {
        match self {
            Self::ComponentInit { component, .. }
            | Self::HealthCheck { component, .. }
            | Self::StageFailed { component, .. }
            | Self::Cleanup { component, .. } => Some(*component),
            Self::Config(_) => Some(Component::Configuration),
            Self::NoSymbols { .. } | Self::NoChangedFiles => Some(Component::SymbolSource),
            Self::NoSymbolsAfterFilter { .. } => None,
        }
    }

    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::ComponentInit { .. } => "COMPONENT_INIT_FAILED",
            Self::HealthCheck { .. } => "HEALTH_CHECK_FAILED",
            Self::StageFailed { .. } => "STAGE_FAILED",
            Self::Cleanup { .. } => "CLEANUP_FAILED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::NoSymbols { .. } => "NO_SYMBOLS",
            Self::NoSymbolsAfterFilter { .. } => "NO_SYMBOLS_AFTER_FILTER",
            Self::NoChangedFiles => "NO_CHANGED_FILES",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self.component() {
            Some(Component::Embedder) => vec![
                "Check that the embedding model can be downloaded or is already cached",
                "Set embedding.backend = \"hashing\" for offline runs",
            ],
            Some(Component::Registry) => vec![
                "Check disk space and permissions in the registry directory",
                "Delete the registry directory to rebuild it from scratch",
            ],
            Some(Component::SimilarityIndex) => vec![
                "Ensure all embeddings come from the same model",
                "Set similarity.backend = \"manual\" to rule out the faster tiers",
            ],
            Some(Component::Configuration) => vec![
                "Run 'codedupe config' to inspect the effective settings",
                "Thresholds must satisfy low < medium < high < exact",
            ],
            Some(Component::SymbolSource) => vec![
                "Check that the symbol dump lists the files you expect",
                "Regenerate the symbol dump with the external parser",
            ],
            None => vec![
                "Lower duplicates.min_symbol_length or widen include_symbol_kinds",
                "Review duplicates.exclude_file_patterns",
            ],
        }
    }
}

/// Result type alias for orchestrator operations
pub type FinderResult<T> = Result<T, FinderError>;
