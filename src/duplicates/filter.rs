//! Symbol selection before embedding.

use crate::config::DuplicateConfig;
use crate::error::ConfigError;
use crate::registry::normalize_path;
use crate::symbol::Symbol;
use crate::types::SymbolKind;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Why symbols were dropped by the last [`SymbolFilter::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterCounts {
    pub kept: usize,
    pub skipped_kind: usize,
    pub skipped_length: usize,
    pub skipped_pattern: usize,
}

#[derive(Debug)]
pub struct SymbolFilter {
    kinds: HashSet<SymbolKind>,
    min_length: usize,
    excludes: GlobSet,
    project_root: PathBuf,
}

impl SymbolFilter {
    /// Compile the exclude patterns.
    ///
    /// A pattern not starting with `*` or `/` also matches at any depth, so
    /// `node_modules/*` excludes `web/node_modules/x.js` too. Matching is
    /// case-insensitive and `*` may cross directory separators.
    pub fn new(config: &DuplicateConfig, project_root: &Path) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude_file_patterns {
            let mut variants = vec![pattern.clone()];
            if !pattern.starts_with('*') && !pattern.starts_with('/') {
                variants.push(format!("**/{pattern}"));
            }
            for variant in variants {
                let glob = GlobBuilder::new(&variant)
                    .literal_separator(false)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ConfigError::InvalidValue {
                        field: "duplicates.exclude_file_patterns",
                        reason: format!("'{pattern}' is not a valid glob: {e}"),
                    })?;
                builder.add(glob);
            }
        }
        let excludes = builder.build().map_err(|e| ConfigError::InvalidValue {
            field: "duplicates.exclude_file_patterns",
            reason: e.to_string(),
        })?;

        Ok(Self {
            kinds: config.include_symbol_kinds.iter().copied().collect(),
            min_length: config.min_symbol_length,
            excludes,
            project_root: project_root.to_path_buf(),
        })
    }

    pub fn is_excluded_path(&self, file_path: &str) -> bool {
        let normalized = normalize_path(&self.project_root, Path::new(file_path));
        self.excludes.is_match(&normalized)
    }

    /// Kept symbols in input order, plus per-reason counts.
    pub fn apply(&self, symbols: &[Symbol]) -> (Vec<Symbol>, FilterCounts) {
        let mut counts = FilterCounts::default();
        let mut kept = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            if !self.kinds.contains(&symbol.kind) {
                counts.skipped_kind += 1;
            } else if symbol.trimmed_content().chars().count() < self.min_length {
                counts.skipped_length += 1;
            } else if self.is_excluded_path(&symbol.file_path) {
                counts.skipped_pattern += 1;
            } else {
                kept.push(symbol.clone());
            }
        }

        counts.kept = kept.len();
        (kept, counts)
    }
}
