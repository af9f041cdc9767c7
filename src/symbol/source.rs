//! Seam to the external symbol extractor.

use super::Symbol;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read symbol dump '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "Failed to parse symbol dump '{}': {reason}\nSuggestion: Expected a JSON array of symbols or an object with a \"symbols\" array",
        path.display()
    )]
    Parse { path: PathBuf, reason: String },

    #[error("No symbols known for file '{}'", path.display())]
    UnknownFile { path: PathBuf },

    #[error("Symbol extraction failed for '{}': {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },
}

/// Producer of symbol records, one file at a time.
pub trait SymbolSource: Send + Sync {
    /// Every file the source can extract symbols from, in a stable order.
    fn files(&self) -> Result<Vec<PathBuf>, SourceError>;

    /// Ordered symbols for a single file.
    fn extract_file(&self, path: &Path) -> Result<Vec<Symbol>, SourceError>;

    /// Short human-readable description for diagnostics.
    fn describe(&self) -> String;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SymbolDump {
    List(Vec<Symbol>),
    Wrapped { symbols: Vec<Symbol> },
}

/// Symbols loaded from a JSON dump written by an external parser.
#[derive(Debug, Clone, Default)]
pub struct JsonSymbolSource {
    origin: Option<PathBuf>,
    by_file: BTreeMap<PathBuf, Vec<Symbol>>,
}

impl JsonSymbolSource {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut source = Self::from_json(&json).map_err(|reason| SourceError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;
        source.origin = Some(path.to_path_buf());
        Ok(source)
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let dump: SymbolDump = serde_json::from_str(json).map_err(|e| e.to_string())?;
        let symbols = match dump {
            SymbolDump::List(symbols) => symbols,
            SymbolDump::Wrapped { symbols } => symbols,
        };
        Ok(Self::from_symbols(symbols))
    }

    pub fn from_symbols(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        let mut by_file: BTreeMap<PathBuf, Vec<Symbol>> = BTreeMap::new();
        for symbol in symbols {
            by_file
                .entry(PathBuf::from(&symbol.file_path))
                .or_default()
                .push(symbol);
        }
        Self {
            origin: None,
            by_file,
        }
    }

    pub fn symbol_count(&self) -> usize {
        self.by_file.values().map(Vec::len).sum()
    }

    fn lookup(&self, path: &Path) -> Option<&Vec<Symbol>> {
        if let Some(symbols) = self.by_file.get(path) {
            return Some(symbols);
        }
        // Callers may pass `./src/a.py` for a dump that recorded `src/a.py`.
        let stripped = path.strip_prefix(".").unwrap_or(path);
        self.by_file
            .iter()
            .find(|(known, _)| known.strip_prefix(".").unwrap_or(known) == stripped)
            .map(|(_, symbols)| symbols)
    }
}

impl SymbolSource for JsonSymbolSource {
    fn files(&self) -> Result<Vec<PathBuf>, SourceError> {
        Ok(self.by_file.keys().cloned().collect())
    }

    fn extract_file(&self, path: &Path) -> Result<Vec<Symbol>, SourceError> {
        self.lookup(path)
            .cloned()
            .ok_or_else(|| SourceError::UnknownFile {
                path: path.to_path_buf(),
            })
    }

    fn describe(&self) -> String {
        match &self.origin {
            Some(path) => format!("json dump {}", path.display()),
            None => "in-memory symbols".to_string(),
        }
    }
}
