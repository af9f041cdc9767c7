//! Symbol records consumed by the duplicate finder.
//!
//! Symbols are produced by an external parser and never mutated here. The
//! `source` submodule defines the seam through which they are obtained.

pub mod source;

pub use source::{JsonSymbolSource, SourceError, SymbolSource};

use crate::types::SymbolKind;
use serde::{Deserialize, Serialize};

fn default_scope() -> String {
    "module".to_string()
}

/// A named code unit with location and signature metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub line_number: u32,
    /// Source text used as the similarity signal.
    pub line_content: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl Symbol {
    pub fn new(
        name: impl Into<String>,
        kind: SymbolKind,
        file_path: impl Into<String>,
        line_number: u32,
        line_content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            file_path: file_path.into(),
            line_number,
            line_content: line_content.into(),
            scope: default_scope(),
            parameters: Vec::new(),
            return_type: None,
            visibility: None,
            complexity: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_return_type(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }

    pub fn with_visibility(mut self, visibility: impl Into<String>) -> Self {
        self.visibility = Some(visibility.into());
        self
    }

    pub fn with_complexity(mut self, complexity: u32) -> Self {
        self.complexity = Some(complexity);
        self
    }

    /// Trimmed source line, the content length used for filtering.
    pub fn trimmed_content(&self) -> &str {
        self.line_content.trim()
    }

    /// Deterministic text representation fed to the embedding model.
    ///
    /// Two symbols with equal canonical text share an embedding cache entry,
    /// so file path and line number are deliberately absent.
    ///
    /// # Example
    /// ```
    /// use codedupe::{Symbol, SymbolKind};
    ///
    /// let symbol = Symbol::new("load", SymbolKind::Function, "a.py", 3, "  def load(path):  ")
    ///     .with_parameters(["path"]);
    /// assert_eq!(
    ///     symbol.canonical_text(),
    ///     "name: load | type: function | content: def load(path): | parameters: path"
    /// );
    /// ```
    #[must_use]
    pub fn canonical_text(&self) -> String {
        let mut parts = vec![
            format!("name: {}", self.name),
            format!("type: {}", self.kind),
            format!("content: {}", self.trimmed_content()),
        ];

        if !self.parameters.is_empty() {
            parts.push(format!("parameters: {}", self.parameters.join(", ")));
        }
        if let Some(return_type) = &self.return_type {
            parts.push(format!("returns: {return_type}"));
        }
        if self.scope != "module" {
            parts.push(format!("scope: {}", self.scope));
        }

        parts.join(" | ")
    }
}
