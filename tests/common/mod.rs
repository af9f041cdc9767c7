#![allow(dead_code)]

use codedupe::embedding::{EmbeddingError, EmbeddingModel};
use codedupe::{EmbeddingBackend, Settings, Symbol, SymbolKind};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Settings rooted in this project with the offline hashing backend.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.project_root = Some(self.path().to_path_buf());
        settings.embedding.backend = EmbeddingBackend::Hashing;
        settings.embedding.dimension = 64;
        settings
    }

    /// Write `symbols` as a JSON dump and return its path.
    pub fn write_dump(&self, symbols: &[Symbol]) -> PathBuf {
        let json = serde_json::to_string_pretty(symbols).expect("Failed to serialize symbols");
        self.add_file("symbols.json", &json)
    }
}

/// A function symbol whose content carries `tag` for [`TableModel`] lookup.
pub fn tagged(name: &str, file: &str, line: u32, tag: &str) -> Symbol {
    Symbol::new(
        name,
        SymbolKind::Function,
        file,
        line,
        format!("def {name}(items): return process(items)  # {tag}"),
    )
}

/// Unit vector in `dim` dimensions whose cosine with `axis(a)` is `cos`.
pub fn rotated(dim: usize, a: usize, b: usize, cos: f32) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[a] = cos;
    v[b] = (1.0 - cos * cos).sqrt();
    v
}

pub fn axis(dim: usize, a: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[a] = 1.0;
    v
}

/// Embedding model that returns fixed vectors for texts containing a tag.
pub struct TableModel {
    dimension: usize,
    table: Vec<(String, Vec<f32>)>,
    calls: Arc<AtomicUsize>,
}

impl TableModel {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            table: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with(mut self, tag: &str, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), self.dimension);
        self.table.push((format!("# {tag}"), vector));
        self
    }

    /// Shared count of tagged texts embedded so far.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl EmbeddingModel for TableModel {
    /// Untagged texts (the health probe) map onto the last axis and are not
    /// counted.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                match self.table.iter().find(|(tag, _)| text.ends_with(tag.as_str())) {
                    Some((_, v)) => {
                        self.calls.fetch_add(1, Ordering::SeqCst);
                        v.clone()
                    }
                    None => axis(self.dimension, self.dimension - 1),
                }
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn method(&self) -> EmbeddingBackend {
        EmbeddingBackend::Hashing
    }

    fn model_name(&self) -> &str {
        "table"
    }
}
