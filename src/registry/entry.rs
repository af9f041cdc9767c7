use crate::symbol::Symbol;
use crate::types::get_utc_timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current entry file format.
pub const ENTRY_SCHEMA_VERSION: u32 = 1;

/// Metadata keys lifted into dedicated entry fields.
pub const EMBEDDING_METHOD_KEY: &str = "embedding_method";
pub const SIMILARITY_METHOD_KEY: &str = "similarity_method";

/// One persisted symbol with its embedding and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub symbol: Symbol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub similarity_metadata: Map<String, Value>,
    /// Content hash of the symbol's file when it was registered
    #[serde(default)]
    pub file_hash: Option<String>,
    /// UTC seconds
    pub last_updated: u64,
    #[serde(default)]
    pub embedding_method: Option<String>,
    #[serde(default)]
    pub similarity_method: Option<String>,
}

fn default_schema_version() -> u32 {
    ENTRY_SCHEMA_VERSION
}

impl RegistryEntry {
    pub fn new(
        symbol: Symbol,
        embedding: Option<Vec<f32>>,
        similarity_metadata: Map<String, Value>,
        file_hash: Option<String>,
    ) -> Self {
        let method = |key: &str| {
            similarity_metadata
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let embedding_method = method(EMBEDDING_METHOD_KEY);
        let similarity_method = method(SIMILARITY_METHOD_KEY);

        Self {
            schema_version: ENTRY_SCHEMA_VERSION,
            symbol,
            embedding,
            similarity_metadata,
            file_hash,
            last_updated: get_utc_timestamp(),
            embedding_method,
            similarity_method,
        }
    }

    /// Seconds since the entry was last written.
    pub fn age_seconds(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_updated)
    }

    /// Whether the stored symbol no longer matches `symbol` or the entry is
    /// older than `stale_after_seconds`.
    pub fn needs_refresh(&self, symbol: &Symbol, now: u64, stale_after_seconds: u64) -> bool {
        self.symbol.line_content != symbol.line_content
            || self.symbol.line_number != symbol.line_number
            || self.age_seconds(now) > stale_after_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SymbolKind;

    fn symbol() -> Symbol {
        Symbol::new("f", SymbolKind::Function, "a.py", 3, "def f(): pass")
    }

    #[test]
    fn test_methods_lifted_from_metadata() {
        let mut metadata = Map::new();
        metadata.insert(EMBEDDING_METHOD_KEY.into(), Value::from("hashing"));
        metadata.insert(SIMILARITY_METHOD_KEY.into(), Value::from("flat"));
        metadata.insert("run".into(), Value::from(7));

        let entry = RegistryEntry::new(symbol(), Some(vec![1.0]), metadata, None);
        assert_eq!(entry.embedding_method.as_deref(), Some("hashing"));
        assert_eq!(entry.similarity_method.as_deref(), Some("flat"));
        assert_eq!(entry.similarity_metadata["run"], 7);
    }

    #[test]
    fn test_needs_refresh() {
        let entry = RegistryEntry::new(symbol(), None, Map::new(), None);
        let now = entry.last_updated;
        assert!(!entry.needs_refresh(&symbol(), now, 3600));

        let moved = Symbol { line_number: 4, ..symbol() };
        assert!(entry.needs_refresh(&moved, now, 3600));

        let edited = Symbol {
            line_content: "def f(): return 1".into(),
            ..symbol()
        };
        assert!(entry.needs_refresh(&edited, now, 3600));

        assert!(entry.needs_refresh(&symbol(), now + 3601, 3600));
    }

    #[test]
    fn test_older_documents_default_schema_version() {
        let json = r#"{
            "symbol": {"name": "f", "kind": "function", "file_path": "a.py",
                       "line_number": 1, "line_content": "def f(): pass"},
            "last_updated": 1735689600
        }"#;
        let entry: RegistryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.schema_version, ENTRY_SCHEMA_VERSION);
        assert!(entry.embedding.is_none());
        assert_eq!(entry.symbol.scope, "module");
    }
}
