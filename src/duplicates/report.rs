//! Detected pairs and the report built from them.

use super::classify::{ComparisonType, DuplicateReason, Severity, Thresholds};
use super::filter::FilterCounts;
use crate::embedding::EmbedderInfo;
use crate::registry::RegistryStats;
use crate::symbol::Symbol;
use crate::types::SymbolKind;
use crate::vector::{BackendTier, DetectorInfo};
use serde::Serialize;
use std::path::PathBuf;

pub const ANALYSIS_TYPE: &str = "duplicate_detection";
pub const DETECTION_METHOD: &str = "embedding_similarity";
const EVIDENCE_CONTENT_CHARS: usize = 100;

/// Provenance attached to every detected pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateDetails {
    pub detection_method: &'static str,
    pub embedding_method: String,
    pub similarity_backend: BackendTier,
}

/// One reported pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateResult {
    pub original_symbol: Symbol,
    pub duplicate_symbol: Symbol,
    pub similarity_score: f32,
    pub confidence: f32,
    pub severity: Severity,
    pub comparison_type: ComparisonType,
    pub reason: Option<DuplicateReason>,
    pub details: DuplicateDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Full,
    Incremental,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolEvidence {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SymbolKind,
    pub file: String,
    pub line: u32,
    pub content: String,
}

impl SymbolEvidence {
    fn from_symbol(symbol: &Symbol) -> Self {
        Self {
            name: symbol.name.clone(),
            kind: symbol.kind,
            file: symbol.file_path.clone(),
            line: symbol.line_number,
            content: symbol
                .line_content
                .chars()
                .take(EVIDENCE_CONTENT_CHARS)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    pub similarity_score: f32,
    pub confidence: f32,
    pub reason: Option<DuplicateReason>,
    pub comparison_type: ComparisonType,
    pub original_symbol: SymbolEvidence,
    pub duplicate_symbol: SymbolEvidence,
    pub details: DuplicateDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub finding_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub file_path: String,
    pub line_number: u32,
    pub evidence: Evidence,
}

impl Finding {
    pub fn from_result(index: usize, result: &DuplicateResult) -> Self {
        Self {
            finding_id: format!("duplicate_{index:04}"),
            title: format!(
                "Duplicate: {} & {}",
                result.original_symbol.name, result.duplicate_symbol.name
            ),
            description: format!(
                "Found {} between symbols with {:.3} similarity",
                result.comparison_type.describe(),
                result.similarity_score
            ),
            severity: result.severity,
            file_path: result.original_symbol.file_path.clone(),
            line_number: result.original_symbol.line_number,
            evidence: Evidence {
                similarity_score: result.similarity_score,
                confidence: result.confidence,
                reason: result.reason,
                comparison_type: result.comparison_type,
                original_symbol: SymbolEvidence::from_symbol(&result.original_symbol),
                duplicate_symbol: SymbolEvidence::from_symbol(&result.duplicate_symbol),
                details: result.details.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityBreakdown {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityBreakdown {
    pub fn count<'a>(severities: impl IntoIterator<Item = &'a Severity>) -> Self {
        let mut breakdown = Self::default();
        for severity in severities {
            match severity {
                Severity::Critical => breakdown.critical += 1,
                Severity::High => breakdown.high += 1,
                Severity::Medium => breakdown.medium += 1,
                Severity::Low => breakdown.low += 1,
            }
        }
        breakdown
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_duplicates_found: usize,
    pub symbols_analyzed: usize,
    pub execution_time_seconds: f64,
    pub severity_breakdown: SeverityBreakdown,
    pub detection_method: &'static str,
    pub thresholds: Thresholds,
}

/// Counters for the most recent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub symbols_extracted: usize,
    pub symbols_analyzed: usize,
    pub embeddings_generated: usize,
    pub duplicates_found: usize,
    pub registry_updates: usize,
    /// Files whose extraction failed and were skipped
    pub files_skipped: usize,
    pub filter: FilterCounts,
    pub execution_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentInfo {
    pub symbol_source: String,
    pub embedder: EmbedderInfo,
    pub similarity_index: DetectorInfo,
    pub registry: RegistryStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationSnapshot {
    pub max_symbols: usize,
    pub batch_size: usize,
    pub enable_caching: bool,
    pub enable_incremental: bool,
    pub min_symbol_length: usize,
    pub include_symbol_kinds: Vec<SymbolKind>,
    pub exclude_file_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub project_root: PathBuf,
    pub analysis_mode: AnalysisMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_files: Option<Vec<String>>,
    pub component_info: ComponentInfo,
    pub configuration: ConfigurationSnapshot,
    pub stats: RunStats,
    /// RFC 3339, UTC
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    pub analysis_type: &'static str,
    pub findings: Vec<Finding>,
    pub summary: Summary,
    pub metadata: ReportMetadata,
}

impl DuplicateReport {
    pub fn new(
        duplicates: &[DuplicateResult],
        symbols_analyzed: usize,
        thresholds: Thresholds,
        metadata: ReportMetadata,
    ) -> Self {
        let findings: Vec<Finding> = duplicates
            .iter()
            .enumerate()
            .map(|(i, result)| Finding::from_result(i, result))
            .collect();

        let summary = Summary {
            total_duplicates_found: duplicates.len(),
            symbols_analyzed,
            execution_time_seconds: (metadata.stats.execution_time_seconds * 100.0).round() / 100.0,
            severity_breakdown: SeverityBreakdown::count(findings.iter().map(|f| &f.severity)),
            detection_method: DETECTION_METHOD,
            thresholds,
        };

        Self {
            analysis_type: ANALYSIS_TYPE,
            findings,
            summary,
            metadata,
        }
    }
}
