//! Duplicate detection: symbol filtering, classification, the pipeline
//! orchestrator and the report it produces.

mod classify;
mod filter;
mod finder;
mod report;
mod stage;

pub use classify::{
    Classification, ComparisonType, DuplicateReason, Severity, Thresholds, classify,
};
pub use filter::{FilterCounts, SymbolFilter};
pub use finder::{CleanupSummary, DuplicateFinder, FinderInfo};
pub use report::{
    ANALYSIS_TYPE, AnalysisMode, ComponentInfo, ConfigurationSnapshot, DETECTION_METHOD,
    DuplicateDetails, DuplicateReport, DuplicateResult, Evidence, Finding, ReportMetadata,
    RunStats, SeverityBreakdown, Summary, SymbolEvidence,
};
pub use stage::{ProgressCallback, ProgressStage};
