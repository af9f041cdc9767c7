use serde::Serialize;
use std::fmt;

/// Pipeline stage, reported through progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Initializing,
    ExtractingSymbols,
    Filtering,
    GeneratingEmbeddings,
    BuildingIndex,
    FindingDuplicates,
    UpdatingRegistry,
    FormattingResults,
    Completed,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Initializing => "initializing",
            ProgressStage::ExtractingSymbols => "extracting_symbols",
            ProgressStage::Filtering => "filtering",
            ProgressStage::GeneratingEmbeddings => "generating_embeddings",
            ProgressStage::BuildingIndex => "building_index",
            ProgressStage::FindingDuplicates => "finding_duplicates",
            ProgressStage::UpdatingRegistry => "updating_registry",
            ProgressStage::FormattingResults => "formatting_results",
            ProgressStage::Completed => "completed",
        }
    }

    /// Overall completion when the stage starts.
    pub fn percent(&self) -> f32 {
        match self {
            ProgressStage::Initializing => 0.0,
            ProgressStage::ExtractingSymbols => 10.0,
            ProgressStage::Filtering => 20.0,
            ProgressStage::GeneratingEmbeddings => 30.0,
            ProgressStage::BuildingIndex => 50.0,
            ProgressStage::FindingDuplicates => 70.0,
            ProgressStage::UpdatingRegistry => 80.0,
            ProgressStage::FormattingResults => 90.0,
            ProgressStage::Completed => 100.0,
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Called with (stage, message, percent) at each stage transition.
pub type ProgressCallback = Box<dyn Fn(ProgressStage, &str, f32) + Send + Sync>;
