//! The detection pipeline.
//!
//! [`DuplicateFinder`] owns one instance of every component. Construction
//! fails unless each component initializes and passes its health check, and a
//! failure in any stage aborts the run with a [`FinderError`] naming the
//! component at fault. Nothing here degrades silently or exits the process.

use super::classify::{Thresholds, classify};
use super::filter::SymbolFilter;
use super::report::{
    AnalysisMode, ComponentInfo, ConfigurationSnapshot, DETECTION_METHOD, DuplicateDetails,
    DuplicateReport, DuplicateResult, ReportMetadata, RunStats,
};
use super::stage::{ProgressCallback, ProgressStage};
use crate::config::Settings;
use crate::embedding::{EmbeddingModel, SymbolEmbedder, create_model};
use crate::error::{Component, ConfigError, FinderError, FinderResult};
use crate::registry::{
    EMBEDDING_METHOD_KEY, RegistryStats, RegistryStore, SIMILARITY_METHOD_KEY, normalize_path,
};
use crate::symbol::{Symbol, SymbolSource};
use crate::vector::{SimilarityDetector, VectorError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Diagnostic snapshot of the finder and its components.
#[derive(Debug, Clone, Serialize)]
pub struct FinderInfo {
    pub current_stage: ProgressStage,
    pub project_root: PathBuf,
    pub thresholds: Thresholds,
    pub configuration: ConfigurationSnapshot,
    pub components: ComponentInfo,
    pub stats: RunStats,
}

/// What [`DuplicateFinder::cleanup`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub cache_entries_removed: usize,
    pub registry_entries_removed: usize,
}

pub struct DuplicateFinder {
    settings: Settings,
    thresholds: Thresholds,
    project_root: PathBuf,
    source: Box<dyn SymbolSource>,
    embedder: SymbolEmbedder,
    detector: SimilarityDetector,
    registry: RegistryStore,
    filter: SymbolFilter,
    stage: ProgressStage,
    stats: RunStats,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for DuplicateFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateFinder")
            .field("project_root", &self.project_root)
            .field("source", &self.source.describe())
            .field("embedder", &self.embedder)
            .field("detector", &self.detector)
            .field("stage", &self.stage)
            .finish()
    }
}

impl DuplicateFinder {
    /// Construct and verify every component.
    pub fn new(settings: Settings, source: Box<dyn SymbolSource>) -> FinderResult<Self> {
        settings.validate()?;
        let model = create_model(&settings.embedding)
            .map_err(|e| FinderError::init(Component::Embedder, "text embedding model", e))?;
        Self::with_model(settings, source, model)
    }

    /// Like [`DuplicateFinder::new`] with an already constructed model.
    pub fn with_model(
        settings: Settings,
        source: Box<dyn SymbolSource>,
        model: Box<dyn EmbeddingModel>,
    ) -> FinderResult<Self> {
        settings.validate()?;
        let thresholds = settings.duplicates.thresholds()?;
        let project_root = settings.resolved_project_root();
        let filter = SymbolFilter::new(&settings.duplicates, &project_root)?;

        source
            .files()
            .map_err(|e| FinderError::init(Component::SymbolSource, "symbol extraction", e))?;

        let cache_dir = settings.resolve_path(&settings.embedding.cache_dir);
        let embedder = SymbolEmbedder::with_model(&settings.embedding, model, cache_dir);

        let detector = SimilarityDetector::new(settings.similarity.clone()).map_err(|e| {
            FinderError::init(Component::SimilarityIndex, "nearest-neighbor search", e)
        })?;

        let registry = RegistryStore::open(&settings.registry, &project_root).map_err(|e| {
            FinderError::init(Component::Registry, "persistent symbol registry", e)
        })?;

        let finder = Self {
            settings,
            thresholds,
            project_root,
            source,
            embedder,
            detector,
            registry,
            filter,
            stage: ProgressStage::Initializing,
            stats: RunStats::default(),
            progress: None,
        };
        finder.validate_components()?;

        info!(
            project_root = %finder.project_root.display(),
            source = %finder.source.describe(),
            backend = %finder.detector.tier(),
            embedding = %finder.embedder.method(),
            "duplicate finder initialized"
        );
        Ok(finder)
    }

    fn validate_components(&self) -> FinderResult<()> {
        self.embedder
            .health_check()
            .map_err(|e| FinderError::HealthCheck {
                component: Component::Embedder,
                capability: "text embedding model",
                reason: e.to_string(),
            })?;

        let probe = [1.0, 0.0, 0.0];
        let self_similarity = self.detector.compute_pairwise_similarity(&probe, &probe);
        if (self_similarity - 1.0).abs() > 1e-3 {
            return Err(FinderError::HealthCheck {
                component: Component::SimilarityIndex,
                capability: "nearest-neighbor search",
                reason: format!("identical vectors scored {self_similarity:.4}"),
            });
        }

        self.registry
            .health_check()
            .map_err(|e| FinderError::HealthCheck {
                component: Component::Registry,
                capability: "persistent symbol registry",
                reason: e.to_string(),
            })?;
        Ok(())
    }

    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    pub fn current_stage(&self) -> ProgressStage {
        self.stage
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    pub fn embedder(&self) -> &SymbolEmbedder {
        &self.embedder
    }

    fn update_progress(&mut self, stage: ProgressStage, message: &str) {
        self.stage = stage;
        debug!(%stage, percent = stage.percent(), "{message}");
        if let Some(callback) = &self.progress {
            callback(stage, message, stage.percent());
        }
    }

    /// Detect duplicates among `symbols` at or above `threshold`
    /// (the low threshold when `None`).
    pub fn find_duplicates(
        &mut self,
        symbols: &[Symbol],
        threshold: Option<f32>,
    ) -> FinderResult<Vec<DuplicateResult>> {
        let incremental = self.settings.duplicates.enable_incremental;
        self.run_pipeline(symbols, threshold, incremental)
    }

    fn run_pipeline(
        &mut self,
        symbols: &[Symbol],
        threshold: Option<f32>,
        incremental: bool,
    ) -> FinderResult<Vec<DuplicateResult>> {
        let threshold = self.resolve_threshold(threshold)?;

        self.update_progress(ProgressStage::Filtering, "Filtering symbols");
        let (filtered, counts) = self.filter.apply(symbols);
        self.stats.filter = counts;
        if filtered.is_empty() {
            return Err(FinderError::NoSymbolsAfterFilter {
                extracted: symbols.len(),
            });
        }

        let analyzed = if incremental {
            self.reduce_to_changed(filtered)?
        } else {
            filtered
        };
        self.stats.symbols_analyzed = analyzed.len();

        self.update_progress(
            ProgressStage::GeneratingEmbeddings,
            &format!("Generating embeddings for {} symbols", analyzed.len()),
        );
        let embeddings = self.embedder.generate_embeddings(&analyzed).map_err(|e| {
            FinderError::stage(ProgressStage::GeneratingEmbeddings, Component::Embedder, e)
        })?;
        self.stats.embeddings_generated = embeddings.len();

        self.update_progress(ProgressStage::BuildingIndex, "Building similarity search index");
        let built = self
            .detector
            .build_index(&embeddings, &analyzed)
            .map_err(|e| {
                FinderError::stage(ProgressStage::BuildingIndex, Component::SimilarityIndex, e)
            })?;
        if !built {
            return Err(FinderError::stage(
                ProgressStage::BuildingIndex,
                Component::SimilarityIndex,
                VectorError::BuildFailed {
                    backend: self.detector.tier(),
                    reason: "no rows were indexed".to_string(),
                },
            ));
        }

        self.update_progress(ProgressStage::FindingDuplicates, "Finding duplicate symbol pairs");
        let duplicates = self.find_similar_pairs(&analyzed, &embeddings, threshold)?;
        self.stats.duplicates_found = duplicates.len();

        if self.settings.duplicates.enable_caching {
            self.update_progress(ProgressStage::UpdatingRegistry, "Updating symbol registry");
            let metadata = self.registry_metadata();
            let written = self
                .registry
                .register_symbols(
                    analyzed
                        .iter()
                        .zip(embeddings)
                        .map(|(symbol, embedding)| (symbol, Some(embedding), metadata.clone())),
                )
                .map_err(|e| {
                    FinderError::stage(ProgressStage::UpdatingRegistry, Component::Registry, e)
                })?;
            self.stats.registry_updates = written;
        }

        info!(
            analyzed = analyzed.len(),
            duplicates = duplicates.len(),
            threshold,
            "duplicate detection complete"
        );
        Ok(duplicates)
    }

    fn resolve_threshold(&self, threshold: Option<f32>) -> FinderResult<f32> {
        let threshold = threshold.unwrap_or(self.thresholds.low());
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidValue {
                field: "threshold",
                reason: format!("{threshold} is outside [0, 1]"),
            }
            .into());
        }
        Ok(threshold)
    }

    /// Keep only symbols the registry re-registered. When nothing changed the
    /// full set is analyzed again, mostly from cached embeddings.
    fn reduce_to_changed(&mut self, filtered: Vec<Symbol>) -> FinderResult<Vec<Symbol>> {
        let updates = self
            .registry
            .update_symbols(&filtered)
            .map_err(|e| FinderError::stage(ProgressStage::Filtering, Component::Registry, e))?;

        let changed: Vec<Symbol> = filtered
            .iter()
            .filter(|symbol| {
                let key = self.registry.entry_key(&symbol.file_path, &symbol.name);
                updates.get(key.as_str()).copied().unwrap_or(false)
            })
            .cloned()
            .collect();

        if changed.is_empty() {
            debug!(symbols = filtered.len(), "no registry changes, analyzing full set");
            Ok(filtered)
        } else {
            debug!(changed = changed.len(), of = filtered.len(), "analyzing changed symbols");
            Ok(changed)
        }
    }

    fn find_similar_pairs(
        &self,
        symbols: &[Symbol],
        embeddings: &[Vec<f32>],
        threshold: f32,
    ) -> FinderResult<Vec<DuplicateResult>> {
        let matches = self
            .detector
            .batch_similarity_search(embeddings, threshold)
            .map_err(|e| {
                FinderError::stage(
                    ProgressStage::FindingDuplicates,
                    Component::SimilarityIndex,
                    e,
                )
            })?;

        let details = DuplicateDetails {
            detection_method: DETECTION_METHOD,
            embedding_method: self.embedder.method().to_string(),
            similarity_backend: self.detector.tier(),
        };

        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut duplicates = Vec::new();
        for (query, hits) in matches {
            for hit in hits {
                let pair = (query.min(hit.match_index), query.max(hit.match_index));
                if query == hit.match_index || !seen.insert(pair) {
                    continue;
                }
                let (Some(original), Some(duplicate)) =
                    (symbols.get(query), symbols.get(hit.match_index))
                else {
                    continue;
                };

                let same_file = normalize_path(&self.project_root, Path::new(&original.file_path))
                    == normalize_path(&self.project_root, Path::new(&duplicate.file_path));
                let Some(class) = classify(hit.similarity_score, same_file, &self.thresholds)
                else {
                    continue;
                };

                duplicates.push(DuplicateResult {
                    original_symbol: original.clone(),
                    duplicate_symbol: duplicate.clone(),
                    similarity_score: hit.similarity_score.clamp(0.0, 1.0),
                    confidence: hit.confidence.clamp(0.0, 1.0),
                    severity: class.severity,
                    comparison_type: class.comparison_type,
                    reason: class.reason,
                    details: details.clone(),
                });
            }
        }
        Ok(duplicates)
    }

    fn registry_metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert(
            "analysis_timestamp".into(),
            Value::from(chrono::Utc::now().to_rfc3339()),
        );
        metadata.insert(
            EMBEDDING_METHOD_KEY.into(),
            Value::from(self.embedder.method().to_string()),
        );
        metadata.insert(
            SIMILARITY_METHOD_KEY.into(),
            Value::from(self.detector.tier().to_string()),
        );
        metadata
    }

    /// Extract every file from the source and report duplicates.
    ///
    /// Files that fail extraction are skipped and counted. At most
    /// `max_symbols` symbols are analyzed.
    pub fn analyze_project(&mut self, threshold: Option<f32>) -> FinderResult<DuplicateReport> {
        let started = Instant::now();
        self.stats = RunStats::default();
        self.update_progress(ProgressStage::Initializing, "Initializing duplicate detection analysis");

        self.update_progress(
            ProgressStage::ExtractingSymbols,
            "Extracting symbols from source files",
        );
        let files = self.source.files().map_err(|e| {
            FinderError::stage(ProgressStage::ExtractingSymbols, Component::SymbolSource, e)
        })?;
        let mut symbols = self.extract_files(&files);
        if symbols.is_empty() {
            return Err(FinderError::NoSymbols {
                origin: self.source.describe(),
            });
        }
        let max_symbols = self.settings.duplicates.max_symbols;
        if symbols.len() > max_symbols {
            warn!(
                extracted = symbols.len(),
                max_symbols, "symbol count exceeds max_symbols, truncating"
            );
            symbols.truncate(max_symbols);
        }
        self.stats.symbols_extracted = symbols.len();

        let incremental = self.settings.duplicates.enable_incremental;
        let duplicates = self.run_pipeline(&symbols, threshold, incremental)?;
        self.stats.execution_time_seconds = started.elapsed().as_secs_f64();

        Ok(self.finish_report(&duplicates, symbols.len(), AnalysisMode::Full, None))
    }

    /// Analyze only the symbols of changed files.
    ///
    /// With `None`, the changed files are those the registry tracks whose
    /// content differs from the recorded hash.
    pub fn incremental_analysis(
        &mut self,
        changed_files: Option<Vec<PathBuf>>,
    ) -> FinderResult<DuplicateReport> {
        let started = Instant::now();
        self.stats = RunStats::default();
        self.update_progress(ProgressStage::Initializing, "Initializing incremental analysis");

        let changed_files = changed_files.unwrap_or_else(|| self.registry.changed_tracked_files());
        if changed_files.is_empty() {
            return Err(FinderError::NoChangedFiles);
        }

        self.update_progress(
            ProgressStage::ExtractingSymbols,
            &format!("Extracting symbols from {} changed files", changed_files.len()),
        );
        let wanted: BTreeSet<String> = changed_files
            .iter()
            .map(|path| normalize_path(&self.project_root, path))
            .collect();
        let files: Vec<PathBuf> = self
            .source
            .files()
            .map_err(|e| {
                FinderError::stage(ProgressStage::ExtractingSymbols, Component::SymbolSource, e)
            })?
            .into_iter()
            .filter(|file| wanted.contains(&normalize_path(&self.project_root, file)))
            .collect();

        let symbols = self.extract_files(&files);
        if symbols.is_empty() {
            return Err(FinderError::NoSymbols {
                origin: format!("{} changed files", changed_files.len()),
            });
        }
        self.stats.symbols_extracted = symbols.len();

        let duplicates = self.run_pipeline(&symbols, None, true)?;
        self.stats.execution_time_seconds = started.elapsed().as_secs_f64();

        let changed: Vec<String> = changed_files
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        Ok(self.finish_report(
            &duplicates,
            symbols.len(),
            AnalysisMode::Incremental,
            Some(changed),
        ))
    }

    fn extract_files(&mut self, files: &[PathBuf]) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        for file in files {
            match self.source.extract_file(file) {
                Ok(extracted) => symbols.extend(extracted),
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "skipping file after extraction failure");
                    self.stats.files_skipped += 1;
                }
            }
        }
        symbols
    }

    fn finish_report(
        &mut self,
        duplicates: &[DuplicateResult],
        symbols_analyzed: usize,
        analysis_mode: AnalysisMode,
        changed_files: Option<Vec<String>>,
    ) -> DuplicateReport {
        self.update_progress(ProgressStage::FormattingResults, "Formatting analysis results");
        let metadata = ReportMetadata {
            project_root: self.project_root.clone(),
            analysis_mode,
            changed_files,
            component_info: self.component_info(),
            configuration: self.configuration_snapshot(),
            stats: self.stats,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let report = DuplicateReport::new(duplicates, symbols_analyzed, self.thresholds, metadata);
        self.update_progress(ProgressStage::Completed, "Analysis completed");
        report
    }

    fn component_info(&self) -> ComponentInfo {
        ComponentInfo {
            symbol_source: self.source.describe(),
            embedder: self.embedder.engine_info(),
            similarity_index: self.detector.detector_info(),
            registry: self.registry_stats(),
        }
    }

    fn registry_stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    fn configuration_snapshot(&self) -> ConfigurationSnapshot {
        let config = &self.settings.duplicates;
        ConfigurationSnapshot {
            max_symbols: config.max_symbols,
            batch_size: config.batch_size,
            enable_caching: config.enable_caching,
            enable_incremental: config.enable_incremental,
            min_symbol_length: config.min_symbol_length,
            include_symbol_kinds: config.include_symbol_kinds.clone(),
            exclude_file_patterns: config.exclude_file_patterns.clone(),
        }
    }

    pub fn finder_info(&self) -> FinderInfo {
        FinderInfo {
            current_stage: self.stage,
            project_root: self.project_root.clone(),
            thresholds: self.thresholds,
            configuration: self.configuration_snapshot(),
            components: self.component_info(),
            stats: self.stats,
        }
    }

    /// Remove registry entries older than `older_than_hours` (registry TTL
    /// when `None`).
    pub fn prune_registry(&mut self, older_than_hours: Option<u64>) -> FinderResult<usize> {
        self.registry
            .cleanup_stale_entries(older_than_hours)
            .map_err(|e| FinderError::cleanup(Component::Registry, e))
    }

    /// Reset run state; with `clear_caches`, also empty the embedding cache,
    /// drop the index and evict stale registry entries.
    pub fn cleanup(&mut self, clear_caches: bool) -> FinderResult<CleanupSummary> {
        let mut summary = CleanupSummary::default();

        if clear_caches {
            summary.cache_entries_removed = self
                .embedder
                .clear_cache(None)
                .map_err(|e| FinderError::cleanup(Component::Embedder, e))?;
            self.detector.clear_index();
            summary.registry_entries_removed = self.prune_registry(None)?;
        }

        self.stats = RunStats::default();
        self.embedder.reset_stats();
        self.registry.reset_stats();
        self.stage = ProgressStage::Initializing;

        info!(
            cache_entries = summary.cache_entries_removed,
            registry_entries = summary.registry_entries_removed,
            "cleanup complete"
        );
        Ok(summary)
    }
}
