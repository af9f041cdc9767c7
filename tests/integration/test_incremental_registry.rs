//! Registry persistence, incremental runs and cache reuse across finders.

use crate::common::{TableModel, TestProject, axis, tagged};
use codedupe::duplicates::AnalysisMode;
use codedupe::io::ExitCode;
use codedupe::{DuplicateFinder, FinderError, JsonSymbolSource, Symbol};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

const DIM: usize = 8;

fn project_with_sources() -> (TestProject, Vec<Symbol>) {
    let project = TestProject::new();
    project.add_file(
        "src/orders.py",
        "def total(items): return process(items)\ndef subtotal(items): return process(items)\n",
    );
    project.add_file("src/billing.py", "def invoice(items): return process(items)\n");

    let symbols = vec![
        tagged("total", "src/orders.py", 1, "sum"),
        tagged("subtotal", "src/orders.py", 2, "sum"),
        tagged("invoice", "src/billing.py", 1, "bill"),
    ];
    (project, symbols)
}

fn model() -> TableModel {
    TableModel::new(DIM)
        .with("sum", axis(DIM, 0))
        .with("bill", axis(DIM, 1))
}

fn open(project: &TestProject, symbols: &[Symbol], model: TableModel) -> DuplicateFinder {
    let source = JsonSymbolSource::from_symbols(symbols.to_vec());
    DuplicateFinder::with_model(project.settings(), Box::new(source), Box::new(model))
        .expect("finder should initialize")
}

#[test]
fn test_analysis_populates_registry() {
    let (project, symbols) = project_with_sources();
    let mut finder = open(&project, &symbols, model());

    let report = finder.analyze_project(None).unwrap();
    assert_eq!(report.metadata.stats.registry_updates, 3);

    let registry = finder.registry();
    assert_eq!(registry.entry_count(), 3);
    assert_eq!(registry.index().files_tracked.len(), 2);
    assert!(project.path().join(".codedupe").is_dir());
}

#[test]
fn test_second_run_reuses_cached_embeddings() {
    let (project, symbols) = project_with_sources();

    let first = model();
    let first_calls = first.counter();
    open(&project, &symbols, first).analyze_project(None).unwrap();
    assert_eq!(first_calls.load(Ordering::SeqCst), 3);

    let second = model();
    let second_calls = second.counter();
    let mut finder = open(&project, &symbols, second);
    let report = finder.analyze_project(None).unwrap();

    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.summary.total_duplicates_found, 1);
    let stats = finder.finder_info().components.embedder.cache_stats;
    assert_eq!(stats.hits, 3);
}

#[test]
fn test_incremental_without_changes_is_not_found() {
    let (project, symbols) = project_with_sources();
    let mut finder = open(&project, &symbols, model());
    finder.analyze_project(None).unwrap();

    let err = finder.incremental_analysis(None).unwrap_err();
    assert!(matches!(err, FinderError::NoChangedFiles));
    assert_eq!(ExitCode::from_error(&err), ExitCode::NotFound);
}

#[test]
fn test_incremental_detects_edited_file() {
    let (project, symbols) = project_with_sources();
    let mut finder = open(&project, &symbols, model());
    finder.analyze_project(None).unwrap();

    project.add_file(
        "src/orders.py",
        "def total(items): return process(items)\n\ndef subtotal(items): return process(items)\n",
    );
    assert_eq!(
        finder.registry().changed_tracked_files(),
        vec![PathBuf::from("src/orders.py")]
    );

    let report = finder.incremental_analysis(None).unwrap();
    assert_eq!(report.metadata.analysis_mode, AnalysisMode::Incremental);
    assert_eq!(
        report.metadata.changed_files,
        Some(vec!["src/orders.py".to_string()])
    );
    assert_eq!(report.summary.symbols_analyzed, 2);
    assert_eq!(report.summary.total_duplicates_found, 1);
    assert!(report
        .findings
        .iter()
        .all(|f| f.file_path == "src/orders.py"));
}

#[test]
fn test_incremental_with_explicit_files() {
    let (project, symbols) = project_with_sources();
    let mut finder = open(&project, &symbols, model());

    let report = finder
        .incremental_analysis(Some(vec![project.path().join("src/billing.py")]))
        .unwrap();

    assert_eq!(report.summary.symbols_analyzed, 1);
    assert_eq!(report.summary.total_duplicates_found, 0);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["metadata"]["analysis_mode"], "incremental");
}

#[test]
fn test_prune_with_zero_hours_removes_everything() {
    let (project, symbols) = project_with_sources();
    let mut finder = open(&project, &symbols, model());
    finder.analyze_project(None).unwrap();

    assert_eq!(finder.prune_registry(Some(0)).unwrap(), 3);
    assert_eq!(finder.registry().entry_count(), 0);
    assert!(finder.registry().index().files_tracked.is_empty());
    assert_eq!(finder.prune_registry(Some(0)).unwrap(), 0);
}

#[test]
fn test_cleanup_with_caches_empties_embedding_cache() {
    let (project, symbols) = project_with_sources();
    let mut finder = open(&project, &symbols, model());
    finder.analyze_project(None).unwrap();
    assert_eq!(finder.embedder().engine_info().cache_entries, 3);

    let summary = finder.cleanup(true).unwrap();
    assert_eq!(summary.cache_entries_removed, 3);
    assert_eq!(finder.embedder().engine_info().cache_entries, 0);
    // Entries written moments ago are younger than the registry TTL
    assert_eq!(summary.registry_entries_removed, 0);
}

#[test]
fn test_registry_survives_reopen() {
    let (project, symbols) = project_with_sources();
    open(&project, &symbols, model()).analyze_project(None).unwrap();

    let finder = open(&project, &symbols, model());
    assert_eq!(finder.registry().entry_count(), 3);
    assert!(finder.registry().changed_tracked_files().is_empty());
}
