//! End-to-end detection runs with controlled embedding vectors.

use crate::common::{TableModel, TestProject, axis, rotated, tagged};
use codedupe::duplicates::{ComparisonType, DuplicateReason};
use codedupe::io::ExitCode;
use codedupe::{DuplicateFinder, FinderError, JsonSymbolSource, Severity, Symbol, SymbolKind};

const DIM: usize = 12;

fn finder_with(project: &TestProject, symbols: Vec<Symbol>, model: TableModel) -> DuplicateFinder {
    let source = JsonSymbolSource::from_symbols(symbols);
    DuplicateFinder::with_model(project.settings(), Box::new(source), Box::new(model))
        .expect("finder should initialize")
}

#[test]
fn test_each_severity_tier_is_reported() {
    let project = TestProject::new();
    let symbols = vec![
        tagged("parse_a", "src/a.py", 1, "exact-1"),
        tagged("parse_b", "src/b.py", 1, "exact-2"),
        tagged("load_a", "src/a.py", 10, "high-1"),
        tagged("load_b", "src/b.py", 10, "high-2"),
        tagged("save_a", "src/a.py", 20, "medium-1"),
        tagged("save_b", "src/c.py", 20, "medium-2"),
        tagged("sync_a", "src/a.py", 30, "low-1"),
        tagged("sync_b", "src/d.py", 30, "low-2"),
        tagged("draw_a", "src/a.py", 40, "none-1"),
        tagged("draw_b", "src/e.py", 40, "none-2"),
    ];
    let model = TableModel::new(DIM)
        .with("exact-1", axis(DIM, 0))
        .with("exact-2", axis(DIM, 0))
        .with("high-1", axis(DIM, 2))
        .with("high-2", rotated(DIM, 2, 3, 0.90))
        .with("medium-1", axis(DIM, 4))
        .with("medium-2", rotated(DIM, 4, 5, 0.80))
        .with("low-1", axis(DIM, 6))
        .with("low-2", rotated(DIM, 6, 7, 0.70))
        .with("none-1", axis(DIM, 8))
        .with("none-2", rotated(DIM, 8, 9, 0.50));

    let mut finder = finder_with(&project, symbols, model);
    let report = finder.analyze_project(None).unwrap();

    assert_eq!(report.summary.total_duplicates_found, 4);
    let breakdown = report.summary.severity_breakdown;
    assert_eq!(
        (breakdown.critical, breakdown.high, breakdown.medium, breakdown.low),
        (1, 1, 1, 1)
    );

    let by_name = |name: &str| {
        report
            .findings
            .iter()
            .find(|f| f.evidence.original_symbol.name == name || f.evidence.duplicate_symbol.name == name)
            .unwrap_or_else(|| panic!("no finding for {name}"))
    };

    let exact = by_name("parse_a");
    assert_eq!(exact.severity, Severity::Critical);
    assert_eq!(exact.evidence.comparison_type, ComparisonType::Exact);
    assert_eq!(
        exact.evidence.reason,
        Some(DuplicateReason::IdenticalImplementation)
    );

    let high = by_name("load_a");
    assert_eq!(high.severity, Severity::High);
    assert_eq!(high.evidence.reason, Some(DuplicateReason::CopyPaste));
    assert!((high.evidence.similarity_score - 0.90).abs() < 1e-3);

    let medium = by_name("save_a");
    assert_eq!(medium.severity, Severity::Medium);
    assert_eq!(medium.evidence.comparison_type, ComparisonType::Structural);
    assert_eq!(medium.evidence.reason, Some(DuplicateReason::RefactorCandidate));

    let low = by_name("sync_a");
    assert_eq!(low.severity, Severity::Low);
    assert_eq!(low.evidence.reason, None);

    assert!(report
        .findings
        .iter()
        .all(|f| f.evidence.original_symbol.name != "draw_a"));
}

#[test]
fn test_same_file_high_similarity_is_similar_functionality() {
    let project = TestProject::new();
    let symbols = vec![
        tagged("render_row", "src/view.py", 1, "row"),
        tagged("render_cell", "src/view.py", 12, "cell"),
    ];
    let model = TableModel::new(DIM)
        .with("row", axis(DIM, 0))
        .with("cell", rotated(DIM, 0, 1, 0.88));

    let mut finder = finder_with(&project, symbols.clone(), model);
    let duplicates = finder.find_duplicates(&symbols, None).unwrap();

    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].severity, Severity::High);
    assert_eq!(
        duplicates[0].reason,
        Some(DuplicateReason::SimilarFunctionality)
    );
}

#[test]
fn test_each_pair_reported_once() {
    let project = TestProject::new();
    let symbols = vec![
        tagged("one", "src/a.py", 1, "same"),
        tagged("two", "src/b.py", 1, "same"),
        tagged("three", "src/c.py", 1, "same"),
    ];
    let model = TableModel::new(DIM).with("same", axis(DIM, 0));

    let mut finder = finder_with(&project, symbols.clone(), model);
    let duplicates = finder.find_duplicates(&symbols, None).unwrap();

    assert_eq!(duplicates.len(), 3);
    let mut pairs: Vec<(String, String)> = duplicates
        .iter()
        .map(|d| {
            let mut pair = [d.original_symbol.name.clone(), d.duplicate_symbol.name.clone()];
            pair.sort();
            (pair[0].clone(), pair[1].clone())
        })
        .collect();
    pairs.sort();
    pairs.dedup();
    assert_eq!(pairs.len(), 3, "no pair may appear in both orders");
    assert!(duplicates.iter().all(|d| d.original_symbol != d.duplicate_symbol));
}

#[test]
fn test_explicit_threshold_hides_lower_tiers() {
    let project = TestProject::new();
    let symbols = vec![
        tagged("exact_a", "src/a.py", 1, "e1"),
        tagged("exact_b", "src/b.py", 1, "e2"),
        tagged("loose_a", "src/a.py", 9, "l1"),
        tagged("loose_b", "src/b.py", 9, "l2"),
    ];
    let model = TableModel::new(DIM)
        .with("e1", axis(DIM, 0))
        .with("e2", axis(DIM, 0))
        .with("l1", axis(DIM, 2))
        .with("l2", rotated(DIM, 2, 3, 0.70));

    let mut finder = finder_with(&project, symbols.clone(), model);
    let duplicates = finder.find_duplicates(&symbols, Some(0.85)).unwrap();

    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].severity, Severity::Critical);
}

#[test]
fn test_excluded_files_and_kinds_are_filtered() {
    let project = TestProject::new();
    let symbols = vec![
        tagged("handler", "src/api.py", 1, "h"),
        tagged("handler_copy", "src/api_v2.py", 1, "h"),
        tagged("test_handler", "src/test_api.py", 1, "h"),
        tagged("mock_handler", "node_modules/lib/index.js", 1, "h"),
        Symbol::new(
            "HANDLER_NAME",
            SymbolKind::Constant,
            "src/consts.py",
            1,
            "HANDLER_NAME = 'handler'  # h",
        ),
        Symbol::new("f", SymbolKind::Function, "src/tiny.py", 1, "f()"),
    ];
    let model = TableModel::new(DIM).with("h", axis(DIM, 0));

    let mut finder = finder_with(&project, symbols, model);
    let report = finder.analyze_project(None).unwrap();

    assert_eq!(report.summary.total_duplicates_found, 1);
    assert_eq!(report.summary.symbols_analyzed, 6);

    let filter = report.metadata.stats.filter;
    assert_eq!(filter.kept, 2);
    assert_eq!(filter.skipped_kind, 1);
    assert_eq!(filter.skipped_length, 1);
    assert_eq!(filter.skipped_pattern, 2);

    let finding = &report.findings[0];
    let files = [
        finding.evidence.original_symbol.file.as_str(),
        finding.evidence.duplicate_symbol.file.as_str(),
    ];
    assert!(files.contains(&"src/api.py"));
    assert!(files.contains(&"src/api_v2.py"));
}

#[test]
fn test_nothing_left_after_filtering_is_not_found() {
    let project = TestProject::new();
    let symbols = vec![
        tagged("test_one", "src/test_a.py", 1, "x"),
        tagged("test_two", "src/test_b.py", 1, "x"),
    ];
    let model = TableModel::new(DIM).with("x", axis(DIM, 0));

    let mut finder = finder_with(&project, symbols, model);
    let err = finder.analyze_project(None).unwrap_err();

    assert!(matches!(err, FinderError::NoSymbolsAfterFilter { extracted: 2 }));
    assert_eq!(ExitCode::from_error(&err), ExitCode::NotFound);
}

#[test]
fn test_out_of_range_threshold_is_config_error() {
    let project = TestProject::new();
    let symbols = vec![
        tagged("one", "src/a.py", 1, "x"),
        tagged("two", "src/b.py", 1, "x"),
    ];
    let model = TableModel::new(DIM).with("x", axis(DIM, 0));

    let mut finder = finder_with(&project, symbols.clone(), model);
    let err = finder.find_duplicates(&symbols, Some(-0.1)).unwrap_err();

    assert_eq!(err.status_code(), "CONFIG_ERROR");
    assert_eq!(ExitCode::from_error(&err), ExitCode::ConfigError);
}

#[test]
fn test_misordered_thresholds_fail_construction() {
    let project = TestProject::new();
    let mut settings = project.settings();
    settings.duplicates.medium = 0.90;

    let source = JsonSymbolSource::from_symbols(Vec::new());
    let err = DuplicateFinder::new(settings, Box::new(source)).unwrap_err();
    assert!(matches!(err, FinderError::Config(_)));
}

#[test]
fn test_report_json_layout() {
    let project = TestProject::new();
    let symbols = vec![
        tagged("fetch_user", "src/users.py", 4, "f"),
        tagged("fetch_account", "src/accounts.py", 8, "f"),
    ];
    let model = TableModel::new(DIM).with("f", axis(DIM, 0));

    let mut finder = finder_with(&project, symbols, model);
    let report = finder.analyze_project(None).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["analysis_type"], "duplicate_detection");
    assert_eq!(json["summary"]["detection_method"], "embedding_similarity");
    assert_eq!(json["summary"]["total_duplicates_found"], 1);
    assert_eq!(json["findings"][0]["finding_id"], "duplicate_0000");
    assert_eq!(json["findings"][0]["severity"], "critical");
    assert_eq!(json["metadata"]["analysis_mode"], "full");
    assert!(json["metadata"].get("changed_files").is_none());
    assert_eq!(json["metadata"]["component_info"]["embedder"]["model_name"], "table");
    assert!(json["findings"][0]["title"]
        .as_str()
        .unwrap()
        .starts_with("Duplicate: "));
}
