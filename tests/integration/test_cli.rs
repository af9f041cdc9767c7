//! The `codedupe` binary driven as a subprocess.

use crate::common::TestProject;
use codedupe::{Symbol, SymbolKind};
use std::process::{Command, Output};

const SETTINGS: &str = r#"
[embedding]
backend = "hashing"
dimension = 128
"#;

fn codedupe(project: &TestProject, args: &[&str]) -> Output {
    let config = project.path().join(".codedupe/settings.toml");
    Command::new(env!("CARGO_BIN_EXE_codedupe"))
        .arg("--config")
        .arg(&config)
        .arg("--project-root")
        .arg(project.path())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run codedupe")
}

fn project() -> TestProject {
    let project = TestProject::new();
    project.add_file(".codedupe/settings.toml", SETTINGS);
    let body = "def read_rows(path): return [line.split(',') for line in open(path)]";
    project.write_dump(&[
        Symbol::new("read_rows", SymbolKind::Function, "src/a.py", 1, body),
        Symbol::new("read_rows", SymbolKind::Function, "src/b.py", 3, body),
    ]);
    project
}

#[test]
fn test_analyze_json_envelope() {
    let project = project();
    let dump = project.path().join("symbols.json");
    let output = codedupe(
        &project,
        &["analyze", "--symbols", dump.to_str().unwrap(), "--json"],
    );

    assert_eq!(output.status.code(), Some(0));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(json["exit_code"], 0);
    assert_eq!(json["data"]["summary"]["total_duplicates_found"], 1);
    assert_eq!(json["data"]["findings"][0]["severity"], "critical");
}

#[test]
fn test_analyze_writes_report_file() {
    let project = project();
    let dump = project.path().join("symbols.json");
    let report = project.path().join("out/report.json");
    let output = codedupe(
        &project,
        &[
            "analyze",
            "--symbols",
            dump.to_str().unwrap(),
            "--json",
            "--output",
            report.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(0));
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(written["analysis_type"], "duplicate_detection");
}

#[test]
fn test_incremental_without_changes_exits_not_found() {
    let project = project();
    let dump = project.path().join("symbols.json");
    let output = codedupe(
        &project,
        &["incremental", "--symbols", dump.to_str().unwrap(), "--json"],
    );

    assert_eq!(output.status.code(), Some(3));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["code"], "NO_CHANGED_FILES");
}

#[test]
fn test_missing_dump_is_blocking() {
    let project = project();
    let output = codedupe(
        &project,
        &["analyze", "--symbols", "does-not-exist.json", "--json"],
    );

    assert_eq!(output.status.code(), Some(2));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["code"], "COMPONENT_INIT_FAILED");
}

#[test]
fn test_status_reports_components() {
    let project = project();
    let output = codedupe(&project, &["status", "--json"]);

    assert_eq!(output.status.code(), Some(0));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["data"]["components"]["embedder"]["method"], "hashing");
    assert_eq!(json["data"]["components"]["registry"]["status"], "healthy");
}
