//! Table rendering for reports and status output.

use crate::duplicates::{DuplicateReport, Severity};
use comfy_table::{
    Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

/// Longest location shown before eliding the start of the path.
const MAX_LOCATION_CHARS: usize = 48;

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table
}

fn header(cells: &[&str]) -> Vec<Cell> {
    cells
        .iter()
        .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
        .collect()
}

fn severity_cell(severity: Severity) -> Cell {
    let color = match severity {
        Severity::Critical => Color::Red,
        Severity::High => Color::Yellow,
        Severity::Medium => Color::Cyan,
        Severity::Low => Color::Grey,
    };
    Cell::new(severity.as_str())
        .fg(color)
        .add_attribute(Attribute::Bold)
}

fn location(file: &str, line: u32) -> String {
    let full = format!("{file}:{line}");
    let count = full.chars().count();
    if count <= MAX_LOCATION_CHARS {
        return full;
    }
    let tail: String = full.chars().skip(count - (MAX_LOCATION_CHARS - 1)).collect();
    format!("…{tail}")
}

/// One row per finding, ordered as reported.
pub fn create_findings_table(report: &DuplicateReport) -> String {
    let mut table = new_table();
    table.set_header(header(&["#", "Severity", "Score", "Original", "Duplicate"]));

    for (i, finding) in report.findings.iter().enumerate() {
        let original = &finding.evidence.original_symbol;
        let duplicate = &finding.evidence.duplicate_symbol;
        table.add_row(vec![
            Cell::new(i + 1),
            severity_cell(finding.severity),
            Cell::new(format!("{:.3}", finding.evidence.similarity_score)),
            Cell::new(format!(
                "{}\n{}",
                original.name,
                location(&original.file, original.line)
            )),
            Cell::new(format!(
                "{}\n{}",
                duplicate.name,
                location(&duplicate.file, duplicate.line)
            )),
        ]);
    }

    table.to_string()
}

/// Run totals and the severity breakdown.
pub fn create_summary_table(report: &DuplicateReport) -> String {
    let summary = &report.summary;
    let stats = &report.metadata.stats;
    let breakdown = summary.severity_breakdown;

    let mut table = new_table();
    table.set_header(header(&["Metric", "Value"]));
    table.add_row(vec![
        "Mode".to_string(),
        format!("{:?}", report.metadata.analysis_mode).to_lowercase(),
    ]);
    table.add_row(vec![
        "Symbols analyzed".to_string(),
        summary.symbols_analyzed.to_string(),
    ]);
    table.add_row(vec![
        "Symbols filtered out".to_string(),
        (stats.filter.skipped_kind + stats.filter.skipped_length + stats.filter.skipped_pattern)
            .to_string(),
    ]);
    if stats.files_skipped > 0 {
        table.add_row(vec![
            "Files skipped".to_string(),
            stats.files_skipped.to_string(),
        ]);
    }
    table.add_row(vec![
        "Duplicates".to_string(),
        summary.total_duplicates_found.to_string(),
    ]);
    table.add_row(vec![
        "Critical / High / Medium / Low".to_string(),
        format!(
            "{} / {} / {} / {}",
            breakdown.critical, breakdown.high, breakdown.medium, breakdown.low
        ),
    ]);
    table.add_row(vec![
        "Backend".to_string(),
        report
            .metadata
            .component_info
            .similarity_index
            .method
            .to_string(),
    ]);
    table.add_row(vec![
        "Time".to_string(),
        format!("{:.2}s", summary.execution_time_seconds),
    ]);

    table.to_string()
}

/// Two-column key/value table.
pub fn create_key_value_table(rows: &[(&str, String)]) -> String {
    let mut table = new_table();
    table.set_header(header(&["Property", "Value"]));
    for (key, value) in rows {
        table.add_row(vec![key.to_string(), value.clone()]);
    }
    table.to_string()
}
