//! CLI entry point for semantic duplicate detection.
//!
//! Loads settings, builds a [`DuplicateFinder`] over a JSON symbol dump and
//! renders the report as tables or a JSON envelope. This is the only place
//! that maps errors to process exit codes.

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use codedupe::display::{
    create_findings_table, create_key_value_table, create_stage_bar, create_summary_table,
    stage_callback, with_spinner,
};
use codedupe::io::{ExitCode, JsonResponse, OutputFormat, ResponseMeta};
use codedupe::logging::{self, LogFormat};
use codedupe::{DuplicateFinder, DuplicateReport, FinderError, JsonSymbolSource, Settings};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Semantic duplicate detection for code symbols
#[derive(Parser)]
#[command(
    name = "codedupe",
    version = env!("CARGO_PKG_VERSION"),
    about = "Find semantically duplicated code symbols",
    long_about = "Embed extracted symbols, search for near neighbors and report duplicate pairs by severity.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to a settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root used to resolve relative paths
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format on stderr
    #[arg(long, global = true, value_name = "text|json")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every symbol in a symbol dump
    #[command(
        after_help = "Examples:\n  codedupe analyze --symbols symbols.json\n  codedupe analyze --symbols symbols.json --threshold 0.85 --json"
    )]
    Analyze {
        /// JSON symbol dump produced by the parser
        #[arg(short, long)]
        symbols: PathBuf,

        /// Minimum similarity to report (defaults to the low threshold)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Emit the JSON envelope on stdout
        #[arg(long)]
        json: bool,

        /// Also write the JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Analyze only symbols in changed files
    Incremental {
        #[arg(short, long)]
        symbols: PathBuf,

        /// Changed files; defaults to tracked files whose content changed
        #[arg(long, num_args = 1..)]
        changed: Vec<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Remove stale registry entries and optionally all caches
    Cleanup {
        /// Evict registry entries older than this many hours (0 removes all)
        #[arg(long)]
        older_than_hours: Option<u64>,

        /// Also clear the embedding cache and the in-memory index
        #[arg(long)]
        clear_caches: bool,
    },

    /// Show component information
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Print the effective settings
    Config,

    /// Write a default .codedupe/settings.toml
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

impl Commands {
    fn output_format(&self) -> OutputFormat {
        match self {
            Commands::Analyze { json, .. }
            | Commands::Incremental { json, .. }
            | Commands::Status { json } => OutputFormat::from_json_flag(*json),
            _ => OutputFormat::Text,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let format = cli.command.output_format();

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => report_failure(&err, format),
    };
    std::process::exit(code.into());
}

fn report_failure(err: &anyhow::Error, format: OutputFormat) -> ExitCode {
    match err.downcast_ref::<FinderError>() {
        Some(finder_err) => {
            let code = ExitCode::from_error(finder_err);
            if format.is_json() {
                let response =
                    JsonResponse::from_error(finder_err).with_meta(ResponseMeta::now(None));
                print_json(&response);
            } else {
                eprintln!("Error: {finder_err}");
                for suggestion in finder_err.recovery_suggestions() {
                    eprintln!("  Suggestion: {suggestion}");
                }
            }
            code
        }
        None => {
            eprintln!("Error: {err:#}");
            ExitCode::GeneralError
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing output: {e}"),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, FinderError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    if let Some(root) = &cli.project_root {
        settings.project_root = Some(root.clone());
    }
    if let Some(format) = cli.log_format {
        settings.logging.format = format;
    }
    match cli.verbose {
        0 => {}
        1 => settings.logging.level = "debug".to_string(),
        _ => settings.logging.level = "trace".to_string(),
    }
    Ok(settings)
}

fn open_finder(
    settings: Settings,
    symbols: Option<&Path>,
) -> Result<DuplicateFinder, FinderError> {
    let source = match symbols {
        Some(path) => JsonSymbolSource::from_file(path).map_err(|e| {
            FinderError::init(
                codedupe::error::Component::SymbolSource,
                "symbol extraction",
                e,
            )
        })?,
        None => JsonSymbolSource::default(),
    };
    DuplicateFinder::new(settings, Box::new(source))
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = load_settings(&cli)?;
    logging::init(&settings.logging);

    match cli.command {
        Commands::Init { force } => {
            let root = settings.resolved_project_root();
            let path = Settings::init_config_file(&root, force).map_err(FinderError::from)?;
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            Ok(ExitCode::Success)
        }

        Commands::Config => {
            let rendered =
                toml::to_string_pretty(&settings).context("failed to render settings as TOML")?;
            println!("{rendered}");
            Ok(ExitCode::Success)
        }

        Commands::Analyze {
            symbols,
            threshold,
            json,
            output,
        } => {
            let started = Instant::now();
            let mut finder = open_finder(settings, Some(&symbols))?;
            let bar = (!json).then(create_stage_bar);
            if let Some(bar) = &bar {
                finder.set_progress_callback(stage_callback(bar));
            }

            let report = finder.analyze_project(threshold)?;
            if let Some(path) = &output {
                write_report(&report, path)?;
            }
            emit_report(&report, json, started);
            Ok(ExitCode::Success)
        }

        Commands::Incremental {
            symbols,
            changed,
            json,
        } => {
            let started = Instant::now();
            let mut finder = open_finder(settings, Some(&symbols))?;
            let changed = (!changed.is_empty()).then_some(changed);
            let report = if json {
                finder.incremental_analysis(changed)?
            } else {
                with_spinner("Analyzing changed files", || {
                    finder.incremental_analysis(changed)
                })?
            };
            emit_report(&report, json, started);
            Ok(ExitCode::Success)
        }

        Commands::Cleanup {
            older_than_hours,
            clear_caches,
        } => {
            let mut finder = open_finder(settings, None)?;
            let mut removed = 0;
            if let Some(hours) = older_than_hours {
                removed += finder.prune_registry(Some(hours))?;
            }
            let summary = finder.cleanup(clear_caches)?;
            removed += summary.registry_entries_removed;

            println!(
                "{}",
                create_key_value_table(&[
                    ("Registry entries removed", removed.to_string()),
                    (
                        "Cache entries removed",
                        summary.cache_entries_removed.to_string()
                    ),
                ])
            );
            Ok(ExitCode::Success)
        }

        Commands::Status { json } => {
            let finder = open_finder(settings, None)?;
            let info = finder.finder_info();
            if json {
                print_json(&JsonResponse::success(&info).with_meta(ResponseMeta::now(None)));
            } else {
                let components = &info.components;
                println!(
                    "{}",
                    create_key_value_table(&[
                        ("Project root", info.project_root.display().to_string()),
                        ("Embedding", components.embedder.method.to_string()),
                        ("Model", components.embedder.model_name.clone()),
                        ("Dimension", components.embedder.dimension.to_string()),
                        ("Cached embeddings", components.embedder.cache_entries.to_string()),
                        ("Similarity backend", components.similarity_index.method.to_string()),
                        ("Registry status", components.registry.status.to_string()),
                        ("Registry symbols", components.registry.symbols_count.to_string()),
                        ("Tracked files", components.registry.files_tracked.to_string()),
                    ])
                );
            }
            Ok(ExitCode::Success)
        }
    }
}

fn write_report(report: &DuplicateReport, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    eprintln!("Report written to {}", path.display());
    Ok(())
}

fn emit_report(report: &DuplicateReport, json: bool, started: Instant) {
    if json {
        let message = format!(
            "Found {} duplicates among {} symbols",
            report.summary.total_duplicates_found, report.summary.symbols_analyzed
        );
        let elapsed = started.elapsed().as_millis() as u64;
        print_json(
            &JsonResponse::success(report)
                .with_message(message)
                .with_meta(ResponseMeta::now(Some(elapsed))),
        );
        return;
    }

    if report.findings.is_empty() {
        println!("No duplicates found.");
    } else {
        println!("{}", create_findings_table(report));
    }
    println!("{}", create_summary_table(report));
}
