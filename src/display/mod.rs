//! Terminal rendering for the CLI: stage progress bars and report tables.

pub mod progress;
pub mod tables;

pub use progress::{create_spinner, create_stage_bar, stage_callback, with_spinner};
pub use tables::{create_findings_table, create_key_value_table, create_summary_table};
