//! Process exit codes for the CLI.
//!
//! - `0`: analysis ran (duplicates found or not)
//! - `1`: unspecified failure
//! - `2`: a component failed to start, automation should stop
//! - `3`, `5`, `6`: specific recoverable failures

use crate::error::{ComponentError, FinderError};
use crate::registry::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,

    GeneralError = 1,

    /// A component could not be initialized or failed its health check
    BlockingError = 2,

    /// No symbols or no changed files to analyze
    NotFound = 3,

    IoError = 5,

    ConfigError = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Map a finder failure to the code scripts should branch on.
    pub fn from_error(error: &FinderError) -> Self {
        match error {
            FinderError::ComponentInit { .. } | FinderError::HealthCheck { .. } => {
                ExitCode::BlockingError
            }
            FinderError::NoSymbols { .. }
            | FinderError::NoSymbolsAfterFilter { .. }
            | FinderError::NoChangedFiles => ExitCode::NotFound,
            FinderError::Config(_) => ExitCode::ConfigError,
            FinderError::StageFailed { source, .. } | FinderError::Cleanup { source, .. } => {
                match source {
                    ComponentError::Registry(RegistryError::Io { .. })
                    | ComponentError::Registry(RegistryError::NotWritable { .. }) => {
                        ExitCode::IoError
                    }
                    _ => ExitCode::GeneralError,
                }
            }
        }
    }

    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::NotFound => "Nothing to analyze",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
        }
    }
}
