//! CLI module for xshacl-explain
//!
//! Explains violation records through the explanation cache, and inspects,
//! summarizes and exports the cache itself.

pub mod commands;
pub mod output;

pub use commands::{ExplainArgs, ExplainCli, ExplainCommands};
pub use output::{ExplainOutput, OutputFormat};

use crate::error::CliError;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Every requested explanation was produced
    Success = 0,
    /// At least one language failed for at least one violation
    ExplanationFailed = 1,
    /// Invalid input, arguments or violation records
    InvalidInput = 3,
    /// File not found or inaccessible
    FileError = 4,
    /// Cache store could not be opened or read
    StoreError = 5,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Invalid records take precedence over generation failures
    pub fn from_outcome(has_invalid: bool, has_failures: bool) -> Self {
        if has_invalid {
            ExitCode::InvalidInput
        } else if has_failures {
            ExitCode::ExplanationFailed
        } else {
            ExitCode::Success
        }
    }
}

impl From<&CliError> for ExitCode {
    fn from(error: &CliError) -> Self {
        match error {
            CliError::InvalidInput(_) | CliError::ParseError(_) | CliError::GeneratorError(_) => {
                ExitCode::InvalidInput
            }
            CliError::FileError(_) => ExitCode::FileError,
            CliError::StoreError(_) => ExitCode::StoreError,
            CliError::SerializationError(_) | CliError::InternalError(_) => ExitCode::InternalError,
        }
    }
}

/// Run the CLI with the given arguments and return the exit code
pub async fn run(cli: ExplainCli) -> Result<ExitCode, CliError> {
    match cli.command {
        ExplainCommands::Explain(args) => commands::execute_explain(args).await,
        ExplainCommands::Inspect {
            store,
            signature,
            format,
        } => commands::execute_inspect(store, signature, format).await,
        ExplainCommands::Stats { store, format } => commands::execute_stats(store, format).await,
        ExplainCommands::Export { store, output } => commands::execute_export(store, output).await,
        ExplainCommands::Signature { violations, format } => {
            commands::execute_signature(violations, format)
        }
    }
}
