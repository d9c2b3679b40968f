//! Exit codes and structured error output.

use serde::Serialize;

/// Process exit codes.
///
/// - 0: actions applied, or would apply in a simulation
/// - 1: unexpected failure or fatal configuration error
/// - 2: no cross-volume duplicates (or nothing left to do)
/// - 3: completed, but some actions failed or some files could not be read
/// - 4: an action failed after its source was removed
/// - 130: interrupted by Ctrl+C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Completed; actions were applied or would be applied.
    Success = 0,
    /// An unexpected or fatal error occurred.
    GeneralError = 1,
    /// Completed; nothing to relink.
    NothingToDo = 2,
    /// Completed with non-fatal errors.
    PartialSuccess = 3,
    /// A logical file lost its data during relinking.
    DataLoss = 4,
    /// Interrupted by user.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "CL000",
            Self::GeneralError => "CL001",
            Self::NothingToDo => "CL002",
            Self::PartialSuccess => "CL003",
            Self::DataLoss => "CL004",
            Self::Interrupted => "CL130",
        }
    }
}

/// Structured error information for `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g. "CL001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Whether the run was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Build from an error and the exit code it maps to.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
