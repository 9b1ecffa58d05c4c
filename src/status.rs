//! Exit status codes for the CLI
//!
//! apiflow follows standard Unix exit code conventions:
//! - 0: Success
//! - 1: Any error (config errors, transport failures, failed actions)
//! - 130: User interrupted (Ctrl+C, standard SIGINT exit code)

use std::process::{ExitCode, Termination};

/// Exit status codes following standard Unix conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    /// Successful execution
    Success = 0,
    /// Any error (load, validation, or execution failure)
    Error = 1,
    /// User interrupted (Ctrl+C) - standard SIGINT code
    Interrupted = 130,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status as u8)
    }
}

impl Termination for ExitStatus {
    fn report(self) -> ExitCode {
        ExitCode::from(self as u8)
    }
}
