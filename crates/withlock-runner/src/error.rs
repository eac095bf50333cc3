//! Error types for runner module

use std::io;
use thiserror::Error;

/// Errors raised while resolving, launching, or observing the child process.
///
/// Each variant names the OS operation that failed. The `io::Error` is the one
/// captured directly after that operation, never re-read later.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("{operation} could not resolve '{program}': {reason}")]
    Resolution {
        operation: &'static str,
        program: String,
        code: i32,
        #[source]
        reason: which::Error,
    },

    #[error("{operation} failed while starting the child: {source}")]
    Spawn {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{operation} failed while setting up the kill-group: {source}")]
    Group {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{operation} failed while waiting for the child: {source}")]
    Wait {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{operation} failed to report the child's exit status: {source}")]
    Status {
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

impl RunnerError {
    /// Name of the OS operation that failed
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Resolution { operation, .. }
            | Self::Spawn { operation, .. }
            | Self::Group { operation, .. }
            | Self::Wait { operation, .. }
            | Self::Status { operation, .. } => operation,
        }
    }

    /// OS error code carried by this error, if the failure produced one
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Resolution { code, .. } => Some(*code),
            Self::Spawn { source, .. }
            | Self::Group { source, .. }
            | Self::Wait { source, .. }
            | Self::Status { source, .. } => source.raw_os_error(),
        }
    }
}
