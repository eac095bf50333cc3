//! Run configuration built from the command line

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use withlock_utils::WithLockError;

/// Usage line printed for command-line errors
pub const USAGE: &str = "usage: withlock [-v...] <lock-resource> <command> [args...]";

/// Everything one invocation needs, validated and immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    lock_path: PathBuf,
    program: OsString,
    args: Vec<OsString>,
    verbosity: u8,
}

impl RunConfig {
    /// Validate the positional arguments.
    ///
    /// An empty lock path or command is a usage error.
    pub fn new(
        lock_path: PathBuf,
        program: OsString,
        args: Vec<OsString>,
        verbosity: u8,
    ) -> Result<Self, WithLockError> {
        if lock_path.as_os_str().is_empty() || program.is_empty() {
            return Err(WithLockError::usage(USAGE));
        }

        Ok(Self {
            lock_path,
            program,
            args,
            verbosity,
        })
    }

    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Command as typed, before suffix normalization and path lookup
    #[must_use]
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    #[must_use]
    pub const fn verbosity(&self) -> u8 {
        self.verbosity
    }
}
