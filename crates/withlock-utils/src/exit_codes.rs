//! Exit code type and mapping from errors.
//!
//! # Exit Code Table
//!
//! | Outcome | Code |
//! |---------|------|
//! | Child ran to completion | the child's own exit code |
//! | Child killed by signal `S` (Unix) | `128 + S` |
//! | Classified failure with an OS error | that OS error code |
//! | Usage error, or failure without an OS code | `1` |

use crate::error::WithLockError;

/// Process exit code of a `withlock` invocation.
///
/// Use the named constants for fixed outcomes, or [`from_i32()`](Self::from_i32)
/// for codes taken from the child or from the OS.
///
/// # Example
///
/// ```rust
/// use withlock_utils::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::from_i32(42).as_i32(), 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - the child exited with status 0
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Usage error, or a failure that carries no OS error code
    pub const USAGE: ExitCode = ExitCode(1);

    /// Get the numeric exit code value.
    ///
    /// Use this with `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl From<&WithLockError> for ExitCode {
    fn from(err: &WithLockError) -> Self {
        err.to_exit_code()
    }
}
