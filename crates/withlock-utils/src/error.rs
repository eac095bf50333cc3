//! Top-level error type and diagnostic rendering

use strum::{Display, EnumString, IntoStaticStr, VariantNames};
use thiserror::Error;

use crate::exit_codes::ExitCode;

pub use withlock_lock::LockError;
pub use withlock_runner::RunnerError;

/// Classification of a failed invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, VariantNames)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Bad command line
    Usage,
    /// Opening, releasing, or closing the lock file
    Resource,
    /// Taking the exclusive lock
    Lock,
    /// Looking up the executable
    Resolution,
    /// Creating or resuming the child
    Spawn,
    /// Creating, configuring, or joining the kill-group
    Group,
    /// Waiting for the child
    Wait,
    /// Reading the child's exit status
    Status,
}

/// Any failure that ends a `withlock` invocation
#[derive(Error, Debug)]
pub enum WithLockError {
    #[error("{message}")]
    Usage { message: String },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

impl WithLockError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Usage { .. } => ErrorKind::Usage,
            Self::Lock(LockError::Acquire { .. }) => ErrorKind::Lock,
            Self::Lock(_) => ErrorKind::Resource,
            Self::Runner(err) => match err {
                RunnerError::Resolution { .. } => ErrorKind::Resolution,
                RunnerError::Spawn { .. } => ErrorKind::Spawn,
                RunnerError::Group { .. } => ErrorKind::Group,
                RunnerError::Wait { .. } => ErrorKind::Wait,
                RunnerError::Status { .. } => ErrorKind::Status,
            },
        }
    }

    /// Name of the OS operation that failed, for classified failures
    #[must_use]
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Usage { .. } => None,
            Self::Lock(err) => err.operation(),
            Self::Runner(err) => Some(err.operation()),
        }
    }

    /// OS error code captured at the failing call
    #[must_use]
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::Usage { .. } => None,
            Self::Lock(err) => err.raw_os_error(),
            Self::Runner(err) => err.raw_os_error(),
        }
    }

    /// The OS code when there is one, otherwise [`ExitCode::USAGE`]
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        self.os_code().map_or(ExitCode::USAGE, ExitCode::from_i32)
    }

    /// The single line written to standard error for this failure.
    ///
    /// `error: <operation> failed: <system message> (code <n>)` when both the
    /// operation and the OS code are known, `error: <message>` otherwise.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        match (self.operation(), self.os_code()) {
            (Some(operation), Some(code)) => format!(
                "error: {operation} failed: {} (code {code})",
                system_message(code)
            ),
            _ => format!("error: {self}"),
        }
    }
}

/// Human-readable text the OS associates with an error code
#[cfg(unix)]
#[must_use]
pub fn system_message(code: i32) -> String {
    nix::errno::Errno::from_raw(code).desc().to_string()
}

/// Human-readable text the OS associates with an error code
#[cfg(windows)]
#[must_use]
pub fn system_message(code: i32) -> String {
    use windows::Win32::System::Diagnostics::Debug::{
        FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS, FormatMessageW,
    };
    use windows::core::PWSTR;

    let mut buf = [0u16; 512];
    // SAFETY: the buffer length passed matches the buffer.
    let len = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            None,
            code as u32,
            0,
            PWSTR(buf.as_mut_ptr()),
            buf.len() as u32,
            None,
        )
    };
    if len == 0 {
        return format!("Unknown error {code}");
    }

    let message = String::from_utf16_lossy(&buf[..len as usize]);
    message.trim_end_matches(['\r', '\n']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::str::FromStr;
    use strum::VariantNames;

    fn io_err(code: i32) -> io::Error {
        io::Error::from_raw_os_error(code)
    }

    #[test]
    fn test_error_kind_names() {
        assert_eq!(ErrorKind::Usage.to_string(), "usage");
        assert_eq!(ErrorKind::from_str("group").unwrap(), ErrorKind::Group);
        assert_eq!(ErrorKind::VARIANTS.len(), 8);
        let name: &'static str = ErrorKind::Resolution.into();
        assert_eq!(name, "resolution");
    }

    #[test]
    fn test_usage_error() {
        let err = WithLockError::usage("usage: withlock <lock-resource> <command> [args...]");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.operation(), None);
        assert_eq!(err.os_code(), None);
        assert_eq!(err.to_exit_code(), ExitCode::USAGE);
        assert_eq!(
            err.diagnostic(),
            "error: usage: withlock <lock-resource> <command> [args...]"
        );
    }

    #[test]
    fn test_lock_errors_split_into_resource_and_lock() {
        let open: WithLockError = LockError::Open {
            operation: "open",
            path: "/tmp/x.lock".into(),
            source: io_err(13),
        }
        .into();
        assert_eq!(open.kind(), ErrorKind::Resource);

        let acquire: WithLockError = LockError::Acquire {
            operation: "flock",
            attempts: 3,
            source: io_err(37),
        }
        .into();
        assert_eq!(acquire.kind(), ErrorKind::Lock);
        assert_eq!(acquire.operation(), Some("flock"));
        assert_eq!(acquire.to_exit_code(), ExitCode::from_i32(37));

        let release: WithLockError = LockError::Release {
            operation: "flock(LOCK_UN)",
            source: io_err(9),
        }
        .into();
        assert_eq!(release.kind(), ErrorKind::Resource);

        let not_open: WithLockError = LockError::NotOpen.into();
        assert_eq!(not_open.kind(), ErrorKind::Resource);
        assert_eq!(not_open.to_exit_code(), ExitCode::USAGE);
        assert_eq!(not_open.diagnostic(), "error: Lock file is not open");
    }

    #[test]
    fn test_runner_error_kinds() {
        let cases = [
            (
                RunnerError::Spawn {
                    operation: "fork",
                    source: io_err(11),
                },
                ErrorKind::Spawn,
            ),
            (
                RunnerError::Group {
                    operation: "setpgid",
                    source: io_err(1),
                },
                ErrorKind::Group,
            ),
            (
                RunnerError::Wait {
                    operation: "waitpid",
                    source: io_err(10),
                },
                ErrorKind::Wait,
            ),
            (
                RunnerError::Status {
                    operation: "waitpid",
                    source: io_err(10),
                },
                ErrorKind::Status,
            ),
        ];

        for (runner, kind) in cases {
            let code = runner.raw_os_error();
            let err = WithLockError::from(runner);
            assert_eq!(err.kind(), kind);
            assert_eq!(err.os_code(), code);
            assert_eq!(Some(err.to_exit_code().as_i32()), code);
        }
    }

    #[test]
    fn test_diagnostic_format() {
        let err: WithLockError = RunnerError::Spawn {
            operation: "execv",
            source: io_err(2),
        }
        .into();
        let expected = format!("error: execv failed: {} (code 2)", system_message(2));
        assert_eq!(err.diagnostic(), expected);
        assert!(!err.diagnostic().contains('\n'));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_message_unix() {
        assert_eq!(system_message(libc::ENOENT), "No such file or directory");
    }

    #[cfg(windows)]
    #[test]
    fn test_system_message_strips_line_break() {
        let message = system_message(2);
        assert!(!message.is_empty());
        assert!(!message.ends_with('\n') && !message.ends_with('\r'));
    }
}
