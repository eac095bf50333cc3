use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::error::RunnerError;
use crate::platform;

// ============================================================================
// Command building
// ============================================================================

/// Platform executable suffix (`.exe` on Windows, empty elsewhere)
pub const EXE_SUFFIX: &str = std::env::consts::EXE_SUFFIX;

/// Append the platform executable suffix unless the name already ends with it.
///
/// The comparison ignores ASCII case, so `TOOL.EXE` is left alone on Windows.
/// On platforms without a suffix this returns the name unchanged.
#[must_use]
pub fn normalize_executable_name(raw: &OsStr) -> OsString {
    with_suffix(raw, EXE_SUFFIX)
}

fn with_suffix(raw: &OsStr, suffix: &str) -> OsString {
    let name = raw.to_string_lossy();
    let bytes = name.as_bytes();
    let has_suffix = bytes.len() >= suffix.len()
        && bytes[bytes.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes());

    let mut normalized = raw.to_os_string();
    if !has_suffix {
        normalized.push(suffix);
    }
    normalized
}

/// Resolve an executable name against the search path and the current directory.
///
/// Names containing a path separator are resolved relative to the current
/// directory; bare names are looked up on `PATH`.
pub fn qualify(executable: &OsStr) -> Result<PathBuf, RunnerError> {
    let resolved = which::which(executable).map_err(|reason| RunnerError::Resolution {
        operation: "which",
        program: executable.to_string_lossy().into_owned(),
        code: platform::NOT_FOUND,
        reason,
    })?;

    #[cfg(windows)]
    let resolved = dunce::simplified(&resolved).to_path_buf();

    Ok(resolved)
}

/// Wrap a token in double quotes if it contains a space or a tab.
///
/// Embedded quotes are not escaped.
#[must_use]
pub fn quote_argument(token: &OsStr) -> OsString {
    if token.to_string_lossy().contains([' ', '\t']) {
        let mut quoted = OsString::with_capacity(token.len() + 2);
        quoted.push("\"");
        quoted.push(token);
        quoted.push("\"");
        quoted
    } else {
        token.to_os_string()
    }
}

/// Join the quoted executable path and the quoted arguments with single spaces.
#[must_use]
pub fn build_command_line(executable: &Path, args: &[OsString]) -> OsString {
    let mut line = quote_argument(executable.as_os_str());
    for arg in args {
        line.push(" ");
        line.push(quote_argument(arg));
    }
    line
}

/// The fully resolved command the child process will run.
///
/// Built once by the orchestrator and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    executable: PathBuf,
    args: Vec<OsString>,
    command_line: OsString,
}

impl ChildCommand {
    /// Create a command from an already qualified executable path
    #[must_use]
    pub fn new(executable: PathBuf, args: Vec<OsString>) -> Self {
        let command_line = build_command_line(&executable, &args);
        Self {
            executable,
            args,
            command_line,
        }
    }

    /// Absolute path of the executable
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Arguments in their original order, unquoted
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Composed command line (quoted executable followed by quoted arguments)
    #[must_use]
    pub fn command_line(&self) -> &OsStr {
        &self.command_line
    }
}
