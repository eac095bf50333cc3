//! CLI entry point

use anyhow::Context;
use clap::Parser;
use std::ffi::OsString;

use withlock_lock::LockFile;
use withlock_runner::NativeLauncher;
use withlock_utils::{ExitCode, WithLockError, logging};

use super::args::Cli;
use crate::config::USAGE;
use crate::orchestrator;

/// Run withlock with the process arguments.
///
/// Handles all output, including diagnostics. Returns `Err` with the exit code
/// whenever it is not zero; `main` only maps it to the process exit status.
pub fn run() -> Result<(), ExitCode> {
    run_from(std::env::args_os())
}

/// Same as [`run`], with an explicit argument vector (program name first)
pub fn run_from<I, T>(argv: I) -> Result<(), ExitCode>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    // Every parse failure, `--help` included, is a usage error.
    let cli = Cli::try_parse_from(argv).map_err(|_| report(&WithLockError::usage(USAGE)))?;

    let config = cli.into_config().map_err(|err| report(&err))?;

    if let Err(err) =
        logging::init_tracing(config.verbosity()).context("failed to initialize logging")
    {
        eprintln!("error: {err:#}");
        return Err(ExitCode::USAGE);
    }

    match orchestrator::run_locked::<LockFile, _>(&config, &NativeLauncher::new()) {
        Ok(ExitCode::SUCCESS) => Ok(()),
        Ok(code) => Err(code),
        Err(err) => Err(report(&err)),
    }
}

fn report(err: &WithLockError) -> ExitCode {
    eprintln!("{}", err.diagnostic());
    err.to_exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_arguments_exit_with_usage_code() {
        assert_eq!(run_from(["withlock"]), Err(ExitCode::USAGE));
        assert_eq!(run_from(["withlock", "only.lock"]), Err(ExitCode::USAGE));
    }

    #[test]
    fn test_empty_lock_path_exits_with_usage_code() {
        assert_eq!(run_from(["withlock", "", "tool"]), Err(ExitCode::USAGE));
    }

    #[test]
    fn test_help_and_version_are_usage_errors() {
        assert_eq!(run_from(["withlock", "--help"]), Err(ExitCode::USAGE));
        assert_eq!(run_from(["withlock", "--version"]), Err(ExitCode::USAGE));
    }
}
