//! CLI argument definitions

use clap::{ArgAction, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

use withlock_utils::WithLockError;

use crate::config::RunConfig;

/// withlock - run a command while holding an exclusive lock on a file
#[derive(Parser, Debug)]
#[command(name = "withlock")]
#[command(about = "Run a command while holding an exclusive advisory lock on a file")]
// No help or version flags: those tokens are read as the lock path or passed to the child.
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Log progress to stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// File to lock; created if missing. May start with `-` unless it spells a known flag.
    #[arg(value_name = "LOCK_RESOURCE", allow_hyphen_values = true)]
    pub lock_resource: PathBuf,

    /// Command to run, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<OsString>,
}

impl Cli {
    /// Split the command vector and validate everything into a [`RunConfig`]
    pub fn into_config(self) -> Result<RunConfig, WithLockError> {
        let mut command = self.command.into_iter();
        let program = command.next().unwrap_or_default();
        RunConfig::new(self.lock_resource, program, command.collect(), self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use clap::error::ErrorKind;
    use std::ffi::OsStr;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("withlock").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_lock_command_and_args() {
        let config = parse(&["a.lock", "make", "-j4", "all"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.lock_path(), std::path::Path::new("a.lock"));
        assert_eq!(config.program(), OsStr::new("make"));
        assert_eq!(config.args(), &[OsString::from("-j4"), OsString::from("all")]);
        assert_eq!(config.verbosity(), 0);
    }

    #[test]
    fn test_flags_after_command_belong_to_child() {
        let config = parse(&["a.lock", "tool", "-v", "--help", "--version"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.verbosity(), 0);
        assert_eq!(
            config.args(),
            &[
                OsString::from("-v"),
                OsString::from("--help"),
                OsString::from("--version")
            ]
        );
    }

    #[test]
    fn test_verbosity_before_lock_resource() {
        let cli = parse(&["-vv", "a.lock", "tool"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_missing_command_is_an_error() {
        let err = parse(&["a.lock"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_no_arguments_is_an_error() {
        let err = parse(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_help_and_version_are_not_flags() {
        for flag in ["--help", "-h", "--version", "-V"] {
            let err = parse(&[flag]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument, "{flag}");
        }
    }

    #[test]
    fn test_lock_resource_may_start_with_hyphen() {
        let config = parse(&["-x.lock", "true"]).unwrap().into_config().unwrap();
        assert_eq!(config.lock_path(), std::path::Path::new("-x.lock"));
        assert_eq!(config.program(), OsStr::new("true"));

        let config = parse(&["-v", "--lock", "true"]).unwrap().into_config().unwrap();
        assert_eq!(config.verbosity(), 1);
        assert_eq!(config.lock_path(), std::path::Path::new("--lock"));
    }
}
