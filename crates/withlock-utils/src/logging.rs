//! Tracing setup for withlock
//!
//! Logging is off unless `-v` is given, so a failing run writes nothing to
//! standard error except its diagnostic line.

use std::ffi::OsStr;
use std::io::IsTerminal;
use std::path::Path;

use tracing::{Level, span};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive for a `-v` count
#[must_use]
pub fn level_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "off",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initialize the global tracing subscriber.
///
/// The filter comes from `verbosity` alone; `RUST_LOG` is not consulted.
/// Events go to standard error in the compact format.
pub fn init_tracing(verbosity: u8) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_new(level_directive(verbosity))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal())
                .with_target(verbosity >= 3)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_line_number(false)
                .with_file(false)
                .compact(),
        )
        .try_init()?;

    Ok(())
}

/// Span covering one locked run
pub fn run_span(lock: &Path, program: &OsStr) -> tracing::Span {
    span!(
        Level::INFO,
        "withlock",
        lock = %lock.display(),
        program = %program.to_string_lossy(),
    )
}
