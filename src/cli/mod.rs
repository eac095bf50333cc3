//! Command-line interface for withlock
//!
//! - `args`: clap argument definitions
//! - `run`: entry point, diagnostics and exit codes

pub mod args;
mod run;

pub use args::Cli;
pub use run::{run, run_from};
