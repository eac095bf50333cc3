//! withlock: run a command while holding an exclusive advisory lock on a file.
//!
//! The lock serializes every invocation that names the same lock file. The
//! command runs in a kill-group, so it and everything it spawns die with the
//! supervising process.
//!
//! - [`orchestrator::run_locked`] sequences lock, launch, wait, unlock
//! - [`cli::run`] is the binary's entry point
//!
//! The building blocks live in the workspace crates `withlock-lock`,
//! `withlock-runner` and `withlock-utils`.

pub mod cli;
pub mod config;
pub mod orchestrator;

pub use config::RunConfig;
pub use orchestrator::{Stage, run_locked};
pub use withlock_utils::{ErrorKind, ExitCode, WithLockError};
