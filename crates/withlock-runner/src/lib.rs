//! Process launching for withlock
//!
//! Builds the child command line and starts the child inside a kill-group, so that
//! the child and everything it spawns is torn down together when the group goes away.
//!
//! # Launch protocol
//!
//! [`GuardedLauncher::launch_guarded`] is the only way to start a child. It runs a
//! fixed sequence that callers cannot reorder:
//!
//! 1. create the process suspended (no child code has run yet)
//! 2. create the kill-group and configure it to kill its members when destroyed
//! 3. add the suspended process to the group
//! 4. resume the process
//!
//! Group membership is therefore in place before the child can execute or fork.

pub mod command_spec;
pub mod error;
mod platform;
pub mod process;

pub use command_spec::{
    ChildCommand, EXE_SUFFIX, build_command_line, normalize_executable_name, qualify,
    quote_argument,
};
pub use error::RunnerError;
pub use platform::GuardedChild;
pub use process::{GuardedLauncher, NativeLauncher, SupervisedChild};
