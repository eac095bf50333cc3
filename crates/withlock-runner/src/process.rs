use std::ffi::OsStr;
use std::path::PathBuf;

use crate::command_spec::{self, ChildCommand};
use crate::error::RunnerError;
use crate::platform;

// ============================================================================
// Launcher traits
// ============================================================================

/// A child process running inside a kill-group.
///
/// Dropping the value destroys the group, which kills every process still in it.
pub trait SupervisedChild {
    /// OS process identifier of the child
    fn id(&self) -> u32;

    /// Block until the child exits. There is no timeout.
    fn wait(&mut self) -> Result<(), RunnerError>;

    /// Exit code of the child once [`wait`](Self::wait) has returned
    fn exit_status(&self) -> Result<i32, RunnerError>;
}

/// Starts children under the suspended-create, bind, resume protocol.
///
/// Implementations MUST establish kill-group membership before the child runs.
/// The steps are not exposed individually so call sites cannot reorder them.
pub trait GuardedLauncher {
    type Child: SupervisedChild;

    /// Resolve a normalized executable name to an absolute path
    fn qualify(&self, executable: &OsStr) -> Result<PathBuf, RunnerError> {
        command_spec::qualify(executable)
    }

    /// Start `command` inside a fresh kill-group and let it run
    fn launch_guarded(&self, command: &ChildCommand) -> Result<Self::Child, RunnerError>;
}

/// Launcher backed by the host OS.
///
/// Uses a Job Object on Windows and a process group on Unix.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeLauncher;

impl NativeLauncher {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl GuardedLauncher for NativeLauncher {
    type Child = platform::GuardedChild;

    fn launch_guarded(&self, command: &ChildCommand) -> Result<Self::Child, RunnerError> {
        platform::launch_guarded(command)
    }
}
