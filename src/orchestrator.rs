//! Lock, launch, wait, unlock.
//!
//! The run walks the stages of [`Stage`] strictly in order. Any failure ends the
//! run at the stage it happened in; nothing is retried here (the lock resource
//! owns its own bounded retry).

use strum::{Display, IntoStaticStr};
use tracing::{error, info};

use withlock_lock::LockResource;
use withlock_runner::{ChildCommand, GuardedLauncher, SupervisedChild, normalize_executable_name};
use withlock_utils::{ErrorKind, ExitCode, WithLockError, logging};

use crate::config::RunConfig;

/// Progress of one locked run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Start,
    LockAcquired,
    CommandBuilt,
    ProcessSpawned,
    GroupBound,
    Running,
    Exited,
    LockReleased,
    Done,
}

/// Tracks the current stage and logs every transition
#[derive(Debug)]
struct Progress {
    stage: Stage,
}

impl Progress {
    fn new() -> Self {
        info!(stage = %Stage::Start, "Starting");
        Self {
            stage: Stage::Start,
        }
    }

    fn advance(&mut self, next: Stage) {
        self.stage = next;
        info!(stage = %next, "Stage reached");
    }

    /// Record the failing stage, then hand the error back
    fn fail(&self, err: impl Into<WithLockError>) -> WithLockError {
        let err = err.into();
        error!(
            stage = %failed_stage(self.stage, &err),
            reached = %self.stage,
            kind = %err.kind(),
            operation = err.operation().unwrap_or("-"),
            code = err.os_code(),
            "Run failed"
        );
        err
    }
}

/// Stage the run was working towards when `err` ended it.
///
/// The launcher creates, binds and resumes in one call, so its error kind
/// tells which of those stages failed.
fn failed_stage(reached: Stage, err: &WithLockError) -> Stage {
    match err.kind() {
        ErrorKind::Usage => Stage::Start,
        ErrorKind::Resource | ErrorKind::Lock if reached == Stage::Start => Stage::LockAcquired,
        ErrorKind::Resource | ErrorKind::Lock => Stage::LockReleased,
        ErrorKind::Resolution => Stage::CommandBuilt,
        ErrorKind::Spawn => Stage::ProcessSpawned,
        ErrorKind::Group => Stage::GroupBound,
        ErrorKind::Wait | ErrorKind::Status => Stage::Exited,
    }
}

/// Run the configured command while holding the lock.
///
/// Returns the child's exit code. The lock is released and closed after the child
/// exits, whatever its code. The kill-group is destroyed last, when the child
/// handle is dropped on return.
pub fn run_locked<R, L>(config: &RunConfig, launcher: &L) -> Result<ExitCode, WithLockError>
where
    R: LockResource,
    L: GuardedLauncher,
{
    let span = logging::run_span(config.lock_path(), config.program());
    let _entered = span.enter();

    let mut progress = Progress::new();

    let mut lock = R::open(config.lock_path()).map_err(|e| progress.fail(e))?;
    lock.acquire_exclusive().map_err(|e| progress.fail(e))?;
    progress.advance(Stage::LockAcquired);

    let name = normalize_executable_name(config.program());
    let executable = launcher.qualify(&name).map_err(|e| progress.fail(e))?;
    let command = ChildCommand::new(executable, config.args().to_vec());
    info!(
        command_line = %command.command_line().to_string_lossy(),
        "Command built"
    );
    progress.advance(Stage::CommandBuilt);

    // Creation, group binding and resume happen as one step inside the launcher.
    let mut child = launcher
        .launch_guarded(&command)
        .map_err(|e| progress.fail(e))?;
    progress.advance(Stage::ProcessSpawned);
    progress.advance(Stage::GroupBound);
    progress.advance(Stage::Running);
    info!(pid = child.id(), "Child running");

    child.wait().map_err(|e| progress.fail(e))?;
    let code = child.exit_status().map_err(|e| progress.fail(e))?;
    progress.advance(Stage::Exited);
    info!(exit_code = code, "Child exited");

    lock.release().map_err(|e| progress.fail(e))?;
    lock.close().map_err(|e| progress.fail(e))?;
    progress.advance(Stage::LockReleased);

    drop(child);
    progress.advance(Stage::Done);

    Ok(ExitCode::from_i32(code))
}
