//! Unix backend: suspended fork, process-group kill-group, `waitpid`.
//!
//! A forked child joins its own process group and then blocks on a start gate
//! (a pipe) before calling `execv`. The parent configures the group while the
//! child is parked there, then opens the gate. Exec failures travel back on a
//! close-on-exec report pipe, so a clean EOF means the exec succeeded.
//!
//! The group is killed on drop, from a fatal-signal handler, and by a watchdog
//! process when the supervisor dies without running either.

use std::ffi::{CString, OsStr};
use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::sync::atomic::{AtomicI32, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork, setpgid};
use tracing::debug;

use crate::command_spec::ChildCommand;
use crate::error::RunnerError;
use crate::process::SupervisedChild;

pub(crate) const NOT_FOUND: i32 = libc::ENOENT;

/// Signals that tear the kill-group down before the supervising process dies
const FATAL_SIGNALS: [Signal; 4] = [
    Signal::SIGTERM,
    Signal::SIGINT,
    Signal::SIGHUP,
    Signal::SIGQUIT,
];

/// Process group killed by the fatal-signal handler; 0 when none is registered
static ACTIVE_GROUP: AtomicI32 = AtomicI32::new(0);

/// Byte written to the start gate to release the child
const START: u8 = 1;

// Steps of the forked child that can fail before exec
const STEP_SETPGID: i32 = 1;
const STEP_PDEATHSIG: i32 = 2;
const STEP_GATE: i32 = 3;
const STEP_EXEC: i32 = 4;

/// Exit status of a forked child that could not exec
const EXIT_LAUNCH_FAILED: i32 = 127;
/// Exit status of a forked child whose parent went away before resuming it
const EXIT_ABANDONED: i32 = 126;

fn step_operation(step: i32) -> &'static str {
    match step {
        STEP_SETPGID => "setpgid",
        STEP_PDEATHSIG => "prctl(PR_SET_PDEATHSIG)",
        STEP_GATE => "read(start gate)",
        _ => "execv",
    }
}

// ============================================================================
// Suspended child
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaunchState {
    /// Parked on the start gate
    Suspended,
    /// Exec succeeded; ownership moved to `GuardedChild`
    Running,
    /// Exec failed and the child was reaped
    Reaped,
}

/// A forked child parked before exec
pub(crate) struct SuspendedChild {
    pid: Pid,
    gate: Option<PipeWriter>,
    report: Option<PipeReader>,
    state: LaunchState,
}

/// Raw descriptors the forked child works with
#[derive(Clone, Copy)]
struct ChildFds {
    gate_reader: RawFd,
    gate_writer: RawFd,
    report_reader: RawFd,
    report_writer: RawFd,
}

fn c_string(value: &OsStr) -> Result<CString, RunnerError> {
    CString::new(value.as_bytes()).map_err(|_| RunnerError::Spawn {
        operation: "execv",
        source: io::Error::from_raw_os_error(libc::EINVAL),
    })
}

/// Fork a child that stops before exec until [`SuspendedChild::resume`] is called.
fn spawn_suspended(command: &ChildCommand) -> Result<SuspendedChild, RunnerError> {
    // Everything the child needs is allocated before the fork.
    let program = c_string(command.executable().as_os_str())?;
    let mut args = Vec::with_capacity(command.args().len() + 1);
    args.push(program.clone());
    for arg in command.args() {
        args.push(c_string(arg)?);
    }
    let mut argv: Vec<*const libc::c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
    argv.push(std::ptr::null());

    let (gate_reader, gate_writer) = io::pipe().map_err(|source| RunnerError::Spawn {
        operation: "pipe",
        source,
    })?;
    let (report_reader, report_writer) = io::pipe().map_err(|source| RunnerError::Spawn {
        operation: "pipe",
        source,
    })?;

    let fds = ChildFds {
        gate_reader: gate_reader.as_raw_fd(),
        gate_writer: gate_writer.as_raw_fd(),
        report_reader: report_reader.as_raw_fd(),
        report_writer: report_writer.as_raw_fd(),
    };
    // SAFETY: getpid has no preconditions.
    let parent = unsafe { libc::getpid() };

    // SAFETY: the child branch only makes async-signal-safe calls until it execs or exits.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => unsafe { run_forked_child(&program, &argv, fds, parent) },
        Ok(ForkResult::Parent { child }) => {
            drop(gate_reader);
            drop(report_writer);
            debug!(pid = child.as_raw(), "Created suspended child");
            Ok(SuspendedChild {
                pid: child,
                gate: Some(gate_writer),
                report: Some(report_reader),
                state: LaunchState::Suspended,
            })
        }
        Err(errno) => Err(RunnerError::Spawn {
            operation: "fork",
            source: errno.into(),
        }),
    }
}

fn errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Body of the forked child.
///
/// # Safety
///
/// Must only be called in a freshly forked child. Everything here is
/// async-signal-safe: raw libc calls on memory allocated before the fork.
unsafe fn run_forked_child(
    program: &CString,
    argv: &[*const libc::c_char],
    fds: ChildFds,
    parent: libc::pid_t,
) -> ! {
    unsafe {
        libc::close(fds.gate_writer);
        libc::close(fds.report_reader);

        if libc::setpgid(0, 0) != 0 {
            report_and_exit(fds.report_writer, STEP_SETPGID);
        }

        #[cfg(target_os = "linux")]
        {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) != 0 {
                report_and_exit(fds.report_writer, STEP_PDEATHSIG);
            }
            // The parent may have died before the death signal was armed.
            if libc::getppid() != parent {
                libc::_exit(EXIT_ABANDONED);
            }
        }
        #[cfg(not(target_os = "linux"))]
        let _ = parent;

        // Undo the parent's signal setup: handlers, the Rust runtime's ignored SIGPIPE, the mask.
        for signal in FATAL_SIGNALS {
            libc::signal(signal as libc::c_int, libc::SIG_DFL);
        }
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        let mut empty: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&raw mut empty);
        libc::sigprocmask(libc::SIG_SETMASK, &raw const empty, std::ptr::null_mut());

        let mut go = 0u8;
        loop {
            let n = libc::read(fds.gate_reader, (&raw mut go).cast(), 1);
            if n == 1 {
                break;
            }
            if n == 0 {
                // Gate closed without a start byte: the parent gave up on us.
                libc::_exit(EXIT_ABANDONED);
            }
            if errno() != libc::EINTR {
                report_and_exit(fds.report_writer, STEP_GATE);
            }
        }
        libc::close(fds.gate_reader);

        libc::execv(program.as_ptr(), argv.as_ptr());
        report_and_exit(fds.report_writer, STEP_EXEC)
    }
}

/// Send `(step, errno)` to the parent and exit.
///
/// # Safety
///
/// Same constraints as [`run_forked_child`].
unsafe fn report_and_exit(fd: RawFd, step: i32) -> ! {
    let code = errno();
    let mut report = [0u8; 8];
    report[..4].copy_from_slice(&step.to_ne_bytes());
    report[4..].copy_from_slice(&code.to_ne_bytes());
    unsafe {
        libc::write(fd, report.as_ptr().cast(), report.len());
        libc::_exit(EXIT_LAUNCH_FAILED)
    }
}

impl SuspendedChild {
    /// Open the start gate and wait for the exec outcome.
    fn resume(&mut self) -> Result<(), RunnerError> {
        let gate_result = match self.gate.take() {
            Some(mut gate) => gate.write_all(&[START]),
            None => Ok(()),
        };

        // EOF on the report pipe means the exec closed it; a report means failure.
        let report = self.read_report().map_err(|source| RunnerError::Spawn {
            operation: "read(exec report)",
            source,
        })?;

        if let Some((step, code)) = report {
            let _ = waitpid(self.pid, None);
            self.state = LaunchState::Reaped;
            return Err(RunnerError::Spawn {
                operation: step_operation(step),
                source: io::Error::from_raw_os_error(code),
            });
        }

        gate_result.map_err(|source| RunnerError::Spawn {
            operation: "write(start gate)",
            source,
        })?;

        self.state = LaunchState::Running;
        debug!(pid = self.pid.as_raw(), "Resumed child");
        Ok(())
    }

    fn read_report(&mut self) -> io::Result<Option<(i32, i32)>> {
        let Some(mut reader) = self.report.take() else {
            return Ok(None);
        };

        let mut buf = Vec::with_capacity(8);
        reader.read_to_end(&mut buf)?;
        if buf.len() < 8 {
            return Ok(None);
        }

        let step = i32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let code = i32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok(Some((step, code)))
    }
}

impl Drop for SuspendedChild {
    fn drop(&mut self) {
        if self.state == LaunchState::Suspended {
            // Never resumed: make sure the parked child does not linger.
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
        }
    }
}

// ============================================================================
// Kill-group
// ============================================================================

/// Process group whose members are killed when the group is dropped
struct KillGroup {
    pgid: Option<Pid>,
    kill_on_close: bool,
    watchdog: Option<Watchdog>,
}

extern "C" fn kill_group_and_reraise(signal: libc::c_int) {
    let pgid = ACTIVE_GROUP.load(Ordering::SeqCst);
    // SAFETY: killpg, signal and raise are async-signal-safe.
    unsafe {
        if pgid > 0 {
            libc::killpg(pgid, libc::SIGKILL);
        }
        libc::signal(signal, libc::SIG_DFL);
        libc::raise(signal);
    }
}

/// Map the parent's `setpgid(pid, pid)` outcome onto the attach result.
///
/// `EACCES` means the child already joined its group and exec'd or is about
/// to; the group is in place either way.
pub(crate) fn classify_attach(result: Result<(), Errno>) -> Result<(), RunnerError> {
    match result {
        Ok(()) => Ok(()),
        Err(Errno::EACCES) => {
            debug!("Ignoring EACCES from setpgid");
            Ok(())
        }
        Err(errno) => Err(RunnerError::Group {
            operation: "setpgid",
            source: errno.into(),
        }),
    }
}

impl KillGroup {
    fn create() -> Self {
        Self {
            pgid: None,
            kill_on_close: false,
            watchdog: None,
        }
    }

    /// Arrange for the group to be killed when it is destroyed, including when the
    /// supervising process receives a fatal signal or is killed outright.
    fn bind_limits(&mut self) -> Result<(), RunnerError> {
        self.watchdog = Some(Watchdog::spawn()?);

        let action = SigAction::new(
            SigHandler::Handler(kill_group_and_reraise),
            SaFlags::empty(),
            SigSet::empty(),
        );
        for fatal in FATAL_SIGNALS {
            // SAFETY: the handler only touches an atomic and async-signal-safe calls.
            unsafe { signal::sigaction(fatal, &action) }.map_err(|errno| RunnerError::Group {
                operation: "sigaction",
                source: errno.into(),
            })?;
        }
        self.kill_on_close = true;
        Ok(())
    }

    fn attach(&mut self, child: &SuspendedChild) -> Result<(), RunnerError> {
        classify_attach(setpgid(child.pid, child.pid))?;

        self.pgid = Some(child.pid);
        ACTIVE_GROUP.store(child.pid.as_raw(), Ordering::SeqCst);
        if let Some(watchdog) = self.watchdog.as_mut() {
            watchdog.arm(child.pid)?;
        }
        debug!(pgid = child.pid.as_raw(), "Attached child to kill-group");
        Ok(())
    }
}

impl Drop for KillGroup {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            let _ = ACTIVE_GROUP.compare_exchange(
                pgid.as_raw(),
                0,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            if self.kill_on_close {
                // ESRCH just means every member is already gone.
                let _ = signal::killpg(pgid, Signal::SIGKILL);
            }
        }
        // The group is gone; the watchdog has nothing left to do.
        drop(self.watchdog.take());
    }
}

// ============================================================================
// Watchdog
// ============================================================================

/// Helper process that kills the group once the supervising process is gone.
///
/// It sits in its own session, outside the group, and blocks reading a pipe
/// whose only write end belongs to the supervisor. The pipe hits EOF when the
/// supervisor exits for any reason, SIGKILL included.
struct Watchdog {
    pid: Pid,
    pipe: Option<PipeWriter>,
}

/// Upper bound on the descriptors the watchdog closes after the fork
fn open_fd_limit() -> libc::c_int {
    // SAFETY: sysconf has no preconditions.
    let limit = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    if limit <= 0 {
        1024
    } else {
        libc::c_int::try_from(limit.min(65_536)).unwrap_or(1024)
    }
}

impl Watchdog {
    fn spawn() -> Result<Self, RunnerError> {
        let (reader, writer) = io::pipe().map_err(|source| RunnerError::Group {
            operation: "pipe",
            source,
        })?;
        let read_fd = reader.as_raw_fd();
        let fd_limit = open_fd_limit();

        // SAFETY: the child branch only makes async-signal-safe calls until it exits.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => unsafe { run_watchdog(read_fd, fd_limit) },
            Ok(ForkResult::Parent { child }) => {
                drop(reader);
                debug!(pid = child.as_raw(), "Started kill-group watchdog");
                Ok(Self {
                    pid: child,
                    pipe: Some(writer),
                })
            }
            Err(errno) => Err(RunnerError::Group {
                operation: "fork",
                source: errno.into(),
            }),
        }
    }

    /// Tell the watchdog which group to kill.
    fn arm(&mut self, pgid: Pid) -> Result<(), RunnerError> {
        let Some(pipe) = self.pipe.as_mut() else {
            return Ok(());
        };
        pipe.write_all(&pgid.as_raw().to_ne_bytes())
            .map_err(|source| RunnerError::Group {
                operation: "write(watchdog)",
                source,
            })
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        drop(self.pipe.take());
        // Forked siblings may still hold the write end until they exec.
        let _ = signal::kill(self.pid, Signal::SIGKILL);
        let _ = waitpid(self.pid, None);
    }
}

/// Body of the watchdog process.
///
/// # Safety
///
/// Must only be called in a freshly forked child; see [`run_forked_child`].
unsafe fn run_watchdog(read_fd: RawFd, fd_limit: libc::c_int) -> ! {
    unsafe {
        libc::setsid();
        for signal in FATAL_SIGNALS {
            libc::signal(signal as libc::c_int, libc::SIG_IGN);
        }
        // Drop inherited descriptors so the lock and the caller's pipes are not held open.
        for fd in 0..fd_limit {
            if fd != read_fd {
                libc::close(fd);
            }
        }

        let mut pgid = [0u8; 4];
        let mut filled = 0;
        while filled < pgid.len() {
            let n = libc::read(
                read_fd,
                pgid[filled..].as_mut_ptr().cast(),
                pgid.len() - filled,
            );
            if n > 0 {
                filled += n.unsigned_abs();
            } else if n == 0 || errno() != libc::EINTR {
                // Supervisor went away before a group existed.
                libc::_exit(0);
            }
        }

        let mut byte = 0u8;
        loop {
            let n = libc::read(read_fd, (&raw mut byte).cast(), 1);
            if n == 0 || (n < 0 && errno() != libc::EINTR) {
                break;
            }
        }

        let pgid = i32::from_ne_bytes(pgid);
        if pgid > 0 {
            libc::killpg(pgid, libc::SIGKILL);
        }
        libc::_exit(0)
    }
}

// ============================================================================
// Guarded child
// ============================================================================

/// Child process running in its own kill-group.
///
/// Dropping it kills the whole group; a child that was never waited for is
/// killed and reaped first.
pub struct GuardedChild {
    pid: Pid,
    status: Option<WaitStatus>,
    _group: KillGroup,
}

pub(crate) fn launch_guarded(command: &ChildCommand) -> Result<GuardedChild, RunnerError> {
    let mut child = spawn_suspended(command)?;

    let mut group = KillGroup::create();
    if let Err(err) = group.bind_limits() {
        drop(group);
        return Err(err);
    }
    group.attach(&child)?;

    child.resume()?;

    Ok(GuardedChild {
        pid: child.pid,
        status: None,
        _group: group,
    })
}

impl SupervisedChild for GuardedChild {
    fn id(&self) -> u32 {
        self.pid.as_raw().unsigned_abs()
    }

    fn wait(&mut self) -> Result<(), RunnerError> {
        loop {
            match waitpid(self.pid, None) {
                Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                    self.status = Some(status);
                    return Ok(());
                }
                Ok(_) | Err(Errno::EINTR) => {}
                Err(errno) => {
                    return Err(RunnerError::Wait {
                        operation: "waitpid",
                        source: errno.into(),
                    });
                }
            }
        }
    }

    fn exit_status(&self) -> Result<i32, RunnerError> {
        match self.status {
            Some(WaitStatus::Exited(_, code)) => Ok(code),
            // Shell convention for signal deaths
            Some(WaitStatus::Signaled(_, signal, _)) => Ok(128 + signal as i32),
            _ => Err(RunnerError::Status {
                operation: "waitpid",
                source: io::Error::from_raw_os_error(libc::ECHILD),
            }),
        }
    }
}

impl Drop for GuardedChild {
    fn drop(&mut self) {
        if self.status.is_none() {
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
        }
    }
}

impl std::fmt::Debug for GuardedChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedChild")
            .field("pid", &self.pid)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::path::{Path, PathBuf};
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn sh(script: &str) -> ChildCommand {
        ChildCommand::new(
            PathBuf::from("/bin/sh"),
            vec![OsString::from("-c"), OsString::from(script)],
        )
    }

    /// Zombies count as dead: reparented orphans may sit unreaped in containers.
    fn is_alive(pid: i32) -> bool {
        if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next());
            return !matches!(state, Some('Z' | 'X'));
        }
        signal::kill(Pid::from_raw(pid), None).is_ok()
    }

    fn wait_for_file(path: &Path) -> String {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Ok(content) = std::fs::read_to_string(path) {
                if content.ends_with('\n') {
                    return content;
                }
            }
            assert!(Instant::now() < deadline, "Timed out waiting for {path:?}");
            thread::sleep(Duration::from_millis(20));
        }
    }

    fn wait_until_dead(pid: i32) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if !is_alive(pid) {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_suspended_child_does_not_run_before_resume() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("ran");
        let command = sh(&format!("touch '{}'", marker.display()));

        let mut child = spawn_suspended(&command).unwrap();
        thread::sleep(Duration::from_millis(300));
        assert!(!marker.exists(), "Child must not run while suspended");

        child.resume().unwrap();
        let status = waitpid(child.pid, None).unwrap();
        assert!(matches!(status, WaitStatus::Exited(_, 0)));
        assert!(marker.exists(), "Child should run after resume");
    }

    #[test]
    fn test_child_leads_its_own_process_group() {
        let child = launch_guarded(&sh("sleep 5")).unwrap();
        let pgid = nix::unistd::getpgid(Some(child.pid)).unwrap();
        assert_eq!(pgid, child.pid);
        assert_ne!(pgid, nix::unistd::getpgrp());
    }

    #[test]
    fn test_dropping_suspended_child_kills_it() {
        let child = spawn_suspended(&sh("exit 0")).unwrap();
        let pid = child.pid.as_raw();
        drop(child);
        assert!(!is_alive(pid), "Parked child should be reaped on drop");
    }

    #[test]
    fn test_exec_failure_reports_errno() {
        let command = ChildCommand::new(PathBuf::from("/nonexistent/withlock-child"), Vec::new());
        let err = launch_guarded(&command).unwrap_err();
        match err {
            RunnerError::Spawn { operation, source } => {
                assert_eq!(operation, "execv");
                assert_eq!(source.raw_os_error(), Some(libc::ENOENT));
            }
            other => panic!("Expected Spawn error, got: {other:?}"),
        }
    }

    #[test]
    fn test_signal_death_maps_to_shell_convention() {
        let mut child = launch_guarded(&sh("kill -KILL $$")).unwrap();
        child.wait().unwrap();
        assert_eq!(child.exit_status().unwrap(), 128 + libc::SIGKILL);
    }

    #[test]
    fn test_exit_status_before_wait_is_an_error() {
        let child = launch_guarded(&sh("exit 0")).unwrap();
        let err = child.exit_status().unwrap_err();
        assert!(matches!(err, RunnerError::Status { .. }));
    }

    #[test]
    fn test_dropping_guarded_child_kills_descendants() {
        let temp = TempDir::new().unwrap();
        let pid_file = temp.path().join("grandchild.pid");
        let script = format!(
            "sleep 30 & echo $! > '{}'; wait",
            pid_file.display()
        );

        let child = launch_guarded(&sh(&script)).unwrap();
        let grandchild: i32 = wait_for_file(&pid_file).trim().parse().unwrap();
        assert!(is_alive(grandchild));

        drop(child);
        assert!(
            wait_until_dead(grandchild),
            "Grandchild {grandchild} should be killed with the group"
        );
    }

    #[test]
    fn test_attach_tolerates_eacces() {
        assert!(classify_attach(Ok(())).is_ok());
        assert!(classify_attach(Err(Errno::EACCES)).is_ok());
    }

    #[test]
    fn test_attach_rejects_other_errors() {
        for errno in [Errno::EPERM, Errno::ESRCH, Errno::EINVAL] {
            match classify_attach(Err(errno)) {
                Err(RunnerError::Group { operation, source }) => {
                    assert_eq!(operation, "setpgid");
                    assert_eq!(source.raw_os_error(), Some(errno as i32));
                }
                other => panic!("Expected Group error for {errno}, got: {other:?}"),
            }
        }
    }

    #[test]
    fn test_destroying_bound_group_reaps_watchdog() {
        let mut group = KillGroup::create();
        group.bind_limits().unwrap();
        let watchdog = group.watchdog.as_ref().unwrap().pid.as_raw();
        assert!(is_alive(watchdog));

        drop(group);
        assert!(!is_alive(watchdog), "Watchdog should be reaped with the group");
    }

    #[test]
    fn test_watchdog_kills_group_when_supervisor_pipe_closes() {
        let temp = TempDir::new().unwrap();
        let pid_file = temp.path().join("grandchild.pid");
        let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());

        let mut child = launch_guarded(&sh(&script)).unwrap();
        let grandchild: i32 = wait_for_file(&pid_file).trim().parse().unwrap();
        assert!(is_alive(grandchild));

        // Same EOF the watchdog sees when the supervisor is SIGKILLed.
        let watchdog = child._group.watchdog.as_mut().unwrap();
        drop(watchdog.pipe.take());

        assert!(
            wait_until_dead(grandchild),
            "Watchdog should kill grandchild {grandchild}"
        );
        child.wait().unwrap();
        assert_eq!(child.exit_status().unwrap(), 128 + libc::SIGKILL);
    }

    #[test]
    fn test_group_outlives_leader_until_dropped() {
        let temp = TempDir::new().unwrap();
        let pid_file = temp.path().join("orphan.pid");
        // The leader exits at once, leaving a background member behind
        let script = format!("sleep 30 & echo $! > '{}'", pid_file.display());

        let mut child = launch_guarded(&sh(&script)).unwrap();
        child.wait().unwrap();
        assert_eq!(child.exit_status().unwrap(), 0);

        let straggler: i32 = wait_for_file(&pid_file).trim().parse().unwrap();
        assert!(is_alive(straggler), "Background member should still run");

        drop(child);
        assert!(
            wait_until_dead(straggler),
            "Destroying the group should kill remaining members"
        );
    }
}
