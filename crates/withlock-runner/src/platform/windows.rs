//! Windows backend: `CREATE_SUSPENDED` launch bound to a Job Object.

use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};

use tracing::debug;
use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, HANDLE, WAIT_FAILED};
use windows::Win32::System::Console::{
    GetStdHandle, STD_ERROR_HANDLE, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE,
};
use windows::Win32::System::Threading::{
    CREATE_SUSPENDED, CreateProcessW, GetExitCodeProcess, INFINITE, PROCESS_INFORMATION,
    ResumeThread, STARTF_USESTDHANDLES, STARTUPINFOW, TerminateProcess, WaitForSingleObject,
};
use windows::core::{PCWSTR, PWSTR};

use super::windows_job::JobObjectHandle;
use crate::command_spec::ChildCommand;
use crate::error::RunnerError;
use crate::process::SupervisedChild;

pub(crate) const NOT_FOUND: i32 = ERROR_FILE_NOT_FOUND.0 as i32;

/// Convert a `windows` crate error into an `io::Error` carrying the Win32 code.
pub(crate) fn win32_error(err: &windows::core::Error) -> io::Error {
    let hr = err.code().0 as u32;
    let code = if hr & 0xFFFF_0000 == 0x8007_0000 {
        hr & 0xFFFF
    } else {
        hr
    };
    io::Error::from_raw_os_error(code as i32)
}

fn wide(value: &OsStr) -> Vec<u16> {
    value.encode_wide().chain(std::iter::once(0)).collect()
}

fn raw(handle: &OwnedHandle) -> HANDLE {
    HANDLE(handle.as_raw_handle())
}

// ============================================================================
// Suspended child
// ============================================================================

/// A process created with its primary thread suspended
struct SuspendedChild {
    pid: u32,
    process: OwnedHandle,
    thread: OwnedHandle,
    resumed: bool,
}

fn spawn_suspended(command: &ChildCommand) -> Result<SuspendedChild, RunnerError> {
    let application = wide(command.executable().as_os_str());
    let mut command_line = wide(command.command_line());

    // The child shares our console streams.
    let mut startup = STARTUPINFOW {
        cb: std::mem::size_of::<STARTUPINFOW>() as u32,
        dwFlags: STARTF_USESTDHANDLES,
        ..Default::default()
    };
    // SAFETY: GetStdHandle only reads the process's standard handle table.
    unsafe {
        startup.hStdInput = GetStdHandle(STD_INPUT_HANDLE).unwrap_or_default();
        startup.hStdOutput = GetStdHandle(STD_OUTPUT_HANDLE).unwrap_or_default();
        startup.hStdError = GetStdHandle(STD_ERROR_HANDLE).unwrap_or_default();
    }

    let mut info = PROCESS_INFORMATION::default();
    // SAFETY: both buffers are NUL-terminated and outlive the call.
    unsafe {
        CreateProcessW(
            PCWSTR(application.as_ptr()),
            Some(PWSTR(command_line.as_mut_ptr())),
            None,
            None,
            true,
            CREATE_SUSPENDED,
            None,
            PCWSTR::null(),
            &raw const startup,
            &raw mut info,
        )
    }
    .map_err(|e| RunnerError::Spawn {
        operation: "CreateProcessW",
        source: win32_error(&e),
    })?;

    // SAFETY: CreateProcessW returned fresh handles that we now own.
    let (process, thread) = unsafe {
        (
            OwnedHandle::from_raw_handle(info.hProcess.0),
            OwnedHandle::from_raw_handle(info.hThread.0),
        )
    };
    debug!(pid = info.dwProcessId, "Created suspended child");

    Ok(SuspendedChild {
        pid: info.dwProcessId,
        process,
        thread,
        resumed: false,
    })
}

impl SuspendedChild {
    fn resume(&mut self) -> Result<(), RunnerError> {
        // SAFETY: `thread` is the live primary thread handle from CreateProcessW.
        if unsafe { ResumeThread(raw(&self.thread)) } == u32::MAX {
            return Err(RunnerError::Spawn {
                operation: "ResumeThread",
                source: io::Error::last_os_error(),
            });
        }
        self.resumed = true;
        debug!(pid = self.pid, "Resumed child");
        Ok(())
    }
}

impl Drop for SuspendedChild {
    fn drop(&mut self) {
        if !self.resumed {
            // SAFETY: `process` is owned by us and still open.
            unsafe {
                let _ = TerminateProcess(raw(&self.process), 1);
            }
        }
    }
}

// ============================================================================
// Guarded child
// ============================================================================

/// Child process assigned to a kill-on-close Job Object.
///
/// Dropping it closes the job, which terminates the child and its descendants.
pub struct GuardedChild {
    pid: u32,
    process: OwnedHandle,
    exit_code: Option<u32>,
    _job: JobObjectHandle,
}

pub(crate) fn launch_guarded(command: &ChildCommand) -> Result<GuardedChild, RunnerError> {
    let mut child = spawn_suspended(command)?;

    let mut job = JobObjectHandle::create()?;
    job.bind_limits()?;
    job.assign(raw(&child.process))?;

    child.resume()?;

    let process = child
        .process
        .try_clone()
        .map_err(|source| RunnerError::Spawn {
            operation: "DuplicateHandle",
            source,
        })?;

    Ok(GuardedChild {
        pid: child.pid,
        process,
        exit_code: None,
        _job: job,
    })
}

impl SupervisedChild for GuardedChild {
    fn id(&self) -> u32 {
        self.pid
    }

    fn wait(&mut self) -> Result<(), RunnerError> {
        // SAFETY: `process` is an owned, open process handle.
        if unsafe { WaitForSingleObject(raw(&self.process), INFINITE) } == WAIT_FAILED {
            return Err(RunnerError::Wait {
                operation: "WaitForSingleObject",
                source: io::Error::last_os_error(),
            });
        }

        let mut code = 0u32;
        // SAFETY: the handle is open and `code` outlives the call.
        unsafe { GetExitCodeProcess(raw(&self.process), &raw mut code) }.map_err(|e| {
            RunnerError::Status {
                operation: "GetExitCodeProcess",
                source: win32_error(&e),
            }
        })?;
        self.exit_code = Some(code);
        Ok(())
    }

    fn exit_status(&self) -> Result<i32, RunnerError> {
        self.exit_code
            .map(|code| code as i32)
            .ok_or_else(|| RunnerError::Status {
                operation: "GetExitCodeProcess",
                source: io::Error::from_raw_os_error(
                    windows::Win32::Foundation::ERROR_INVALID_STATE.0 as i32,
                ),
            })
    }
}

impl std::fmt::Debug for GuardedChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedChild")
            .field("pid", &self.pid)
            .field("exit_code", &self.exit_code)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::path::PathBuf;

    fn cmd(script: &str) -> ChildCommand {
        let cmd = crate::command_spec::qualify(OsStr::new("cmd.exe")).unwrap();
        ChildCommand::new(cmd, vec![OsString::from("/C"), OsString::from(script)])
    }

    #[test]
    fn test_win32_error_unwraps_hresult() {
        let err = windows::core::Error::from(ERROR_FILE_NOT_FOUND.to_hresult());
        assert_eq!(win32_error(&err).raw_os_error(), Some(NOT_FOUND));
    }

    #[test]
    fn test_exit_code_round_trips_through_job() {
        let mut child = launch_guarded(&cmd("exit 7")).unwrap();
        child.wait().unwrap();
        assert_eq!(child.exit_status().unwrap(), 7);
    }

    #[test]
    fn test_missing_executable_is_a_spawn_error() {
        let command = ChildCommand::new(PathBuf::from(r"C:\nope\withlock-missing.exe"), Vec::new());
        let err = launch_guarded(&command).unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { operation: "CreateProcessW", .. }));
    }
}
