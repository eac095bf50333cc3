use std::io;

use tracing::debug;
use windows::Win32::Foundation::{CloseHandle, ERROR_ACCESS_DENIED, HANDLE};
use windows::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE,
    JOBOBJECT_EXTENDED_LIMIT_INFORMATION, JobObjectExtendedLimitInformation,
    SetInformationJobObject,
};

use super::windows::win32_error;
use crate::error::RunnerError;

/// RAII wrapper for a Windows Job Object handle.
///
/// Closing the handle terminates every process in the job once
/// `JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE` has been set by [`bind_limits`](Self::bind_limits).
pub(crate) struct JobObjectHandle {
    handle: Option<HANDLE>,
}

// SAFETY: Windows HANDLEs are safe to send between threads.
// The HANDLE is an opaque kernel object reference that can be used from any thread.
unsafe impl Send for JobObjectHandle {}

impl Drop for JobObjectHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            // SAFETY: the handle came from CreateJobObjectW and is closed once.
            unsafe {
                let _ = CloseHandle(handle);
            }
        }
    }
}

impl JobObjectHandle {
    /// Create an anonymous Job Object with no limits yet
    pub(crate) fn create() -> Result<Self, RunnerError> {
        // SAFETY: no security attributes and no name are passed.
        let job = unsafe { CreateJobObjectW(None, None) }.map_err(|e| RunnerError::Group {
            operation: "CreateJobObjectW",
            source: win32_error(&e),
        })?;
        Ok(Self { handle: Some(job) })
    }

    /// Configure the job to kill all of its processes when the handle is closed.
    ///
    /// On failure the job handle is closed before the error is returned.
    pub(crate) fn bind_limits(&mut self) -> Result<(), RunnerError> {
        let Some(job) = self.handle else {
            return Err(not_open("SetInformationJobObject"));
        };

        let mut info = JOBOBJECT_EXTENDED_LIMIT_INFORMATION::default();
        info.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;

        // SAFETY: `info` is a correctly sized extended limit structure that outlives the call.
        let result = unsafe {
            SetInformationJobObject(
                job,
                JobObjectExtendedLimitInformation,
                (&raw const info).cast(),
                std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
            )
        };

        if let Err(e) = result {
            let source = win32_error(&e);
            if let Some(handle) = self.handle.take() {
                // SAFETY: the job handle is still open and is not used again.
                unsafe {
                    let _ = CloseHandle(handle);
                }
            }
            return Err(RunnerError::Group {
                operation: "SetInformationJobObject",
                source,
            });
        }
        Ok(())
    }

    /// Assign a (suspended) process to the job; see [`classify_assign`].
    pub(crate) fn assign(&self, process: HANDLE) -> Result<(), RunnerError> {
        let Some(job) = self.handle else {
            return Err(not_open("AssignProcessToJobObject"));
        };

        // SAFETY: both handles are open for the duration of the call.
        classify_assign(unsafe { AssignProcessToJobObject(job, process) })
    }
}

/// Map the `AssignProcessToJobObject` outcome onto the attach result.
///
/// `ERROR_ACCESS_DENIED` is returned when the process already belongs to a
/// job that does not allow nesting; it is tolerated.
pub(crate) fn classify_assign(result: windows::core::Result<()>) -> Result<(), RunnerError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.code() == ERROR_ACCESS_DENIED.to_hresult() => {
            debug!("Ignoring ERROR_ACCESS_DENIED from AssignProcessToJobObject");
            Ok(())
        }
        Err(e) => Err(RunnerError::Group {
            operation: "AssignProcessToJobObject",
            source: win32_error(&e),
        }),
    }
}

fn not_open(operation: &'static str) -> RunnerError {
    RunnerError::Group {
        operation,
        source: io::Error::from_raw_os_error(
            windows::Win32::Foundation::ERROR_INVALID_HANDLE.0 as i32,
        ),
    }
}
