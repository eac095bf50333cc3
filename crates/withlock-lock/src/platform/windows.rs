use std::fs::File;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, IntoRawHandle, RawHandle};
use std::path::Path;

use windows::Win32::Foundation::{CloseHandle, ERROR_NETNAME_DELETED, GENERIC_READ, HANDLE};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FILE_ATTRIBUTE_READONLY, FILE_SHARE_READ, LOCKFILE_EXCLUSIVE_LOCK, LockFileEx,
    OPEN_ALWAYS, UnlockFileEx,
};
use windows::Win32::System::IO::OVERLAPPED;
use windows::core::PCWSTR;

/// Reported intermittently by `LockFileEx` on files hosted on network shares
pub(crate) const TRANSIENT_LOCK_ERROR: i32 = ERROR_NETNAME_DELETED.0 as i32;

pub(crate) const OPEN_OP: &str = "CreateFileW";
pub(crate) const LOCK_OP: &str = "LockFileEx";
pub(crate) const UNLOCK_OP: &str = "UnlockFileEx";
pub(crate) const CLOSE_OP: &str = "CloseHandle";

/// Convert a `windows` crate error into an `io::Error` carrying the Win32 code.
///
/// This is a local copy of the runner's helper so the lock crate stays standalone.
fn win32_error(err: &windows::core::Error) -> io::Error {
    let hr = err.code().0 as u32;
    let code = if hr & 0xFFFF_0000 == 0x8007_0000 {
        hr & 0xFFFF
    } else {
        hr
    };
    io::Error::from_raw_os_error(code as i32)
}

fn handle(file: &File) -> HANDLE {
    HANDLE(file.as_raw_handle())
}

/// Open the lock file for reading, creating it with the read-only attribute if absent.
///
/// Other processes may open it for reading concurrently.
pub(crate) fn open(path: &Path) -> io::Result<File> {
    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    // SAFETY: `wide` is NUL-terminated and outlives the call.
    let raw = unsafe {
        CreateFileW(
            PCWSTR(wide.as_ptr()),
            GENERIC_READ.0,
            FILE_SHARE_READ,
            None,
            OPEN_ALWAYS,
            FILE_ATTRIBUTE_READONLY,
            None,
        )
    }
    .map_err(|e| win32_error(&e))?;

    // SAFETY: `raw` is a freshly opened handle that nothing else owns.
    Ok(unsafe { File::from_raw_handle(raw.0 as RawHandle) })
}

pub(crate) fn lock_exclusive(file: &File) -> io::Result<()> {
    let mut overlapped = OVERLAPPED::default();
    // SAFETY: the handle is valid for the lifetime of `file`, and the call is
    // synchronous because the handle was not opened for overlapped I/O.
    unsafe { LockFileEx(handle(file), LOCKFILE_EXCLUSIVE_LOCK, None, 1, 0, &mut overlapped) }
        .map_err(|e| win32_error(&e))
}

pub(crate) fn unlock(file: &File) -> io::Result<()> {
    let mut overlapped = OVERLAPPED::default();
    // SAFETY: see `lock_exclusive`; the range matches the locked byte.
    unsafe { UnlockFileEx(handle(file), None, 1, 0, &mut overlapped) }
        .map_err(|e| win32_error(&e))
}

pub(crate) fn close(file: File) -> io::Result<()> {
    let raw = file.into_raw_handle();
    // SAFETY: ownership of the handle was released by `into_raw_handle`.
    unsafe { CloseHandle(HANDLE(raw)) }.map_err(|e| win32_error(&e))
}
