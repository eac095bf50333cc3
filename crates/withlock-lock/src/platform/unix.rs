use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Lock table or remote lock manager temporarily unavailable (NFS and friends)
pub(crate) const TRANSIENT_LOCK_ERROR: i32 = libc::ENOLCK;

pub(crate) const OPEN_OP: &str = "open";
pub(crate) const LOCK_OP: &str = "flock";
pub(crate) const UNLOCK_OP: &str = "flock(LOCK_UN)";
pub(crate) const CLOSE_OP: &str = "close";

/// Open the lock file read-only, creating it with read-only permissions if absent.
///
/// `O_CREAT` is passed as a custom flag because `OpenOptions::create` insists on
/// write access, and `flock` only needs a readable descriptor.
pub(crate) fn open(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_CREAT)
        .mode(0o444)
        .open(path)
}

pub(crate) fn lock_exclusive(file: &File) -> io::Result<()> {
    flock(file, libc::LOCK_EX)
}

pub(crate) fn unlock(file: &File) -> io::Result<()> {
    flock(file, libc::LOCK_UN)
}

pub(crate) fn close(file: File) -> io::Result<()> {
    let fd = file.into_raw_fd();
    // SAFETY: `fd` was just released from an owning `File`, so nothing else closes it.
    if unsafe { libc::close(fd) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    loop {
        // SAFETY: the descriptor is owned by `file` and stays open for the call.
        if unsafe { libc::flock(file.as_raw_fd(), operation) } == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_created_lock_file_is_read_only() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mode.lock");

        let file = open(&path).unwrap();
        close(file).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o222, 0, "Lock file should not be writable: {mode:o}");
    }

    #[test]
    fn test_read_only_descriptor_can_be_locked() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ro.lock");

        let file = open(&path).unwrap();
        lock_exclusive(&file).unwrap();
        unlock(&file).unwrap();
        close(file).unwrap();
    }
}
