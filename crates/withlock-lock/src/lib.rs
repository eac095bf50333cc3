//! Exclusive advisory file locking for withlock
//!
//! This crate provides the lock resource that serializes withlock invocations.
//! The lock file is opened (and created when missing) for reading only, and an
//! exclusive whole-file advisory lock is taken on it. The locking is advisory and
//! only coordinates processes that take the same lock; it is not a security boundary.
//!
//! Acquisition blocks until the lock is granted. A single error class, reported
//! intermittently by lock files on network shares, is retried a bounded number of
//! times; every other failure is returned immediately.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

mod platform;

/// Total number of lock attempts made when the transient error class is reported.
pub const MAX_LOCK_ATTEMPTS: u32 = 3;

/// OS error code treated as transient by [`LockResource::acquire_exclusive`].
///
/// `ERROR_NETNAME_DELETED` on Windows, `ENOLCK` on Unix.
pub const TRANSIENT_LOCK_ERROR: i32 = platform::TRANSIENT_LOCK_ERROR;

/// Lock errors for lock resource operations
///
/// Every variant carries the name of the OS operation that failed and the
/// `io::Error` captured right after that call.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("{operation} failed for lock file {}: {source}", path.display())]
    Open {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Acquire {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("{operation} failed while releasing the lock: {source}")]
    Release {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{operation} failed while closing the lock file: {source}")]
    Close {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Lock file is not open")]
    NotOpen,
}

impl LockError {
    /// Name of the OS operation that failed
    #[must_use]
    pub const fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Open { operation, .. }
            | Self::Acquire { operation, .. }
            | Self::Release { operation, .. }
            | Self::Close { operation, .. } => Some(operation),
            Self::NotOpen => None,
        }
    }

    /// The captured OS error, if any
    #[must_use]
    pub const fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Open { source, .. }
            | Self::Acquire { source, .. }
            | Self::Release { source, .. }
            | Self::Close { source, .. } => Some(source),
            Self::NotOpen => None,
        }
    }

    /// Raw OS error code carried by this error
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        self.io_error().and_then(io::Error::raw_os_error)
    }
}

/// Check whether an error belongs to the transient class worth retrying
#[must_use]
pub fn is_transient(err: &io::Error) -> bool {
    err.raw_os_error() == Some(TRANSIENT_LOCK_ERROR)
}

/// Run `attempt` until it succeeds, up to [`MAX_LOCK_ATTEMPTS`] times.
///
/// Only errors for which [`is_transient`] holds are retried. Any other error is
/// returned on the spot together with the number of attempts made so far.
///
/// # Returns
/// * `Ok(attempts)` - The attempt number that succeeded (1-based)
/// * `Err((attempts, error))` - The last error and how many attempts were made
pub fn retry_transient<F>(mut attempt: F) -> Result<u32, (u32, io::Error)>
where
    F: FnMut(u32) -> io::Result<()>,
{
    let mut last_error = None;

    for n in 1..=MAX_LOCK_ATTEMPTS {
        match attempt(n) {
            Ok(()) => return Ok(n),
            Err(e) if is_transient(&e) => {
                warn!(
                    attempt = n,
                    max_attempts = MAX_LOCK_ATTEMPTS,
                    error = %e,
                    "Transient lock failure"
                );
                last_error = Some(e);
            }
            Err(e) => return Err((n, e)),
        }
    }

    // All attempts hit the transient class; report it with its own code.
    Err((
        MAX_LOCK_ATTEMPTS,
        last_error.unwrap_or_else(|| io::Error::from_raw_os_error(TRANSIENT_LOCK_ERROR)),
    ))
}

/// Acquisition state of a lock resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked,
}

/// Operations the orchestrator needs from a lock resource.
///
/// The resource is opened at the start of a run, locked, unlocked after the child
/// has exited, and finally closed.
pub trait LockResource: Sized {
    /// Open the resource, creating it if absent
    fn open(path: &Path) -> Result<Self, LockError>;

    /// Take the exclusive lock, blocking until it is granted
    fn acquire_exclusive(&mut self) -> Result<(), LockError>;

    /// Release the exclusive lock
    fn release(&mut self) -> Result<(), LockError>;

    /// Close the underlying handle
    fn close(self) -> Result<(), LockError>;
}

/// Lock file backed by an OS file handle
///
/// Dropping a `LockFile` without calling [`LockResource::close`] still closes the
/// handle, and the OS drops the advisory lock with it.
pub struct LockFile {
    path: PathBuf,
    file: Option<File>,
    state: LockState,
}

impl LockFile {
    /// Path of the lock file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current acquisition state
    #[must_use]
    pub const fn state(&self) -> LockState {
        self.state
    }

    fn file(&self) -> Result<&File, LockError> {
        self.file.as_ref().ok_or(LockError::NotOpen)
    }
}

impl LockResource for LockFile {
    fn open(path: &Path) -> Result<Self, LockError> {
        let file = platform::open(path).map_err(|source| LockError::Open {
            operation: platform::OPEN_OP,
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "Opened lock file");

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            state: LockState::Unlocked,
        })
    }

    fn acquire_exclusive(&mut self) -> Result<(), LockError> {
        let file = self.file()?;

        let attempts = retry_transient(|_| platform::lock_exclusive(file)).map_err(
            |(attempts, source)| LockError::Acquire {
                operation: platform::LOCK_OP,
                attempts,
                source,
            },
        )?;

        self.state = LockState::Locked;
        debug!(path = %self.path.display(), attempts, "Acquired exclusive lock");
        Ok(())
    }

    fn release(&mut self) -> Result<(), LockError> {
        let file = self.file()?;

        platform::unlock(file).map_err(|source| LockError::Release {
            operation: platform::UNLOCK_OP,
            source,
        })?;

        self.state = LockState::Unlocked;
        debug!(path = %self.path.display(), "Released exclusive lock");
        Ok(())
    }

    fn close(mut self) -> Result<(), LockError> {
        let file = self.file.take().ok_or(LockError::NotOpen)?;

        platform::close(file).map_err(|source| LockError::Close {
            operation: platform::CLOSE_OP,
            source,
        })
    }
}

impl std::fmt::Debug for LockFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockFile")
            .field("path", &self.path)
            .field("open", &self.file.is_some())
            .field("state", &self.state)
            .finish()
    }
}
