#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;
#[cfg(windows)]
mod windows_job;

#[cfg(unix)]
pub use unix::GuardedChild;
#[cfg(unix)]
pub(crate) use unix::{NOT_FOUND, launch_guarded};

#[cfg(windows)]
pub use windows::GuardedChild;
#[cfg(windows)]
pub(crate) use windows::{NOT_FOUND, launch_guarded};
