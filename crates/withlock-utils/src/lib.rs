pub mod error;
pub mod exit_codes;
pub mod logging;

pub use error::{ErrorKind, WithLockError, system_message};
pub use exit_codes::ExitCode;
