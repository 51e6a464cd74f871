//! Database pool setup and write retry policy

pub mod init;
pub mod retry;

pub use init::*;
pub use retry::{is_lock_error, Backoff, RetryPolicy};
