//! Utility modules.

pub mod backoff;
pub mod shutdown;

pub use backoff::retry_delay;
pub use shutdown::shutdown_signal;
