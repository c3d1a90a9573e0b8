//! Daemon mode: scheduled runs and signal handling.

pub mod scheduler;
pub mod shutdown;
