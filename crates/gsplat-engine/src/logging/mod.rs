//! Logger setup for hosts and tools embedding the sorter.
//!
//! The engine itself only talks to the `log` facade; installing `env_logger`
//! is left to whoever owns `main`.

mod init;

pub use init::{init_logging, LoggingConfig};
