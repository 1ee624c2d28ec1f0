//! Shared ambient stack for the sipline binaries: tracing subscriber setup
//! and a small configuration error type. Nothing here is SIP/RTP-specific.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::setup::{log_welcome, parse_log_level, setup_logging, LoggingConfig};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
