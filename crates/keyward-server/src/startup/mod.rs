//! Application startup utilities module.
//!
//! Logging, HTTP server construction and graceful shutdown.

mod http;
mod logging;
mod shutdown;

pub use http::main_server;
pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::{serve_until, wait_for_shutdown_signal};
