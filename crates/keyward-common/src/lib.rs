//! Keyward Common - Shared types, constants, and utilities
//!
//! This crate provides the foundational types used across all Keyward components:
//! - Error types and response error tags
//! - Storage mode selection
//! - Utility functions
//! - Common constants

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{ErrorBody, ErrorType, HANDLE_ERROR_NAME, KeywardError};
pub use utils::{dedup_keys, parse_positive};

/// Lease applied when a lock request omits its expiry (milliseconds)
pub const DEFAULT_EXPIRY_MS: u64 = 1000;

/// Default HTTP listen address
pub const DEFAULT_SERVER_ADDRESS: &str = "localhost";

/// Default HTTP listen port
pub const DEFAULT_SERVER_PORT: u16 = 3000;

/// Default Redis endpoint
pub const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Backend that holds lock state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Process-local table, single instance only
    Memory,
    /// Redis shared by every coordinator instance
    #[default]
    Redis,
}

impl StorageMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageMode::Memory => "memory",
            StorageMode::Redis => "redis",
        }
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "in_memory" => Ok(StorageMode::Memory),
            "redis" => Ok(StorageMode::Redis),
            _ => Err(format!("Invalid storage mode: {}", s)),
        }
    }
}
