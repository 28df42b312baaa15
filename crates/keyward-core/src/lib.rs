//! Keyward Core - Lock state machine and storage backends
//!
//! This crate provides:
//! - The per-key lock state and fencing token model
//! - The `StateStore` contract with in-memory and Redis implementations
//! - Lease expiry timers owned by each store
//! - The `LockCoordinator` the request layer talks to

pub mod error;
pub mod model;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use error::LockError;
pub use model::{INITIAL_VERSION, LockState, LockToken};
pub use service::LockCoordinator;
pub use store::{MemoryStateStore, RedisStateStore, RedisStoreConfig, StateStore};
