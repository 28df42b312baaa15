// Core services exposed to the request layer

pub mod lock;

pub use lock::LockCoordinator;
