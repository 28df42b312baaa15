// Main library module for Keyward - a distributed lock coordinator with fencing tokens
// The binary in main.rs wires these modules together

pub mod api; // HTTP handlers, models and routes
pub mod error; // HTTP error mapping
pub mod model; // Configuration
pub mod startup; // Logging, server and shutdown utilities

pub use error::AppError;
pub use model::Configuration;
