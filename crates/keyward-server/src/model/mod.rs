//! Data models module
//!
//! - `config` - Configuration management

pub mod config;

pub use config::{Cli, Configuration};
