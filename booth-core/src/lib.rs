//! Booth Core - Shared data structures, errors, configuration and logging
//!
//! This module defines the types every other booth crate builds on

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio;
pub use tracing;
