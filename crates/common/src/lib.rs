//! Revunk Common Utilities
//!
//! Shared infrastructure for all Revunk crates:
//! - Error taxonomy and result aliases
//! - Exact media time (integer nanoseconds) and rational frame rates
//! - Tracing/logging initialization
//! - Configuration loading

pub mod config;
pub mod error;
pub mod logging;
pub mod time;

pub use config::*;
pub use error::*;
pub use time::*;
