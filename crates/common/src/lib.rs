//! wafreplay Common Library
//!
//! Shared test-definition types, run configuration and errors for the
//! wafreplay runner and CLI.

pub mod config;
pub mod error;
pub mod header;
pub mod types;

// Re-export commonly used types
pub use config::{InputOverride, RunMode, RunnerConfig, TestOverride};
pub use error::{Error, Result};
pub use header::Header;
pub use types::*;

/// wafreplay version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = ".wafreplay.toml";
