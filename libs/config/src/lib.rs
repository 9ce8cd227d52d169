//! # Pipeline Configuration
//!
//! TOML configuration for capture streams and statistics publishing.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use config::PipelineConfig;
//!
//! let config = PipelineConfig::load("pipeline.toml")?;
//! for stream in &config.streams {
//!     println!("{} ({}, {} sources)", stream.name, stream.protocol, stream.nsrc);
//! }
//! # Ok::<(), config::ConfigError>(())
//! ```

pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use error::{ConfigError, ConfigResult};
pub use pipeline::{
    PipelineConfig, SinkKind, StatsConfig, StreamConfig, DEFAULT_BACKLOG, DEFAULT_MTU,
    DEFAULT_PROCLOG_DIR, DEFAULT_TIMEOUT_MS,
};
