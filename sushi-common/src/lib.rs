//! Sushi Common - Shared configuration, error types, and logging for the SushiBot relay.
//!
//! This crate provides:
//! - Configuration types and loading (file + environment overrides)
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    Config, FetchersConfig, LlmConfig, LlmSecretsConfig, NetworkConfig, ObservabilityConfig,
    SecretsConfig, SessionConfig, SlackSecretsConfig,
};
pub use error::{Error, Result};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
}
