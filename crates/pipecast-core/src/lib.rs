//! `PipeCast` Core Library
//!
//! Shared functionality for `PipeCast` components:
//! - Configuration resolution (defaults, file, environment)
//! - Common error types
//! - Tracing subscriber setup

pub mod config;
pub mod error;
pub mod tracing_init;

pub use config::{EncoderConfig, OverflowPolicy, RelayConfig, ServerConfig, SessionConfig};
pub use error::{Error, Result};
