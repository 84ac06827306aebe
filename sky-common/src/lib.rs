//! Sky Common - Shared configuration, logging, and error types for the Sky feed services.
//!
//! This crate provides:
//! - Configuration types and loading (file, environment overrides)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    BufferConfig, Config, JetstreamConfig, NetworkConfig, ObservabilityConfig, ServerConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
