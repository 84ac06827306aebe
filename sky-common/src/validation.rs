//! Configuration validation.
//!
//! Checks that required values are present and within the ranges the
//! server and the Jetstream service accept.

use thiserror::Error;

use crate::config::{BufferConfig, Config, JetstreamConfig, ObservabilityConfig, ServerConfig};

/// Jetstream rejects subscriptions with more collections than this.
pub const MAX_WANTED_COLLECTIONS: usize = 100;

/// Jetstream rejects subscriptions with more DIDs than this.
pub const MAX_WANTED_DIDS: usize = 10_000;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port} for {field}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.server.validate() {
            errors.push(e);
        }
        if let Err(e) = self.buffer.validate() {
            errors.push(e);
        }
        if let Err(e) = self.jetstream.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }
        if self.network.bind.parse::<std::net::IpAddr>().is_err() {
            errors.push(ValidationError::InvalidValue {
                field: "network.bind".into(),
                reason: format!("'{}' is not an IP address", self.network.bind),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "server.port".into(),
            });
        }
        if self.session_idle_timeout_secs == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "server.session_idle_timeout_secs".into(),
                reason: "must be greater than 0 (omit to disable)".into(),
            });
        }
        if self.max_body_bytes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "server.max_body_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for BufferConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.capacity == 0 {
            return Err(ValidationError::InvalidValue {
                field: "buffer.capacity".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Validate for JetstreamConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.endpoint) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            Ok(url) => errors.push(ValidationError::InvalidValue {
                field: "jetstream.endpoint".into(),
                reason: format!("unsupported scheme '{}', expected ws or wss", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError::InvalidValue {
                field: "jetstream.endpoint".into(),
                reason: e.to_string(),
            }),
        }

        if self.wanted_collections.len() > MAX_WANTED_COLLECTIONS {
            errors.push(ValidationError::InvalidValue {
                field: "jetstream.wanted_collections".into(),
                reason: format!(
                    "{} entries, at most {MAX_WANTED_COLLECTIONS} allowed",
                    self.wanted_collections.len()
                ),
            });
        }

        if self.wanted_dids.len() > MAX_WANTED_DIDS {
            errors.push(ValidationError::InvalidValue {
                field: "jetstream.wanted_dids".into(),
                reason: format!(
                    "{} entries, at most {MAX_WANTED_DIDS} allowed",
                    self.wanted_dids.len()
                ),
            });
        }

        if self.initial_backoff_ms == 0 || self.initial_backoff_ms > self.max_backoff_ms {
            errors.push(ValidationError::InvalidValue {
                field: "jetstream.initial_backoff_ms".into(),
                reason: format!(
                    "must be between 1 and max_backoff_ms ({})",
                    self.max_backoff_ms
                ),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("'{}' is not one of: pretty, json", self.log_format),
            });
        }
        Ok(())
    }
}
