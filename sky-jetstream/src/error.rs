//! Jetstream client errors.

/// Result type for Jetstream operations.
pub type JetstreamResult<T> = Result<T, JetstreamError>;

/// Jetstream client error type.
#[derive(Debug, thiserror::Error)]
pub enum JetstreamError {
    #[error("Invalid Jetstream endpoint: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Gave up after {0} reconnection attempts")]
    RetriesExhausted(u32),
}
