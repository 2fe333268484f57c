use thiserror::Error;

/// Result type for Nuvo operations
pub type Result<T> = std::result::Result<T, NuvoError>;

/// Errors that can occur when bridging a Nuvo amplifier to host entities
#[derive(Error, Debug)]
pub enum NuvoError {
    /// Scale definition is malformed or has zero width
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Push payload is missing expected fields or carries a wrong-typed identifier
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// No live device connection is available (closed, or the entity was detached)
    #[error("Connection unavailable")]
    ConnectionUnavailable,

    /// Connection was closed while a query was waiting for its answer
    #[error("Connection closed")]
    ConnectionClosed,

    /// Query timed out waiting for the device to answer
    #[error("Query timeout")]
    Timeout,

    /// Amplifier model is not in the model table
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Source name is not one of the configured sources
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Device answered with an event of a different kind than requested
    #[error("Unexpected event: {0}")]
    UnexpectedEvent(String),

    /// Integration configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
