use framebridge_frame::CorrelationId;

/// Errors that can occur in endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] framebridge_transport::TransportError),

    /// Batch encoding error.
    #[error("frame error: {0}")]
    Frame(#[from] framebridge_frame::FrameError),

    /// A value could not be converted to a transportable payload.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema validation error.
    #[cfg(feature = "schema")]
    #[error("schema validation error: {0}")]
    Schema(#[from] framebridge_schema::SchemaError),

    /// A request handle was used after it had already been completed.
    #[error("request {correlation_id} already completed; {attempted} rejected")]
    AlreadyCompleted {
        correlation_id: CorrelationId,
        attempted: &'static str,
    },

    /// The endpoint has been shut down.
    #[error("endpoint shut down")]
    Shutdown,

    /// The endpoint configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PeerError>;
