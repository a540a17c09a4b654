/// Errors that can occur while encoding or decoding batches.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload carries our marker but its body is not a valid batch.
    #[error("malformed batch: {0}")]
    Malformed(String),

    /// The batch holds more envelopes than the configured maximum.
    #[error("too many messages in batch ({count}, max {max})")]
    TooManyMessages { count: usize, max: usize },

    /// The legacy encoding has no field to carry a scoping domain.
    #[error("legacy wire format cannot carry domain '{0}'")]
    DomainUnsupported(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
