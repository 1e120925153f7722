use thiserror::Error;

/// Unified error type for the streaming core.
///
/// This aggregates low-level failures into the categories the caller actually
/// branches on. Cancellation is not an error (it is a normal terminal session
/// state, see [`crate::SessionStatus`]), and decode failures never surface
/// here at all: the chunk decoder substitutes replacement characters instead
/// of aborting the stream.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested model set is empty or names a backend outside the known
    /// set. Rejected synchronously, before any network activity.
    #[error("invalid model set: {reason}")]
    InvalidModelSet { reason: String },

    /// The stream (or an auxiliary request) answered with a non-success
    /// status during the handshake. No message events precede this.
    #[error("open failed: HTTP {status}: {message}")]
    Open { status: u16, message: String },

    /// Transport-level failure after a successful open, or a request that
    /// never reached the server. Terminal; retry is a caller decision.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Invalid endpoint base or path.
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The service envelope `{code, data, message}` carried a non-zero code.
    #[error("service error: code {code}: {message}")]
    Envelope { code: i64, message: String },
}

impl Error {
    pub fn invalid_model_set(reason: impl Into<String>) -> Self {
        Error::InvalidModelSet {
            reason: reason.into(),
        }
    }

    pub fn open(status: u16, message: impl Into<String>) -> Self {
        Error::Open {
            status,
            message: message.into(),
        }
    }

    /// True for failures of the initial handshake as opposed to mid-stream
    /// transport errors.
    pub fn is_open_error(&self) -> bool {
        matches!(self, Error::Open { .. })
    }
}
