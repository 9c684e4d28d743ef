//! Error types for the session client boundary.

use tokio_tungstenite::tungstenite;

/// Failures decoding or encoding a protocol frame. These never escape the
/// inbound dispatcher; they are logged and the frame is dropped.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("frame has no msg_type tag")]
    MissingTag,

    #[error("malformed frame: {0}")]
    InvalidFrame(#[source] serde_json::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Failures of the underlying connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("connection closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// Errors returned to callers of [`crate::ProtocolClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An outbound intent was issued before the session id and user id
    /// were known.
    #[error("session not established")]
    SessionNotEstablished,

    #[error("websocket is not connected")]
    NotConnected,

    #[error("user id must not be empty")]
    EmptyUserId,

    #[error("websocket connection failed: {0}")]
    ConnectFailed(#[source] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// Precondition failures point at a bug in the calling flow rather than
    /// a runtime condition.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::SessionNotEstablished | Self::NotConnected | Self::EmptyUserId
        )
    }
}
