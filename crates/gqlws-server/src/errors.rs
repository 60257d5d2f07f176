//! Error types for the connection engine and host server.

use gqlws_protocol::{CodecError, ServerFrame};

/// Failure returned by a [`Subscriber`](crate::engine::Subscriber).
///
/// The variant decides which frame the client sees: `Rejected` becomes an
/// `error` frame, `Unavailable` a `connection_error` frame. Both are scoped to
/// the operation id and leave the connection open.
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    /// The engine refused this operation (bad query, validation failure).
    #[error("{0}")]
    Rejected(String),
    /// The engine cannot serve operations at all.
    #[error("{0}")]
    Unavailable(String),
}

impl SubscribeError {
    /// Build the frame reported to the client for operation `id`.
    pub fn to_frame(&self, id: &str) -> ServerFrame {
        match self {
            Self::Rejected(message) => ServerFrame::error(id, message.as_str()),
            Self::Unavailable(message) => ServerFrame::connection_error(id, message.as_str()),
        }
    }
}

/// Failure returned by a [`ConnectHook`](crate::hooks::ConnectHook).
///
/// Always fatal: the client receives one `error` frame and the socket closes.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ConnectError {
    /// Reason shown to the client.
    pub message: String,
}

impl ConnectError {
    /// Build from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure writing one frame to the socket.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The frame could not be encoded.
    #[error(transparent)]
    Encode(#[from] CodecError),
    /// The sink refused the message.
    #[error("transport write failed: {0}")]
    Transport(String),
}

/// Failure starting the host server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding or serving failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlws_protocol::ServerFrameType;

    #[test]
    fn rejected_maps_to_error_frame() {
        let frame = SubscribeError::Rejected("bad query".into()).to_frame("1");
        assert_eq!(frame.kind, ServerFrameType::Error);
        assert_eq!(frame.id.as_deref(), Some("1"));
        assert_eq!(frame.payload.unwrap()["message"], "bad query");
    }

    #[test]
    fn unavailable_maps_to_connection_error_frame() {
        let frame = SubscribeError::Unavailable("no engine".into()).to_frame("9");
        assert_eq!(frame.kind, ServerFrameType::ConnectionError);
        assert_eq!(frame.id.as_deref(), Some("9"));
    }

    #[test]
    fn connect_error_display() {
        assert_eq!(ConnectError::new("unauthorized").to_string(), "unauthorized");
    }

    #[test]
    fn write_error_wraps_codec() {
        let err: WriteError = CodecError::MissingType.into();
        assert!(matches!(err, WriteError::Encode(_)));
    }
}
