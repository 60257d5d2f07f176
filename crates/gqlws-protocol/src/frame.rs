//! Frame envelopes.
//!
//! Inbound frames are parsed in two steps: the envelope (`id`, `type`) is read
//! first and the payload is kept as raw JSON until the type is known. Only
//! `connection_init` payloads are decoded here; `start` payloads stay raw so
//! that a bad operation body can be reported against its own id instead of
//! failing the whole connection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{CodecError, Result};
use crate::payload::ErrorPayload;

/// A decoded client → server frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientFrame {
    /// `connection_init` with its free-form payload (empty when absent).
    ConnectionInit {
        /// Payload handed to the bootstrap hook.
        payload: Map<String, Value>,
    },
    /// `start` with its still-undecoded operation payload.
    Start {
        /// Client-chosen operation id.
        id: String,
        /// Raw payload, decoded later as an `OperationPayload`.
        payload: Option<Value>,
    },
    /// `stop` for one operation.
    Stop {
        /// Operation to stop.
        id: String,
    },
    /// `connection_terminate`.
    ConnectionTerminate,
    /// Any type outside the protocol vocabulary.
    Unknown {
        /// Id as sent (empty when absent).
        id: String,
        /// The unrecognized `type` value.
        kind: String,
    },
}

impl ClientFrame {
    /// Decode one text message.
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(CodecError::Malformed)?;
        Self::from_value(value)
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(CodecError::MissingType);
        };

        let kind = match object.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return Err(CodecError::MissingType),
        };
        let id = match object.remove("id") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(id)) => id,
            Some(_) => return Err(CodecError::InvalidId),
        };
        let payload = match object.remove("payload") {
            None | Some(Value::Null) => None,
            Some(p) => Some(p),
        };

        let frame = match kind.as_str() {
            crate::CONNECTION_INIT => match payload {
                None => Self::ConnectionInit { payload: Map::new() },
                Some(Value::Object(payload)) => Self::ConnectionInit { payload },
                Some(_) => return Err(CodecError::InvalidInitPayload),
            },
            crate::START => Self::Start { id, payload },
            crate::STOP => Self::Stop { id },
            crate::CONNECTION_TERMINATE => Self::ConnectionTerminate,
            _ => Self::Unknown { id, kind },
        };
        Ok(frame)
    }

    /// Wire name of this frame's type.
    pub fn kind(&self) -> &str {
        match self {
            Self::ConnectionInit { .. } => crate::CONNECTION_INIT,
            Self::Start { .. } => crate::START,
            Self::Stop { .. } => crate::STOP,
            Self::ConnectionTerminate => crate::CONNECTION_TERMINATE,
            Self::Unknown { kind, .. } => kind,
        }
    }
}

/// Types the server emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerFrameType {
    /// `connection_ack`
    ConnectionAck,
    /// `connection_error`
    ConnectionError,
    /// `ka`
    #[serde(rename = "ka")]
    KeepAlive,
    /// `data`
    Data,
    /// `error`
    Error,
    /// `complete`
    Complete,
}

impl ServerFrameType {
    /// Wire name, also used as a metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionAck => crate::CONNECTION_ACK,
            Self::ConnectionError => crate::CONNECTION_ERROR,
            Self::KeepAlive => crate::KEEP_ALIVE,
            Self::Data => crate::DATA,
            Self::Error => crate::ERROR,
            Self::Complete => crate::COMPLETE,
        }
    }
}

/// An outbound `{id, type, payload}` envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    /// Operation id; omitted for connection-scoped frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Frame type.
    #[serde(rename = "type")]
    pub kind: ServerFrameType,
    /// Type-dependent body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ServerFrame {
    /// `connection_ack`.
    pub fn connection_ack() -> Self {
        Self {
            id: None,
            kind: ServerFrameType::ConnectionAck,
            payload: None,
        }
    }

    /// `ka`.
    pub fn keep_alive() -> Self {
        Self {
            id: None,
            kind: ServerFrameType::KeepAlive,
            payload: None,
        }
    }

    /// `data` carrying one engine result verbatim.
    pub fn data(id: impl Into<String>, value: Value) -> Self {
        Self {
            id: scoped(id.into()),
            kind: ServerFrameType::Data,
            payload: Some(value),
        }
    }

    /// `complete`.
    pub fn complete(id: impl Into<String>) -> Self {
        Self {
            id: scoped(id.into()),
            kind: ServerFrameType::Complete,
            payload: None,
        }
    }

    /// `error` with a `{message}` body. An empty id makes it connection-scoped.
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_error(ServerFrameType::Error, id.into(), message.into())
    }

    /// `connection_error` with a `{message}` body.
    pub fn connection_error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_error(ServerFrameType::ConnectionError, id.into(), message.into())
    }

    fn with_error(kind: ServerFrameType, id: String, message: String) -> Self {
        Self {
            id: scoped(id),
            kind,
            payload: serde_json::to_value(ErrorPayload::new(message)).ok(),
        }
    }

    /// Serialize to the text form sent over the socket.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(CodecError::Encode)
    }
}

fn scoped(id: String) -> Option<String> {
    (!id.is_empty()).then_some(id)
}
