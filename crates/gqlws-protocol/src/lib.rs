//! # gqlws-protocol
//!
//! Wire format of the `graphql-ws` subscription protocol.
//!
//! - [`ClientFrame`]: inbound frames, decoded lazily by their `type` tag
//! - [`ServerFrame`]: outbound `{id, type, payload}` envelopes
//! - [`OperationPayload`]: the `{query, variables, operationName}` body of `start`
//! - [`CodecError`]: everything that can go wrong while decoding

#![deny(unsafe_code)]

pub mod errors;
pub mod frame;
pub mod payload;

pub use errors::{CodecError, Result};
pub use frame::{ClientFrame, ServerFrame, ServerFrameType};
pub use payload::{ErrorPayload, OperationPayload};

/// Subprotocol token negotiated during the WebSocket upgrade.
pub const SUBPROTOCOL: &str = "graphql-ws";

/// Client → server: open the connection, optionally carrying an init payload.
pub const CONNECTION_INIT: &str = "connection_init";
/// Client → server: start an operation.
pub const START: &str = "start";
/// Client → server: stop an operation.
pub const STOP: &str = "stop";
/// Client → server: close the connection.
pub const CONNECTION_TERMINATE: &str = "connection_terminate";
/// Server → client: `connection_init` accepted.
pub const CONNECTION_ACK: &str = "connection_ack";
/// Server → client: connection-level or engine-availability error.
pub const CONNECTION_ERROR: &str = "connection_error";
/// Server → client: keep-alive.
pub const KEEP_ALIVE: &str = "ka";
/// Server → client: one result of an operation.
pub const DATA: &str = "data";
/// Server → client: operation-scoped error.
pub const ERROR: &str = "error";
/// Server → client: operation finished.
pub const COMPLETE: &str = "complete";
