//! Per-connection protocol engine.
//!
//! - [`session`]: read loop and state machine
//! - `multiplexer`: one forwarding task per operation
//! - [`writer`]: serialized access to the outbound half
//! - [`registry`]: live operations and their cancellation handles
//! - [`keepalive`]: optional `ka` frames

pub mod keepalive;
pub(crate) mod multiplexer;
pub mod registry;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;
pub mod writer;

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::context::ConnectionContext;

pub use session::{ConnectionState, Session};

/// Serve one upgraded socket until it closes or `cancel` fires.
pub async fn serve_socket(
    socket: WebSocket,
    config: Arc<Config>,
    context: ConnectionContext,
    cancel: CancellationToken,
) {
    let (sink, stream) = socket.split();
    Session::new(config, context, sink, cancel).run(stream).await;
}
