//! # gqlws-server
//!
//! Server side of the `graphql-ws` subscription protocol on Axum WebSockets.
//!
//! - Upgrade gate: a tower service/layer that hands `graphql-ws` upgrades to
//!   the protocol engine and everything else to a fallback
//! - Connection engine: per-socket state machine, operation registry,
//!   per-operation forwarding tasks, serialized outbound writes
//! - Seams for the embedder: [`Subscriber`] (query engine) and
//!   [`ConnectHook`] (connection bootstrap)
//! - Host server: `/health`, `/metrics`, graceful shutdown via
//!   `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod context;
pub mod engine;
pub mod errors;
pub mod gate;
pub mod health;
pub mod hooks;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod shutdown;

pub use config::{Config, RequestPredicate};
pub use connection::{ConnectionState, Session, serve_socket};
pub use context::{ConnectionContext, OperationContext};
pub use engine::{FnSubscriber, NoSubscriber, OperationRequest, ResultStream, Subscriber};
pub use errors::{ConnectError, ServerError, SubscribeError, WriteError};
pub use gate::{Endpoint, GqlWsLayer, GqlWsService};
pub use hooks::{ConnectHook, FnConnectHook, Passthrough};
pub use server::GqlWsServer;
pub use shutdown::ShutdownCoordinator;
