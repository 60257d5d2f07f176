//! Per-connection and per-operation context handed to hooks and engines.

use std::sync::Arc;

use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Generate a fresh connection id.
pub fn new_connection_id() -> String {
    format!("conn_{}", Uuid::now_v7())
}

/// Context of one upgraded connection.
///
/// Starts from the upgrade request (headers, URI) and can be augmented by the
/// bootstrap hook with arbitrary values, e.g. an authenticated user.
#[derive(Clone, Debug)]
pub struct ConnectionContext {
    connection_id: String,
    uri: Uri,
    headers: Arc<HeaderMap>,
    values: Map<String, Value>,
}

impl ConnectionContext {
    /// An empty context, not tied to any request.
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            uri: Uri::default(),
            headers: Arc::new(HeaderMap::new()),
            values: Map::new(),
        }
    }

    /// Derive the base context from an upgrade request head.
    pub fn from_parts(connection_id: impl Into<String>, parts: &Parts) -> Self {
        Self {
            connection_id: connection_id.into(),
            uri: parts.uri.clone(),
            headers: Arc::new(parts.headers.clone()),
            values: Map::new(),
        }
    }

    /// Server-assigned connection id.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Upgrade request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Upgrade request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Look up a value set by the bootstrap hook.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// All hook-provided values.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Set a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.insert(key, value);
        self
    }
}

/// Context of one operation, a child of its connection.
#[derive(Clone, Debug)]
pub struct OperationContext {
    /// Connection the operation runs on.
    pub connection: ConnectionContext,
    /// Client-chosen operation id.
    pub operation_id: String,
    cancel: CancellationToken,
}

impl OperationContext {
    /// Context for operation `operation_id`, cancelled through `cancel`.
    pub fn new(
        connection: ConnectionContext,
        operation_id: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connection,
            operation_id: operation_id.into(),
            cancel,
        }
    }

    /// Token cancelled on `stop`, id reuse, or connection teardown, and once
    /// the operation has sent its last frame.
    ///
    /// Engines that spawn their own work should stop when this fires.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the operation has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
