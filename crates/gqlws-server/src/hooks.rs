//! Connection bootstrap hook.

use std::future::Future;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::ConnectionContext;
use crate::errors::ConnectError;

/// Runs on every `connection_init`.
///
/// Receives the current connection context and the init payload (often an
/// `authToken`). The returned context replaces the connection's context for
/// every later operation. An error closes the connection.
#[async_trait]
pub trait ConnectHook: Send + Sync + 'static {
    /// Validate and augment the connection context.
    async fn on_connect(
        &self,
        ctx: ConnectionContext,
        payload: Map<String, Value>,
    ) -> Result<ConnectionContext, ConnectError>;
}

/// Default hook: returns the context unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

#[async_trait]
impl ConnectHook for Passthrough {
    async fn on_connect(
        &self,
        ctx: ConnectionContext,
        _payload: Map<String, Value>,
    ) -> Result<ConnectionContext, ConnectError> {
        Ok(ctx)
    }
}

/// Adapter turning an async closure into a [`ConnectHook`].
pub struct FnConnectHook<F>(pub F);

#[async_trait]
impl<F, Fut> ConnectHook for FnConnectHook<F>
where
    F: Fn(ConnectionContext, Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ConnectionContext, ConnectError>> + Send + 'static,
{
    async fn on_connect(
        &self,
        ctx: ConnectionContext,
        payload: Map<String, Value>,
    ) -> Result<ConnectionContext, ConnectError> {
        (self.0)(ctx, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn passthrough_keeps_context() {
        let ctx = ConnectionContext::new("c1").with_value("k", json!(1));
        let out = Passthrough
            .on_connect(ctx, Map::new())
            .await
            .unwrap();
        assert_eq!(out.connection_id(), "c1");
        assert_eq!(out.get("k"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn fn_hook_can_reject() {
        let hook = FnConnectHook(|ctx: ConnectionContext, payload: Map<String, Value>| async move {
            match payload.get("authToken").and_then(Value::as_str) {
                Some(token) => Ok(ctx.with_value("token", json!(token))),
                None => Err(ConnectError::new("missing authToken")),
            }
        });

        let err = hook
            .on_connect(ConnectionContext::new("c"), Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "missing authToken");

        let mut payload = Map::new();
        let _ = payload.insert("authToken".into(), json!("secret"));
        let ctx = hook
            .on_connect(ConnectionContext::new("c"), payload)
            .await
            .unwrap();
        assert_eq!(ctx.get("token"), Some(&json!("secret")));
    }
}
