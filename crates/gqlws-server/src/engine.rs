//! Query-engine seam.
//!
//! The server never executes queries itself. For each accepted `start` it
//! calls a [`Subscriber`] and forwards whatever the returned stream yields.

use std::future::Future;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};

use crate::context::OperationContext;
use crate::errors::SubscribeError;

/// Results of one operation, in the order they must reach the client.
pub type ResultStream = BoxStream<'static, Value>;

/// Decoded body of a `start` frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OperationRequest {
    /// Query document text.
    pub query: String,
    /// Selected operation; empty when the client sent none.
    pub operation_name: String,
    /// Variable values.
    pub variables: Map<String, Value>,
}

/// Executes operations and produces their result streams.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Start executing `request`.
    ///
    /// The stream is drained until it ends or the operation is cancelled; it
    /// is dropped as soon as `ctx.cancellation()` fires.
    async fn subscribe(
        &self,
        ctx: OperationContext,
        request: OperationRequest,
    ) -> Result<ResultStream, SubscribeError>;
}

/// Default engine: rejects every operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSubscriber;

#[async_trait]
impl Subscriber for NoSubscriber {
    async fn subscribe(
        &self,
        _ctx: OperationContext,
        _request: OperationRequest,
    ) -> Result<ResultStream, SubscribeError> {
        Err(SubscribeError::Unavailable(
            "no subscriber function provided".into(),
        ))
    }
}

/// Adapter turning an async closure into a [`Subscriber`].
pub struct FnSubscriber<F>(pub F);

#[async_trait]
impl<F, Fut> Subscriber for FnSubscriber<F>
where
    F: Fn(OperationContext, OperationRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResultStream, SubscribeError>> + Send + 'static,
{
    async fn subscribe(
        &self,
        ctx: OperationContext,
        request: OperationRequest,
    ) -> Result<ResultStream, SubscribeError> {
        (self.0)(ctx, request).await
    }
}
