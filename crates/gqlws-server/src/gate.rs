//! Upgrade gate: graphql-ws upgrades go to the protocol engine, everything
//! else to a fallback service.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::header::{ORIGIN, SEC_WEBSOCKET_PROTOCOL};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use gqlws_protocol::SUBPROTOCOL;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::config::Config;
use crate::connection::serve_socket;
use crate::context::{ConnectionContext, new_connection_id};

/// Whether any `Sec-WebSocket-Protocol` header lists `graphql-ws`.
pub fn advertises_subprotocol(headers: &HeaderMap) -> bool {
    headers
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|candidate| candidate.trim() == SUBPROTOCOL)
}

/// Whether the protocol engine should take this request.
pub fn should_upgrade(config: &Config, parts: &Parts) -> bool {
    advertises_subprotocol(&parts.headers) && (config.upgrade_rule)(parts)
}

/// Shared state behind every [`GqlWsService`] clone.
#[derive(Clone)]
pub struct Endpoint {
    config: Arc<Config>,
    shutdown: CancellationToken,
    connections: Arc<AtomicUsize>,
}

impl Endpoint {
    /// Connections are cancelled when `shutdown` fires.
    pub fn new(config: Config, shutdown: CancellationToken) -> Self {
        Self {
            config: Arc::new(config),
            shutdown,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Endpoint configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Currently upgraded connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    async fn upgrade(self, mut parts: Parts) -> Response {
        if !(self.config.check_origin)(&parts) {
            warn!(origin = ?parts.headers.get(ORIGIN), "upgrade rejected by origin check");
            return StatusCode::FORBIDDEN.into_response();
        }

        let context = ConnectionContext::from_parts(new_connection_id(), &parts);
        let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(ws) => ws,
            Err(rejection) => {
                debug!(error = %rejection, "websocket upgrade refused");
                return rejection.into_response();
            }
        };

        let max_message_size = self.config.max_message_size;
        ws.protocols([SUBPROTOCOL])
            .max_message_size(max_message_size)
            .on_upgrade(move |socket| self.serve(socket, context))
    }

    async fn serve(self, socket: WebSocket, context: ConnectionContext) {
        let _guard = ConnectionGuard::new(&self.connections);
        let cancel = self.shutdown.child_token();
        serve_socket(socket, Arc::clone(&self.config), context, cancel).await;
    }
}

/// Keeps the live-connection count accurate even if the session panics.
struct ConnectionGuard<'a>(&'a AtomicUsize);

impl<'a> ConnectionGuard<'a> {
    fn new(count: &'a AtomicUsize) -> Self {
        let _ = count.fetch_add(1, Ordering::Relaxed);
        Self(count)
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Tower service routing graphql-ws upgrades to the engine and the rest to
/// `fallback`.
#[derive(Clone)]
pub struct GqlWsService<S> {
    endpoint: Endpoint,
    fallback: S,
}

impl<S> GqlWsService<S> {
    /// Wrap `fallback`.
    pub fn new(endpoint: Endpoint, fallback: S) -> Self {
        Self { endpoint, fallback }
    }

    /// Shared endpoint state.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl<S> Service<Request<Body>> for GqlWsService<S>
where
    S: Service<Request<Body>, Error = Infallible> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.fallback.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let (parts, body) = req.into_parts();

        if !should_upgrade(&self.endpoint.config, &parts) {
            // Call the instance that was driven to readiness, leave a fresh clone behind.
            let clone = self.fallback.clone();
            let mut ready = std::mem::replace(&mut self.fallback, clone);
            let fut = ready.call(Request::from_parts(parts, body));
            return Box::pin(async move { fut.await.map(IntoResponse::into_response) });
        }

        let endpoint = self.endpoint.clone();
        Box::pin(async move { Ok(endpoint.upgrade(parts).await) })
    }
}

/// [`Layer`] producing [`GqlWsService`].
#[derive(Clone)]
pub struct GqlWsLayer {
    endpoint: Endpoint,
}

impl GqlWsLayer {
    /// Build a layer sharing `endpoint`.
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

impl<S> Layer<S> for GqlWsLayer {
    type Service = GqlWsService<S>;

    fn layer(&self, fallback: S) -> Self::Service {
        GqlWsService::new(self.endpoint.clone(), fallback)
    }
}
