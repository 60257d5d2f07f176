//! Connection lifecycle: one read loop per upgraded socket.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::Message;
use futures::{Sink, Stream, StreamExt};
use gqlws_protocol::{ClientFrame, OperationPayload, ServerFrame};
use metrics::{counter, gauge, histogram};
use serde_json::{Map, Value};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use super::keepalive::run_keep_alive;
use super::multiplexer::{Operation, forward};
use super::registry::OperationRegistry;
use super::writer::{Delivery, FrameWriter};
use crate::config::Config;
use crate::context::{ConnectionContext, OperationContext};
use crate::engine::OperationRequest;
use crate::metrics::{
    CONNECTION_DURATION_SECONDS, CONNECTIONS_ACTIVE, CONNECTIONS_TOTAL, OPERATION_ERRORS_TOTAL,
    OPERATIONS_STARTED_TOTAL,
};

/// Upper bound on waiting for operation tasks, and then for the socket
/// close, once a connection ends.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded, no `connection_init` processed yet.
    Fresh,
    /// `connection_init` acknowledged.
    Ready,
    /// Socket closed.
    Terminated,
}

/// One connection's protocol state machine.
///
/// Generic over the outbound sink so it can run on an axum [`WebSocket`]
/// half or on an in-memory channel.
///
/// [`WebSocket`]: axum::extract::ws::WebSocket
pub struct Session<W> {
    config: Arc<Config>,
    context: ConnectionContext,
    state: ConnectionState,
    writer: FrameWriter<W>,
    registry: Arc<OperationRegistry>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl<W> Session<W>
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: fmt::Display,
{
    /// Build a session writing to `sink`.
    ///
    /// `cancel` is the connection token: cancelling it (or its parent) ends
    /// the read loop and every operation.
    pub fn new(
        config: Arc<Config>,
        context: ConnectionContext,
        sink: W,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            context,
            state: ConnectionState::Fresh,
            writer: FrameWriter::new(sink),
            registry: Arc::new(OperationRegistry::new()),
            tasks: TaskTracker::new(),
            cancel,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run the read loop until the client leaves, terminates, breaks the
    /// protocol, or the connection token fires. Tears everything down before
    /// returning.
    #[instrument(skip_all, fields(connection_id = %self.context.connection_id()))]
    pub async fn run<R, E>(mut self, mut inbound: R)
    where
        R: Stream<Item = Result<Message, E>> + Unpin + Send,
        E: fmt::Display + Send,
    {
        let started = Instant::now();
        info!("client connected");
        counter!(CONNECTIONS_TOTAL).increment(1);
        gauge!(CONNECTIONS_ACTIVE).increment(1.0);

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("connection cancelled");
                    break;
                }
                next = inbound.next() => next,
            };

            let flow = match next {
                None => {
                    debug!("client went away");
                    break;
                }
                Some(Err(e)) => {
                    debug!(error = %e, "read failed");
                    break;
                }
                Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()).await,
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => self.handle_text(text).await,
                    Err(_) => {
                        warn!(len = data.len(), "received non-UTF8 binary frame");
                        self.fail("invalid message: binary frame is not UTF-8").await
                    }
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => ControlFlow::Continue(()),
                Some(Ok(Message::Close(_))) => {
                    debug!("client sent close frame");
                    break;
                }
            };
            if flow.is_break() {
                break;
            }
        }

        self.teardown().await;
        gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        info!("client disconnected");
    }

    async fn handle_text(&mut self, text: &str) -> ControlFlow<()> {
        match ClientFrame::decode(text) {
            Ok(frame) => self.dispatch(frame).await,
            Err(e) => {
                warn!(error = %e, "undecodable frame");
                self.fail(&e.to_string()).await
            }
        }
    }

    async fn dispatch(&mut self, frame: ClientFrame) -> ControlFlow<()> {
        debug!(frame_type = frame.kind(), "frame received");
        match frame {
            ClientFrame::ConnectionInit { payload } => self.on_connection_init(payload).await,
            ClientFrame::Start { id, payload } => self.on_start(id, payload).await,
            ClientFrame::Stop { id } => self.on_stop(&id).await,
            ClientFrame::ConnectionTerminate => {
                debug!("client terminated connection");
                ControlFlow::Break(())
            }
            ClientFrame::Unknown { id, kind } => {
                debug!(frame_type = %kind, operation_id = %id, "ignoring unknown frame type");
                ControlFlow::Continue(())
            }
        }
    }

    async fn on_connection_init(&mut self, payload: Map<String, Value>) -> ControlFlow<()> {
        let hook = Arc::clone(&self.config.on_connect);
        match hook.on_connect(self.context.clone(), payload).await {
            Ok(context) => {
                self.context = context;
                let first = self.state == ConnectionState::Fresh;
                self.state = ConnectionState::Ready;
                self.send(&ServerFrame::connection_ack()).await?;
                if first {
                    self.start_keep_alive();
                }
                ControlFlow::Continue(())
            }
            Err(e) => {
                warn!(error = %e, "connection bootstrap rejected");
                self.fail(&e.message).await
            }
        }
    }

    fn start_keep_alive(&self) {
        let Some(interval) = self.config.protocol.keep_alive_interval() else {
            return;
        };
        let writer = self.writer.clone();
        let cancel = self.cancel.clone();
        let _ = self.tasks.spawn(async move {
            let result = run_keep_alive(writer, interval, cancel).await;
            debug!(?result, "keep-alive stopped");
        });
    }

    async fn on_start(&mut self, id: String, payload: Option<Value>) -> ControlFlow<()> {
        if id.is_empty() {
            return self
                .reject("missing_id", ServerFrame::error("", "start frame requires an id"))
                .await;
        }
        if self.state == ConnectionState::Fresh && self.config.protocol.require_connection_init {
            return self
                .reject(
                    "not_initialized",
                    ServerFrame::error(id, "connection_init required before start"),
                )
                .await;
        }
        let live = self
            .registry
            .len()
            .saturating_sub(usize::from(self.registry.contains(&id)));
        if !self.config.protocol.admits(live) {
            return self
                .reject(
                    "too_many_operations",
                    ServerFrame::error(id, "too many active operations"),
                )
                .await;
        }

        let request = match OperationPayload::decode(payload) {
            Ok(payload) => {
                let (query, operation_name, variables) = payload.into_parts();
                OperationRequest {
                    query,
                    operation_name,
                    variables,
                }
            }
            Err(e) => {
                debug!(operation_id = %id, error = %e, "invalid start payload");
                return self
                    .reject("invalid_payload", ServerFrame::error(id, e.to_string()))
                    .await;
            }
        };

        let cancel = self.cancel.child_token();
        let context = OperationContext::new(self.context.clone(), id.as_str(), cancel.clone());
        let registration = self.registry.insert(&id, cancel);
        if registration.replaced {
            debug!(operation_id = %id, "replaced live operation with the same id");
        }
        counter!(OPERATIONS_STARTED_TOTAL).increment(1);
        debug!(operation_id = %id, "operation started");

        // The engine call runs in the operation task so the read loop keeps
        // serving `stop` and `connection_terminate` while it is pending.
        let _ = self.tasks.spawn(forward(Operation {
            id,
            generation: registration.generation,
            context,
            request,
            subscriber: Arc::clone(&self.config.subscriber),
            writer: self.writer.clone(),
            registry: Arc::clone(&self.registry),
        }));
        ControlFlow::Continue(())
    }

    async fn on_stop(&mut self, id: &str) -> ControlFlow<()> {
        let Some(cancel) = self.registry.remove(id) else {
            debug!(operation_id = id, "stop for unknown operation ignored");
            return ControlFlow::Continue(());
        };
        cancel.cancel();
        debug!(operation_id = id, "operation stopped");
        self.send(&ServerFrame::complete(id)).await
    }

    /// Answer a `start` that will not run. The connection stays open.
    async fn reject(&self, reason: &'static str, frame: ServerFrame) -> ControlFlow<()> {
        counter!(OPERATION_ERRORS_TOTAL, "reason" => reason).increment(1);
        self.send(&frame).await
    }

    /// Report a connection-fatal problem and end the loop.
    async fn fail(&self, message: &str) -> ControlFlow<()> {
        let _ = self.send(&ServerFrame::error("", message)).await;
        ControlFlow::Break(())
    }

    async fn send(&self, frame: &ServerFrame) -> ControlFlow<()> {
        match self.writer.send_unless_cancelled(frame, &self.cancel).await {
            Ok(Delivery::Sent) => ControlFlow::Continue(()),
            Ok(Delivery::Skipped) => {
                debug!(frame_type = frame.kind.as_str(), "connection cancelled during write");
                ControlFlow::Break(())
            }
            Err(e) => {
                warn!(error = %e, frame_type = frame.kind.as_str(), "write failed, closing");
                ControlFlow::Break(())
            }
        }
    }

    async fn teardown(&mut self) {
        self.state = ConnectionState::Terminated;
        self.cancel.cancel();
        let cancelled = self.registry.cancel_all();
        self.tasks.close();
        if time::timeout(TEARDOWN_TIMEOUT, self.tasks.wait()).await.is_err() {
            warn!(tasks = self.tasks.len(), "operation tasks outlived teardown");
        }
        // A client that stopped reading never lets the close frame out.
        if time::timeout(TEARDOWN_TIMEOUT, self.writer.close()).await.is_err() {
            debug!("socket close timed out");
        }
        debug!(operations_cancelled = cancelled, "connection torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    use futures::channel::mpsc;
    use serde_json::json;
    use tokio::task::JoinHandle;

    use crate::connection::testing::StuckSink;
    use crate::engine::{FnSubscriber, ResultStream};
    use crate::errors::{ConnectError, SubscribeError};
    use crate::hooks::FnConnectHook;

    struct Harness {
        client: mpsc::UnboundedSender<Result<Message, Infallible>>,
        server: mpsc::UnboundedReceiver<Message>,
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    }

    impl Harness {
        fn spawn(config: Config) -> Self {
            let (client, inbound) = mpsc::unbounded();
            let (sink, server) = mpsc::unbounded();
            let cancel = CancellationToken::new();
            let session = Session::new(
                Arc::new(config),
                ConnectionContext::new("conn_test"),
                sink,
                cancel.clone(),
            );
            let handle = tokio::spawn(session.run(inbound));
            Self {
                client,
                server,
                cancel,
                handle,
            }
        }

        fn send(&self, frame: Value) {
            self.client
                .unbounded_send(Ok(Message::Text(frame.to_string().into())))
                .unwrap();
        }

        fn send_raw(&self, msg: Message) {
            self.client.unbounded_send(Ok(msg)).unwrap();
        }

        async fn recv(&mut self) -> Value {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.server.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("connection closed");
            match msg {
                Message::Text(t) => serde_json::from_str(t.as_str()).unwrap(),
                other => panic!("unexpected message {other:?}"),
            }
        }

        /// Wait until the session closes its sink, returning frames sent before.
        async fn drain(mut self) -> Vec<Value> {
            let mut out = Vec::new();
            loop {
                let next = tokio::time::timeout(Duration::from_secs(5), self.server.next())
                    .await
                    .expect("session did not close");
                match next {
                    Some(Message::Text(t)) => out.push(serde_json::from_str(t.as_str()).unwrap()),
                    Some(_) => {}
                    None => break,
                }
            }
            self.handle.await.unwrap();
            out
        }
    }

    fn values(items: Vec<Value>) -> ResultStream {
        futures::stream::iter(items).boxed()
    }

    fn counting_engine() -> Config {
        Config::new().with_subscriber(FnSubscriber(
            |_ctx: OperationContext, _req: OperationRequest| async move {
                Ok::<_, SubscribeError>(values(vec![json!(1), json!(2), json!(3)]))
            },
        ))
    }

    fn pending_engine() -> Config {
        Config::new().with_subscriber(FnSubscriber(
            |_ctx: OperationContext, _req: OperationRequest| async move {
                Ok::<_, SubscribeError>(futures::stream::pending().boxed())
            },
        ))
    }

    #[tokio::test]
    async fn init_then_start_streams_then_completes() {
        let mut h = Harness::spawn(counting_engine());
        h.send(json!({"type": "connection_init", "payload": {}}));
        assert_eq!(h.recv().await, json!({"type": "connection_ack"}));

        h.send(json!({"id": "1", "type": "start", "payload": {"query": "sub{x}"}}));
        for i in 1..=3 {
            assert_eq!(
                h.recv().await,
                json!({"id": "1", "type": "data", "payload": i})
            );
        }
        assert_eq!(h.recv().await, json!({"id": "1", "type": "complete"}));

        // stop after completion is a no-op
        h.send(json!({"id": "1", "type": "stop"}));
        h.send(json!({"type": "connection_terminate"}));
        assert!(h.drain().await.is_empty());
    }

    #[tokio::test]
    async fn start_without_init_is_allowed_by_default() {
        let mut h = Harness::spawn(counting_engine());
        h.send(json!({"id": "a", "type": "start", "payload": {"query": "q"}}));
        assert_eq!(h.recv().await["type"], "data");
    }

    #[tokio::test]
    async fn start_before_init_rejected_when_required() {
        let mut config = counting_engine();
        config.protocol.require_connection_init = true;
        let mut h = Harness::spawn(config);

        h.send(json!({"id": "1", "type": "start", "payload": {"query": "q"}}));
        let frame = h.recv().await;
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["id"], "1");

        h.send(json!({"type": "connection_init"}));
        assert_eq!(h.recv().await["type"], "connection_ack");
        h.send(json!({"id": "1", "type": "start", "payload": {"query": "q"}}));
        assert_eq!(h.recv().await["type"], "data");
    }

    #[tokio::test]
    async fn malformed_start_payload_is_scoped_to_id() {
        let mut h = Harness::spawn(counting_engine());
        h.send(json!({"id": "bad", "type": "start", "payload": {"query": 42}}));
        let frame = h.recv().await;
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["id"], "bad");
        assert!(frame["payload"]["message"].is_string());

        // Connection still serves later frames.
        h.send(json!({"id": "good", "type": "start", "payload": {"query": "q"}}));
        assert_eq!(h.recv().await["id"], "good");
    }

    #[tokio::test]
    async fn start_with_empty_id_gets_unscoped_error() {
        let mut h = Harness::spawn(counting_engine());
        h.send(json!({"type": "start", "payload": {"query": "q"}}));
        let frame = h.recv().await;
        assert_eq!(frame["type"], "error");
        assert!(frame.get("id").is_none());
    }

    #[tokio::test]
    async fn stop_halts_operation_and_completes() {
        let mut h = Harness::spawn(pending_engine());
        h.send(json!({"id": "s", "type": "start", "payload": {"query": "q"}}));
        h.send(json!({"id": "s", "type": "stop"}));
        assert_eq!(h.recv().await, json!({"id": "s", "type": "complete"}));

        h.send(json!({"type": "connection_terminate"}));
        assert!(h.drain().await.is_empty());
    }

    #[tokio::test]
    async fn stop_for_unknown_id_is_ignored() {
        let mut h = Harness::spawn(counting_engine());
        h.send(json!({"id": "nope", "type": "stop"}));
        h.send(json!({"type": "connection_init"}));
        assert_eq!(h.recv().await["type"], "connection_ack");
    }

    #[tokio::test]
    async fn unknown_type_is_ignored() {
        let mut h = Harness::spawn(counting_engine());
        h.send(json!({"id": "1", "type": "subscribe"}));
        h.send(json!({"type": "connection_init"}));
        assert_eq!(h.recv().await["type"], "connection_ack");
    }

    #[tokio::test]
    async fn malformed_json_closes_connection() {
        let h = Harness::spawn(counting_engine());
        h.send_raw(Message::Text("{not json".into()));
        let frames = h.drain().await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "error");
        assert!(frames[0].get("id").is_none());
    }

    #[tokio::test]
    async fn binary_utf8_is_treated_as_text() {
        let mut h = Harness::spawn(counting_engine());
        h.send_raw(Message::Binary(
            br#"{"type":"connection_init"}"#.to_vec().into(),
        ));
        assert_eq!(h.recv().await["type"], "connection_ack");
    }

    #[tokio::test]
    async fn hook_rejection_sends_error_and_closes() {
        let config = counting_engine().with_on_connect(FnConnectHook(
            |_ctx: ConnectionContext, _payload: Map<String, Value>| async move {
                Err::<ConnectionContext, _>(ConnectError::new("unauthorized"))
            },
        ));
        let h = Harness::spawn(config);
        h.send(json!({"type": "connection_init", "payload": {"authToken": "x"}}));
        let frames = h.drain().await;
        assert_eq!(
            frames,
            vec![json!({"type": "error", "payload": {"message": "unauthorized"}})]
        );
    }

    #[tokio::test]
    async fn hook_context_reaches_engine() {
        let config = Config::new()
            .with_on_connect(FnConnectHook(
                |ctx: ConnectionContext, payload: Map<String, Value>| async move {
                    let user = payload.get("user").cloned().unwrap_or(Value::Null);
                    Ok(ctx.with_value("user", user))
                },
            ))
            .with_subscriber(FnSubscriber(
                |ctx: OperationContext, _req: OperationRequest| async move {
                    let user = ctx.connection.get("user").cloned().unwrap_or(Value::Null);
                    Ok::<_, SubscribeError>(values(vec![user]))
                },
            ));
        let mut h = Harness::spawn(config);
        h.send(json!({"type": "connection_init", "payload": {"user": "ada"}}));
        assert_eq!(h.recv().await["type"], "connection_ack");
        h.send(json!({"id": "1", "type": "start", "payload": {"query": "q"}}));
        assert_eq!(h.recv().await["payload"], "ada");
    }

    #[tokio::test]
    async fn subscriber_errors_map_to_frames() {
        let config = Config::new().with_subscriber(FnSubscriber(
            |_ctx: OperationContext, req: OperationRequest| async move {
                match req.query.as_str() {
                    "reject" => Err(SubscribeError::Rejected("bad query".into())),
                    _ => Err(SubscribeError::Unavailable("engine down".into())),
                }
            },
        ));
        let mut h = Harness::spawn(config);
        h.send(json!({"id": "1", "type": "start", "payload": {"query": "reject"}}));
        assert_eq!(
            h.recv().await,
            json!({"id": "1", "type": "error", "payload": {"message": "bad query"}})
        );
        h.send(json!({"id": "2", "type": "start", "payload": {"query": "other"}}));
        assert_eq!(
            h.recv().await,
            json!({"id": "2", "type": "connection_error", "payload": {"message": "engine down"}})
        );
    }

    #[tokio::test]
    async fn default_config_reports_missing_subscriber() {
        let mut h = Harness::spawn(Config::new());
        h.send(json!({"id": "1", "type": "start", "payload": {"query": "q"}}));
        let frame = h.recv().await;
        assert_eq!(frame["type"], "connection_error");
        assert_eq!(frame["payload"]["message"], "no subscriber function provided");
    }

    #[tokio::test]
    async fn operation_limit_is_enforced() {
        let mut config = pending_engine();
        config.protocol.max_operations_per_connection = 1;
        let mut h = Harness::spawn(config);
        h.send(json!({"id": "1", "type": "start", "payload": {"query": "q"}}));
        h.send(json!({"id": "2", "type": "start", "payload": {"query": "q"}}));
        let frame = h.recv().await;
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["id"], "2");
    }

    #[tokio::test]
    async fn reused_id_replaces_without_complete() {
        let mut h = Harness::spawn(pending_engine());
        h.send(json!({"id": "1", "type": "start", "payload": {"query": "q"}}));
        h.send(json!({"id": "1", "type": "start", "payload": {"query": "q"}}));
        h.send(json!({"id": "1", "type": "stop"}));
        // Only the stop of the replacement produces a complete.
        assert_eq!(h.recv().await, json!({"id": "1", "type": "complete"}));
        h.send(json!({"type": "connection_terminate"}));
        assert!(h.drain().await.is_empty());
    }

    #[tokio::test]
    async fn terminate_cancels_running_operations() {
        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel::<CancellationToken>();
        let config = Config::new().with_subscriber(FnSubscriber(
            move |ctx: OperationContext, _req: OperationRequest| {
                let seen_tx = seen_tx.clone();
                async move {
                    let _ = seen_tx.send(ctx.cancellation().clone());
                    Ok::<_, SubscribeError>(futures::stream::pending().boxed())
                }
            },
        ));
        let h = Harness::spawn(config);
        h.send(json!({"id": "1", "type": "start", "payload": {"query": "q"}}));
        h.send(json!({"id": "2", "type": "start", "payload": {"query": "q"}}));
        let tokens = [
            seen_rx.recv().await.unwrap(),
            seen_rx.recv().await.unwrap(),
        ];
        h.send(json!({"type": "connection_terminate"}));

        assert!(h.drain().await.is_empty());
        assert!(tokens.iter().all(CancellationToken::is_cancelled));
    }

    #[tokio::test]
    async fn cancelling_connection_token_ends_session() {
        let h = Harness::spawn(pending_engine());
        h.send(json!({"id": "1", "type": "start", "payload": {"query": "q"}}));
        h.cancel.cancel();
        assert!(h.drain().await.is_empty());
    }

    #[tokio::test]
    async fn client_disconnect_ends_session() {
        let h = Harness::spawn(counting_engine());
        h.client.close_channel();
        assert!(h.drain().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_starts_after_ack() {
        let mut config = counting_engine();
        config.protocol.keep_alive_interval_ms = 1_000;
        let mut h = Harness::spawn(config);
        h.send(json!({"type": "connection_init"}));
        assert_eq!(h.recv().await["type"], "connection_ack");
        assert_eq!(h.recv().await, json!({"type": "ka"}));
        assert_eq!(h.recv().await, json!({"type": "ka"}));
    }

    fn pending_call_engine() -> Config {
        Config::new().with_subscriber(FnSubscriber(
            |_ctx: OperationContext, _req: OperationRequest| {
                futures::future::pending::<Result<ResultStream, SubscribeError>>()
            },
        ))
    }

    #[tokio::test]
    async fn pending_engine_call_does_not_block_read_loop() {
        let mut h = Harness::spawn(pending_call_engine());
        h.send(json!({"id": "1", "type": "start", "payload": {"query": "q"}}));
        h.send(json!({"type": "connection_init"}));
        assert_eq!(h.recv().await["type"], "connection_ack");

        h.send(json!({"id": "1", "type": "stop"}));
        assert_eq!(h.recv().await, json!({"id": "1", "type": "complete"}));
    }

    #[tokio::test]
    async fn cancel_ends_session_with_pending_engine_call() {
        let h = Harness::spawn(pending_call_engine());
        h.send(json!({"id": "1", "type": "start", "payload": {"query": "q"}}));
        h.send(json!({"id": "2", "type": "start", "payload": {"query": "q"}}));
        tokio::task::yield_now().await;
        h.cancel.cancel();
        assert!(h.drain().await.is_empty());
    }

    /// Session over a socket whose client never reads.
    fn spawn_unread(
        config: Config,
    ) -> (
        mpsc::UnboundedSender<Result<Message, Infallible>>,
        CancellationToken,
        JoinHandle<()>,
    ) {
        let (client, inbound) = mpsc::unbounded();
        let cancel = CancellationToken::new();
        let session = Session::new(
            Arc::new(config),
            ConnectionContext::new("conn_unread"),
            StuckSink,
            cancel.clone(),
        );
        (client, cancel, tokio::spawn(session.run(inbound)))
    }

    fn text(frame: Value) -> Result<Message, Infallible> {
        Ok(Message::Text(frame.to_string().into()))
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_ends_session_while_operation_write_is_blocked() {
        let (client, cancel, handle) = spawn_unread(counting_engine());
        client
            .unbounded_send(text(json!({"id": "1", "type": "start", "payload": {"query": "q"}})))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(60), handle)
            .await
            .expect("session still running after cancel")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn terminate_ends_session_while_operation_write_is_blocked() {
        let (client, _cancel, handle) = spawn_unread(counting_engine());
        client
            .unbounded_send(text(json!({"id": "1", "type": "start", "payload": {"query": "q"}})))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        client
            .unbounded_send(text(json!({"type": "connection_terminate"})))
            .unwrap();
        tokio::time::timeout(Duration::from_secs(60), handle)
            .await
            .expect("session still running after terminate")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_ends_session_while_ack_write_is_blocked() {
        let (client, cancel, handle) = spawn_unread(counting_engine());
        client
            .unbounded_send(text(json!({"type": "connection_init"})))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(60), handle)
            .await
            .expect("session still running after cancel")
            .unwrap();
    }

    #[test]
    fn new_session_is_fresh() {
        let (sink, _rx) = mpsc::unbounded::<Message>();
        let session = Session::new(
            Arc::new(Config::new()),
            ConnectionContext::new("c"),
            sink,
            CancellationToken::new(),
        );
        assert_eq!(session.state(), ConnectionState::Fresh);
    }
}
