//! Per-operation task: calls the engine, then forwards its results.

use std::fmt;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Sink, StreamExt};
use gqlws_protocol::ServerFrame;
use metrics::{counter, gauge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::registry::OperationRegistry;
use super::writer::{Delivery, FrameWriter};
use crate::context::OperationContext;
use crate::engine::{OperationRequest, ResultStream, Subscriber};
use crate::metrics::{OPERATION_ERRORS_TOTAL, OPERATIONS_ACTIVE};

/// Everything one operation task owns.
pub(crate) struct Operation<W> {
    pub(crate) id: String,
    pub(crate) generation: u64,
    /// Carries the operation token.
    pub(crate) context: OperationContext,
    pub(crate) request: OperationRequest,
    pub(crate) subscriber: Arc<dyn Subscriber>,
    pub(crate) writer: FrameWriter<W>,
    pub(crate) registry: Arc<OperationRegistry>,
}

/// Why an operation task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The engine stream ended.
    Exhausted,
    /// The engine refused the operation.
    Refused,
    /// `stop`, id reuse, or teardown cancelled the operation.
    Cancelled,
    /// The transport refused a frame.
    WriteFailed,
}

/// Run one operation from the engine call to its last frame.
///
/// The engine call and every write race the operation token, so a slow engine
/// or a client that stopped reading only stalls this operation, and only until
/// it is cancelled.
///
/// On exit the task removes its own registry entry. If that removal succeeds
/// and the operation was not cancelled, it also sends the final frame:
/// `complete`, or the engine's refusal as `error`/`connection_error`. A
/// cancelled task writes nothing more: whoever cancelled it owns the
/// `complete` (or, on teardown, nobody does).
#[instrument(skip_all, fields(operation_id = %op.id))]
pub(crate) async fn forward<W>(op: Operation<W>) -> Outcome
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: fmt::Display,
{
    let Operation {
        id,
        generation,
        context,
        request,
        subscriber,
        writer,
        registry,
    } = op;
    let cancel = context.cancellation().clone();

    let subscribed = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        result = subscriber.subscribe(context, request) => Some(result),
    };

    let (outcome, last) = match subscribed {
        None => (Outcome::Cancelled, None),
        Some(Err(e)) => {
            debug!(error = %e, "subscriber refused operation");
            counter!(OPERATION_ERRORS_TOTAL, "reason" => "subscribe_failed").increment(1);
            (Outcome::Refused, Some(e.to_frame(&id)))
        }
        Some(Ok(stream)) => {
            let outcome = drain(&id, stream, &writer, &cancel).await;
            let last =
                (outcome != Outcome::Cancelled).then(|| ServerFrame::complete(id.as_str()));
            (outcome, last)
        }
    };

    let owned = registry.remove_if_current(&id, generation);
    if let Some(frame) = last.filter(|_| owned) {
        if let Err(e) = writer.send_unless_cancelled(&frame, &cancel).await {
            debug!(error = %e, frame_type = frame.kind.as_str(), "final write failed");
        }
    }
    // The engine may still be watching the token.
    cancel.cancel();

    debug!(?outcome, owned, "operation finished");
    outcome
}

/// Forward every value of `stream` as a `data` frame.
///
/// The stream is dropped before returning, releasing the engine's resources
/// ahead of the final write.
async fn drain<W>(
    id: &str,
    mut stream: ResultStream,
    writer: &FrameWriter<W>,
    cancel: &CancellationToken,
) -> Outcome
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: fmt::Display,
{
    gauge!(OPERATIONS_ACTIVE).increment(1.0);
    let mut forwarded: u64 = 0;

    let outcome = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break Outcome::Cancelled,
            next = stream.next() => next,
        };
        let Some(value) = next else {
            break Outcome::Exhausted;
        };
        match writer
            .send_unless_cancelled(&ServerFrame::data(id, value), cancel)
            .await
        {
            Ok(Delivery::Sent) => forwarded += 1,
            Ok(Delivery::Skipped) => break Outcome::Cancelled,
            Err(e) => {
                warn!(error = %e, "data write failed, abandoning operation");
                break Outcome::WriteFailed;
            }
        }
    };

    drop(stream);
    gauge!(OPERATIONS_ACTIVE).decrement(1.0);
    debug!(forwarded, "stream drained");
    outcome
}
