//! Outbound writer guard.
//!
//! The read loop, the keep-alive task, and every multiplexer write through one
//! [`FrameWriter`]. Each frame is encoded up front and written while holding
//! the lock, so frames never interleave on the socket.

use std::fmt;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use gqlws_protocol::ServerFrame;
use metrics::counter;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::errors::WriteError;
use crate::metrics::FRAMES_SENT_TOTAL;

/// What happened to a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame was written.
    Sent,
    /// The token fired before the frame reached the sink.
    Skipped,
}

/// Shared, serialized access to a connection's outbound sink.
pub struct FrameWriter<W> {
    sink: Arc<Mutex<W>>,
}

impl<W> Clone for FrameWriter<W> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<W> FrameWriter<W>
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: fmt::Display,
{
    /// Wrap a sink.
    pub fn new(sink: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// Write one frame unless `cancel` fires first.
    ///
    /// Cancellation is checked after the lock is taken: once a canceller has
    /// cancelled and then written its own frame, no frame guarded by the same
    /// token can follow it. The wait for the lock and the write itself also
    /// give up when the token fires, so a client that stopped reading cannot
    /// pin the caller.
    pub async fn send_unless_cancelled(
        &self,
        frame: &ServerFrame,
        cancel: &CancellationToken,
    ) -> Result<Delivery, WriteError> {
        let text = frame.to_json()?;
        let write = async {
            let mut sink = self.sink.lock().await;
            if cancel.is_cancelled() {
                return Ok(Delivery::Skipped);
            }
            write_text(&mut *sink, frame, text).await?;
            Ok::<_, WriteError>(Delivery::Sent)
        };
        let delivery = tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(Delivery::Skipped),
            delivery = write => delivery,
        };
        if matches!(delivery, Ok(Delivery::Skipped)) {
            trace!(frame_type = frame.kind.as_str(), "write skipped after cancellation");
        }
        delivery
    }

    /// Flush and close the sink. Errors are logged, not returned.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!(error = %e, "closing sink failed");
        }
    }
}

async fn write_text<W>(sink: &mut W, frame: &ServerFrame, text: String) -> Result<(), WriteError>
where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
{
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| WriteError::Transport(e.to_string()))?;
    counter!(FRAMES_SENT_TOTAL, "type" => frame.kind.as_str()).increment(1);
    Ok(())
}
