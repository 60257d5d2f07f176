//! `ka` keep-alive frames.

use std::fmt;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::Sink;
use gqlws_protocol::ServerFrame;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::writer::{Delivery, FrameWriter};

/// Outcome of the keep-alive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveResult {
    /// The connection ended.
    Cancelled,
    /// A `ka` frame could not be written.
    WriteFailed,
}

/// Send a `ka` frame every `interval` until `cancel` fires.
///
/// The first frame goes out one full interval after the call, since the
/// caller has just written `connection_ack`.
pub async fn run_keep_alive<W>(
    writer: FrameWriter<W>,
    interval: Duration,
    cancel: CancellationToken,
) -> KeepAliveResult
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: fmt::Display,
{
    let mut ticker = time::interval(interval);
    // Skip the immediate first tick
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match writer.send_unless_cancelled(&ServerFrame::keep_alive(), &cancel).await {
                    Ok(Delivery::Sent) => {}
                    Ok(Delivery::Skipped) => return KeepAliveResult::Cancelled,
                    Err(e) => {
                        tracing::debug!(error = %e, "keep-alive write failed");
                        return KeepAliveResult::WriteFailed;
                    }
                }
            }
            () = cancel.cancelled() => {
                return KeepAliveResult::Cancelled;
            }
        }
    }
}
