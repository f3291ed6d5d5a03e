//! Relays upstream responses back to the client.
//!
//! Buffered responses are decoded into an untyped JSON tree and re-encoded,
//! so the proxy does not validate the upstream schema. Streaming responses are
//! forwarded line by line, each line framed with a blank line, while watching
//! for the client going away.

use std::io;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use bytes::{Bytes, BytesMut};
use futures::{AsyncBufReadExt, AsyncReadExt, Stream, StreamExt, TryStreamExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::proxy::error::ProxyError;

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

/// Framed chunks queued between the copy loop and the response body
const STREAM_CHANNEL_CAPACITY: usize = 32;

const LINE_TERMINATOR: &[u8] = b"\n\n";

/// Longest upstream line accepted before the stream is aborted
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Turn a non-OK upstream response into the client-facing error
async fn ensure_ok(response: reqwest::Response) -> Result<reqwest::Response, ProxyError> {
    let status = response.status();
    if status == reqwest::StatusCode::OK {
        return Ok(response);
    }

    let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let message = match response.text().await {
        Ok(body) => body,
        Err(e) => e.to_string(),
    };

    tracing::error!("Upstream error {}: {}", status, message);
    Err(ProxyError::Upstream { status, message })
}

/// Read the whole body, decode it as `T` and re-encode it with status OK
pub async fn relay_json<T>(response: reqwest::Response) -> Result<Response, ProxyError>
where
    T: DeserializeOwned + Serialize,
{
    let response = ensure_ok(response).await?;

    let body = response
        .bytes()
        .await
        .map_err(|e| ProxyError::Relay(e.to_string()))?;

    let document: T = serde_json::from_slice(&body).map_err(|e| ProxyError::Relay(e.to_string()))?;

    Ok((StatusCode::OK, Json(document)).into_response())
}

/// Buffered strategy for untyped upstream documents
pub async fn relay_buffered(response: reqwest::Response) -> Result<Response, ProxyError> {
    relay_json::<Value>(response).await
}

/// Streaming strategy: commit the event-stream headers and copy lines in the
/// background. Errors after this point can only end the stream.
pub async fn relay_stream(response: reqwest::Response, trace_id: String) -> Result<Response, ProxyError> {
    let response = ensure_ok(response).await?;

    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(STREAM_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut sink = ClientSink::new(tx);
        // The upstream body lives inside `lines` and is dropped on every exit.
        let lines = upstream_lines(response);

        match copy_lines(lines, &mut sink).await {
            Ok(CopyOutcome::Completed { lines }) => {
                tracing::debug!("[{}] Stream completed | Lines: {}", trace_id, lines);
            }
            Ok(CopyOutcome::Cancelled { lines }) => {
                tracing::info!("[{}] Client disconnected after {} line(s)", trace_id, lines);
            }
            Err(RelayError::Read(e)) => {
                tracing::error!("[{}] Upstream stream read failed: {}", trace_id, e);
            }
            Err(RelayError::Write(e)) => {
                tracing::warn!("[{}] Client stream write failed: {}", trace_id, e);
            }
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .map_err(|e| ProxyError::Relay(e.to_string()))
}

/// Split an upstream body into raw byte lines without buffering it whole.
/// `\n` and `\r\n` terminators are stripped; line content is not decoded.
pub fn upstream_lines(response: reqwest::Response) -> impl Stream<Item = io::Result<Bytes>> + Send + Unpin {
    let reader = Box::pin(response.bytes_stream())
        .map_err(io::Error::other)
        .into_async_read();

    Box::pin(futures::stream::try_unfold(reader, |mut reader| async move {
        let mut line = Vec::new();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64 + 2)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        strip_line_ending(&mut line);
        if line.len() > MAX_LINE_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("upstream line exceeds {} bytes", MAX_LINE_BYTES),
            ));
        }
        Ok::<_, io::Error>(Some((Bytes::from(line), reader)))
    }))
}

fn strip_line_ending(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Upstream body exhausted and everything flushed
    Completed { lines: usize },
    /// Client went away; nothing after `lines` was written
    Cancelled { lines: usize },
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("read failed: {0}")]
    Read(io::Error),

    #[error("write failed: {0}")]
    Write(io::Error),
}

/// Write side of a streaming response. Framed lines are buffered until
/// flushed into the body channel; a dropped body closes the channel, which is
/// how client disconnects show up.
pub struct ClientSink {
    tx: mpsc::Sender<io::Result<Bytes>>,
    pending: BytesMut,
}

impl ClientSink {
    pub fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx,
            pending: BytesMut::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the client has gone away
    pub async fn cancelled(&self) {
        self.tx.closed().await
    }

    pub fn write_line(&mut self, line: &[u8]) {
        self.pending.extend_from_slice(line);
        self.pending.extend_from_slice(LINE_TERMINATOR);
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = self.pending.split().freeze();
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client stream closed"))
    }
}

enum Next {
    Line(Option<io::Result<Bytes>>),
    Disconnected,
}

/// Copy lines to the client until the upstream ends or the client leaves.
///
/// Cancellation is checked before every write. On cancellation whatever is
/// buffered is flushed and no further upstream lines are read. A write that
/// fails because the client went away mid-send is a cancellation too.
pub async fn copy_lines<L>(mut lines: L, sink: &mut ClientSink) -> Result<CopyOutcome, RelayError>
where
    L: Stream<Item = io::Result<Bytes>> + Unpin,
{
    let mut written = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = sink.cancelled() => Next::Disconnected,
            line = lines.next() => Next::Line(line),
        };

        let line = match next {
            Next::Disconnected => return cancel(sink, written).await,
            Next::Line(None) => break,
            Next::Line(Some(Ok(line))) => line,
            Next::Line(Some(Err(e))) => {
                if let Some(outcome) = flush_or_cancel(sink, written).await? {
                    return Ok(outcome);
                }
                return Err(RelayError::Read(e));
            }
        };

        if sink.is_cancelled() {
            return cancel(sink, written).await;
        }

        sink.write_line(&line);
        // Event streams are latency sensitive; push every line out.
        if let Some(outcome) = flush_or_cancel(sink, written).await? {
            return Ok(outcome);
        }
        written += 1;
    }

    if let Some(outcome) = flush_or_cancel(sink, written).await? {
        return Ok(outcome);
    }
    Ok(CopyOutcome::Completed { lines: written })
}

/// Flush, mapping a failure caused by the client leaving to `Cancelled`.
/// `written` counts the lines fully delivered before this flush.
async fn flush_or_cancel(sink: &mut ClientSink, written: usize) -> Result<Option<CopyOutcome>, RelayError> {
    match sink.flush().await {
        Ok(()) => Ok(None),
        Err(_) if sink.is_cancelled() => Ok(Some(CopyOutcome::Cancelled { lines: written })),
        Err(e) => Err(RelayError::Write(e)),
    }
}

async fn cancel(sink: &mut ClientSink, written: usize) -> Result<CopyOutcome, RelayError> {
    if let Err(e) = sink.flush().await {
        tracing::debug!("Dropped buffered stream data for closed client: {}", e);
    }
    Ok(CopyOutcome::Cancelled { lines: written })
}
