//! Server-Sent Events consumption for task subscriptions.
//!
//! Parses the `event:`/`data:` frames produced by an agent's
//! `tasks/sendSubscribe` response into typed [`A2AEvent`] values. The three
//! payload-bearing event types are `task_status`, `task_message`, and
//! `task_artifact`; an `error` frame reports a server-side stream failure
//! and is surfaced as a stream-local error.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::Stream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{AgentVaultError, Result};
use crate::types::{A2AEvent, TaskArtifactUpdateEvent, TaskMessageEvent, TaskStatusUpdateEvent};

/// A complete SSE frame: the `event` field and the joined `data` payload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental SSE frame assembler.
///
/// Feed it lines (without trailing newline); a blank line completes the
/// pending frame. Comment lines (`:` prefix) are keepalives and ignored;
/// `id:` and `retry:` fields are ignored.
#[derive(Debug, Default)]
pub(crate) struct SseFrameParser {
    event: Option<String>,
    data: Vec<String>,
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one line; returns a frame when a blank line completes one.
    pub fn push_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            // Frame boundary.
            if self.data.is_empty() && self.event.is_none() {
                return None;
            }
            let frame = SseFrame {
                event: self.event.take().unwrap_or_else(|| "message".to_string()),
                data: std::mem::take(&mut self.data).join("\n"),
            };
            return Some(frame);
        }

        if line.starts_with(':') {
            // Keepalive comment.
            return None;
        }

        if let Some(value) = line.strip_prefix("event:") {
            self.event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // Other fields (id:, retry:) are ignored.
        None
    }
}

/// Decode a completed frame into an event.
///
/// Returns `Ok(None)` for frames to skip (empty data, unknown event types),
/// `Err` for `error` frames and undecodable payloads.
pub(crate) fn decode_frame(frame: &SseFrame) -> Result<Option<A2AEvent>> {
    if frame.data.is_empty() {
        return Ok(None);
    }

    match frame.event.as_str() {
        "task_status" => {
            let event: TaskStatusUpdateEvent = serde_json::from_str(&frame.data).map_err(|e| {
                AgentVaultError::Message(format!("failed to parse task_status event: {e}"))
            })?;
            Ok(Some(A2AEvent::StatusUpdate(event)))
        }
        "task_message" => {
            let event: TaskMessageEvent = serde_json::from_str(&frame.data).map_err(|e| {
                AgentVaultError::Message(format!("failed to parse task_message event: {e}"))
            })?;
            Ok(Some(A2AEvent::Message(event)))
        }
        "task_artifact" => {
            let event: TaskArtifactUpdateEvent =
                serde_json::from_str(&frame.data).map_err(|e| {
                    AgentVaultError::Message(format!("failed to parse task_artifact event: {e}"))
                })?;
            Ok(Some(A2AEvent::ArtifactUpdate(event)))
        }
        "error" => {
            let payload: serde_json::Value = serde_json::from_str(&frame.data)
                .unwrap_or_else(|_| serde_json::json!({"message": frame.data}));
            let message = payload
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown stream error");
            Err(AgentVaultError::Connection(format!(
                "agent reported stream error: {message}"
            )))
        }
        other => {
            warn!(event = %other, "skipping unknown SSE event type");
            Ok(None)
        }
    }
}

/// A stream of task events from an open SSE connection.
///
/// Produced by
/// [`AgentVaultClient::receive_messages`](crate::client::AgentVaultClient::receive_messages).
/// Ends when the task reaches a terminal state, the server closes the
/// connection, or an `error` frame arrives. Dropping the stream aborts the
/// reader task, which closes the underlying connection promptly.
pub struct A2AEventStream {
    receiver: mpsc::Receiver<Result<A2AEvent>>,
    task: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for A2AEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("A2AEventStream").finish_non_exhaustive()
    }
}

impl A2AEventStream {
    /// Spawn a reader over the raw HTTP response.
    pub(crate) fn from_response(response: reqwest::Response, idle_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(64);

        let task = tokio::spawn(async move {
            if let Err(e) = read_sse_response(response, &tx, idle_timeout).await {
                // Final error; the receiver may already be gone.
                let _ = tx.send(Err(e)).await;
            }
        });

        Self { receiver: rx, task }
    }

    /// Get the next event; `None` when the stream is finished.
    pub async fn next(&mut self) -> Option<Result<A2AEvent>> {
        self.receiver.recv().await
    }
}

impl Drop for A2AEventStream {
    fn drop(&mut self) {
        // Abort the reader so the connection closes promptly on consumer
        // cancellation.
        self.task.abort();
    }
}

impl Stream for A2AEventStream {
    type Item = Result<A2AEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Read the response body chunk by chunk, assemble frames, and forward
/// decoded events until a terminal status or stream end.
async fn read_sse_response(
    response: reqwest::Response,
    tx: &mpsc::Sender<Result<A2AEvent>>,
    idle_timeout: Duration,
) -> Result<()> {
    use futures::StreamExt;

    let mut body = response.bytes_stream();
    let mut parser = SseFrameParser::new();
    let mut buffer = String::new();

    loop {
        let chunk = match tokio::time::timeout(idle_timeout, body.next()).await {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => {
                return Err(AgentVaultError::Connection(format!(
                    "error reading SSE stream: {e}"
                )));
            }
            Ok(None) => break,
            Err(_) => {
                return Err(AgentVaultError::Timeout(format!(
                    "no SSE data received for {}s, closing stream",
                    idle_timeout.as_secs()
                )));
            }
        };

        let text = std::str::from_utf8(&chunk)
            .map_err(|e| AgentVaultError::Connection(format!("invalid UTF-8 in SSE stream: {e}")))?;
        buffer.push_str(text);

        while let Some(newline_pos) = buffer.find('\n') {
            let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
            buffer.drain(..=newline_pos);

            let Some(frame) = parser.push_line(&line) else {
                continue;
            };

            match decode_frame(&frame) {
                Ok(Some(event)) => {
                    let terminal = event.is_terminal();
                    if tx.send(Ok(event)).await.is_err() {
                        // Consumer gone; stop reading.
                        return Ok(());
                    }
                    if terminal {
                        debug!("terminal status received, closing SSE stream");
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(e) => return Err(e),
            }
        }
    }

    Ok(())
}
