//! Pipelined JSON-RPC channel over any byte stream.
//!
//! One channel owns one wire (child stdio pipes in production, a duplex
//! stream in tests). Requests carry monotonically increasing ids; a
//! background reader task matches responses to pending calls strictly by id,
//! so any number of calls may be outstanding and resolve out of arrival
//! order. Cancellation is timeout-only: a deadline races the pending
//! response, and a late response matching no pending call is discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::TransportError;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, notification};

type PendingReply = Result<Value, TransportError>;

/// Outstanding calls by JSON-RPC id. `None` once the channel is closed, so a
/// call racing teardown fails instead of parking a sender nobody will wake.
type PendingMap = Arc<Mutex<Option<HashMap<u64, oneshot::Sender<PendingReply>>>>>;

/// A pipelined JSON-RPC 2.0 channel.
pub(crate) struct RpcChannel {
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: PendingMap,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    /// Label for log lines, usually the server name.
    label: String,
}

impl RpcChannel {
    /// Wire up a channel over a reader/writer pair and start the reader task.
    pub(crate) fn new<R, W>(reader: R, writer: W, label: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let label = label.into();
        let pending: PendingMap = Arc::new(Mutex::new(Some(HashMap::new())));
        let reader_task = tokio::spawn(read_loop(reader, Arc::clone(&pending), label.clone()));

        Self {
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            reader: reader_task,
            label,
        }
    }

    /// Whether the wire is still open.
    pub(crate) fn is_open(&self) -> bool {
        self.pending.lock().is_ok_and(|guard| guard.is_some())
    }

    /// Send one request and wait for its matching response or the deadline.
    pub(crate) async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Duration,
    ) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut guard = self
                .pending
                .lock()
                .map_err(|_| TransportError::Protocol("pending map poisoned".to_string()))?;
            let Some(map) = guard.as_mut() else {
                return Err(TransportError::Closed);
            };
            map.insert(id, tx);
        }

        let request = JsonRpcRequest::new(id, method, params);
        let line = serde_json::to_string(&request)? + "\n";

        if let Err(e) = self.write_line(&line).await {
            self.remove_pending(id);
            return Err(e);
        }

        match timeout(deadline, rx).await {
            Ok(Ok(reply)) => reply,
            // Sender dropped without a reply: the reader tore the map down.
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                // Deadline elapsed; forget the id so a late response is
                // discarded rather than delivered.
                self.remove_pending(id);
                Err(TransportError::Timeout)
            }
        }
    }

    /// Send a notification (no id, no response expected).
    pub(crate) async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), TransportError> {
        let frame = notification(method, params);
        let line = serde_json::to_string(&frame)? + "\n";
        self.write_line(&line).await
    }

    /// Close the channel: stop the reader and reject every pending call.
    pub(crate) async fn close(&self) {
        self.reader.abort();
        fail_all_pending(&self.pending, &self.label);
    }

    async fn write_line(&self, line: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    fn remove_pending(&self, id: u64) {
        if let Ok(mut guard) = self.pending.lock() {
            if let Some(map) = guard.as_mut() {
                map.remove(&id);
            }
        }
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.reader.abort();
        fail_all_pending(&self.pending, &self.label);
    }
}

/// Reader task: line-buffered parse loop matching responses by id.
async fn read_loop<R>(reader: R, pending: PendingMap, label: String)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                dispatch_line(trimmed, &pending, &label);
            }
            // EOF: the peer closed its end (process exit for stdio).
            Ok(None) => {
                tracing::debug!(server = %label, "Connection closed by peer");
                break;
            }
            Err(e) => {
                tracing::warn!(server = %label, error = %e, "Read error on connection");
                break;
            }
        }
    }

    fail_all_pending(&pending, &label);
}

/// Parse one line and complete the matching pending call, if any.
///
/// Malformed lines (npx banners, stray prints) are logged and discarded
/// without killing the channel.
fn dispatch_line(line: &str, pending: &PendingMap, label: &str) {
    let Ok(response) = serde_json::from_str::<JsonRpcResponse>(line) else {
        tracing::debug!(server = %label, line, "Skipping non-JSON-RPC output");
        return;
    };

    let Some(id) = response.id else {
        // Server-initiated notification; this core does not consume any.
        tracing::debug!(server = %label, "Ignoring server notification frame");
        return;
    };

    let sender = {
        let Ok(mut guard) = pending.lock() else {
            return;
        };
        guard.as_mut().and_then(|map| map.remove(&id))
    };

    let Some(sender) = sender else {
        tracing::debug!(server = %label, id, "Dropping response with no pending request");
        return;
    };

    let reply = match (response.error, response.result) {
        (Some(err), _) => Err(TransportError::Server {
            code: err.code,
            message: err.message,
        }),
        (None, Some(result)) => Ok(result),
        (None, None) => Err(TransportError::Protocol(
            "Missing result in response".to_string(),
        )),
    };

    // The caller may have timed out between removal and send; that is fine.
    let _ = sender.send(reply);
}

/// Reject every pending call with a connection-closed error and mark the
/// channel closed. Idempotent.
fn fail_all_pending(pending: &PendingMap, label: &str) {
    let Ok(mut guard) = pending.lock() else {
        return;
    };
    if let Some(map) = guard.take() {
        let count = map.len();
        for (_, sender) in map {
            let _ = sender.send(Err(TransportError::Closed));
        }
        if count > 0 {
            tracing::debug!(server = %label, count, "Rejected pending calls on close");
        }
    }
}
