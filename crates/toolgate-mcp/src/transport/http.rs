//! HTTP transport: stateless, one JSON-RPC message per POST body.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::Transport;

/// Stateless HTTP JSON-RPC transport.
///
/// `connect` for HTTP only records the endpoint; there is no session and no
/// handshake. Each call is one POST with one request body and one response
/// body, so correlation is trivial but ids are still unique and monotonic.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    request_timeout: Duration,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Create a transport for one endpoint.
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            request_timeout,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Duration,
    ) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let response = self
            .client
            .post(&self.url)
            .timeout(deadline.min(self.request_timeout))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http(format!(
                "Endpoint returned HTTP {status}"
            )));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Protocol(format!("Bad response body: {e}")))?;

        if body.id != Some(id) {
            tracing::debug!(url = %self.url, expected = id, got = ?body.id, "Response id mismatch");
            return Err(TransportError::Protocol(
                "Response id does not match request".to_string(),
            ));
        }

        if let Some(err) = body.error {
            return Err(TransportError::Server {
                code: err.code,
                message: err.message,
            });
        }

        body.result
            .ok_or_else(|| TransportError::Protocol("Missing result in response".to_string()))
    }

    async fn close(&self) {
        // Nothing held open; per-call connections are pooled by reqwest.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_transport_error() {
        // Reserved TEST-NET-1 address; connections fail fast or time out.
        let transport =
            HttpTransport::new("http://192.0.2.1:9/rpc", Duration::from_millis(200)).unwrap();

        let result = transport
            .call("ping", None, Duration::from_millis(200))
            .await;

        assert!(matches!(
            result,
            Err(TransportError::Http(_) | TransportError::Timeout)
        ));
    }
}
