//! Transport implementations behind one connector capability.
//!
//! A small closed set — stdio child process and stateless HTTP — behind the
//! [`Transport`] trait. The registry never sees a raw process or socket
//! handle; each connection is an owned resource released on
//! unregister/failure/shutdown.

pub mod channel;
pub mod http;
pub mod stdio;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use toolgate_core::{ServerDescriptor, TransportKind};

use crate::error::TransportError;
use crate::protocol::InitializeResult;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

/// One JSON-RPC channel to a remote server.
///
/// In-flight calls are never replayed on failure: a crashed connection
/// rejects them and retry is the caller's decision, since tool side effects
/// are unknown.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for its response or the deadline.
    async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Duration,
    ) -> Result<Value, TransportError>;

    /// Release the connection, rejecting all pending calls.
    async fn close(&self);
}

/// An established connection plus whatever the handshake reported.
pub struct Connection {
    /// The live transport.
    pub transport: Arc<dyn Transport>,
    /// Initialize result; `None` for stateless transports (HTTP has no
    /// handshake).
    pub info: Option<InitializeResult>,
}

/// Connect a descriptor over its configured transport.
///
/// For stdio this spawns the child and runs the `initialize` handshake; for
/// HTTP it records the endpoint without any round-trip.
pub async fn connect(
    descriptor: &ServerDescriptor,
    connect_timeout: Duration,
) -> Result<Connection, TransportError> {
    match &descriptor.transport {
        TransportKind::Stdio {
            command,
            args,
            env,
            working_dir,
        } => {
            let (transport, info) = StdioTransport::spawn(
                &descriptor.name,
                command,
                args,
                env,
                working_dir.as_deref(),
                connect_timeout,
            )
            .await?;
            Ok(Connection {
                transport: Arc::new(transport),
                info: Some(info),
            })
        }
        TransportKind::Http { url, timeout_ms } => {
            let transport = HttpTransport::new(url, Duration::from_millis(*timeout_ms))?;
            Ok(Connection {
                transport: Arc::new(transport),
                info: None,
            })
        }
    }
}
