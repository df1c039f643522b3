//! Transport and registry error types.

use thiserror::Error;

/// Errors that can occur on one JSON-RPC connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to spawn the server process.
    #[error("Failed to spawn MCP server process: {0}")]
    Spawn(String),

    /// I/O failure on the wire.
    #[error("Failed to communicate with MCP server: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The initialize handshake failed or returned garbage.
    #[error("MCP handshake failed: {0}")]
    Handshake(String),

    /// The peer violated the protocol (missing result, bad frame).
    #[error("MCP protocol error: {0}")]
    Protocol(String),

    /// The call deadline elapsed before a matching response arrived.
    #[error("Timeout waiting for MCP server response")]
    Timeout,

    /// The server returned a JSON-RPC error object.
    #[error("MCP server returned error: code={code}, message={message}")]
    Server {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The connection is closed; all pending calls were rejected.
    #[error("Connection closed")]
    Closed,

    /// HTTP transport failure.
    #[error("HTTP transport error: {0}")]
    Http(String),
}

impl TransportError {
    /// Whether a retry at the transport level could plausibly succeed.
    ///
    /// Tool-reported errors ([`TransportError::Server`]) executed on the
    /// remote side and are never retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Io(_) | Self::Closed | Self::Http(_)
        )
    }
}

/// Errors from server registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A server with this name is already registered.
    #[error("Server already registered: {0}")]
    AlreadyRegistered(String),

    /// No server with this name is registered.
    #[error("Server not registered: {0}")]
    NotFound(String),

    /// The server exists but is not in a state that serves calls.
    #[error("Server '{0}' is unavailable")]
    Unavailable(String),

    /// Descriptor failed validation.
    #[error("Invalid server configuration: {0}")]
    InvalidConfig(#[from] toolgate_core::ConfigError),

    /// Connect/handshake exhausted its retries.
    #[error("Failed to connect to server '{name}': {reason}")]
    ConnectFailed {
        /// Server name.
        name: String,
        /// Last connect error.
        reason: String,
    },

    /// Transport failure on an established connection.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
