//! Server descriptors and connection lifecycle types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable entry for stdio server processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    /// Environment variable key
    pub key: String,
    /// Environment variable value
    pub value: String,
}

impl EnvVar {
    /// Create a new environment variable entry.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Transport a server is reached over, with its connection parameters.
///
/// A small closed set: stdio child process or stateless HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process spawned by us, JSON-RPC over stdin/stdout pipes.
    Stdio {
        /// Executable name or absolute path. Flags belong in `args`.
        command: String,
        /// Arguments passed to the executable.
        #[serde(default)]
        args: Vec<String>,
        /// Environment variables for the child process.
        #[serde(default)]
        env: Vec<EnvVar>,
        /// Working directory for the process, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<String>,
    },
    /// External process we reach with one HTTP POST per JSON-RPC call.
    Http {
        /// Endpoint URL (e.g. `http://localhost:3001/rpc`).
        url: String,
        /// Per-request timeout in milliseconds.
        #[serde(default = "default_http_timeout_ms")]
        timeout_ms: u64,
    },
}

const fn default_http_timeout_ms() -> u64 {
    30_000
}

/// Reconnect/backoff policy for a server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum connect attempts before the server is marked Failed.
    pub max_attempts: u32,
    /// Backoff before the first reconnect attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on the exponential backoff, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry `attempt` (0-based), doubling up to the cap.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.min(16));
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Declarative description of one tool-providing server.
///
/// Descriptors arrive from the external configuration source already parsed;
/// [`ServerDescriptor::validate`] covers the semantic checks the parser
/// cannot do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Registry-unique server name.
    pub name: String,

    /// Transport kind and connection parameters.
    #[serde(flatten)]
    pub transport: TransportKind,

    /// Disabled descriptors stay registered but are never connected.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Priority for tool-name collisions: higher wins.
    #[serde(default)]
    pub priority: i32,

    /// Connect/reconnect policy.
    #[serde(default)]
    pub retry: RetryPolicy,
}

const fn default_true() -> bool {
    true
}

impl ServerDescriptor {
    /// Create a stdio server descriptor.
    #[must_use]
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Stdio {
                command: command.into(),
                args,
                env: Vec::new(),
                working_dir: None,
            },
            enabled: true,
            priority: 0,
            retry: RetryPolicy::default(),
        }
    }

    /// Create an HTTP server descriptor.
    #[must_use]
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Http {
                url: url.into(),
                timeout_ms: default_http_timeout_ms(),
            },
            enabled: true,
            priority: 0,
            retry: RetryPolicy::default(),
        }
    }

    /// Add an environment variable (stdio descriptors only; no-op otherwise).
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let TransportKind::Stdio { ref mut env, .. } = self.transport {
            env.push(EnvVar::new(key, value));
        }
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set enabled status.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate required fields for the descriptor's transport kind.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetryPolicy(
                self.name.clone(),
                "max_attempts must be at least 1".to_string(),
            ));
        }

        match &self.transport {
            TransportKind::Stdio { command, .. } => {
                if command.is_empty() {
                    return Err(ConfigError::MissingCommand(self.name.clone()));
                }
                if command.contains(char::is_whitespace) {
                    return Err(ConfigError::CommandWithArguments(self.name.clone()));
                }
                Ok(())
            }
            TransportKind::Http { url, .. } => {
                if url.is_empty() {
                    return Err(ConfigError::MissingUrl(self.name.clone()));
                }
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ConfigError::InvalidUrl(self.name.clone(), url.clone()));
                }
                Ok(())
            }
        }
    }
}

/// Connection lifecycle state for one registered server.
///
/// Disconnected → Connecting → Ready ⇄ Degraded → Failed → (reconnect) →
/// Connecting. Disabled descriptors stay Disconnected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected and no connection in progress.
    #[default]
    Disconnected,
    /// Connect/handshake in progress.
    Connecting,
    /// Handshake complete, serving calls.
    Ready,
    /// Recent health checks failed; still serving, demotion pending.
    Degraded,
    /// Connection lost or handshake exhausted its retries.
    Failed,
}

impl ConnectionState {
    /// Whether tools from a server in this state belong in the catalog.
    #[must_use]
    pub const fn serves_tools(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }
}

/// Runtime status snapshot for one server, exposed upward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Server name.
    pub name: String,
    /// Current connection state.
    pub state: ConnectionState,
    /// Number of tools discovered from this server.
    pub tool_count: usize,
    /// When the last successful connect completed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdio_descriptor_builder() {
        let desc = ServerDescriptor::stdio("calc", "npx", vec!["-y".to_string()])
            .with_env("API_KEY", "secret")
            .with_priority(5);

        assert_eq!(desc.name, "calc");
        assert_eq!(desc.priority, 5);
        match &desc.transport {
            TransportKind::Stdio { command, env, .. } => {
                assert_eq!(command, "npx");
                assert_eq!(env.len(), 1);
                assert_eq!(env[0].key, "API_KEY");
            }
            TransportKind::Http { .. } => panic!("expected stdio transport"),
        }
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_command_with_flags() {
        let desc = ServerDescriptor::stdio("bad", "npx -y server", vec![]);
        assert!(matches!(
            desc.validate(),
            Err(ConfigError::CommandWithArguments(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let desc = ServerDescriptor::http("remote", "ftp://example.com");
        assert!(matches!(desc.validate(), Err(ConfigError::InvalidUrl(..))));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
        };
        assert_eq!(retry.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(retry.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(retry.backoff_delay(2), Duration::from_millis(400));
        assert_eq!(retry.backoff_delay(3), Duration::from_millis(500));
        assert_eq!(retry.backoff_delay(30), Duration::from_millis(500));
    }

    #[test]
    fn test_state_serialization_is_lowercase() {
        let json = serde_json::to_string(&ConnectionState::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }

    #[test]
    fn test_descriptor_round_trips_through_json() {
        let desc = ServerDescriptor::http("remote", "http://localhost:3001/rpc");
        let json = serde_json::to_string(&desc).unwrap();
        assert!(json.contains("\"transport\":\"http\""));
        let back: ServerDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, desc);
    }
}
