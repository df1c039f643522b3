//! Execution results, options, and the user-facing error shape.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Parameters rejected against the tool's schema; nothing was sent.
    Validation,
    /// The call deadline elapsed.
    Timeout,
    /// Connection-level failure (spawn, pipe, HTTP, protocol).
    Transport,
    /// The tool executed and reported an error.
    Tool,
}

/// Structured, user-safe execution error: kind, message, remediation hints.
///
/// Never a raw stack trace or protocol frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionError {
    /// Failure category.
    pub kind: ErrorKind,
    /// User-friendly message.
    pub message: String,
    /// Worked usage examples for remediation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<Value>,
}

impl ExecutionError {
    /// Create an error with no hints.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            hints: Vec::new(),
        }
    }

    /// Attach remediation hints.
    #[must_use]
    pub fn with_hints(mut self, hints: Vec<Value>) -> Self {
        self.hints = hints;
        self
    }
}

/// Normalized outcome of one `execute()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the call succeeded.
    pub success: bool,

    /// Tool payload (if success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Structured error (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,

    /// Wall-clock latency of the whole call, retries included.
    pub latency: Duration,

    /// Number of retries performed (0 = first attempt succeeded or was
    /// terminal).
    pub retries: u32,
}

impl ExecutionResult {
    /// Create a success result.
    #[must_use]
    pub const fn success(payload: Value, latency: Duration, retries: u32) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
            latency,
            retries,
        }
    }

    /// Create a failure result.
    #[must_use]
    pub const fn failure(error: ExecutionError, latency: Duration, retries: u32) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error),
            latency,
            retries,
        }
    }
}

/// Options for one `execute()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Per-attempt call timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retries allowed for transport-level failures. Tool-reported errors
    /// are never retried.
    pub retry_attempts: u32,
    /// Validate parameters against the tool's schema before sending.
    pub validate_input: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retry_attempts: 2,
            validate_input: true,
        }
    }
}
