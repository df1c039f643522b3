//! Core domain types and port definitions for toolgate.
//!
//! This crate holds the transport-agnostic vocabulary of the system: server
//! descriptors and connection states, tool descriptors, routing decisions,
//! execution results, the error taxonomy, and the port traits for the
//! external collaborators (LLM, embedder, event sink). It must not depend on
//! any infrastructure crate.

pub mod domain;
pub mod error;
pub mod ports;

// Re-export commonly used types for convenience
pub use domain::server::EnvVar;
pub use domain::{
    ConnectionState, ErrorKind, ExecuteOptions, ExecutionError, ExecutionResult, RankedTool,
    RetryPolicy, RoutePath, RouterConfig, RoutingDecision, ScoringWeights, ServerDescriptor,
    ServerStatus, ToolCallResult, ToolDescriptor, TransportKind,
};
pub use error::ConfigError;
pub use ports::{
    ChatMessage, ChatModel, ChatRole, EmbedError, Embedder, EventSink, LlmError, LlmReply,
    NoopEmbedder, NoopSink, RegistryEvent, ToolSpec,
};
