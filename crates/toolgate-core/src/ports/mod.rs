//! Port traits for external collaborators.
//!
//! The LLM, the embedding provider, and the event consumer all live outside
//! this core. Each port ships a Noop implementation so the core is testable
//! without any of them.

pub mod embedding;
pub mod event_sink;
pub mod llm;

pub use embedding::{EmbedError, Embedder, NoopEmbedder};
pub use event_sink::{EventSink, NoopSink, RegistryEvent};
pub use llm::{ChatMessage, ChatModel, ChatRole, LlmError, LlmReply, ToolSpec};
