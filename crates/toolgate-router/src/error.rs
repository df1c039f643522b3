//! Routing-layer error taxonomy.

use thiserror::Error;
use toolgate_core::LlmError;
use toolgate_mcp::RegistryError;

/// Errors surfaced by the routing facade.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The requested or LLM-chosen tool is not in the catalog.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Registry refused or failed the operation.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The language model backend failed.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}
