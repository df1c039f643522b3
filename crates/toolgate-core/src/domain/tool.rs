//! Tool descriptors and raw call results.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A discovered tool: a named, schema-described remote capability.
///
/// Created from a server's `tools/list` response; the index augments it with
/// keywords, an embedding, and learned usage examples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Catalog-unique tool name.
    pub name: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for input parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,

    /// Name of the server that owns this tool.
    pub server: String,

    /// Keywords used for lexical matching: manual entries plus tokens
    /// inferred from the tool name.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub keywords: BTreeSet<String>,

    /// Embedding of name + description, once the embedder has produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Worked usage examples surfaced in validation error hints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
}

impl ToolDescriptor {
    /// Create a new tool descriptor owned by `server`.
    pub fn new(name: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
            server: server.into(),
            keywords: BTreeSet::new(),
            embedding: None,
            examples: Vec::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Add a manual keyword.
    #[must_use]
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.insert(keyword.into().to_lowercase());
        self
    }

    /// Add a worked usage example.
    #[must_use]
    pub fn with_example(mut self, example: Value) -> Self {
        self.examples.push(example);
        self
    }
}

/// Raw result of a `tools/call`, before the executor normalizes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Whether the call succeeded.
    pub success: bool,

    /// Content payload (if success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,

    /// Error message reported by the tool (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResult {
    /// Create a success result.
    #[must_use]
    pub const fn success(content: Value) -> Self {
        Self {
            success: true,
            content: Some(content),
            error: None,
        }
    }

    /// Create a tool-reported error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_descriptor_builder() {
        let tool = ToolDescriptor::new("solve_n_queens", "puzzles")
            .with_description("Solve the N-Queens puzzle")
            .with_keyword("Chess")
            .with_example(json!({"n": 8}));

        assert_eq!(tool.server, "puzzles");
        assert!(tool.keywords.contains("chess"));
        assert_eq!(tool.examples.len(), 1);
    }

    #[test]
    fn test_tool_call_result() {
        let ok = ToolCallResult::success(json!([{"type": "text", "text": "done"}]));
        assert!(ok.success);
        assert!(ok.content.is_some());

        let err = ToolCallResult::error("board too large");
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("board too large"));
    }
}
