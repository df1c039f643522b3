//! Validated, retrying tool execution with enriched errors.
//!
//! The executor owns the failure policy: parameters are validated before
//! anything crosses a transport, transient transport failures are retried
//! with backoff, and tool-reported errors are terminal because the tool
//! already ran. Every terminal outcome feeds the index's success rates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value, json};
use toolgate_core::{ErrorKind, ExecuteOptions, ExecutionError, ExecutionResult, ToolDescriptor};
use toolgate_mcp::{RegistryError, ServerRegistry, TransportError};

use crate::index::ToolIndex;

/// Base delay between transport retries; doubles per attempt.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Executes catalog tools through the registry.
pub struct Executor {
    registry: Arc<ServerRegistry>,
    index: Arc<ToolIndex>,
}

impl Executor {
    /// Create an executor over the registry and index.
    pub fn new(registry: Arc<ServerRegistry>, index: Arc<ToolIndex>) -> Self {
        Self { registry, index }
    }

    /// Execute a tool by name.
    ///
    /// Validation failures return immediately with `kind = validation` and
    /// worked-example hints; nothing is sent and no outcome is recorded,
    /// since the tool never ran. Transport failures retry up to
    /// `options.retry_attempts` times; tool-reported errors never retry.
    pub async fn execute(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        options: &ExecuteOptions,
    ) -> ExecutionResult {
        let started = Instant::now();

        let Some(tool) = self.index.get(tool_name).await else {
            return ExecutionResult::failure(
                ExecutionError::new(
                    ErrorKind::Validation,
                    format!("Unknown tool: {tool_name}"),
                ),
                started.elapsed(),
                0,
            );
        };

        if options.validate_input {
            if let Some(error) = validate_arguments(&tool, &arguments) {
                return ExecutionResult::failure(error, started.elapsed(), 0);
            }
        }

        let deadline = Duration::from_millis(options.timeout_ms);
        let mut retries = 0_u32;

        loop {
            let outcome = self
                .registry
                .call_tool(&tool.server, tool_name, arguments.clone(), deadline)
                .await;

            match outcome {
                Ok(result) if result.success => {
                    self.index.record_outcome(tool_name, true).await;
                    let payload = result.content.unwrap_or(Value::Null);
                    return ExecutionResult::success(payload, started.elapsed(), retries);
                }
                Ok(result) => {
                    // The tool ran and said no; retrying would re-run side
                    // effects we cannot reason about.
                    self.index.record_outcome(tool_name, false).await;
                    let message = result
                        .error
                        .unwrap_or_else(|| "Tool reported an error".to_string());
                    let error = ExecutionError::new(ErrorKind::Tool, message)
                        .with_hints(example_hints(&tool));
                    return ExecutionResult::failure(error, started.elapsed(), retries);
                }
                Err(e) => {
                    let retryable = matches!(
                        &e,
                        RegistryError::Transport(t) if t.is_retryable()
                    );
                    if retryable && retries < options.retry_attempts {
                        let delay = RETRY_BACKOFF * 2_u32.saturating_pow(retries);
                        tracing::warn!(
                            tool = %tool_name,
                            server = %tool.server,
                            error = %e,
                            retries,
                            "Transport failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        retries += 1;
                        continue;
                    }

                    self.index.record_outcome(tool_name, false).await;
                    let kind = match &e {
                        RegistryError::Transport(TransportError::Timeout) => ErrorKind::Timeout,
                        _ => ErrorKind::Transport,
                    };
                    let error = ExecutionError::new(kind, e.to_string());
                    return ExecutionResult::failure(error, started.elapsed(), retries);
                }
            }
        }
    }
}

/// Validate arguments against the tool's input schema.
///
/// Returns `None` when the arguments pass or the tool carries no schema.
fn validate_arguments(
    tool: &ToolDescriptor,
    arguments: &Map<String, Value>,
) -> Option<ExecutionError> {
    let schema = tool.input_schema.as_ref()?;
    let compiled = match jsonschema::JSONSchema::compile(schema) {
        Ok(compiled) => compiled,
        Err(e) => {
            // A broken schema is the server's bug, not the caller's; let the
            // call through rather than rejecting valid input.
            tracing::warn!(tool = %tool.name, error = %e, "Tool schema does not compile");
            return None;
        }
    };

    let instance = Value::Object(arguments.clone());
    let messages: Vec<String> = match compiled.validate(&instance) {
        Ok(()) => return None,
        Err(errors) => errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect(),
    };

    Some(
        ExecutionError::new(
            ErrorKind::Validation,
            format!(
                "Invalid parameters for '{}': {}",
                tool.name,
                messages.join("; ")
            ),
        )
        .with_hints(example_hints(tool)),
    )
}

/// Worked-example hints: the tool's recorded examples, or one synthesized
/// from the schema when it has none.
fn example_hints(tool: &ToolDescriptor) -> Vec<Value> {
    if !tool.examples.is_empty() {
        return tool.examples.clone();
    }
    tool.input_schema
        .as_ref()
        .and_then(example_from_schema)
        .map(|example| vec![example])
        .unwrap_or_default()
}

/// Synthesize a minimal valid-shaped example from an object schema.
fn example_from_schema(schema: &Value) -> Option<Value> {
    let properties = schema.get("properties")?.as_object()?;
    let mut example = Map::new();
    for (name, spec) in properties {
        let value = match spec.get("type").and_then(Value::as_str) {
            Some("integer" | "number") => json!(1),
            Some("boolean") => json!(true),
            Some("array") => json!([]),
            Some("object") => json!({}),
            _ => json!("example"),
        };
        example.insert(name.clone(), value);
    }
    Some(Value::Object(example))
}
