//! The routing facade: registry + index + router + executor behind one type.

use std::sync::Arc;

use serde_json::{Map, Value};
use toolgate_core::{
    ChatMessage, ChatModel, Embedder, ExecuteOptions, ExecutionResult, LlmReply, RoutePath,
    RouterConfig, RoutingDecision, ServerDescriptor, ServerStatus, ToolSpec,
};
use toolgate_mcp::{ConfigDiff, ServerRegistry};

use crate::error::RouterError;
use crate::executor::Executor;
use crate::index::ToolIndex;
use crate::router::IntentRouter;

/// What answering an utterance produced.
#[derive(Debug)]
pub enum ServiceReply {
    /// A tool ran; the decision explains why this one.
    Executed {
        /// The routing decision that led here.
        decision: RoutingDecision,
        /// Normalized execution outcome.
        result: ExecutionResult,
    },
    /// The language model answered directly.
    Text {
        /// The routing decision that led here.
        decision: RoutingDecision,
        /// Model-produced answer.
        content: String,
    },
}

/// Facade over the full pipeline: catalog sync, routing, and execution.
pub struct Toolgate {
    registry: Arc<ServerRegistry>,
    index: Arc<ToolIndex>,
    router: IntentRouter,
    executor: Executor,
    chat: Arc<dyn ChatModel>,
}

impl Toolgate {
    /// Assemble the pipeline from its ports.
    pub fn new(
        registry: Arc<ServerRegistry>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        config: RouterConfig,
    ) -> Self {
        let index = Arc::new(ToolIndex::new(embedder));
        Self {
            router: IntentRouter::new(Arc::clone(&index), config),
            executor: Executor::new(Arc::clone(&registry), Arc::clone(&index)),
            registry,
            index,
            chat,
        }
    }

    /// Rebuild the index from the registry's current catalog.
    pub async fn sync_index(&self) {
        let catalog = self.registry.catalog().await;
        for collision in &catalog.collisions {
            tracing::warn!(
                tool = %collision.tool,
                winner = %collision.winner,
                loser = %collision.loser,
                "Tool name collision in catalog"
            );
        }
        let count = catalog.tools.len();
        self.index.sync(catalog.tools).await;
        tracing::debug!(count, "Index synchronized with catalog");
    }

    /// Route an utterance without executing anything.
    pub async fn route(&self, utterance: &str) -> RoutingDecision {
        self.router.route(utterance).await
    }

    /// Execute a tool by name, outside of routing.
    pub async fn execute(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
        options: &ExecuteOptions,
    ) -> ExecutionResult {
        self.executor.execute(tool, arguments, options).await
    }

    /// Answer an utterance end to end: route, then execute or ask the model.
    ///
    /// A successful direct execution also reinforces the index, so the same
    /// phrasing routes more confidently next time.
    pub async fn respond(
        &self,
        utterance: &str,
        options: &ExecuteOptions,
    ) -> Result<ServiceReply, RouterError> {
        let decision = self.router.route(utterance).await;

        match decision.path {
            RoutePath::Direct => {
                // Routing only yields Direct with tool and parameters set.
                let tool = decision
                    .tool
                    .clone()
                    .ok_or_else(|| RouterError::UnknownTool(utterance.to_string()))?;
                let arguments = decision.parameters.clone().unwrap_or_default();

                let result = self.executor.execute(&tool, arguments, options).await;
                if result.success {
                    self.index.learn(&tool, utterance).await;
                }
                Ok(ServiceReply::Executed { decision, result })
            }
            RoutePath::Hybrid => {
                let tools: Vec<ToolSpec> = decision
                    .candidates
                    .iter()
                    .map(|c| ToolSpec {
                        name: c.tool.name.clone(),
                        description: c.tool.description.clone(),
                        input_schema: c.tool.input_schema.clone(),
                    })
                    .collect();
                let messages = [
                    ChatMessage::system(
                        "Pick the tool that fulfils the request and supply its arguments, \
                         or answer directly if no tool fits.",
                    ),
                    ChatMessage::user(utterance),
                ];

                match self.chat.complete(&messages, &tools).await? {
                    LlmReply::ToolCall { name, arguments } => {
                        if self.index.get(&name).await.is_none() {
                            return Err(RouterError::UnknownTool(name));
                        }
                        let result = self.executor.execute(&name, arguments, options).await;
                        Ok(ServiceReply::Executed { decision, result })
                    }
                    LlmReply::Text { content } => Ok(ServiceReply::Text { decision, content }),
                }
            }
            RoutePath::LlmOnly => {
                let messages = [ChatMessage::user(utterance)];
                match self.chat.complete(&messages, &[]).await? {
                    LlmReply::Text { content } => Ok(ServiceReply::Text { decision, content }),
                    // No tools were offered; treat a stray call as text-less.
                    LlmReply::ToolCall { name, .. } => Err(RouterError::UnknownTool(name)),
                }
            }
        }
    }

    /// Reconcile registered servers against a descriptor list, then resync
    /// the index.
    pub async fn apply_config(&self, descriptors: Vec<ServerDescriptor>) -> ConfigDiff {
        let diff = self.registry.apply_config(descriptors).await;
        self.sync_index().await;
        diff
    }

    /// Status snapshot of every registered server.
    pub async fn server_status(&self) -> Vec<ServerStatus> {
        self.registry.server_status().await
    }

    /// Close every connection and stop background tasks.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
