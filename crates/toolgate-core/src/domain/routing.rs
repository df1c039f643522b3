//! Routing decisions and router/scoring configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::tool::ToolDescriptor;

/// Which path a routing decision takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutePath {
    /// The router invokes a tool itself, without LLM involvement.
    Direct,
    /// A curated tool subset is handed to the LLM, which decides
    /// whether/which tool to call.
    Hybrid,
    /// The LLM answers without tools.
    LlmOnly,
}

/// One ranked candidate from the tool index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedTool {
    /// The candidate tool.
    pub tool: ToolDescriptor,
    /// Blended score ∈ [0, 1].
    pub score: f64,
}

/// Per-utterance routing decision. Transient; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Chosen path.
    pub path: RoutePath,

    /// Selected tool name (direct path only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    /// Parameters extracted from the utterance (direct path only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,

    /// Confidence ∈ [0, 1], always derived from the blended-score formula.
    pub confidence: f64,

    /// Ranked candidates considered, best first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<RankedTool>,

    /// One-line reasoning citing the rule and score that fired.
    pub reasoning: String,
}

/// Blend weights for the index scoring formula.
///
/// The formula's shape is fixed (weighted sum of keyword overlap, embedding
/// similarity, and historical success rate); the weights were tuned
/// empirically and stay calibratable configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of the keyword-overlap ratio.
    pub keyword: f64,
    /// Weight of the cosine similarity to the query embedding.
    pub vector: f64,
    /// Weight of the historical success rate.
    pub success: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            keyword: 0.45,
            vector: 0.35,
            success: 0.20,
        }
    }
}

/// Router thresholds and scoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Minimum blended top score for the direct path.
    pub direct_threshold: f64,
    /// Minimum blended top score for the hybrid path.
    pub hybrid_threshold: f64,
    /// Maximum candidates handed to the LLM on the hybrid path.
    pub max_candidates: usize,
    /// Blend weights used by the index.
    pub weights: ScoringWeights,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            direct_threshold: 0.7,
            hybrid_threshold: 0.3,
            max_candidates: 5,
            weights: ScoringWeights::default(),
        }
    }
}
