//! Three-way intent routing: direct, hybrid, or llm-only.
//!
//! [`decide`] is pure — scores in, decision out — so the policy is testable
//! without an index or a registry. [`IntentRouter`] binds it to a live
//! [`ToolIndex`].

use std::sync::Arc;

use toolgate_core::{RankedTool, RoutePath, RouterConfig, RoutingDecision};

use crate::index::ToolIndex;
use crate::intent;

/// Apply the routing policy to ranked candidates.
///
/// Order matters: the actionability gate runs before any threshold rule, so
/// "what is X" goes to the model even when X matches a tool name almost
/// perfectly. Direct needs both a confident score and a complete parameter
/// extraction; a confident score with incomplete parameters is hybrid.
pub fn decide(
    utterance: &str,
    candidates: &[RankedTool],
    config: &RouterConfig,
) -> RoutingDecision {
    let top_score = candidates.first().map_or(0.0, |c| c.score);
    let shortlist: Vec<RankedTool> = candidates
        .iter()
        .take(config.max_candidates)
        .cloned()
        .collect();

    if !intent::is_actionable(utterance) {
        return RoutingDecision {
            path: RoutePath::LlmOnly,
            tool: None,
            parameters: None,
            confidence: 1.0 - top_score,
            candidates: Vec::new(),
            reasoning: "Utterance asks for an explanation, not an action".to_string(),
        };
    }

    let Some(top) = candidates.first() else {
        return RoutingDecision {
            path: RoutePath::LlmOnly,
            tool: None,
            parameters: None,
            confidence: 1.0,
            candidates: Vec::new(),
            reasoning: "No tools indexed".to_string(),
        };
    };

    if top_score >= config.direct_threshold {
        if let Some(parameters) =
            intent::extract_parameters(utterance, top.tool.input_schema.as_ref())
        {
            return RoutingDecision {
                path: RoutePath::Direct,
                tool: Some(top.tool.name.clone()),
                parameters: Some(parameters),
                confidence: top_score,
                candidates: shortlist,
                reasoning: format!(
                    "Score {top_score:.2} >= direct threshold {:.2} and all required parameters extracted",
                    config.direct_threshold
                ),
            };
        }
        return RoutingDecision {
            path: RoutePath::Hybrid,
            tool: Some(top.tool.name.clone()),
            parameters: None,
            confidence: top_score,
            candidates: shortlist,
            reasoning: format!(
                "Score {top_score:.2} >= direct threshold {:.2} but required parameters could not be extracted",
                config.direct_threshold
            ),
        };
    }

    if top_score >= config.hybrid_threshold {
        return RoutingDecision {
            path: RoutePath::Hybrid,
            tool: None,
            parameters: None,
            confidence: top_score,
            candidates: shortlist,
            reasoning: format!(
                "Score {top_score:.2} between hybrid threshold {:.2} and direct threshold {:.2}",
                config.hybrid_threshold, config.direct_threshold
            ),
        };
    }

    RoutingDecision {
        path: RoutePath::LlmOnly,
        tool: None,
        parameters: None,
        confidence: 1.0 - top_score,
        candidates: Vec::new(),
        reasoning: format!(
            "Score {top_score:.2} below hybrid threshold {:.2}",
            config.hybrid_threshold
        ),
    }
}

/// Routes utterances against a live tool index.
pub struct IntentRouter {
    index: Arc<ToolIndex>,
    config: RouterConfig,
}

impl IntentRouter {
    /// Create a router over the index.
    pub fn new(index: Arc<ToolIndex>, config: RouterConfig) -> Self {
        Self { index, config }
    }

    /// Rank tools for the utterance and apply the routing policy.
    pub async fn route(&self, utterance: &str) -> RoutingDecision {
        let candidates = self
            .index
            .search(utterance, &self.config.weights, self.config.max_candidates)
            .await;
        let decision = decide(utterance, &candidates, &self.config);
        tracing::debug!(
            path = ?decision.path,
            tool = ?decision.tool,
            confidence = decision.confidence,
            reasoning = %decision.reasoning,
            "Routed utterance"
        );
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolgate_core::ToolDescriptor;

    fn queens_candidate(score: f64) -> RankedTool {
        RankedTool {
            tool: ToolDescriptor::new("solve_n_queens", "puzzles").with_input_schema(json!({
                "type": "object",
                "properties": { "n": { "type": "integer" } },
                "required": ["n"]
            })),
            score,
        }
    }

    #[test]
    fn test_direct_when_confident_and_parameters_complete() {
        let decision = decide(
            "solve n queens for 8",
            &[queens_candidate(0.85)],
            &RouterConfig::default(),
        );
        assert_eq!(decision.path, RoutePath::Direct);
        assert_eq!(decision.tool.as_deref(), Some("solve_n_queens"));
        assert_eq!(decision.parameters.unwrap()["n"], json!(8));
        assert!((decision.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_explanation_goes_to_llm_despite_high_score() {
        let decision = decide(
            "what is the n-queens problem",
            &[queens_candidate(0.92)],
            &RouterConfig::default(),
        );
        assert_eq!(decision.path, RoutePath::LlmOnly);
        assert!(decision.tool.is_none());
        // Confidence stays score-derived, same as every llm-only branch.
        assert!((decision.confidence - (1.0 - 0.92)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_confident_but_parameterless_is_hybrid() {
        let decision = decide(
            "solve the queens puzzle on a big or small board",
            &[queens_candidate(0.85)],
            &RouterConfig::default(),
        );
        assert_eq!(decision.path, RoutePath::Hybrid);
        assert_eq!(decision.tool.as_deref(), Some("solve_n_queens"));
        assert!(!decision.candidates.is_empty());
    }

    #[test]
    fn test_mid_score_is_hybrid_with_candidates() {
        let decision = decide(
            "do something with queens",
            &[queens_candidate(0.5)],
            &RouterConfig::default(),
        );
        assert_eq!(decision.path, RoutePath::Hybrid);
        assert!(decision.tool.is_none());
        assert_eq!(decision.candidates.len(), 1);
    }

    #[test]
    fn test_low_score_is_llm_only() {
        let decision = decide(
            "book me a flight to Lisbon",
            &[queens_candidate(0.1)],
            &RouterConfig::default(),
        );
        assert_eq!(decision.path, RoutePath::LlmOnly);
        assert!((decision.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_catalog_is_llm_only() {
        let decision = decide("solve n queens for 8", &[], &RouterConfig::default());
        assert_eq!(decision.path, RoutePath::LlmOnly);
        assert!((decision.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_direct_confidence_is_monotonic_in_score() {
        let config = RouterConfig::default();
        let low = decide("solve n queens for 8", &[queens_candidate(0.75)], &config);
        let high = decide("solve n queens for 8", &[queens_candidate(0.95)], &config);
        assert_eq!(low.path, RoutePath::Direct);
        assert_eq!(high.path, RoutePath::Direct);
        assert!(high.confidence > low.confidence);
    }
}
