//! Tool index: lexical keywords, optional embeddings, and learned success
//! rates blended into one relevance score.
//!
//! The index degrades gracefully: when the embedder is unavailable or a tool
//! has no embedding yet, scoring falls back to keywords + success rate with
//! the weights renormalized, so search never fails outright.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::timeout;
use toolgate_core::{Embedder, RankedTool, ScoringWeights, ToolDescriptor};

/// Cap on keywords learned from successful queries, per tool.
const MAX_LEARNED_KEYWORDS: usize = 32;

/// Longest a search will wait for the query embedding before scoring on
/// keywords alone.
const QUERY_EMBED_TIMEOUT: Duration = Duration::from_millis(500);

/// Words too common to carry routing signal.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "can", "do", "for", "from", "in", "is", "it", "me", "my", "of", "on",
    "or", "please", "that", "the", "this", "to", "with", "you",
];

struct IndexedTool {
    tool: ToolDescriptor,
    /// Tokens from the tool name + manual keywords + learned queries.
    keywords: BTreeSet<String>,
    learned: BTreeSet<String>,
    successes: u64,
    failures: u64,
}

impl IndexedTool {
    /// Smoothed success rate: 0.5 with no history, converging on the
    /// observed ratio as outcomes accumulate.
    fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        #[allow(clippy::cast_precision_loss)]
        let rate = (self.successes as f64 + 1.0) / (total as f64 + 2.0);
        rate
    }

    fn all_keywords(&self) -> BTreeSet<String> {
        self.keywords.union(&self.learned).cloned().collect()
    }
}

/// Searchable index over the tool catalog.
pub struct ToolIndex {
    embedder: Arc<dyn Embedder>,
    inner: Arc<RwLock<HashMap<String, IndexedTool>>>,
}

impl ToolIndex {
    /// Create an empty index backed by the given embedder.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or update one tool.
    ///
    /// Tokens are derived from the tool name (snake/camel/kebab aware) and
    /// merged with any manual keywords, so the tool is keyword-searchable as
    /// soon as this returns. The embedding is filled in on a spawned task;
    /// a slow or unavailable embedder never delays availability, it only
    /// leaves the tool on keyword scoring until the vector lands. Learned
    /// state survives updates.
    pub async fn upsert(&self, tool: ToolDescriptor) {
        let mut keywords = tokenize(&tool.name);
        keywords.extend(tool.keywords.iter().cloned());

        let name = tool.name.clone();
        let embed_text = if tool.embedding.is_none() {
            Some(match &tool.description {
                Some(desc) => format!("{}: {desc}", tool.name),
                None => tool.name.clone(),
            })
        } else {
            None
        };

        {
            let mut inner = self.inner.write().await;
            match inner.get_mut(&name) {
                Some(existing) => {
                    existing.tool = tool;
                    existing.keywords = keywords;
                }
                None => {
                    inner.insert(
                        name.clone(),
                        IndexedTool {
                            tool,
                            keywords,
                            learned: BTreeSet::new(),
                            successes: 0,
                            failures: 0,
                        },
                    );
                }
            }
        }

        if let Some(text) = embed_text {
            let embedder = Arc::clone(&self.embedder);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                match embedder.embed(&text).await {
                    Ok(embedding) => {
                        let mut inner = inner.write().await;
                        // The tool may have been re-upserted or dropped while
                        // we were embedding; only fill a still-empty slot.
                        if let Some(entry) = inner.get_mut(&name) {
                            if entry.tool.embedding.is_none() {
                                entry.tool.embedding = Some(embedding);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(tool = %name, error = %e, "Embedding unavailable, keyword-only");
                    }
                }
            });
        }
    }

    /// Replace the indexed set with a fresh catalog.
    ///
    /// Tools absent from the new catalog are dropped; surviving tools keep
    /// their learned keywords and outcome counters.
    pub async fn sync(&self, tools: Vec<ToolDescriptor>) {
        let names: BTreeSet<String> = tools.iter().map(|t| t.name.clone()).collect();
        {
            let mut inner = self.inner.write().await;
            inner.retain(|name, _| names.contains(name));
        }
        for tool in tools {
            self.upsert(tool).await;
        }
    }

    /// Drop every tool owned by `server`.
    pub async fn remove_server(&self, server: &str) {
        let mut inner = self.inner.write().await;
        inner.retain(|_, entry| entry.tool.server != server);
    }

    /// Look up one tool by name.
    pub async fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.inner.read().await.get(name).map(|e| e.tool.clone())
    }

    /// Number of indexed tools.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the index is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Rank tools against an utterance.
    ///
    /// Score is a weighted blend of keyword overlap, embedding cosine
    /// similarity, and learned success rate. Pairs missing an embedding are
    /// scored on the remaining components with weights renormalized. Ties
    /// break on success rate, then name, so ranking is deterministic.
    pub async fn search(
        &self,
        utterance: &str,
        weights: &ScoringWeights,
        limit: usize,
    ) -> Vec<RankedTool> {
        let query_tokens = tokenize(utterance);
        // Bounded wait: keyword scoring is never hostage to the embedder.
        let query_embedding = match timeout(QUERY_EMBED_TIMEOUT, self.embedder.embed(utterance))
            .await
        {
            Ok(Ok(v)) => Some(v),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Query embedding unavailable, keyword-only search");
                None
            }
            Err(_) => {
                tracing::debug!("Query embedding timed out, keyword-only search");
                None
            }
        };

        let inner = self.inner.read().await;
        let mut ranked: Vec<(RankedTool, f64)> = inner
            .values()
            .map(|entry| {
                let kw = keyword_overlap(&query_tokens, &entry.all_keywords());
                let rate = entry.success_rate();
                let vec_sim = match (&query_embedding, &entry.tool.embedding) {
                    (Some(q), Some(t)) => Some(cosine_similarity(q, t)),
                    _ => None,
                };

                let score = match vec_sim {
                    Some(sim) => {
                        weights.keyword * kw + weights.vector * sim + weights.success * rate
                    }
                    None => {
                        // Redistribute the vector weight across what we have.
                        let denom = weights.keyword + weights.success;
                        if denom > 0.0 {
                            (weights.keyword * kw + weights.success * rate) / denom
                        } else {
                            0.0
                        }
                    }
                };

                (
                    RankedTool {
                        tool: entry.tool.clone(),
                        score,
                    },
                    rate,
                )
            })
            .collect();

        ranked.sort_by(|(a, a_rate), (b, b_rate)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b_rate
                        .partial_cmp(a_rate)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.tool.name.cmp(&b.tool.name))
        });

        ranked
            .into_iter()
            .take(limit)
            .map(|(ranked, _)| ranked)
            .collect()
    }

    /// Record one execution outcome for a tool.
    pub async fn record_outcome(&self, tool: &str, success: bool) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.get_mut(tool) {
            if success {
                entry.successes += 1;
            } else {
                entry.failures += 1;
            }
        }
    }

    /// Reinforce a successful routing: remember the query's tokens as
    /// keywords for the tool, up to a cap.
    pub async fn learn(&self, tool: &str, utterance: &str) {
        let tokens = tokenize(utterance);
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.get_mut(tool) {
            for token in tokens {
                if entry.learned.len() >= MAX_LEARNED_KEYWORDS {
                    break;
                }
                entry.learned.insert(token);
            }
        }
    }

    /// Success rate currently attributed to a tool.
    pub async fn success_rate(&self, tool: &str) -> Option<f64> {
        self.inner.read().await.get(tool).map(IndexedTool::success_rate)
    }
}

/// Tokenize text for lexical matching.
///
/// Splits on non-alphanumeric boundaries and camelCase humps, lowercases,
/// and drops stopwords and single characters.
pub(crate) fn tokenize(text: &str) -> BTreeSet<String> {
    let mut separated = String::with_capacity(text.len() + 8);
    let mut prev_lower = false;
    for c in text.chars() {
        if c.is_uppercase() && prev_lower {
            separated.push(' ');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        separated.push(c);
    }

    separated
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Fraction of query tokens present in the tool's keywords.
fn keyword_overlap(query: &BTreeSet<String>, keywords: &BTreeSet<String>) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let hits = query.intersection(keywords).count();
    #[allow(clippy::cast_precision_loss)]
    let overlap = hits as f64 / query.len() as f64;
    overlap
}

/// Cosine similarity between two vectors, clamped to `[0, 1]`.
///
/// Mismatched lengths and zero-norm vectors score 0 rather than erroring;
/// the raw cosine's negative half is clamped away since anti-similarity
/// carries no routing signal.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use toolgate_core::{EmbedError, NoopEmbedder};

    /// Deterministic bag-of-letters embedder for tests.
    struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            let mut v = vec![0.0_f32; 26];
            for c in text.chars().filter(char::is_ascii_lowercase) {
                v[(c as usize) - ('a' as usize)] += 1.0;
            }
            Ok(v)
        }
    }

    fn queens_tool() -> ToolDescriptor {
        ToolDescriptor::new("solve_n_queens", "puzzles")
            .with_description("Solve the N-Queens chess puzzle for a given board size")
    }

    fn weather_tool() -> ToolDescriptor {
        ToolDescriptor::new("get_weather", "weather")
            .with_description("Current weather for a location")
    }

    /// Embedder that never answers within any reasonable deadline.
    struct HangingEmbedder;

    #[async_trait]
    impl Embedder for HangingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(EmbedError::Unavailable)
        }
    }

    async fn wait_for_embedding(index: &ToolIndex, name: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if index
                .get(name)
                .await
                .is_some_and(|t| t.embedding.is_some())
            {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "embedding for '{name}' never arrived"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_upsert_then_search_hits_on_keywords() {
        let index = ToolIndex::new(Arc::new(NoopEmbedder::new()));
        index.upsert(queens_tool()).await;
        index.upsert(weather_tool()).await;

        let results = index
            .search("solve n queens", &ScoringWeights::default(), 5)
            .await;
        assert_eq!(results[0].tool.name, "solve_n_queens");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_never_blocks_on_the_embedder() {
        let index = ToolIndex::new(Arc::new(HangingEmbedder));

        timeout(Duration::from_millis(100), index.upsert(queens_tool()))
            .await
            .expect("upsert must not wait for the embedder");

        // Keyword-searchable immediately, embedding still pending.
        let results = index
            .search("solve n queens", &ScoringWeights::default(), 5)
            .await;
        assert_eq!(results[0].tool.name, "solve_n_queens");
        assert!(results[0].tool.embedding.is_none());
        assert!(results[0].score > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_times_out_a_hung_query_embed() {
        let index = ToolIndex::new(Arc::new(HangingEmbedder));
        index.upsert(queens_tool()).await;

        let results = timeout(
            Duration::from_secs(2),
            index.search("solve n queens", &ScoringWeights::default(), 5),
        )
        .await
        .expect("search must fall back to keywords, not hang");
        assert_eq!(results[0].tool.name, "solve_n_queens");
    }

    #[tokio::test]
    async fn test_embedding_arrives_on_a_background_task() {
        let index = ToolIndex::new(Arc::new(HashEmbedder));
        index.upsert(queens_tool()).await;

        wait_for_embedding(&index, "solve_n_queens").await;
        let tool = index.get("solve_n_queens").await.unwrap();
        assert_eq!(tool.embedding.unwrap().len(), 26);
    }

    #[tokio::test]
    async fn test_search_is_idempotent() {
        let index = ToolIndex::new(Arc::new(HashEmbedder));
        index.upsert(queens_tool()).await;
        index.upsert(weather_tool()).await;
        wait_for_embedding(&index, "solve_n_queens").await;
        wait_for_embedding(&index, "get_weather").await;

        let weights = ScoringWeights::default();
        let first = index.search("what is the weather", &weights, 5).await;
        let second = index.search("what is the weather", &weights, 5).await;

        let names_first: Vec<&str> = first.iter().map(|r| r.tool.name.as_str()).collect();
        let names_second: Vec<&str> = second.iter().map(|r| r.tool.name.as_str()).collect();
        assert_eq!(names_first, names_second);
        for (a, b) in first.iter().zip(second.iter()) {
            assert!((a.score - b.score).abs() < f64::EPSILON);
        }
    }

    #[tokio::test]
    async fn test_unavailable_embedder_degrades_to_keywords() {
        let index = ToolIndex::new(Arc::new(NoopEmbedder::new()));
        index.upsert(queens_tool()).await;

        let results = index
            .search("solve queens puzzle", &ScoringWeights::default(), 5)
            .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].tool.embedding.is_none());
        assert!(results[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_outcomes_shift_ranking() {
        let index = ToolIndex::new(Arc::new(NoopEmbedder::new()));
        index
            .upsert(ToolDescriptor::new("search_web", "a").with_keyword("find"))
            .await;
        index
            .upsert(ToolDescriptor::new("search_files", "b").with_keyword("find"))
            .await;

        // Equal lexical signal; reward one, punish the other.
        for _ in 0..5 {
            index.record_outcome("search_files", true).await;
            index.record_outcome("search_web", false).await;
        }

        let results = index.search("find", &ScoringWeights::default(), 5).await;
        assert_eq!(results[0].tool.name, "search_files");
    }

    #[tokio::test]
    async fn test_success_rate_starts_neutral() {
        let index = ToolIndex::new(Arc::new(NoopEmbedder::new()));
        index.upsert(queens_tool()).await;

        let rate = index.success_rate("solve_n_queens").await.unwrap();
        assert!((rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_learned_keywords_improve_recall_and_are_capped() {
        let index = ToolIndex::new(Arc::new(NoopEmbedder::new()));
        index.upsert(ToolDescriptor::new("solve_n_queens", "puzzles")).await;

        let before = index
            .search("chessboard challenge", &ScoringWeights::default(), 5)
            .await;
        assert!(before[0].score < 0.4);

        index.learn("solve_n_queens", "chessboard challenge").await;
        let after = index
            .search("chessboard challenge", &ScoringWeights::default(), 5)
            .await;
        assert!(after[0].score > before[0].score);

        // Cap holds however many queries we learn from.
        for i in 0..100 {
            index.learn("solve_n_queens", &format!("query number{i}")).await;
        }
        let inner = index.inner.read().await;
        assert!(inner["solve_n_queens"].learned.len() <= MAX_LEARNED_KEYWORDS);
    }

    #[tokio::test]
    async fn test_sync_drops_stale_tools_but_keeps_history() {
        let index = ToolIndex::new(Arc::new(NoopEmbedder::new()));
        index.upsert(queens_tool()).await;
        index.upsert(weather_tool()).await;
        index.record_outcome("solve_n_queens", true).await;
        index.record_outcome("solve_n_queens", true).await;

        index.sync(vec![queens_tool()]).await;

        assert_eq!(index.len().await, 1);
        assert!(index.get("get_weather").await.is_none());
        let rate = index.success_rate("solve_n_queens").await.unwrap();
        assert!(rate > 0.5);
    }

    #[tokio::test]
    async fn test_remove_server_prunes_its_tools() {
        let index = ToolIndex::new(Arc::new(NoopEmbedder::new()));
        index.upsert(queens_tool()).await;
        index.upsert(weather_tool()).await;

        index.remove_server("puzzles").await;
        assert!(index.get("solve_n_queens").await.is_none());
        assert!(index.get("get_weather").await.is_some());
    }

    #[test]
    fn test_tokenize_splits_name_styles() {
        let tokens = tokenize("solveNQueens kebab-case snake_case");
        assert!(tokens.contains("solve"));
        assert!(tokens.contains("queens"));
        assert!(tokens.contains("kebab"));
        assert!(tokens.contains("snake"));
        assert!(!tokens.contains("n")); // Single chars dropped
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        // Anti-similar vectors clamp to zero.
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    }
}
