//! Compass strategy - semantic similarity to the current node.
//!
//! Ranks eligible nodes by cosine similarity between the current node's
//! embedding and their stored embeddings. A scorer with a vector index ranks
//! for us; otherwise every eligible node is scored in memory. Both paths go
//! through the same final ordering (score descending, node id ascending).

use async_trait::async_trait;
use quest_model::{Node, NodeId};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::{rank_by_score, Candidate, CandidateStrategy, StrategyKind, StrategyRequest};
use crate::cache::NavigationCache;
use crate::error::StrategyError;
use crate::repository::{EmbeddingScorer, NodeFilter, NodeRepository};

/// One ranked node in a cached compass ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedNode {
    pub id: NodeId,
    pub slug: String,
    pub score: f64,
}

/// Similarity ranking from one source node, cached under the `comp` kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompassRanking {
    /// How many entries were requested when this ranking was computed.
    pub depth: usize,
    pub entries: Vec<RankedNode>,
}

impl CompassRanking {
    /// Whether this ranking can answer a request needing `depth` entries.
    pub fn covers(&self, depth: usize) -> bool {
        self.depth >= depth || self.entries.len() < self.depth
    }

    /// Whether `slug` appears in the ranking.
    pub fn references(&self, slug: &str) -> bool {
        self.entries.iter().any(|entry| entry.slug == slug)
    }
}

pub struct CompassStrategy {
    repository: Arc<dyn NodeRepository>,
    scorer: Arc<dyn EmbeddingScorer>,
    cache: Option<Arc<NavigationCache>>,
}

impl CompassStrategy {
    /// Compass without a ranking cache.
    pub fn new(repository: Arc<dyn NodeRepository>, scorer: Arc<dyn EmbeddingScorer>) -> Self {
        Self {
            repository,
            scorer,
            cache: None,
        }
    }

    /// Reuse rankings through the navigation cache.
    pub fn with_cache(mut self, cache: Arc<NavigationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn rank(
        &self,
        request: &StrategyRequest<'_>,
        depth: usize,
    ) -> Result<CompassRanking, StrategyError> {
        let query = match &request.current.embedding {
            Some(embedding) => embedding.clone(),
            None => {
                self.scorer
                    .embed(&request.current.embedding_text())
                    .await?
            }
        };

        let filter = NodeFilter::excluding([request.current.id]).with_embedding();
        let pool = self
            .repository
            .list_eligible_nodes(request.scope, &filter)
            .await?;

        // The index may order ties differently, so it ranks the whole pool and
        // the cut at `depth` happens here.
        let mut scored: Vec<(Node, f64)> =
            match self.scorer.score_vector(&query, &pool, pool.len()).await? {
                Some(indexed) => indexed
                    .into_iter()
                    .map(|(node, score)| (node, f64::from(score)))
                    .collect(),
                None => pool
                    .into_iter()
                    .filter_map(|node| {
                        let score = cosine_similarity(&query, node.embedding.as_deref()?)?;
                        Some((node, f64::from(score)))
                    })
                    .collect(),
            };

        rank_by_score(&mut scored);
        scored.truncate(depth);

        Ok(CompassRanking {
            depth,
            entries: scored
                .into_iter()
                .map(|(node, score)| RankedNode {
                    id: node.id,
                    slug: node.slug,
                    score,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl CandidateStrategy for CompassStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Compass
    }

    async fn candidates(
        &self,
        request: &StrategyRequest<'_>,
        _rng: &mut StdRng,
    ) -> Result<Vec<Candidate>, StrategyError> {
        // Over-fetch so exclusions cannot starve the result
        let depth = request.limit + request.exclude.len();

        let key = self.cache.as_ref().map(|cache| {
            (
                cache,
                cache.compass_key(request.scope, &request.current.slug, request.preview),
            )
        });

        let cached = match &key {
            Some((cache, key)) => cache
                .get_compass(key)
                .await
                .filter(|ranking| ranking.covers(depth)),
            None => None,
        };

        let ranking = match cached {
            Some(ranking) => {
                debug!(node = %request.current.slug, "compass ranking from cache");
                ranking
            }
            None => {
                let ranking = self.rank(request, depth).await?;
                if let Some((cache, key)) = &key {
                    cache.put_compass(key, &ranking).await;
                }
                ranking
            }
        };

        let mut candidates = Vec::new();
        for entry in ranking.entries {
            if candidates.len() >= request.limit {
                break;
            }
            if request.exclude.contains(&entry.id) {
                continue;
            }
            if let Some(node) = self
                .repository
                .get_node_by_id(request.scope, entry.id)
                .await?
            {
                candidates.push(Candidate::new(node, StrategyKind::Compass, entry.score));
            }
        }
        Ok(candidates)
    }
}

/// Cosine similarity; `None` when dimensions differ, 0 for a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::cache::{InMemoryCacheStore, NavigationCache};
    use crate::config::NavigationConfig;
    use crate::preview::PreviewContext;
    use quest_model::ScopeId;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scorer without a vector index; counts embed calls.
    #[derive(Default)]
    struct PlainScorer {
        embeds: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingScorer for PlainScorer {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, StrategyError> {
            self.embeds.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }
    }

    /// Scorer with a vector index doing the same cosine math.
    struct IndexedScorer;

    #[async_trait]
    impl EmbeddingScorer for IndexedScorer {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, StrategyError> {
            Ok(vec![1.0, 0.0])
        }

        async fn score_vector(
            &self,
            query: &[f32],
            candidates: &[Node],
            limit: usize,
        ) -> Result<Option<Vec<(Node, f32)>>, StrategyError> {
            // Index breaks ties by id descending; the strategy re-ranks
            let mut scored: Vec<(Node, f32)> = candidates
                .iter()
                .filter_map(|n| {
                    let score = cosine_similarity(query, n.embedding.as_deref()?)?;
                    Some((n.clone(), score))
                })
                .collect();
            scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.id.cmp(&a.0.id)));
            scored.truncate(limit);
            Ok(Some(scored))
        }
    }

    struct DownScorer;

    #[async_trait]
    impl EmbeddingScorer for DownScorer {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, StrategyError> {
            Err(StrategyError::Embedding("connection refused".to_string()))
        }
    }

    fn content(scope: ScopeId) -> crate::content::ContentGraph {
        graph_with(
            scope,
            vec![
                node(1, "start"),
                node(2, "near").with_embedding(vec![0.9, 0.1]),
                node(3, "tie-b").with_embedding(vec![0.5, 0.5]),
                node(4, "far").with_embedding(vec![0.0, 1.0]),
                node(5, "tie-a").with_embedding(vec![0.5, 0.5]),
                node(6, "hidden")
                    .with_embedding(vec![1.0, 0.0])
                    .with_visibility(true, true, false),
                node(7, "no-vector"),
            ],
        )
    }

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), Some(1.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), Some(0.0));
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), Some(0.0));
    }

    #[tokio::test]
    async fn test_full_scan_ranking() {
        let scope = ScopeId::new();
        let graph = content(scope);
        let current = graph.node(scope, quest_model::NodeId::from_u128(1)).unwrap().clone();
        let scorer = Arc::new(PlainScorer::default());
        let strategy = CompassStrategy::new(Arc::new(graph), scorer.clone());
        let exclude = BTreeSet::new();
        let preview = PreviewContext::off();

        let found = strategy
            .candidates(&request(scope, &current, &exclude, &preview, 10), &mut rng())
            .await
            .unwrap();

        // Equal scores fall back to id order: tie-b (3) before tie-a (5)
        assert_eq!(slugs(&found), vec!["near", "tie-b", "tie-a", "far"]);
        assert_eq!(scorer.embeds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_indexed_and_full_scan_agree() {
        let scope = ScopeId::new();
        let graph = Arc::new(content(scope));
        let current = graph.node(scope, quest_model::NodeId::from_u128(1)).unwrap().clone();
        let exclude = BTreeSet::new();
        let preview = PreviewContext::off();

        let plain = CompassStrategy::new(graph.clone(), Arc::new(PlainScorer::default()));
        let indexed = CompassStrategy::new(graph.clone(), Arc::new(IndexedScorer));

        let a = plain
            .candidates(&request(scope, &current, &exclude, &preview, 3), &mut rng())
            .await
            .unwrap();
        let b = indexed
            .candidates(&request(scope, &current, &exclude, &preview, 3), &mut rng())
            .await
            .unwrap();

        assert_eq!(slugs(&a), slugs(&b));
        assert_eq!(slugs(&a), vec!["near", "tie-b", "tie-a"]);
    }

    #[tokio::test]
    async fn test_indexed_agrees_when_a_tie_straddles_the_limit() {
        let scope = ScopeId::new();
        let graph = Arc::new(content(scope));
        let current = graph.node(scope, quest_model::NodeId::from_u128(1)).unwrap().clone();
        let exclude = BTreeSet::new();
        let preview = PreviewContext::off();

        let plain = CompassStrategy::new(graph.clone(), Arc::new(PlainScorer::default()));
        let indexed = CompassStrategy::new(graph.clone(), Arc::new(IndexedScorer));

        let a = plain
            .candidates(&request(scope, &current, &exclude, &preview, 2), &mut rng())
            .await
            .unwrap();
        let b = indexed
            .candidates(&request(scope, &current, &exclude, &preview, 2), &mut rng())
            .await
            .unwrap();

        assert_eq!(slugs(&a), vec!["near", "tie-b"]);
        assert_eq!(slugs(&b), slugs(&a));
    }

    #[tokio::test]
    async fn test_stored_embedding_skips_embed_call() {
        let scope = ScopeId::new();
        let mut graph = content(scope);
        graph
            .add_node(scope, node(1, "start").with_embedding(vec![0.0, 1.0]))
            .unwrap();
        let current = graph.node(scope, quest_model::NodeId::from_u128(1)).unwrap().clone();
        let scorer = Arc::new(PlainScorer::default());
        let strategy = CompassStrategy::new(Arc::new(graph), scorer.clone());
        let exclude = BTreeSet::new();
        let preview = PreviewContext::off();

        let found = strategy
            .candidates(&request(scope, &current, &exclude, &preview, 1), &mut rng())
            .await
            .unwrap();

        assert_eq!(slugs(&found), vec!["far"]);
        assert_eq!(scorer.embeds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_error() {
        let scope = ScopeId::new();
        let graph = content(scope);
        let current = graph.node(scope, quest_model::NodeId::from_u128(1)).unwrap().clone();
        let strategy = CompassStrategy::new(Arc::new(graph), Arc::new(DownScorer));
        let exclude = BTreeSet::new();
        let preview = PreviewContext::off();

        let result = strategy
            .candidates(&request(scope, &current, &exclude, &preview, 3), &mut rng())
            .await;
        assert!(matches!(result, Err(StrategyError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_ranking_cached_and_exclusions_applied_after() {
        let scope = ScopeId::new();
        let graph = content(scope);
        let current = graph.node(scope, quest_model::NodeId::from_u128(1)).unwrap().clone();
        let scorer = Arc::new(PlainScorer::default());
        let cache = Arc::new(NavigationCache::new(
            Arc::new(InMemoryCacheStore::new()),
            &NavigationConfig::default(),
        ));
        let strategy =
            CompassStrategy::new(Arc::new(graph), scorer.clone()).with_cache(cache.clone());
        let preview = PreviewContext::off();

        let none = BTreeSet::new();
        let first = strategy
            .candidates(&request(scope, &current, &none, &preview, 2), &mut rng())
            .await
            .unwrap();
        assert_eq!(slugs(&first), vec!["near", "tie-b"]);

        let exclude: BTreeSet<_> = [quest_model::NodeId::from_u128(2)].into_iter().collect();
        let second = strategy
            .candidates(&request(scope, &current, &exclude, &preview, 1), &mut rng())
            .await
            .unwrap();
        assert_eq!(slugs(&second), vec!["tie-b"]);

        // Second call was served from the cached ranking
        assert_eq!(scorer.embeds.load(Ordering::SeqCst), 1);
    }
}
