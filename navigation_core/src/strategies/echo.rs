//! Echo strategy - popularity by incoming echo events.

use async_trait::async_trait;
use quest_model::Node;
use rand::rngs::StdRng;
use std::sync::Arc;

use super::{rank_by_score, Candidate, CandidateStrategy, StrategyKind, StrategyRequest};
use crate::error::StrategyError;
use crate::repository::{EchoSource, NodeFilter, NodeRepository};

pub struct EchoStrategy {
    repository: Arc<dyn NodeRepository>,
    echoes: Arc<dyn EchoSource>,
}

impl EchoStrategy {
    /// Rank nodes in the repository by their `echoes` counts.
    pub fn new(repository: Arc<dyn NodeRepository>, echoes: Arc<dyn EchoSource>) -> Self {
        Self {
            repository,
            echoes,
        }
    }
}

#[async_trait]
impl CandidateStrategy for EchoStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Echo
    }

    async fn candidates(
        &self,
        request: &StrategyRequest<'_>,
        _rng: &mut StdRng,
    ) -> Result<Vec<Candidate>, StrategyError> {
        let filter = NodeFilter::excluding(request.excluded_with_current());
        let pool = self
            .repository
            .list_eligible_nodes(request.scope, &filter)
            .await?;

        let mut scored: Vec<(Node, f64)> = Vec::with_capacity(pool.len());
        for node in pool {
            let count = self.echoes.count_incoming(request.scope, node.id).await?;
            scored.push((node, count as f64));
        }

        rank_by_score(&mut scored);
        Ok(scored
            .into_iter()
            .take(request.limit)
            .map(|(node, score)| Candidate::new(node, StrategyKind::Echo, score))
            .collect())
    }
}
