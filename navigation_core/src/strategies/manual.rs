//! Manual strategy - authored transitions in authored (or weighted) order.

use async_trait::async_trait;
use rand::rngs::StdRng;
use std::sync::Arc;
use tracing::debug;

use super::{Candidate, CandidateStrategy, StrategyKind, StrategyRequest};
use crate::error::StrategyError;
use crate::repository::NodeRepository;

pub struct ManualStrategy {
    repository: Arc<dyn NodeRepository>,
    weighted: bool,
}

impl ManualStrategy {
    /// Follow authored transitions by position.
    pub fn new(repository: Arc<dyn NodeRepository>) -> Self {
        Self {
            repository,
            weighted: false,
        }
    }

    /// Order by transition weight (descending) instead of authored position.
    pub fn weighted(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }
}

#[async_trait]
impl CandidateStrategy for ManualStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Manual
    }

    async fn candidates(
        &self,
        request: &StrategyRequest<'_>,
        _rng: &mut StdRng,
    ) -> Result<Vec<Candidate>, StrategyError> {
        let mut transitions = self
            .repository
            .list_transitions(request.scope, request.current.id)
            .await?;

        // Both sorts are stable, so ties keep insertion order
        if self.weighted {
            transitions.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        } else {
            transitions.sort_by_key(|t| t.position);
        }

        let mut candidates = Vec::new();
        for transition in transitions {
            if candidates.len() >= request.limit {
                break;
            }
            if request.exclude.contains(&transition.to) {
                continue;
            }
            match self
                .repository
                .get_node_by_id(request.scope, transition.to)
                .await?
            {
                Some(node) => {
                    let weight = transition.weight;
                    candidates
                        .push(Candidate::new(node, StrategyKind::Manual, weight).via(transition));
                }
                None => {
                    debug!(
                        transition = %transition.id,
                        target = %transition.to,
                        "skipping dangling transition"
                    );
                }
            }
        }
        Ok(candidates)
    }
}
