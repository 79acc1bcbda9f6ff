//! Random strategy - uniform draw without replacement.

use async_trait::async_trait;
use quest_model::Tag;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{Candidate, CandidateStrategy, StrategyKind, StrategyRequest};
use crate::error::StrategyError;
use crate::repository::{NodeFilter, NodeRepository};

pub struct RandomStrategy {
    repository: Arc<dyn NodeRepository>,
    tag_whitelist: BTreeSet<Tag>,
}

impl RandomStrategy {
    /// Draw from every eligible node in the scope.
    pub fn new(repository: Arc<dyn NodeRepository>) -> Self {
        Self {
            repository,
            tag_whitelist: BTreeSet::new(),
        }
    }

    /// Only draw nodes carrying at least one of these tags.
    pub fn with_tag_whitelist<T: Into<Tag>>(mut self, tags: impl IntoIterator<Item = T>) -> Self {
        self.tag_whitelist = tags.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl CandidateStrategy for RandomStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Random
    }

    async fn candidates(
        &self,
        request: &StrategyRequest<'_>,
        rng: &mut StdRng,
    ) -> Result<Vec<Candidate>, StrategyError> {
        let filter = NodeFilter::excluding(request.excluded_with_current())
            .with_any_tags(self.tag_whitelist.iter().cloned());
        // Listed in id order, so a seeded draw is reproducible
        let pool = self
            .repository
            .list_eligible_nodes(request.scope, &filter)
            .await?;
        if pool.is_empty() {
            return Ok(Vec::new());
        }

        let score = 1.0 / pool.len() as f64;
        Ok(pool
            .choose_multiple(rng, request.limit)
            .cloned()
            .map(|node| Candidate::new(node, StrategyKind::Random, score))
            .collect())
    }
}
