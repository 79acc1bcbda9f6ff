//! Candidate strategies - independent producers of next-node candidates.
//!
//! - **Manual**: authored transitions leaving the current node
//! - **Compass**: semantic similarity to the current node
//! - **Echo**: popularity by incoming echo events
//! - **Random**: uniform draw, the last resort
//!
//! A strategy that finds nothing returns an empty list. Errors mean the
//! strategy could not answer at all.

mod compass;
mod echo;
mod manual;
mod random;

pub use compass::*;
pub use echo::*;
pub use manual::*;
pub use random::*;

use async_trait::async_trait;
use quest_model::{Actor, Node, NodeId, ScopeId, Transition};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::StrategyError;
use crate::preview::PreviewContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Manual,
    Compass,
    Echo,
    Random,
}

impl StrategyKind {
    /// Wire name, as used in traces and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Manual => "manual",
            StrategyKind::Compass => "compass",
            StrategyKind::Echo => "echo",
            StrategyKind::Random => "random",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A possible next node. Lives for one routing call only.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub node: Node,
    /// Display label offered to the reader.
    pub label: String,
    pub strategy: StrategyKind,
    pub score: f64,
    /// Set when the node is reached through an authored transition.
    pub transition: Option<Transition>,
}

impl Candidate {
    /// A candidate with no transition attached.
    pub fn new(node: Node, strategy: StrategyKind, score: f64) -> Self {
        Self {
            label: node.title.clone(),
            node,
            strategy,
            score,
            transition: None,
        }
    }

    /// Attach the authored transition that leads to this candidate.
    pub fn via(mut self, transition: Transition) -> Self {
        self.transition = Some(transition);
        self
    }
}

/// Inputs shared by every strategy for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct StrategyRequest<'a> {
    pub scope: ScopeId,
    pub current: &'a Node,
    pub actor: Option<&'a Actor>,
    pub limit: usize,
    /// Nodes that must not be offered (already offered, or already visited).
    pub exclude: &'a BTreeSet<NodeId>,
    pub preview: &'a PreviewContext,
}

impl StrategyRequest<'_> {
    /// Exclusion set including the current node.
    pub fn excluded_with_current(&self) -> BTreeSet<NodeId> {
        let mut excluded = self.exclude.clone();
        excluded.insert(self.current.id);
        excluded
    }
}

#[async_trait]
pub trait CandidateStrategy: Send + Sync {
    /// Which slot of the mode plan this strategy fills.
    fn kind(&self) -> StrategyKind;

    /// Candidates in the order they should be evaluated. `rng` is the
    /// routing call's random source.
    async fn candidates(
        &self,
        request: &StrategyRequest<'_>,
        rng: &mut StdRng,
    ) -> Result<Vec<Candidate>, StrategyError>;
}

/// Rank by score descending, ties by node id ascending.
pub(crate) fn rank_by_score(scored: &mut [(Node, f64)]) {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_by_score_breaks_ties_by_id() {
        let a = Node::new("a").with_id(NodeId::from_u128(2));
        let b = Node::new("b").with_id(NodeId::from_u128(1));
        let c = Node::new("c").with_id(NodeId::from_u128(3));
        let mut scored = vec![(a, 0.5), (c, 0.9), (b, 0.5)];

        rank_by_score(&mut scored);

        let order: Vec<_> = scored.iter().map(|(n, _)| n.slug.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_candidate_label_defaults_to_title() {
        let candidate = Candidate::new(
            Node::new("mill").with_title("The Old Mill"),
            StrategyKind::Echo,
            3.0,
        );
        assert_eq!(candidate.label, "The Old Mill");
        assert!(candidate.transition.is_none());
    }
}
