//! Collaborator contracts consumed by the engine.
//!
//! Persistence, embeddings, popularity, NFT ownership and usage bookkeeping
//! live outside the engine. Each is a narrow async trait so the engine can be
//! driven by a database in production and by in-memory fixtures in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quest_model::{Actor, ActorId, NftRef, Node, NodeId, ScopeId, Tag, Transition, TransitionId};
use std::collections::BTreeSet;

use crate::error::{OracleError, RepositoryError, StrategyError};

/// Narrowing applied to eligible-node listings. Eligibility itself
/// (visible, public, recommendable) is always enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub exclude: BTreeSet<NodeId>,
    /// When non-empty, nodes must carry at least one of these tags.
    pub any_tags: BTreeSet<Tag>,
    pub require_embedding: bool,
}

impl NodeFilter {
    /// Eligible nodes except `exclude`.
    pub fn excluding(exclude: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            exclude: exclude.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Keep only nodes carrying at least one of `tags`.
    pub fn with_any_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.any_tags.extend(tags);
        self
    }

    /// Keep only nodes with a stored embedding.
    pub fn with_embedding(mut self) -> Self {
        self.require_embedding = true;
        self
    }

    /// Whether `node` passes every filter, eligibility included.
    pub fn matches(&self, node: &Node) -> bool {
        node.is_eligible()
            && !self.exclude.contains(&node.id)
            && (self.any_tags.is_empty() || node.tags.iter().any(|t| self.any_tags.contains(t)))
            && (!self.require_embedding || node.embedding.is_some())
    }
}

/// Read-only node and transition lookups.
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// Node by slug, eligible or not.
    async fn get_node(&self, scope: ScopeId, slug: &str) -> Result<Option<Node>, RepositoryError>;

    /// Node by id, eligible or not.
    async fn get_node_by_id(
        &self,
        scope: ScopeId,
        id: NodeId,
    ) -> Result<Option<Node>, RepositoryError>;

    /// Eligible nodes matching `filter`, ordered by id ascending.
    async fn list_eligible_nodes(
        &self,
        scope: ScopeId,
        filter: &NodeFilter,
    ) -> Result<Vec<Node>, RepositoryError>;

    /// Transitions leaving `from`, in insertion order.
    async fn list_transitions(
        &self,
        scope: ScopeId,
        from: NodeId,
    ) -> Result<Vec<Transition>, RepositoryError>;
}

/// Actor lookups for simulations run on behalf of a real user.
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    /// `Ok(None)` when the actor is unknown in `scope`.
    async fn get_actor(&self, scope: ScopeId, id: ActorId)
        -> Result<Option<Actor>, RepositoryError>;
}

/// Semantic embedding service.
#[async_trait]
pub trait EmbeddingScorer: Send + Sync {
    /// Embed free text into the same space as stored node vectors.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StrategyError>;

    /// Rank `candidates` through a dedicated vector index. `Ok(None)` means
    /// no index exists and the caller ranks in memory.
    async fn score_vector(
        &self,
        _query: &[f32],
        _candidates: &[Node],
        _limit: usize,
    ) -> Result<Option<Vec<(Node, f32)>>, StrategyError> {
        Ok(None)
    }
}

/// Popularity signal: incoming "echo" events per node.
#[async_trait]
pub trait EchoSource: Send + Sync {
    /// Echo events recorded against `node`.
    async fn count_incoming(&self, scope: ScopeId, node: NodeId) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait NftOwnershipOracle: Send + Sync {
    /// Whether `actor` currently holds `nft`.
    async fn owns_nft(&self, actor: ActorId, nft: &NftRef) -> Result<bool, OracleError>;
}

/// Persists transition usage so later cooldown checks can see it.
#[async_trait]
pub trait TransitionUsageRecorder: Send + Sync {
    /// Remember that `actor` took `transition` at `at`.
    async fn record_use(
        &self,
        scope: ScopeId,
        actor: ActorId,
        transition: TransitionId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}
