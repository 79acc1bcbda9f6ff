//! Content Graph - scope-partitioned in-memory store of nodes and transitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use quest_model::{
    validate_slug, Actor, ActorId, ModelError, Node, NodeId, ScopeId, Tag, Transition,
    TransitionId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::RepositoryError;
use crate::repository::{
    ActorDirectory, EchoSource, NodeFilter, NodeRepository, TransitionUsageRecorder,
};

/// Content of one tenant.
#[derive(Debug, Clone, Default)]
struct ScopeContent {
    /// All nodes by ID; BTreeMap keeps listings in id order.
    nodes: BTreeMap<NodeId, Node>,

    /// Index: slug -> node.
    slug_index: HashMap<String, NodeId>,

    /// Index: Tag -> nodes carrying this tag.
    tag_index: HashMap<Tag, BTreeSet<NodeId>>,

    /// Outgoing transitions in insertion order (adjacency list).
    outgoing: HashMap<NodeId, Vec<Transition>>,

    actors: HashMap<ActorId, Actor>,
}

impl ScopeContent {
    fn unindex(&mut self, node: &Node) {
        self.slug_index.remove(&node.slug);
        for tag in &node.tags {
            if let Some(ids) = self.tag_index.get_mut(tag) {
                ids.remove(&node.id);
            }
        }
    }
}

/// The in-memory content store.
///
/// Nodes and transitions are loaded up front through `&mut self`; echo
/// counters and transition usage are written concurrently through `&self`.
#[derive(Debug, Default)]
pub struct ContentGraph {
    scopes: HashMap<ScopeId, ScopeContent>,

    /// Incoming echo events per node.
    echoes: DashMap<(ScopeId, NodeId), u64>,

    /// Recorded transition uses, merged into actors on lookup.
    usage: DashMap<(ScopeId, ActorId, TransitionId), DateTime<Utc>>,
}

impl ContentGraph {
    /// Create a new empty content graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node.
    pub fn add_node(&mut self, scope: ScopeId, node: Node) -> Result<NodeId, ModelError> {
        validate_slug(&node.slug)?;
        let content = self.scopes.entry(scope).or_default();

        if let Some(existing) = content.slug_index.get(&node.slug) {
            if *existing != node.id {
                return Err(ModelError::DuplicateSlug(node.slug.clone()));
            }
        }

        if let Some(previous) = content.nodes.remove(&node.id) {
            content.unindex(&previous);
        }

        let id = node.id;
        content.slug_index.insert(node.slug.clone(), id);
        for tag in &node.tags {
            content.tag_index.entry(tag.clone()).or_default().insert(id);
        }
        content.nodes.insert(id, node);
        Ok(id)
    }

    /// Remove a node together with every transition touching it.
    pub fn remove_node(&mut self, scope: ScopeId, id: NodeId) -> Option<Node> {
        let content = self.scopes.get_mut(&scope)?;
        let node = content.nodes.remove(&id)?;
        content.unindex(&node);

        content.outgoing.remove(&id);
        for transitions in content.outgoing.values_mut() {
            transitions.retain(|t| t.to != id);
        }
        self.echoes.remove(&(scope, id));
        Some(node)
    }

    /// Insert or replace an outgoing edge. Self-loops are rejected.
    pub fn add_transition(
        &mut self,
        scope: ScopeId,
        transition: Transition,
    ) -> Result<TransitionId, ModelError> {
        transition.validate()?;
        let id = transition.id;
        let outgoing = self
            .scopes
            .entry(scope)
            .or_default()
            .outgoing
            .entry(transition.from)
            .or_default();

        // Replace in place to keep insertion order stable
        match outgoing.iter_mut().find(|t| t.id == id) {
            Some(existing) => *existing = transition,
            None => outgoing.push(transition),
        }
        Ok(id)
    }

    /// Remove an edge, returning it if present.
    pub fn remove_transition(&mut self, scope: ScopeId, id: TransitionId) -> Option<Transition> {
        let content = self.scopes.get_mut(&scope)?;
        for transitions in content.outgoing.values_mut() {
            if let Some(pos) = transitions.iter().position(|t| t.id == id) {
                return Some(transitions.remove(pos));
            }
        }
        None
    }

    /// Insert or replace an actor.
    pub fn add_actor(&mut self, scope: ScopeId, actor: Actor) -> ActorId {
        let id = actor.id;
        self.scopes.entry(scope).or_default().actors.insert(id, actor);
        id
    }

    /// Count one incoming echo event for `node`.
    pub fn record_echo(&self, scope: ScopeId, node: NodeId) {
        *self.echoes.entry((scope, node)).or_default() += 1;
    }

    /// Look up a node by id.
    pub fn node(&self, scope: ScopeId, id: NodeId) -> Option<&Node> {
        self.scopes.get(&scope)?.nodes.get(&id)
    }

    /// Look up a node by slug.
    pub fn node_by_slug(&self, scope: ScopeId, slug: &str) -> Option<&Node> {
        let content = self.scopes.get(&scope)?;
        content
            .slug_index
            .get(slug)
            .and_then(|id| content.nodes.get(id))
    }

    /// Get all nodes carrying a tag.
    pub fn nodes_by_tag(&self, scope: ScopeId, tag: &Tag) -> Vec<&Node> {
        self.scopes
            .get(&scope)
            .and_then(|content| {
                content
                    .tag_index
                    .get(tag)
                    .map(|ids| ids.iter().filter_map(|id| content.nodes.get(id)).collect())
            })
            .unwrap_or_default()
    }

    /// Number of nodes in a scope.
    pub fn node_count(&self, scope: ScopeId) -> usize {
        self.scopes.get(&scope).map_or(0, |c| c.nodes.len())
    }

    /// Number of authored edges in a scope.
    pub fn transition_count(&self, scope: ScopeId) -> usize {
        self.scopes
            .get(&scope)
            .map_or(0, |c| c.outgoing.values().map(Vec::len).sum())
    }

    fn eligible_nodes(&self, scope: ScopeId, filter: &NodeFilter) -> Vec<Node> {
        let Some(content) = self.scopes.get(&scope) else {
            return Vec::new();
        };

        if filter.any_tags.is_empty() {
            return content
                .nodes
                .values()
                .filter(|node| filter.matches(node))
                .cloned()
                .collect();
        }

        // Narrow through the tag index first
        let ids: BTreeSet<NodeId> = filter
            .any_tags
            .iter()
            .filter_map(|tag| content.tag_index.get(tag))
            .flatten()
            .copied()
            .collect();
        ids.iter()
            .filter_map(|id| content.nodes.get(id))
            .filter(|node| filter.matches(node))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NodeRepository for ContentGraph {
    async fn get_node(&self, scope: ScopeId, slug: &str) -> Result<Option<Node>, RepositoryError> {
        Ok(self.node_by_slug(scope, slug).cloned())
    }

    async fn get_node_by_id(
        &self,
        scope: ScopeId,
        id: NodeId,
    ) -> Result<Option<Node>, RepositoryError> {
        Ok(self.node(scope, id).cloned())
    }

    async fn list_eligible_nodes(
        &self,
        scope: ScopeId,
        filter: &NodeFilter,
    ) -> Result<Vec<Node>, RepositoryError> {
        Ok(self.eligible_nodes(scope, filter))
    }

    async fn list_transitions(
        &self,
        scope: ScopeId,
        from: NodeId,
    ) -> Result<Vec<Transition>, RepositoryError> {
        Ok(self
            .scopes
            .get(&scope)
            .and_then(|content| content.outgoing.get(&from))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ActorDirectory for ContentGraph {
    async fn get_actor(
        &self,
        scope: ScopeId,
        id: ActorId,
    ) -> Result<Option<Actor>, RepositoryError> {
        let Some(mut actor) = self
            .scopes
            .get(&scope)
            .and_then(|content| content.actors.get(&id))
            .cloned()
        else {
            return Ok(None);
        };

        for entry in self.usage.iter() {
            let (entry_scope, actor_id, transition) = *entry.key();
            if entry_scope == scope && actor_id == id {
                let at = *entry.value();
                let last = actor.transition_uses.entry(transition).or_insert(at);
                if *last < at {
                    *last = at;
                }
            }
        }
        Ok(Some(actor))
    }
}

#[async_trait]
impl EchoSource for ContentGraph {
    async fn count_incoming(&self, scope: ScopeId, node: NodeId) -> Result<u64, RepositoryError> {
        Ok(self.echoes.get(&(scope, node)).map_or(0, |count| *count))
    }
}

#[async_trait]
impl TransitionUsageRecorder for ContentGraph {
    async fn record_use(
        &self,
        scope: ScopeId,
        actor: ActorId,
        transition: TransitionId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.usage.insert((scope, actor, transition), at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get_node() {
        let scope = ScopeId::new();
        let mut graph = ContentGraph::new();

        let id = graph.add_node(scope, Node::new("mill").with_tag("river")).unwrap();

        assert_eq!(graph.node(scope, id).unwrap().slug, "mill");
        assert_eq!(graph.node_by_slug(scope, "mill").unwrap().id, id);
        assert!(graph.node_by_slug(ScopeId::new(), "mill").is_none());
    }

    #[test]
    fn test_duplicate_slug_rejected() {
        let scope = ScopeId::new();
        let mut graph = ContentGraph::new();
        graph.add_node(scope, Node::new("mill")).unwrap();

        let result = graph.add_node(scope, Node::new("mill"));
        assert_eq!(result, Err(ModelError::DuplicateSlug("mill".to_string())));
    }

    #[test]
    fn test_replace_node_reindexes_tags() {
        let scope = ScopeId::new();
        let mut graph = ContentGraph::new();
        let node = Node::new("mill").with_tag("river");
        let id = graph.add_node(scope, node.clone()).unwrap();

        graph
            .add_node(scope, Node::new("mill").with_id(id).with_tag("night"))
            .unwrap();

        assert!(graph.nodes_by_tag(scope, &Tag::new("river")).is_empty());
        assert_eq!(graph.nodes_by_tag(scope, &Tag::new("night")).len(), 1);
    }

    #[test]
    fn test_remove_node_drops_transitions() {
        let scope = ScopeId::new();
        let mut graph = ContentGraph::new();
        let a = graph.add_node(scope, Node::new("a")).unwrap();
        let b = graph.add_node(scope, Node::new("b")).unwrap();
        graph.add_transition(scope, Transition::new(a, b)).unwrap();
        graph.add_transition(scope, Transition::new(b, a)).unwrap();
        assert_eq!(graph.transition_count(scope), 2);

        let removed = graph.remove_node(scope, b);
        assert!(removed.is_some());
        assert_eq!(graph.transition_count(scope), 0);
        assert_eq!(graph.node_count(scope), 1);
    }

    #[tokio::test]
    async fn test_list_eligible_is_id_ordered_and_filtered() {
        let scope = ScopeId::new();
        let mut graph = ContentGraph::new();
        graph
            .add_node(scope, Node::new("z").with_id(NodeId::from_u128(3)).with_tag("forest"))
            .unwrap();
        graph
            .add_node(scope, Node::new("y").with_id(NodeId::from_u128(1)).with_tag("forest"))
            .unwrap();
        graph
            .add_node(
                scope,
                Node::new("x")
                    .with_id(NodeId::from_u128(2))
                    .with_tag("forest")
                    .with_visibility(true, false, true),
            )
            .unwrap();
        graph
            .add_node(scope, Node::new("w").with_id(NodeId::from_u128(4)))
            .unwrap();

        let all = graph
            .list_eligible_nodes(scope, &NodeFilter::default())
            .await
            .unwrap();
        let slugs: Vec<_> = all.iter().map(|n| n.slug.as_str()).collect();
        assert_eq!(slugs, vec!["y", "z", "w"]);

        let forest = graph
            .list_eligible_nodes(scope, &NodeFilter::default().with_any_tags([Tag::new("forest")]))
            .await
            .unwrap();
        let slugs: Vec<_> = forest.iter().map(|n| n.slug.as_str()).collect();
        assert_eq!(slugs, vec!["y", "z"]);
    }

    #[tokio::test]
    async fn test_transitions_keep_insertion_order() {
        let scope = ScopeId::new();
        let mut graph = ContentGraph::new();
        let a = graph.add_node(scope, Node::new("a")).unwrap();
        let b = graph.add_node(scope, Node::new("b")).unwrap();
        let c = graph.add_node(scope, Node::new("c")).unwrap();
        graph.add_transition(scope, Transition::new(a, c)).unwrap();
        graph.add_transition(scope, Transition::new(a, b)).unwrap();

        let targets: Vec<_> = graph
            .list_transitions(scope, a)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.to)
            .collect();
        assert_eq!(targets, vec![c, b]);
    }

    #[tokio::test]
    async fn test_echo_counts() {
        let scope = ScopeId::new();
        let mut graph = ContentGraph::new();
        let a = graph.add_node(scope, Node::new("a")).unwrap();

        graph.record_echo(scope, a);
        graph.record_echo(scope, a);

        assert_eq!(graph.count_incoming(scope, a).await.unwrap(), 2);
        assert_eq!(graph.count_incoming(scope, NodeId::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recorded_usage_visible_on_actor() {
        let scope = ScopeId::new();
        let mut graph = ContentGraph::new();
        let actor = graph.add_actor(scope, Actor::new());
        let transition = TransitionId::new();
        let at = Utc::now();

        graph.record_use(scope, actor, transition, at).await.unwrap();

        let loaded = graph.get_actor(scope, actor).await.unwrap().unwrap();
        assert_eq!(loaded.last_used(transition), Some(at));
        assert!(graph.get_actor(scope, ActorId::new()).await.unwrap().is_none());
    }
}
