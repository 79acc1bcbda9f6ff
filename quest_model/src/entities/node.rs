//! Node definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{NftRef, NodeId, Tag};

/// One narrative unit a reader can be positioned at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub slug: String,
    pub title: String,

    // Publication flags; all three must hold for the node to be offered
    pub visible: bool,
    pub public: bool,
    pub recommendable: bool,

    pub premium_only: bool,
    pub nft_required: Option<NftRef>,

    pub tags: BTreeSet<Tag>,

    /// Popularity score maintained by the content side.
    pub popularity: f64,

    /// Stored semantic embedding, when one has been computed.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl Node {
    /// Create a new published node with the given slug.
    pub fn new(slug: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            id: NodeId::new(),
            title: slug.clone(),
            slug,
            visible: true,
            public: true,
            recommendable: true,
            premium_only: false,
            nft_required: None,
            tags: BTreeSet::new(),
            popularity: 0.0,
            embedding: None,
        }
    }

    /// Use a fixed id instead of a random one.
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    /// Set the human-readable title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Add one normalized tag.
    pub fn with_tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Add several tags.
    pub fn with_tags<T: Into<Tag>>(mut self, tags: impl IntoIterator<Item = T>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Restrict the node to premium actors.
    pub fn premium(mut self) -> Self {
        self.premium_only = true;
        self
    }

    /// Restrict the node to holders of `nft`.
    pub fn with_nft(mut self, nft: NftRef) -> Self {
        self.nft_required = Some(nft);
        self
    }

    /// Set the three publication flags at once.
    pub fn with_visibility(mut self, visible: bool, public: bool, recommendable: bool) -> Self {
        self.visible = visible;
        self.public = public;
        self.recommendable = recommendable;
        self
    }

    /// Set the stored popularity signal.
    pub fn with_popularity(mut self, popularity: f64) -> Self {
        self.popularity = popularity;
        self
    }

    /// Store a precomputed embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Visible, public and recommendable: the precondition for being offered.
    pub fn is_eligible(&self) -> bool {
        self.visible && self.public && self.recommendable
    }

    /// Check for a tag.
    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    /// Text used to embed this node when no stored embedding exists.
    pub fn embedding_text(&self) -> String {
        let mut text = self.title.clone();
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag.as_str());
        }
        text
    }

    /// Lightweight reference carried in traces and cached payloads.
    pub fn to_ref(&self) -> NodeRef {
        NodeRef {
            id: self.id,
            slug: self.slug.clone(),
            title: self.title.clone(),
        }
    }
}

/// Identity of a node as it appears in routing output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: NodeId,
    pub slug: String,
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_is_eligible() {
        let node = Node::new("gate");
        assert!(node.is_eligible());
        assert!(!node.premium_only);
        assert_eq!(node.title, "gate");
    }

    #[test]
    fn test_any_flag_off_makes_ineligible() {
        assert!(!Node::new("a").with_visibility(false, true, true).is_eligible());
        assert!(!Node::new("b").with_visibility(true, false, true).is_eligible());
        assert!(!Node::new("c").with_visibility(true, true, false).is_eligible());
    }

    #[test]
    fn test_embedding_text_includes_tags() {
        let node = Node::new("mill")
            .with_title("The Old Mill")
            .with_tags(["River", "night"]);
        assert_eq!(node.embedding_text(), "The Old Mill night river");
    }
}
