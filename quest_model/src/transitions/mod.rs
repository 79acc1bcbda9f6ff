//! Authored transitions between nodes and the conditions gating them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use crate::entities::TransitionId;
use crate::entities::{ModelError, NftRef, NodeId, Tag};

/// Conditions an actor must satisfy to take a transition. Every field is
/// checked independently and all must pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCondition {
    #[serde(default)]
    pub premium_required: bool,
    #[serde(default)]
    pub nft_required: Option<NftRef>,
    #[serde(default)]
    pub tags: BTreeSet<Tag>,
    #[serde(default)]
    pub cooldown_seconds: Option<u64>,
}

impl TransitionCondition {
    /// A condition that only premium actors pass.
    pub fn premium() -> Self {
        Self {
            premium_required: true,
            ..Default::default()
        }
    }

    /// A condition requiring every one of `tags` on the actor.
    pub fn requiring_tags<T: Into<Tag>>(tags: impl IntoIterator<Item = T>) -> Self {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Also require ownership of `nft`.
    pub fn with_nft(mut self, nft: NftRef) -> Self {
        self.nft_required = Some(nft);
        self
    }

    /// Also require `seconds` between two uses by the same actor.
    pub fn with_cooldown(mut self, seconds: u64) -> Self {
        self.cooldown_seconds = Some(seconds);
        self
    }

    /// No gate of any kind.
    pub fn is_open(&self) -> bool {
        !self.premium_required
            && self.nft_required.is_none()
            && self.tags.is_empty()
            && self.cooldown_seconds.is_none()
    }
}

/// An authored edge `from -> to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: TransitionId,
    pub from: NodeId,
    pub to: NodeId,
    /// Authored order among the transitions leaving `from`.
    pub position: u32,
    /// Used only when weighted manual ordering is enabled.
    pub weight: f64,
    pub condition: Option<TransitionCondition>,
}

impl Transition {
    /// Unconditional edge at position 0 with weight 1.
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self {
            id: TransitionId::new(),
            from,
            to,
            position: 0,
            weight: 1.0,
            condition: None,
        }
    }

    /// Use a fixed id instead of a random one.
    pub fn with_id(mut self, id: TransitionId) -> Self {
        self.id = id;
        self
    }

    /// Authored display order; lower comes first.
    pub fn with_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }

    /// Relative weight for weighted manual ordering.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Gate the edge behind `condition`.
    pub fn with_condition(mut self, condition: TransitionCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Rejects self-loops.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.from == self.to {
            return Err(ModelError::SelfLoop(self.id));
        }
        Ok(())
    }
}
