//! Actor definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::{ActorId, Tag};
use crate::transitions::TransitionId;

/// A reader (or operator) asking where to go next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub is_premium: bool,
    /// None = premium without expiry.
    pub premium_until: Option<DateTime<Utc>>,
    pub role: Option<String>,
    pub tags: BTreeSet<Tag>,

    /// Last time each transition was taken, consulted by cooldown checks.
    #[serde(default)]
    pub transition_uses: HashMap<TransitionId, DateTime<Utc>>,
}

impl Actor {
    /// Create a new non-premium actor.
    pub fn new() -> Self {
        Self::with_id(ActorId::new())
    }

    /// Create a non-premium actor with a known id.
    pub fn with_id(id: ActorId) -> Self {
        Self {
            id,
            is_premium: false,
            premium_until: None,
            role: None,
            tags: BTreeSet::new(),
            transition_uses: HashMap::new(),
        }
    }

    /// Grant premium, optionally expiring at `until`.
    pub fn premium(mut self, until: Option<DateTime<Utc>>) -> Self {
        self.is_premium = true;
        self.premium_until = until;
        self
    }

    /// Set the actor's role name.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Add one normalized tag.
    pub fn with_tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Record a past use of `transition` at `at`.
    pub fn with_transition_use(mut self, transition: TransitionId, at: DateTime<Utc>) -> Self {
        self.transition_uses.insert(transition, at);
        self
    }

    /// Premium status at `now`, honoring `premium_until`.
    pub fn is_premium_at(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.premium_until.map_or(true, |until| until > now)
    }

    /// When the actor last used `transition`, if ever.
    pub fn last_used(&self, transition: TransitionId) -> Option<DateTime<Utc>> {
        self.transition_uses.get(&transition).copied()
    }

    /// Whether the actor carries every one of `required`.
    pub fn has_tags<'a>(&self, required: impl IntoIterator<Item = &'a Tag>) -> bool {
        required.into_iter().all(|tag| self.tags.contains(tag))
    }
}

impl Default for Actor {
    fn default() -> Self {
        Self::new()
    }
}
