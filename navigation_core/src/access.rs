//! Access policy - may this actor see a node or take a transition?
//!
//! Fails closed: anything not explicitly allowed is denied, including NFT
//! checks the ownership oracle cannot answer.

use chrono::{DateTime, Duration, Utc};
use quest_model::{Actor, NftRef, Node, Transition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::preview::{Clock, PreviewContext, PREMIUM_PLAN};
use crate::repository::NftOwnershipOracle;

/// Why a candidate was not taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NotVisible,
    PremiumRequired,
    NftRequired,
    TagMismatch,
    Cooldown,
    /// A strategy produced nothing.
    NoCandidate,
    /// A strategy failed or timed out.
    StrategyUnavailable,
}

impl RejectReason {
    /// Wire name, as used in traces.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NotVisible => "not_visible",
            RejectReason::PremiumRequired => "premium_required",
            RejectReason::NftRequired => "nft_required",
            RejectReason::TagMismatch => "tag_mismatch",
            RejectReason::Cooldown => "cooldown",
            RejectReason::NoCandidate => "no_candidate",
            RejectReason::StrategyUnavailable => "strategy_unavailable",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless access predicate over the state it is given.
#[derive(Clone)]
pub struct AccessPolicy {
    oracle: Arc<dyn NftOwnershipOracle>,
    clock: Arc<dyn Clock>,
}

impl AccessPolicy {
    /// Policy resolving NFTs through `oracle` and time through `clock`.
    pub fn new(oracle: Arc<dyn NftOwnershipOracle>, clock: Arc<dyn Clock>) -> Self {
        Self { oracle, clock }
    }

    /// The clock used when no preview time applies.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Whether `actor` may enter `node`.
    pub async fn can_access_node(
        &self,
        node: &Node,
        actor: Option<&Actor>,
        preview: &PreviewContext,
    ) -> bool {
        self.check_node(node, actor, preview).await.is_ok()
    }

    /// Whether `actor` may take `transition`.
    pub async fn can_use_transition(
        &self,
        transition: &Transition,
        actor: Option<&Actor>,
        preview: &PreviewContext,
    ) -> bool {
        self.check_transition(transition, actor, preview).await.is_ok()
    }

    /// Node-level check with the concrete reason on denial.
    pub async fn check_node(
        &self,
        node: &Node,
        actor: Option<&Actor>,
        preview: &PreviewContext,
    ) -> Result<(), RejectReason> {
        if !node.is_eligible() {
            return Err(RejectReason::NotVisible);
        }

        if node.premium_only {
            let now = preview.now(self.clock());
            if !node_premium(actor, preview, now) {
                return Err(RejectReason::PremiumRequired);
            }
        }

        if let Some(nft) = &node.nft_required {
            if !self.owns(actor, nft).await {
                return Err(RejectReason::NftRequired);
            }
        }

        Ok(())
    }

    /// Transition-level check. Each condition field is evaluated independently.
    pub async fn check_transition(
        &self,
        transition: &Transition,
        actor: Option<&Actor>,
        preview: &PreviewContext,
    ) -> Result<(), RejectReason> {
        let Some(condition) = &transition.condition else {
            return Ok(());
        };

        if condition.premium_required && !transition_premium(actor, preview) {
            return Err(RejectReason::PremiumRequired);
        }

        if let Some(nft) = &condition.nft_required {
            if !self.owns(actor, nft).await {
                return Err(RejectReason::NftRequired);
            }
        }

        if !condition.tags.is_empty() {
            let satisfied = actor.is_some_and(|a| a.has_tags(&condition.tags));
            if !satisfied {
                return Err(RejectReason::TagMismatch);
            }
        }

        if let (Some(cooldown), Some(actor)) = (condition.cooldown_seconds, actor) {
            if let Some(last) = actor.last_used(transition.id) {
                let now = preview.now(self.clock());
                let window = Duration::seconds(i64::try_from(cooldown).unwrap_or(i64::MAX));
                if now.signed_duration_since(last) < window {
                    return Err(RejectReason::Cooldown);
                }
            }
        }

        Ok(())
    }

    async fn owns(&self, actor: Option<&Actor>, nft: &NftRef) -> bool {
        let Some(actor) = actor else {
            return false;
        };
        match self.oracle.owns_nft(actor.id, nft).await {
            Ok(owned) => owned,
            Err(err) => {
                warn!(
                    actor = %actor.id,
                    nft = %nft,
                    error = %err,
                    "NFT ownership unresolved, denying"
                );
                false
            }
        }
    }
}

/// Premium for node access: a preview plan overrides reality, otherwise the
/// actor's premium flag and its expiry.
fn node_premium(actor: Option<&Actor>, preview: &PreviewContext, now: DateTime<Utc>) -> bool {
    match preview.plan_override() {
        Some(plan) => plan == PREMIUM_PLAN,
        None => actor.is_some_and(|a| a.is_premium_at(now)),
    }
}

/// Premium for transition conditions: the flag alone, `premium_until` is not
/// consulted (unlike node access).
fn transition_premium(actor: Option<&Actor>, preview: &PreviewContext) -> bool {
    match preview.plan_override() {
        Some(plan) => plan == PREMIUM_PLAN,
        None => actor.is_some_and(|a| a.is_premium),
    }
}
