//! Decision trace and routing result.

use quest_model::{NodeRef, TransitionId};
use serde::{Deserialize, Serialize};

use crate::access::RejectReason;
use crate::strategies::StrategyKind;

/// One candidate evaluation (or one strategy that produced nothing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub strategy: StrategyKind,
    /// `None` for `no_candidate` and `strategy_unavailable` steps.
    pub candidate: Option<NodeRef>,
    /// Transition the candidate is reached through, for manual candidates.
    pub transition: Option<TransitionId>,
    pub accepted: bool,
    pub reject_reason: Option<RejectReason>,
}

impl TraceStep {
    /// A candidate that passed access checks.
    pub fn accepted(
        strategy: StrategyKind,
        candidate: NodeRef,
        transition: Option<TransitionId>,
    ) -> Self {
        Self {
            strategy,
            candidate: Some(candidate),
            transition,
            accepted: true,
            reject_reason: None,
        }
    }

    /// A candidate refused by the access policy.
    pub fn rejected(
        strategy: StrategyKind,
        candidate: NodeRef,
        transition: Option<TransitionId>,
        reason: RejectReason,
    ) -> Self {
        Self {
            strategy,
            candidate: Some(candidate),
            transition,
            accepted: false,
            reject_reason: Some(reason),
        }
    }

    /// A strategy-level outcome with no candidate attached.
    pub fn strategy_outcome(strategy: StrategyKind, reason: RejectReason) -> Self {
        Self {
            strategy,
            candidate: None,
            transition: None,
            accepted: false,
            reject_reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// Every attempted strategy was exhausted without an accepted candidate.
    NoRoute,
}

/// Counters describing one routing call. Evaluation counts stand in for
/// wall-clock time so preview traces stay deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub winning_strategy: Option<StrategyKind>,
    /// Candidates passed through the access policy.
    pub candidates_evaluated: usize,
    /// Strategy invocations plus candidate evaluations.
    pub evaluation_steps: usize,
    /// Shannon entropy (bits) of the chosen node's tags.
    pub tag_entropy: f64,
}

/// Outcome of one routing call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    next_node: Option<NodeRef>,
    reason: Option<RouteReason>,
    trace: Vec<TraceStep>,
    metrics: RouteMetrics,
}

impl RouteResult {
    pub(crate) fn accepted(
        next_node: NodeRef,
        trace: Vec<TraceStep>,
        metrics: RouteMetrics,
    ) -> Self {
        Self {
            next_node: Some(next_node),
            reason: None,
            trace,
            metrics,
        }
    }

    pub(crate) fn no_route(trace: Vec<TraceStep>, metrics: RouteMetrics) -> Self {
        Self {
            next_node: None,
            reason: Some(RouteReason::NoRoute),
            trace,
            metrics,
        }
    }

    /// The node to move to; `None` for a no-route result.
    pub fn next_node(&self) -> Option<&NodeRef> {
        self.next_node.as_ref()
    }

    /// Why no node was chosen.
    pub fn reason(&self) -> Option<RouteReason> {
        self.reason
    }

    /// Whether every strategy came up empty.
    pub fn is_no_route(&self) -> bool {
        self.reason == Some(RouteReason::NoRoute)
    }

    /// Every step in evaluation order.
    pub fn trace(&self) -> &[TraceStep] {
        &self.trace
    }

    /// Counters and the winning strategy.
    pub fn metrics(&self) -> &RouteMetrics {
        &self.metrics
    }

    /// The step that produced `next_node`.
    pub fn accepted_step(&self) -> Option<&TraceStep> {
        self.trace.iter().find(|step| step.accepted)
    }

    /// Whether this result mentions `slug` as destination or evaluated candidate.
    pub fn references(&self, slug: &str) -> bool {
        self.next_node.as_ref().is_some_and(|n| n.slug == slug)
            || self
                .trace
                .iter()
                .filter_map(|step| step.candidate.as_ref())
                .any(|candidate| candidate.slug == slug)
    }
}
