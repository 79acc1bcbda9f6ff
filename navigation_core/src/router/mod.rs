//! Transition router - greedy first-accept selection with a decision trace.
//!
//! Per call: `Start -> Evaluating(strategy_i) -> Accepted | Exhausted`.
//!
//! 1. **Plan**: ask the composer which strategies to try for the mode
//! 2. **Fetch**: invoke one strategy, bounded by the strategy timeout
//! 3. **Evaluate**: run each candidate through the access policy, in order
//! 4. **Select**: the first accepted candidate wins and evaluation stops
//! 5. **Exhaust**: nothing accepted anywhere yields `NoRoute`

mod trace;

pub use trace::*;

use quest_model::{Actor, Node, NodeId, ScopeId};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::access::{AccessPolicy, RejectReason};
use crate::composer::{ModesComposer, NavigationMode};
use crate::config::NavigationConfig;
use crate::diversity::tag_entropy;
use crate::error::StrategyError;
use crate::preview::PreviewContext;
use crate::strategies::{Candidate, StrategyKind, StrategyRequest};

/// Inputs of one routing call.
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    pub scope: ScopeId,
    pub current: &'a Node,
    pub actor: Option<&'a Actor>,
    pub mode: NavigationMode,
    /// Previously visited nodes, kept out of algorithmic strategies.
    pub history: &'a BTreeSet<NodeId>,
    pub preview: &'a PreviewContext,
}

pub struct TransitionRouter {
    composer: Arc<ModesComposer>,
    policy: AccessPolicy,
    candidate_limit: usize,
    strategy_timeout: Duration,
}

impl TransitionRouter {
    /// Router with the timeout and candidate limit from `config`.
    pub fn new(
        composer: Arc<ModesComposer>,
        policy: AccessPolicy,
        config: &NavigationConfig,
    ) -> Self {
        Self {
            composer,
            policy,
            candidate_limit: config.candidate_limit,
            strategy_timeout: config.strategy_timeout(),
        }
    }

    /// The access policy applied to every candidate.
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Route once. Never fails: strategy failures become trace steps and an
    /// exhausted plan becomes `NoRoute`.
    pub async fn route(&self, request: &RouteRequest<'_>) -> RouteResult {
        let mut rng = request.preview.rng();
        let mut trace = Vec::new();
        let mut metrics = RouteMetrics::default();

        // Never offer the current node, never offer a node twice
        let mut offered = BTreeSet::from([request.current.id]);

        for &kind in self.composer.plan(request.mode) {
            metrics.evaluation_steps += 1;

            let mut exclude = offered.clone();
            if kind != StrategyKind::Manual {
                exclude.extend(request.history.iter().copied());
            }
            let strategy_request = StrategyRequest {
                scope: request.scope,
                current: request.current,
                actor: request.actor,
                limit: self.candidate_limit,
                exclude: &exclude,
                preview: request.preview,
            };

            let fetched = match tokio::time::timeout(
                self.strategy_timeout,
                self.composer.fetch(kind, &strategy_request, &mut rng),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(StrategyError::Timeout(self.strategy_timeout.as_millis() as u64)),
            };

            let candidates = match fetched {
                Ok(candidates) => candidates,
                Err(err) => {
                    warn!(
                        strategy = %kind,
                        node = %request.current.slug,
                        error = %err,
                        "strategy unavailable, degrading"
                    );
                    trace.push(TraceStep::strategy_outcome(
                        kind,
                        RejectReason::StrategyUnavailable,
                    ));
                    continue;
                }
            };

            let mut evaluated = false;
            for candidate in candidates {
                if !offered.insert(candidate.node.id) {
                    continue;
                }
                evaluated = true;
                metrics.candidates_evaluated += 1;
                metrics.evaluation_steps += 1;

                let transition = candidate.transition.as_ref().map(|t| t.id);
                match self.evaluate(&candidate, request).await {
                    Ok(()) => {
                        debug!(
                            strategy = %kind,
                            candidate = %candidate.node.slug,
                            "candidate accepted"
                        );
                        trace.push(TraceStep::accepted(kind, candidate.node.to_ref(), transition));
                        metrics.winning_strategy = Some(kind);
                        metrics.tag_entropy = tag_entropy(&candidate.node.tags);
                        return RouteResult::accepted(candidate.node.to_ref(), trace, metrics);
                    }
                    Err(reason) => {
                        debug!(
                            strategy = %kind,
                            candidate = %candidate.node.slug,
                            %reason,
                            "candidate rejected"
                        );
                        trace.push(TraceStep::rejected(
                            kind,
                            candidate.node.to_ref(),
                            transition,
                            reason,
                        ));
                    }
                }
            }

            if !evaluated {
                debug!(
                    strategy = %kind,
                    node = %request.current.slug,
                    "strategy produced no new candidates"
                );
                trace.push(TraceStep::strategy_outcome(kind, RejectReason::NoCandidate));
            }
        }

        debug!(node = %request.current.slug, mode = %request.mode, "no route");
        RouteResult::no_route(trace, metrics)
    }

    async fn evaluate(
        &self,
        candidate: &Candidate,
        request: &RouteRequest<'_>,
    ) -> Result<(), RejectReason> {
        self.policy
            .check_node(&candidate.node, request.actor, request.preview)
            .await?;
        if let Some(transition) = &candidate.transition {
            self.policy
                .check_transition(transition, request.actor, request.preview)
                .await?;
        }
        Ok(())
    }
}
