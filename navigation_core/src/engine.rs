//! Navigation engine facade.
//!
//! Wires collaborators, cache, composer and router together and exposes the
//! three call shapes used by outer layers:
//!
//! - [`NavigationEngine::generate_transitions`]: production routing
//! - [`NavigationEngine::simulate_transitions`]: seeded, side-effect-free preview
//! - [`NavigationEngine::invalidate_cache`]: explicit cache invalidation
//!
//! Per routing call: cache lookup, router on miss, usage bookkeeping, cache
//! write last so a cancelled call never leaves a partial entry.

use quest_model::{Actor, ActorId, Node, NodeId, ScopeId, TransitionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::access::{AccessPolicy, RejectReason};
use crate::cache::{CacheStore, NavigationCache};
use crate::composer::{ModesComposer, NavigationMode};
use crate::config::NavigationConfig;
use crate::diversity::DiversityReport;
use crate::error::NavigationError;
use crate::preview::{Clock, PreviewContext, PreviewMode, PreviewOptions, SystemClock};
use crate::repository::{
    ActorDirectory, EchoSource, EmbeddingScorer, NftOwnershipOracle, NodeRepository,
    TransitionUsageRecorder,
};
use crate::router::{RouteRequest, RouteResult, TransitionRouter};

/// Input of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub scope: ScopeId,
    pub start_node: String,
    /// Falls back to the configured default mode.
    pub mode: Option<NavigationMode>,
    /// Slugs already visited; kept out of algorithmic strategies.
    #[serde(default)]
    pub history: Vec<String>,
    /// Simulate on behalf of a real actor.
    pub actor_id: Option<ActorId>,
    #[serde(default)]
    pub preview_mode: PreviewMode,
    /// Overrides; only the seed is honored when `preview_mode` is off.
    #[serde(default)]
    pub preview: PreviewOptions,
}

impl SimulationRequest {
    /// Simulate from `start_node` with the default mode and preview off.
    pub fn new(scope: ScopeId, start_node: impl Into<String>) -> Self {
        Self {
            scope,
            start_node: start_node.into(),
            mode: None,
            history: Vec::new(),
            actor_id: None,
            preview_mode: PreviewMode::Off,
            preview: PreviewOptions::default(),
        }
    }

    /// Route with `mode` instead of the configured default.
    pub fn with_mode(mut self, mode: NavigationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Slugs already visited on this path.
    pub fn with_history<S: Into<String>>(mut self, history: impl IntoIterator<Item = S>) -> Self {
        self.history.extend(history.into_iter().map(Into::into));
        self
    }

    /// Simulate as this actor.
    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor_id = Some(actor);
        self
    }

    /// Fix the seed so the run replays.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.preview.seed = Some(seed);
        self
    }

    /// Turn preview mode on with the given overrides.
    pub fn with_preview(mut self, options: PreviewOptions) -> Self {
        self.preview_mode = PreviewMode::On;
        self.preview = options;
        self
    }

    /// The context a simulation runs under. Simulations are always seeded
    /// and always isolated; with preview off no clock, plan or role
    /// override applies.
    fn preview_context(&self) -> PreviewContext {
        match self.preview_mode {
            PreviewMode::On => PreviewContext::on(self.preview.clone()),
            PreviewMode::Off => PreviewContext::on(PreviewOptions {
                seed: self.preview.seed,
                ..Default::default()
            }),
        }
    }
}

/// A simulated route plus the seed that reproduces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    #[serde(flatten)]
    pub route: RouteResult,
    pub seed: u64,
}

/// Outcome of a multi-step simulated walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkReport {
    pub seed: u64,
    pub steps: Vec<RouteResult>,
    pub diversity: DiversityReport,
}

impl WalkReport {
    /// Slugs visited after the start node, in order.
    pub fn path(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|step| step.next_node())
            .map(|node| node.slug.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationTarget {
    Node(String),
    User(ActorId),
    All,
}

/// Everything a simulation needs, resolved up front.
struct Simulation {
    preview: PreviewContext,
    seed: u64,
    current: Node,
    actor: Option<Actor>,
    history: BTreeSet<NodeId>,
    mode: NavigationMode,
}

pub struct NavigationEngine {
    repository: Arc<dyn NodeRepository>,
    actors: Option<Arc<dyn ActorDirectory>>,
    usage: Option<Arc<dyn TransitionUsageRecorder>>,
    cache: Arc<NavigationCache>,
    router: TransitionRouter,
    clock: Arc<dyn Clock>,
    config: NavigationConfig,
}

impl NavigationEngine {
    /// Start a builder with the required collaborators.
    pub fn builder(
        repository: Arc<dyn NodeRepository>,
        scorer: Arc<dyn EmbeddingScorer>,
        echoes: Arc<dyn EchoSource>,
        oracle: Arc<dyn NftOwnershipOracle>,
        store: Arc<dyn CacheStore>,
    ) -> NavigationEngineBuilder {
        NavigationEngineBuilder {
            repository,
            scorer,
            echoes,
            oracle,
            store,
            config: NavigationConfig::default(),
            clock: Arc::new(SystemClock),
            actors: None,
            usage: None,
        }
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    /// The shared navigation cache.
    pub fn cache(&self) -> &Arc<NavigationCache> {
        &self.cache
    }

    /// The access policy used by the router.
    pub fn policy(&self) -> &AccessPolicy {
        self.router.policy()
    }

    /// Production routing from `node_slug` in the configured default mode.
    pub async fn generate_transitions(
        &self,
        scope: ScopeId,
        node_slug: &str,
        actor: Option<&Actor>,
    ) -> Result<RouteResult, NavigationError> {
        let current = self.resolve_node(scope, node_slug).await?;
        let preview = PreviewContext::off();
        Ok(self
            .route(
                scope,
                &current,
                actor,
                self.config.default_mode,
                &BTreeSet::new(),
                &preview,
            )
            .await)
    }

    /// Seeded preview routing. Never writes production cache entries and
    /// never records transition usage.
    pub async fn simulate_transitions(
        &self,
        request: &SimulationRequest,
    ) -> Result<SimulationResult, NavigationError> {
        let sim = self.prepare(request).await?;
        let route = self
            .route(
                request.scope,
                &sim.current,
                sim.actor.as_ref(),
                sim.mode,
                &sim.history,
                &sim.preview,
            )
            .await;
        Ok(SimulationResult {
            route,
            seed: sim.seed,
        })
    }

    /// Follow accepted routes for up to `steps` hops. Each hop is seeded
    /// with `seed + i` and every visited node joins the history.
    pub async fn simulate_walk(
        &self,
        request: &SimulationRequest,
        steps: usize,
    ) -> Result<WalkReport, NavigationError> {
        let Simulation {
            preview,
            seed,
            mut current,
            actor,
            mut history,
            mode,
        } = self.prepare(request).await?;

        let mut results = Vec::with_capacity(steps);
        for step in 0..steps {
            let step_preview = preview.reseeded(seed.wrapping_add(step as u64));
            let route = self
                .route(
                    request.scope,
                    &current,
                    actor.as_ref(),
                    mode,
                    &history,
                    &step_preview,
                )
                .await;

            let next = route.next_node().cloned();
            results.push(route);
            let Some(next) = next else {
                break;
            };

            history.insert(current.id);
            current = self.resolve_node(request.scope, &next.slug).await?;
        }

        Ok(WalkReport {
            seed,
            diversity: DiversityReport::from_results(&results),
            steps: results,
        })
    }

    /// Returns how many entries were removed. Idempotent.
    pub async fn invalidate_cache(
        &self,
        scope: ScopeId,
        target: &InvalidationTarget,
    ) -> Result<usize, NavigationError> {
        let removed = match target {
            InvalidationTarget::Node(slug) => self.cache.invalidate_by_node(scope, slug).await?,
            InvalidationTarget::User(actor) => self.cache.invalidate_by_user(*actor).await?,
            InvalidationTarget::All => self.cache.invalidate_all(scope).await?,
        };
        Ok(removed)
    }

    async fn prepare(&self, request: &SimulationRequest) -> Result<Simulation, NavigationError> {
        let preview = request.preview_context();
        let seed = preview.seed().unwrap_or_default();
        let current = self.resolve_node(request.scope, &request.start_node).await?;

        let actor = match request.actor_id {
            Some(id) => Some(self.resolve_actor(request.scope, id).await?),
            None => None,
        };

        let mut history = BTreeSet::new();
        for slug in &request.history {
            match self.repository.get_node(request.scope, slug).await? {
                Some(node) => {
                    history.insert(node.id);
                }
                None => debug!(node = %slug, "unknown history slug ignored"),
            }
        }

        Ok(Simulation {
            preview,
            seed,
            current,
            actor,
            history,
            mode: request.mode.unwrap_or(self.config.default_mode),
        })
    }

    async fn resolve_node(&self, scope: ScopeId, slug: &str) -> Result<Node, NavigationError> {
        self.repository
            .get_node(scope, slug)
            .await?
            .ok_or_else(|| NavigationError::NodeNotFound {
                scope,
                slug: slug.to_string(),
            })
    }

    async fn resolve_actor(&self, scope: ScopeId, id: ActorId) -> Result<Actor, NavigationError> {
        let Some(directory) = &self.actors else {
            return Err(NavigationError::ActorNotFound(id));
        };
        directory
            .get_actor(scope, id)
            .await?
            .ok_or(NavigationError::ActorNotFound(id))
    }

    async fn route(
        &self,
        scope: ScopeId,
        current: &Node,
        actor: Option<&Actor>,
        mode: NavigationMode,
        history: &BTreeSet<NodeId>,
        preview: &PreviewContext,
    ) -> RouteResult {
        let key = self
            .cache
            .nav_key(scope, &current.slug, actor.map(|a| a.id), mode, preview, history);

        // A generated seed or now makes the fingerprint unique to this call.
        let cacheable = preview.is_reproducible();
        if cacheable {
            if let Some(hit) = self.cache.get_route(&key).await {
                debug!(key = %key, "navigation served from cache");
                return hit;
            }
        }

        let result = self
            .router
            .route(&RouteRequest {
                scope,
                current,
                actor,
                mode,
                history,
                preview,
            })
            .await;

        if !preview.is_on() {
            self.record_usage(scope, actor, &result).await;
        }

        if !cacheable {
            debug!(key = %key, "unpinned preview not cached");
        } else if self.is_time_sensitive(scope, current, &result).await {
            debug!(key = %key, "cooldown-gated route not cached");
        } else {
            self.cache.put_route(&key, &result).await;
        }

        info!(
            %scope,
            node = %current.slug,
            %mode,
            preview = preview.is_on(),
            next = result.next_node().map(|n| n.slug.as_str()).unwrap_or("-"),
            strategy = result.metrics().winning_strategy.map(|s| s.as_str()).unwrap_or("-"),
            evaluated = result.metrics().candidates_evaluated,
            tag_entropy = result.metrics().tag_entropy,
            "route decided"
        );
        result
    }

    async fn record_usage(&self, scope: ScopeId, actor: Option<&Actor>, result: &RouteResult) {
        let (Some(recorder), Some(actor)) = (&self.usage, actor) else {
            return;
        };
        let Some(transition) = result.accepted_step().and_then(|step| step.transition) else {
            return;
        };
        if let Err(err) = recorder
            .record_use(scope, actor.id, transition, self.clock.now())
            .await
        {
            warn!(%actor.id, %transition, error = %err, "failed to record transition use");
        }
    }

    /// Whether the result depends on a cooldown that elapses with time, so a
    /// cached copy would go stale before its TTL.
    async fn is_time_sensitive(
        &self,
        scope: ScopeId,
        current: &Node,
        result: &RouteResult,
    ) -> bool {
        let mut involved: BTreeSet<TransitionId> = BTreeSet::new();
        for step in result.trace() {
            if step.reject_reason == Some(RejectReason::Cooldown) {
                return true;
            }
            if let Some(transition) = step.transition {
                involved.insert(transition);
            }
        }
        if involved.is_empty() {
            return false;
        }

        match self.repository.list_transitions(scope, current.id).await {
            Ok(transitions) => transitions.iter().any(|t| {
                involved.contains(&t.id)
                    && t.condition
                        .as_ref()
                        .is_some_and(|c| c.cooldown_seconds.is_some())
            }),
            Err(err) => {
                warn!(
                    %scope,
                    node = %current.slug,
                    error = %err,
                    "could not inspect transitions, skipping cache write"
                );
                true
            }
        }
    }
}

pub struct NavigationEngineBuilder {
    repository: Arc<dyn NodeRepository>,
    scorer: Arc<dyn EmbeddingScorer>,
    echoes: Arc<dyn EchoSource>,
    oracle: Arc<dyn NftOwnershipOracle>,
    store: Arc<dyn CacheStore>,
    config: NavigationConfig,
    clock: Arc<dyn Clock>,
    actors: Option<Arc<dyn ActorDirectory>>,
    usage: Option<Arc<dyn TransitionUsageRecorder>>,
}

impl NavigationEngineBuilder {
    /// Replace the default configuration.
    pub fn with_config(mut self, config: NavigationConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Needed to simulate on behalf of an actor id.
    pub fn with_actor_directory(mut self, actors: Arc<dyn ActorDirectory>) -> Self {
        self.actors = Some(actors);
        self
    }

    /// Persist production transition uses for later cooldown checks.
    pub fn with_usage_recorder(mut self, usage: Arc<dyn TransitionUsageRecorder>) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Assemble the composer, router and cache.
    pub fn build(self) -> NavigationEngine {
        let cache = Arc::new(NavigationCache::new(self.store, &self.config));
        let composer = Arc::new(ModesComposer::from_collaborators(
            self.repository.clone(),
            self.scorer,
            self.echoes,
            cache.clone(),
            &self.config,
        ));
        let policy = AccessPolicy::new(self.oracle, self.clock.clone());
        let router = TransitionRouter::new(composer, policy, &self.config);

        NavigationEngine {
            repository: self.repository,
            actors: self.actors,
            usage: self.usage,
            cache,
            router,
            clock: self.clock,
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_preview_off_keeps_only_the_seed() {
        let mut request = SimulationRequest::new(ScopeId::new(), "a")
            .with_seed(11)
            .with_history(["b"]);
        request.preview.plan = Some("premium".to_string());

        let preview = request.preview_context();
        assert!(preview.is_on());
        assert_eq!(preview.seed(), Some(11));
        assert_eq!(preview.plan_override(), None);
    }

    #[test]
    fn test_preview_on_honors_overrides() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let request = SimulationRequest::new(ScopeId::new(), "a").with_preview(PreviewOptions {
            seed: Some(3),
            now: Some(now),
            plan: Some("premium".to_string()),
            role: Some("editor".to_string()),
        });

        let preview = request.preview_context();
        assert_eq!(preview.plan_override(), Some("premium"));
        assert_eq!(preview.role_override(), Some("editor"));
        assert_eq!(preview.now(&SystemClock), now);
    }

    #[test]
    fn test_request_from_json() {
        let scope = ScopeId::from_u128(4);
        let json = serde_json::json!({
            "scope": scope,
            "start_node": "a",
            "mode": "random",
            "actor_id": null,
            "preview": { "seed": 42 },
        });
        let request: SimulationRequest = serde_json::from_value(json).unwrap();

        assert_eq!(request.mode, Some(NavigationMode::Random));
        assert_eq!(request.preview_mode, PreviewMode::Off);
        assert!(request.history.is_empty());
        assert_eq!(request.preview_context().seed(), Some(42));
    }

    #[test]
    fn test_invalidation_target_serde() {
        let target: InvalidationTarget = serde_json::from_str(r#"{"node":"gate"}"#).unwrap();
        assert_eq!(target, InvalidationTarget::Node("gate".to_string()));
        let all: InvalidationTarget = serde_json::from_str(r#""all""#).unwrap();
        assert_eq!(all, InvalidationTarget::All);
    }
}
