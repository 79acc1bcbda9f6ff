//! Navigation cache - versioned, namespaced, invalidation-aware.
//!
//! Routing results (`nav`) and compass rankings (`comp`) are stored as JSON
//! [`CacheEntry`] values in an injected [`CacheStore`]. Reads and writes
//! never fail the caller: a broken store degrades to direct computation.
//! Invalidation always deletes and never patches.

mod keys;
mod store;

pub use keys::*;
pub use store::*;

use quest_model::{ActorId, NodeId, ScopeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::composer::NavigationMode;
use crate::config::NavigationConfig;
use crate::error::CacheError;
use crate::preview::PreviewContext;
use crate::router::RouteResult;
use crate::strategies::CompassRanking;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CachedPayload {
    Route(RouteResult),
    Compass(CompassRanking),
}

impl CachedPayload {
    /// Whether the payload mentions `slug` in any position.
    pub fn references(&self, slug: &str) -> bool {
        match self {
            CachedPayload::Route(route) => route.references(slug),
            CachedPayload::Compass(ranking) => ranking.references(slug),
        }
    }
}

/// What is physically stored under a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: CachedPayload,
    pub namespace: CacheNamespace,
    pub version: String,
}

pub struct NavigationCache {
    store: Arc<dyn CacheStore>,
    enabled: bool,
    route_ttl: Duration,
    compass_ttl: Duration,
}

impl NavigationCache {
    /// Cache over `store`, with TTLs and the on/off flag from `config`.
    pub fn new(store: Arc<dyn CacheStore>, config: &NavigationConfig) -> Self {
        Self {
            store,
            enabled: config.features.navigation_cache_v2,
            route_ttl: config.cache_ttl(),
            compass_ttl: config.compass_cache_ttl(),
        }
    }

    /// Whether reads and writes go through. Invalidation always does.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Key for a routing decision.
    pub fn nav_key(
        &self,
        scope: ScopeId,
        node: &str,
        actor: Option<ActorId>,
        mode: NavigationMode,
        preview: &PreviewContext,
        history: &BTreeSet<NodeId>,
    ) -> NavCacheKey {
        NavCacheKey::nav(scope, node, actor, mode, preview, history)
    }

    /// Key for a Compass ranking.
    pub fn compass_key(&self, scope: ScopeId, node: &str, preview: &PreviewContext) -> NavCacheKey {
        NavCacheKey::compass(scope, node, preview)
    }

    /// Cached route for `key`; any failure reads as a miss.
    pub async fn get_route(&self, key: &NavCacheKey) -> Option<RouteResult> {
        match self.read(key).await? {
            CachedPayload::Route(route) => Some(route),
            CachedPayload::Compass(_) => None,
        }
    }

    /// Store a route; failures are logged and dropped.
    pub async fn put_route(&self, key: &NavCacheKey, route: &RouteResult) {
        self.write(key, CachedPayload::Route(route.clone()), self.route_ttl)
            .await;
    }

    /// Cached Compass ranking for `key`; any failure reads as a miss.
    pub async fn get_compass(&self, key: &NavCacheKey) -> Option<CompassRanking> {
        match self.read(key).await? {
            CachedPayload::Compass(ranking) => Some(ranking),
            CachedPayload::Route(_) => None,
        }
    }

    /// Store a Compass ranking; failures are logged and dropped.
    pub async fn put_compass(&self, key: &NavCacheKey, ranking: &CompassRanking) {
        self.write(key, CachedPayload::Compass(ranking.clone()), self.compass_ttl)
            .await;
    }

    /// Raw entry lookup, bypassing the feature switch.
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        match self.store.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| CacheError::Payload(e.to_string())),
            None => Ok(None),
        }
    }

    /// Raw entry write, bypassing the feature switch.
    pub async fn set(&self, entry: &CacheEntry, ttl: Duration) -> Result<(), CacheError> {
        let raw = serde_json::to_string(entry).map_err(|e| CacheError::Payload(e.to_string()))?;
        self.store.set(&entry.key, raw, ttl).await
    }

    /// Live storage keys matching a `*` glob.
    pub async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.store.scan(pattern).await
    }

    /// Keys of one scope in one namespace.
    pub async fn scan_scope(
        &self,
        namespace: CacheNamespace,
        scope: ScopeId,
    ) -> Result<Vec<String>, CacheError> {
        self.store
            .scan(&NavCacheKey::namespace_pattern(namespace, scope))
            .await
    }

    /// Remove every entry that could reference `slug` as source or
    /// destination, in both namespaces.
    ///
    /// Manual routes only depend on authored edges, so they are kept unless
    /// their payload mentions the node. Compass rankings and algorithmic
    /// routes draw from the whole scope and are always dropped. Entries whose
    /// payload cannot be decoded are removed too.
    pub async fn invalidate_by_node(
        &self,
        scope: ScopeId,
        slug: &str,
    ) -> Result<usize, CacheError> {
        let mut removed = 0;
        for key in self.store.scan(&NavCacheKey::scope_pattern(scope)).await? {
            let Some(parsed) = NavCacheKey::parse(&key) else {
                continue;
            };
            if parsed.scope != scope {
                continue;
            }

            let stale = if parsed.node == slug || !parsed.is_payload_bounded() {
                true
            } else {
                match self.get(&key).await {
                    Ok(Some(entry)) => entry.payload.references(slug),
                    Ok(None) => false,
                    Err(CacheError::Payload(_)) => true,
                    Err(err) => return Err(err),
                }
            };

            if stale && self.store.delete(&key).await? {
                removed += 1;
            }
        }
        info!(%scope, node = slug, removed, "invalidated cache by node");
        Ok(removed)
    }

    /// Remove every navigation entry keyed to `actor`, across scopes.
    pub async fn invalidate_by_user(&self, actor: ActorId) -> Result<usize, CacheError> {
        let removed = self
            .delete_matching(&NavCacheKey::user_pattern(actor))
            .await?;
        info!(%actor, removed, "invalidated cache by user");
        Ok(removed)
    }

    /// Full flush of one scope, both namespaces and every schema version.
    pub async fn invalidate_all(&self, scope: ScopeId) -> Result<usize, CacheError> {
        let removed = self
            .delete_matching(&NavCacheKey::scope_pattern(scope))
            .await?;
        info!(%scope, removed, "invalidated cache for scope");
        Ok(removed)
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut removed = 0;
        for key in self.store.scan(pattern).await? {
            if NavCacheKey::parse(&key).is_some() && self.store.delete(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn read(&self, key: &NavCacheKey) -> Option<CachedPayload> {
        if !self.enabled {
            return None;
        }
        let storage_key = key.to_storage_key();
        match self.get(&storage_key).await {
            Ok(Some(entry))
                if entry.key == storage_key && entry.version == NAV_CACHE_SCHEMA_VERSION =>
            {
                debug!(key = %storage_key, "cache hit");
                Some(entry.payload)
            }
            Ok(Some(_)) => {
                warn!(key = %storage_key, "cache entry does not match its key, ignoring");
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!(key = %storage_key, error = %err, "cache read failed, computing directly");
                None
            }
        }
    }

    async fn write(&self, key: &NavCacheKey, payload: CachedPayload, ttl: Duration) {
        if !self.enabled {
            return;
        }
        let entry = CacheEntry {
            key: key.to_storage_key(),
            payload,
            namespace: key.namespace,
            version: key.version.clone(),
        };
        if let Err(err) = self.set(&entry, ttl).await {
            warn!(key = %entry.key, error = %err, "cache write skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::RejectReason;
    use crate::preview::PreviewOptions;
    use crate::router::{RouteMetrics, TraceStep};
    use crate::strategies::{RankedNode, StrategyKind};
    use async_trait::async_trait;
    use quest_model::Node;

    fn scope() -> ScopeId {
        ScopeId::from_u128(1)
    }

    fn cache_with(store: Arc<dyn CacheStore>, config: &NavigationConfig) -> NavigationCache {
        NavigationCache::new(store, config)
    }

    fn cache() -> (Arc<InMemoryCacheStore>, NavigationCache) {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = cache_with(store.clone(), &NavigationConfig::default());
        (store, cache)
    }

    fn route_to(slug: &str) -> RouteResult {
        let node = Node::new(slug).to_ref();
        RouteResult::accepted(
            node.clone(),
            vec![TraceStep::accepted(StrategyKind::Manual, node, None)],
            RouteMetrics::default(),
        )
    }

    fn nav_key(node: &str, actor: Option<ActorId>, preview: &PreviewContext) -> NavCacheKey {
        NavCacheKey::nav(scope(), node, actor, NavigationMode::Manual, preview, &BTreeSet::new())
    }

    fn preview() -> PreviewContext {
        PreviewContext::on(PreviewOptions {
            seed: Some(42),
            ..Default::default()
        })
    }

    struct DownStore;

    #[async_trait]
    impl CacheStore for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn scan(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_route_roundtrip() {
        let (_, cache) = cache();
        let key = nav_key("a", None, &PreviewContext::off());
        let route = route_to("b");

        assert_eq!(cache.get_route(&key).await, None);
        cache.put_route(&key, &route).await;
        assert_eq!(cache.get_route(&key).await, Some(route));
    }

    #[tokio::test]
    async fn test_preview_writes_stay_out_of_production() {
        let (_, cache) = cache();
        let preview = preview();
        cache.put_route(&nav_key("a", None, &preview), &route_to("b")).await;

        assert!(cache
            .scan_scope(CacheNamespace::Production, scope())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            cache
                .scan_scope(CacheNamespace::Preview, scope())
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(cache.get_route(&nav_key("a", None, &PreviewContext::off())).await, None);
    }

    #[tokio::test]
    async fn test_invalidate_by_node_removes_source_and_destination() {
        let (store, cache) = cache();
        let off = PreviewContext::off();
        cache.put_route(&nav_key("a", None, &off), &route_to("b")).await;
        cache.put_route(&nav_key("b", None, &off), &route_to("c")).await;
        cache.put_route(&nav_key("x", None, &off), &route_to("y")).await;
        cache.put_route(&nav_key("a", None, &preview()), &route_to("b")).await;
        cache
            .put_compass(
                &NavCacheKey::compass(scope(), "z", &off),
                &CompassRanking {
                    depth: 3,
                    entries: vec![RankedNode {
                        id: NodeId::from_u128(2),
                        slug: "b".to_string(),
                        score: 0.9,
                    }],
                },
            )
            .await;

        // "b" is source of one entry, destination of two, ranked in one
        assert_eq!(cache.invalidate_by_node(scope(), "b").await.unwrap(), 4);
        assert_eq!(store.len(), 1);
        assert!(cache.get_route(&nav_key("x", None, &off)).await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_by_node_drops_algorithmic_entries() {
        let (store, cache) = cache();
        let off = PreviewContext::off();
        let history = BTreeSet::new();
        let echo = NavCacheKey::nav(scope(), "x", None, NavigationMode::Echo, &off, &history);
        let auto = NavCacheKey::nav(scope(), "x", None, NavigationMode::Auto, &off, &history);
        cache.put_route(&echo, &route_to("y")).await;
        cache.put_route(&auto, &route_to("y")).await;
        cache
            .put_compass(
                &NavCacheKey::compass(scope(), "x", &off),
                &CompassRanking {
                    depth: 1,
                    entries: Vec::new(),
                },
            )
            .await;
        cache.put_route(&nav_key("x", None, &off), &route_to("y")).await;

        // "newcomer" appears in no payload but could now outrank "y"
        assert_eq!(cache.invalidate_by_node(scope(), "newcomer").await.unwrap(), 3);
        assert_eq!(store.len(), 1);
        assert!(cache.get_route(&nav_key("x", None, &off)).await.is_some());
    }

    #[tokio::test]
    async fn test_invalidation_is_idempotent() {
        let (_, cache) = cache();
        cache
            .put_route(&nav_key("a", None, &PreviewContext::off()), &route_to("b"))
            .await;

        assert_eq!(cache.invalidate_by_node(scope(), "a").await.unwrap(), 1);
        assert_eq!(cache.invalidate_by_node(scope(), "a").await.unwrap(), 0);
        assert_eq!(cache.invalidate_all(scope()).await.unwrap(), 0);
        assert_eq!(cache.invalidate_by_user(ActorId::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_by_node_counts_trace_candidates() {
        let (_, cache) = cache();
        let rejected = Node::new("vault").to_ref();
        let accepted = Node::new("open").to_ref();
        let route = RouteResult::accepted(
            accepted.clone(),
            vec![
                TraceStep::rejected(
                    StrategyKind::Manual,
                    rejected,
                    None,
                    RejectReason::PremiumRequired,
                ),
                TraceStep::accepted(StrategyKind::Manual, accepted, None),
            ],
            RouteMetrics::default(),
        );
        cache.put_route(&nav_key("gate", None, &PreviewContext::off()), &route).await;

        assert_eq!(cache.invalidate_by_node(scope(), "vault").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_by_user_leaves_others() {
        let (store, cache) = cache();
        let off = PreviewContext::off();
        let reader = ActorId::from_u128(10);
        cache.put_route(&nav_key("a", Some(reader), &off), &route_to("b")).await;
        cache.put_route(&nav_key("a", Some(reader), &preview()), &route_to("b")).await;
        cache.put_route(&nav_key("a", None, &off), &route_to("b")).await;

        assert_eq!(cache.invalidate_by_user(reader).await.unwrap(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_all_is_scoped() {
        let (store, cache) = cache();
        let off = PreviewContext::off();
        cache.put_route(&nav_key("a", None, &off), &route_to("b")).await;
        cache.put_route(&nav_key("a", None, &preview()), &route_to("b")).await;
        let elsewhere = NavCacheKey::nav(
            ScopeId::from_u128(2),
            "a",
            None,
            NavigationMode::Auto,
            &off,
            &BTreeSet::new(),
        );
        cache.put_route(&elsewhere, &route_to("b")).await;
        store
            .set("session:unrelated", "{}".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.invalidate_all(scope()).await.unwrap(), 2);
        assert!(cache.get_route(&elsewhere).await.is_some());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_miss_and_invalidated() {
        let (store, cache) = cache();
        let key = nav_key("a", None, &PreviewContext::off());
        store
            .set(&key.to_storage_key(), "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get_route(&key).await, None);
        assert_eq!(cache.invalidate_by_node(scope(), "elsewhere").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_passes_through() {
        let store = Arc::new(InMemoryCacheStore::new());
        let mut config = NavigationConfig::default();
        config.features.navigation_cache_v2 = false;
        let cache = cache_with(store.clone(), &config);
        let key = nav_key("a", None, &PreviewContext::off());

        cache.put_route(&key, &route_to("b")).await;
        assert!(store.is_empty());
        assert_eq!(cache.get_route(&key).await, None);
    }

    #[tokio::test]
    async fn test_store_failure_degrades_reads_and_writes() {
        let cache = cache_with(Arc::new(DownStore), &NavigationConfig::default());
        let key = nav_key("a", None, &PreviewContext::off());

        cache.put_route(&key, &route_to("b")).await;
        assert_eq!(cache.get_route(&key).await, None);
        assert!(matches!(
            cache.invalidate_all(scope()).await,
            Err(CacheError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_a_miss() {
        let (_, cache) = cache();
        let key = NavCacheKey::compass(scope(), "a", &PreviewContext::off());
        cache.put_route(&key, &route_to("b")).await;
        assert_eq!(cache.get_compass(&key).await, None);
    }
}
