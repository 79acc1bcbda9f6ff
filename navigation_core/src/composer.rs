//! Modes composer - maps a navigation mode onto strategy invocations.

use quest_model::Tag;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::cache::NavigationCache;
use crate::config::NavigationConfig;
use crate::error::StrategyError;
use crate::repository::{EchoSource, EmbeddingScorer, NodeRepository};
use crate::strategies::{
    Candidate, CandidateStrategy, CompassStrategy, EchoStrategy, ManualStrategy, RandomStrategy,
    StrategyKind, StrategyRequest,
};

/// Requested navigation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationMode {
    Manual,
    Compass,
    Echo,
    Random,
    #[default]
    Auto,
}

/// Strategy order for `auto`: authored intent, then similarity, then
/// popularity, then chance.
pub const AUTO_PRIORITY: [StrategyKind; 4] = [
    StrategyKind::Manual,
    StrategyKind::Compass,
    StrategyKind::Echo,
    StrategyKind::Random,
];

impl NavigationMode {
    /// Wire name, as used in config and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationMode::Manual => "manual",
            NavigationMode::Compass => "compass",
            NavigationMode::Echo => "echo",
            NavigationMode::Random => "random",
            NavigationMode::Auto => "auto",
        }
    }
}

impl std::fmt::Display for NavigationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NavigationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(NavigationMode::Manual),
            "compass" => Ok(NavigationMode::Compass),
            "echo" => Ok(NavigationMode::Echo),
            "random" => Ok(NavigationMode::Random),
            "auto" => Ok(NavigationMode::Auto),
            other => Err(format!("unknown navigation mode '{other}'")),
        }
    }
}

/// Holds one instance of each strategy and dispatches by kind.
pub struct ModesComposer {
    manual: Arc<dyn CandidateStrategy>,
    compass: Arc<dyn CandidateStrategy>,
    echo: Arc<dyn CandidateStrategy>,
    random: Arc<dyn CandidateStrategy>,
}

impl ModesComposer {
    /// Compose from four ready strategies.
    pub fn new(
        manual: Arc<dyn CandidateStrategy>,
        compass: Arc<dyn CandidateStrategy>,
        echo: Arc<dyn CandidateStrategy>,
        random: Arc<dyn CandidateStrategy>,
    ) -> Self {
        Self {
            manual,
            compass,
            echo,
            random,
        }
    }

    /// Build the standard strategies from collaborators, honoring the
    /// config's feature set and random whitelist.
    pub fn from_collaborators(
        repository: Arc<dyn NodeRepository>,
        scorer: Arc<dyn EmbeddingScorer>,
        echoes: Arc<dyn EchoSource>,
        cache: Arc<NavigationCache>,
        config: &NavigationConfig,
    ) -> Self {
        let manual = ManualStrategy::new(repository.clone())
            .weighted(config.features.weighted_manual_transitions);
        let compass = CompassStrategy::new(repository.clone(), scorer).with_cache(cache);
        let echo = EchoStrategy::new(repository.clone(), echoes);
        let random = RandomStrategy::new(repository).with_tag_whitelist(
            config.random_tag_whitelist.iter().map(Tag::new),
        );

        Self::new(
            Arc::new(manual),
            Arc::new(compass),
            Arc::new(echo),
            Arc::new(random),
        )
    }

    /// Strategies to try, in order, for `mode`.
    pub fn plan(&self, mode: NavigationMode) -> &'static [StrategyKind] {
        match mode {
            NavigationMode::Manual => &AUTO_PRIORITY[0..1],
            NavigationMode::Compass => &AUTO_PRIORITY[1..2],
            NavigationMode::Echo => &AUTO_PRIORITY[2..3],
            NavigationMode::Random => &AUTO_PRIORITY[3..4],
            NavigationMode::Auto => &AUTO_PRIORITY,
        }
    }

    /// The strategy registered for `kind`.
    pub fn strategy(&self, kind: StrategyKind) -> &Arc<dyn CandidateStrategy> {
        match kind {
            StrategyKind::Manual => &self.manual,
            StrategyKind::Compass => &self.compass,
            StrategyKind::Echo => &self.echo,
            StrategyKind::Random => &self.random,
        }
    }

    /// Invoke exactly one strategy and normalize its output.
    pub async fn fetch(
        &self,
        kind: StrategyKind,
        request: &StrategyRequest<'_>,
        rng: &mut StdRng,
    ) -> Result<Vec<Candidate>, StrategyError> {
        let mut candidates = self.strategy(kind).candidates(request, rng).await?;
        for candidate in &mut candidates {
            candidate.strategy = kind;
            if candidate.label.is_empty() {
                candidate.label = candidate.node.slug.clone();
            }
        }
        Ok(candidates)
    }
}
