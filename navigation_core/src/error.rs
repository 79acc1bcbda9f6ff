//! Error taxonomy for the navigation engine.
//!
//! `NoRoute` is deliberately absent: running out of candidates is a routing
//! outcome carried by [`crate::RouteReason`], not a failure.

use quest_model::{ActorId, ModelError, ScopeId};
use thiserror::Error;

/// Failure of a content or popularity lookup.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    #[error("invalid content: {0}")]
    Invalid(#[from] ModelError),
}

/// A strategy could not answer. Always degraded, never surfaced.
#[derive(Debug, Clone, Error)]
pub enum StrategyError {
    #[error("repository lookup failed: {0}")]
    Repository(#[from] RepositoryError),

    #[error("embedding service failed: {0}")]
    Embedding(String),

    #[error("strategy timed out after {0} ms")]
    Timeout(u64),
}

/// Cache store unreachable or payload unusable.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cache payload could not be encoded or decoded: {0}")]
    Payload(String),
}

/// NFT ownership could not be resolved.
#[derive(Debug, Clone, Error)]
#[error("ownership oracle failed: {0}")]
pub struct OracleError(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid navigation config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Errors propagated to callers of the engine.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("node '{slug}' not found in scope {scope}")]
    NodeNotFound { scope: ScopeId, slug: String },

    #[error("actor {0} not found")]
    ActorNotFound(ActorId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl NavigationError {
    /// `NotFound`-class errors: unknown node or unknown actor.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            NavigationError::NodeNotFound { .. } | NavigationError::ActorNotFound(_)
        )
    }
}
