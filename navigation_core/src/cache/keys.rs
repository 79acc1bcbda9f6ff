//! Cache key definitions
//!
//! Format: `{prefix}{version}:{kind}:{scope}:{subject}:{mode}` where the
//! prefix is empty for production traffic and `preview:` for simulations.
//! Slugs never contain `:`, `@`, `~` or `*`, so keys split unambiguously.

use quest_model::{ActorId, NodeId, ScopeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::composer::NavigationMode;
use crate::preview::PreviewContext;

/// Bump when the cached payload format changes; old entries are never read.
pub const NAV_CACHE_SCHEMA_VERSION: &str = "v2";

const PREVIEW_PREFIX: &str = "preview:";
const ANONYMOUS: &str = "anon";
const COMPASS_MODE: &str = "compass";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Full routing results.
    Nav,
    /// Compass similarity rankings.
    Comp,
}

impl CacheKind {
    /// Key segment for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Nav => "nav",
            CacheKind::Comp => "comp",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "nav" => Some(CacheKind::Nav),
            "comp" => Some(CacheKind::Comp),
            _ => None,
        }
    }
}

/// Production and preview entries never share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheNamespace {
    Production,
    Preview,
}

impl CacheNamespace {
    /// The namespace a context writes to.
    pub fn of(preview: &PreviewContext) -> Self {
        if preview.is_on() {
            CacheNamespace::Preview
        } else {
            CacheNamespace::Production
        }
    }

    /// Storage key prefix; empty for production.
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheNamespace::Production => "",
            CacheNamespace::Preview => PREVIEW_PREFIX,
        }
    }
}

/// Structured navigation cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NavCacheKey {
    pub namespace: CacheNamespace,
    pub version: String,
    pub kind: CacheKind,
    pub scope: ScopeId,
    pub node: String,
    /// Only `nav` keys carry an actor; `None` is an anonymous reader.
    pub actor: Option<ActorId>,
    /// Digest of preview inputs and history, when they can change the result.
    pub variant: Option<String>,
    pub mode: String,
}

impl NavCacheKey {
    /// Key for a routing result.
    pub fn nav(
        scope: ScopeId,
        node: &str,
        actor: Option<ActorId>,
        mode: NavigationMode,
        preview: &PreviewContext,
        history: &BTreeSet<NodeId>,
    ) -> Self {
        Self {
            namespace: CacheNamespace::of(preview),
            version: NAV_CACHE_SCHEMA_VERSION.to_string(),
            kind: CacheKind::Nav,
            scope,
            node: node.to_string(),
            actor,
            variant: variant_digest(preview, history),
            mode: mode.as_str().to_string(),
        }
    }

    /// Key for a compass ranking. Rankings do not depend on the reader.
    pub fn compass(scope: ScopeId, node: &str, preview: &PreviewContext) -> Self {
        Self {
            namespace: CacheNamespace::of(preview),
            version: NAV_CACHE_SCHEMA_VERSION.to_string(),
            kind: CacheKind::Comp,
            scope,
            node: node.to_string(),
            actor: None,
            variant: None,
            mode: COMPASS_MODE.to_string(),
        }
    }

    /// Whether every node this entry depends on is named in its payload.
    /// Only manual routes qualify: other modes rank the whole scope.
    pub fn is_payload_bounded(&self) -> bool {
        self.kind == CacheKind::Nav && self.mode == NavigationMode::Manual.as_str()
    }

    /// Whether the key carries the running schema version.
    pub fn is_current_version(&self) -> bool {
        self.version == NAV_CACHE_SCHEMA_VERSION
    }

    fn subject(&self) -> String {
        match self.kind {
            CacheKind::Comp => self.node.clone(),
            CacheKind::Nav => {
                let actor = self
                    .actor
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| ANONYMOUS.to_string());
                match &self.variant {
                    Some(variant) => format!("{}@{}~{}", self.node, actor, variant),
                    None => format!("{}@{}", self.node, actor),
                }
            }
        }
    }

    /// Convert to storage key string
    pub fn to_storage_key(&self) -> String {
        format!(
            "{}{}:{}:{}:{}:{}",
            self.namespace.prefix(),
            self.version,
            self.kind.as_str(),
            self.scope,
            self.subject(),
            self.mode
        )
    }

    /// Parse a storage key of any schema version.
    pub fn parse(key: &str) -> Option<Self> {
        let (namespace, rest) = match key.strip_prefix(PREVIEW_PREFIX) {
            Some(rest) => (CacheNamespace::Preview, rest),
            None => (CacheNamespace::Production, key),
        };

        let parts: Vec<&str> = rest.split(':').collect();
        let [version, kind, scope, subject, mode] = parts.as_slice() else {
            return None;
        };

        let kind = CacheKind::parse(kind)?;
        let scope = ScopeId::from_uuid(Uuid::parse_str(scope).ok()?);

        let (node, actor, variant) = match kind {
            CacheKind::Comp => (subject.to_string(), None, None),
            CacheKind::Nav => {
                let (node, reader) = subject.split_once('@')?;
                let (reader, variant) = match reader.split_once('~') {
                    Some((reader, variant)) => (reader, Some(variant.to_string())),
                    None => (reader, None),
                };
                let actor = match reader {
                    ANONYMOUS => None,
                    id => Some(ActorId::from_uuid(Uuid::parse_str(id).ok()?)),
                };
                (node.to_string(), actor, variant)
            }
        };

        Some(Self {
            namespace,
            version: version.to_string(),
            kind,
            scope,
            node,
            actor,
            variant,
            mode: mode.to_string(),
        })
    }

    /// Every entry of a scope, all namespaces and versions.
    pub fn scope_pattern(scope: ScopeId) -> String {
        format!("*:{}:*", scope)
    }

    /// Every entry of a scope in one namespace, any version.
    pub fn namespace_pattern(namespace: CacheNamespace, scope: ScopeId) -> String {
        format!("{}v*:{}:*", namespace.prefix(), scope)
    }

    /// Every navigation entry keyed to `actor`, across scopes.
    pub fn user_pattern(actor: ActorId) -> String {
        format!("*:nav:*@{}*", actor)
    }
}

impl fmt::Display for NavCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage_key())
    }
}

fn variant_digest(preview: &PreviewContext, history: &BTreeSet<NodeId>) -> Option<String> {
    let fingerprint = preview.fingerprint();
    if fingerprint.is_none() && history.is_empty() {
        return None;
    }

    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.unwrap_or_default().as_bytes());
    for id in history {
        hasher.update(id.0.as_bytes());
    }
    let hash = hasher.finalize();
    Some(hex::encode(&hash[..8]))
}

/// Glob match where `*` matches any run of characters (including none).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}
