//! Preview (simulation) context threaded through every routing component.
//!
//! With preview on, "now", plan and role come from the context instead of the
//! wall clock and the real actor, and all randomness is drawn from a
//! generator seeded by the context. The effective seed is always known so a
//! run can be replayed bit for bit.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Plan name that grants premium access under a preview override.
pub const PREMIUM_PLAN: &str = "premium";

/// Source of wall-clock time for production routing.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    #[default]
    Off,
    On,
}

/// Caller-supplied preview inputs; anything left `None` gets a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewOptions {
    pub seed: Option<u64>,
    pub now: Option<DateTime<Utc>>,
    pub plan: Option<String>,
    pub role: Option<String>,
}

/// Immutable per-request context. Constructed once, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewContext {
    mode: PreviewMode,
    seed: Option<u64>,
    now: Option<DateTime<Utc>>,
    plan: Option<String>,
    role: Option<String>,
    /// Seed and now came from the caller rather than being generated here.
    #[serde(default)]
    seed_supplied: bool,
    #[serde(default)]
    now_supplied: bool,
}

impl PreviewContext {
    /// Production context: no overrides, no seed.
    pub fn off() -> Self {
        Self {
            mode: PreviewMode::Off,
            seed: None,
            now: None,
            plan: None,
            role: None,
            seed_supplied: false,
            now_supplied: false,
        }
    }

    /// Preview context. A missing seed is generated here, a missing `now`
    /// freezes at construction time.
    pub fn on(options: PreviewOptions) -> Self {
        Self {
            mode: PreviewMode::On,
            seed: Some(options.seed.unwrap_or_else(rand::random)),
            now: Some(options.now.unwrap_or_else(Utc::now)),
            plan: options.plan,
            role: options.role,
            seed_supplied: options.seed.is_some(),
            now_supplied: options.now.is_some(),
        }
    }

    /// Whether preview overrides apply.
    pub fn mode(&self) -> PreviewMode {
        self.mode
    }

    /// Shorthand for `mode() == PreviewMode::On`.
    pub fn is_on(&self) -> bool {
        self.mode == PreviewMode::On
    }

    /// Effective seed; always `Some` in preview.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// "Now" as seen by access checks.
    pub fn now(&self, clock: &dyn Clock) -> DateTime<Utc> {
        match (self.mode, self.now) {
            (PreviewMode::On, Some(now)) => now,
            _ => clock.now(),
        }
    }

    /// Plan to evaluate access under instead of the actor's own.
    pub fn plan_override(&self) -> Option<&str> {
        self.is_on().then_some(self.plan.as_deref()).flatten()
    }

    /// Role to evaluate under instead of the actor's own.
    pub fn role_override(&self) -> Option<&str> {
        self.is_on().then_some(self.role.as_deref()).flatten()
    }

    /// Random source for one routing call: seeded in preview, entropy otherwise.
    pub fn rng(&self) -> StdRng {
        match (self.mode, self.seed) {
            (PreviewMode::On, Some(seed)) => StdRng::seed_from_u64(seed),
            _ => StdRng::from_entropy(),
        }
    }

    /// Same context with a different seed (used for multi-step walks).
    pub fn reseeded(&self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self.clone()
        }
    }

    /// Whether a later call with the same inputs rebuilds this exact context.
    /// Production always does; a preview only when the caller fixed both
    /// seed and now.
    pub fn is_reproducible(&self) -> bool {
        !self.is_on() || (self.seed_supplied && self.now_supplied)
    }

    /// Short stable digest of the inputs that change a preview outcome.
    /// Production contexts have no fingerprint.
    pub fn fingerprint(&self) -> Option<String> {
        if !self.is_on() {
            return None;
        }
        let mut hasher = Sha256::new();
        hasher.update(self.seed.unwrap_or_default().to_be_bytes());
        hasher.update(
            self.now
                .map(|now| now.timestamp_millis())
                .unwrap_or_default()
                .to_be_bytes(),
        );
        hasher.update(self.plan.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(self.role.as_deref().unwrap_or("").as_bytes());
        let hash = hasher.finalize();
        Some(hex::encode(&hash[..8]))
    }
}

impl Default for PreviewContext {
    fn default() -> Self {
        Self::off()
    }
}
