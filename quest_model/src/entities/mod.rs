//! Entity definitions for quest content.

mod actor;
mod node;

pub use actor::*;
pub use node::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an ID from a specific UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Create an ID from a 128-bit value (stable ids for fixtures).
            pub fn from_u128(value: u128) -> Self {
                Self(Uuid::from_u128(value))
            }

            /// Create a nil/empty ID.
            pub fn nil() -> Self {
                Self(Uuid::nil())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Tenant partition (workspace/account) under which all content is namespaced.
    ScopeId
);
uuid_id!(
    /// Unique identifier for nodes.
    NodeId
);
uuid_id!(
    /// Unique identifier for readers and operators.
    ActorId
);
uuid_id!(
    /// Unique identifier for authored transitions.
    TransitionId
);

/// Reference to an NFT that gates content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NftRef(pub String);

impl NftRef {
    /// Wrap an external token reference.
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }
}

impl std::fmt::Display for NftRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A content tag. Stored trimmed and lower-cased so `Forest` and ` forest`
/// are the same tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Tag(String);

impl Tag {
    /// Trimmed and lowercased.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    /// The normalized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised when content violates model constraints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("slug must not be empty")]
    EmptySlug,

    #[error("slug '{slug}' contains reserved character '{character}'")]
    ReservedCharacter { slug: String, character: char },

    #[error("slug '{0}' is already used by another node")]
    DuplicateSlug(String),

    #[error("transition {0} points back to its own source node")]
    SelfLoop(TransitionId),
}

/// Characters that separate segments of navigation cache keys and patterns.
pub const RESERVED_SLUG_CHARS: [char; 5] = [':', '@', '~', '*', ' '];

/// Validate a node slug for use as an identifier and cache-key segment.
pub fn validate_slug(slug: &str) -> Result<(), ModelError> {
    if slug.is_empty() {
        return Err(ModelError::EmptySlug);
    }
    if let Some(character) = slug.chars().find(|c| RESERVED_SLUG_CHARS.contains(c)) {
        return Err(ModelError::ReservedCharacter {
            slug: slug.to_string(),
            character,
        });
    }
    Ok(())
}
