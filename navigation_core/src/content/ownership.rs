//! Fixed NFT ownership table.

use async_trait::async_trait;
use quest_model::{ActorId, NftRef};
use std::collections::HashSet;

use crate::error::OracleError;
use crate::repository::NftOwnershipOracle;

/// Ownership oracle backed by a static set of `(actor, nft)` pairs.
#[derive(Debug, Clone, Default)]
pub struct StaticOwnershipOracle {
    owned: HashSet<(ActorId, NftRef)>,
}

impl StaticOwnershipOracle {
    /// An oracle where nobody owns anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `actor` owns `nft`.
    pub fn with_ownership(mut self, actor: ActorId, nft: NftRef) -> Self {
        self.owned.insert((actor, nft));
        self
    }
}

#[async_trait]
impl NftOwnershipOracle for StaticOwnershipOracle {
    async fn owns_nft(&self, actor: ActorId, nft: &NftRef) -> Result<bool, OracleError> {
        Ok(self.owned.contains(&(actor, nft.clone())))
    }
}
