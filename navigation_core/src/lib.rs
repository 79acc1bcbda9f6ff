//! # Navigation Core
//!
//! The decision engine of Waypoint. Given a reader's current node in a
//! branching quest, it decides which node to offer next and records why.
//!
//! ## Core Components
//!
//! - **access**: Fail-closed access policy for nodes and transitions
//! - **strategies**: Manual, Compass, Echo and Random candidate producers
//! - **composer**: Maps a navigation mode onto strategy invocations
//! - **router**: Greedy first-accept selection with a replayable trace
//! - **cache**: Versioned navigation cache with preview isolation
//! - **preview**: Deterministic simulation context (clock, plan, seeded RNG)
//! - **diversity**: Entropy-based observability over routing results
//! - **engine**: Facade exposing generate, simulate and invalidate
//!
//! ## Design Philosophy
//!
//! - **Injected collaborators**: Storage, embeddings, popularity and NFT
//!   ownership are narrow async traits; the engine never touches a database
//! - **Degrade, don't fail**: Only a missing start node is an error; strategy
//!   and cache failures surface in the trace and logs
//! - **Replayable**: Preview runs are a pure function of their inputs and seed

pub mod access;
pub mod cache;
pub mod composer;
pub mod config;
pub mod content;
pub mod diversity;
pub mod engine;
pub mod error;
pub mod preview;
pub mod repository;
pub mod router;
pub mod strategies;

pub use access::*;
pub use cache::*;
pub use composer::*;
pub use config::*;
pub use content::*;
pub use diversity::*;
pub use engine::*;
pub use error::*;
pub use preview::*;
pub use repository::*;
pub use router::*;
pub use strategies::*;
