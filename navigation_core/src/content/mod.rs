//! In-memory collaborators: a content graph and an ownership oracle.
//!
//! Suitable for tests, simulations over exported content and small
//! single-process deployments.

mod graph;
mod ownership;

pub use graph::*;
pub use ownership::*;
