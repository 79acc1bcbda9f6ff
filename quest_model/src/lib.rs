//! # Quest Model
//!
//! The content model of a branching quest: the nodes a reader can stand on,
//! the authored transitions between them, and the actors who travel them.
//! This crate is the single source of truth for content shapes and does not
//! contain any routing logic.

pub mod entities;
pub mod transitions;

pub use entities::*;
pub use transitions::*;
