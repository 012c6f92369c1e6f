//! Rating system integration using the TrueSkill algorithm
//!
//! This module provides the skill model seam used for match quality and
//! post-match rating updates, and the bookkeeping that turns a confirmed
//! result into updated scores.

pub mod model;
pub mod settlement;
pub mod trueskill;

// Re-export commonly used types
pub use model::SkillModel;
pub use settlement::{settle_scores, Settlement};
pub use trueskill::TrueSkillModel;

#[cfg(test)]
pub use model::MockSkillModel;
