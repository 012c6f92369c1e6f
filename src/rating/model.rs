//! Skill model trait

use crate::error::Result;
use crate::types::{Outcome, PlayerRating};

/// Predicts match quality and produces updated ratings after a match
///
/// Team ratings are passed in team order; the returned ratings keep that
/// order and the player order within each team.
#[cfg_attr(test, mockall::automock)]
pub trait SkillModel: Send + Sync {
    /// Predicted balance of a match between the given teams, in (0, 1]
    fn match_quality(&self, teams: &[Vec<PlayerRating>]) -> Result<f64>;

    /// Updated ratings for every player after the match ended with `outcome`
    fn rate(&self, teams: &[Vec<PlayerRating>], outcome: &Outcome) -> Result<Vec<Vec<PlayerRating>>>;

    /// Rating assigned to players without a score
    fn initial_rating(&self) -> PlayerRating;
}
