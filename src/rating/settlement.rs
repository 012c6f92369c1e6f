//! Score bookkeeping after a confirmed match

use crate::error::{MatchmakingError, Result};
use crate::types::{Outcome, Partition, PlayerRating, RatingChange, Score};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Updated scores and the rating movement behind them
#[derive(Debug, Clone)]
pub struct Settlement {
    pub scores: Vec<Score>,
    pub changes: Vec<RatingChange>,
}

/// Apply new ratings and the win/lose/draw tally to each participant's score.
///
/// `rated` must mirror the partition's team layout. `current` holds the
/// participants' existing scores for the game's season and format; players
/// missing from it start from a fresh record.
pub fn settle_scores(
    partition: &Partition,
    outcome: &Outcome,
    rated: &[Vec<PlayerRating>],
    current: &HashMap<String, Score>,
    season: u32,
    format_id: &str,
    now: DateTime<Utc>,
) -> Result<Settlement> {
    if rated.len() != partition.team_count() {
        return Err(MatchmakingError::RatingCalculationFailed {
            reason: format!(
                "expected ratings for {} teams, got {}",
                partition.team_count(),
                rated.len()
            ),
        }
        .into());
    }

    let mut scores = Vec::new();
    let mut changes = Vec::new();

    for (team, new_ratings) in partition.teams().iter().zip(rated) {
        if team.players.len() != new_ratings.len() {
            return Err(MatchmakingError::RatingCalculationFailed {
                reason: format!(
                    "team {} has {} players but {} ratings",
                    team.index + 1,
                    team.players.len(),
                    new_ratings.len()
                ),
            }
            .into());
        }

        for (player, new_rating) in team.players.iter().zip(new_ratings) {
            let mut score = current.get(&player.id).cloned().unwrap_or_else(|| {
                Score::new(player.id.clone(), season, format_id, player.rating, now)
            });

            match outcome {
                Outcome::Draw => score.draw += 1,
                Outcome::Team(winner) if *winner == team.index => score.win += 1,
                Outcome::Team(_) => score.lose += 1,
            }
            score.rating = *new_rating;
            score.updated_at = now;

            changes.push(RatingChange {
                player_id: player.id.clone(),
                old_rating: player.rating,
                new_rating: *new_rating,
            });
            scores.push(score);
        }
    }

    Ok(Settlement { scores, changes })
}
