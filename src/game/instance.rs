//! Match snapshot and result confirmation

use crate::error::{MatchmakingError, Result};
use crate::types::{MatchFormat, MatchId, Outcome, Partition, PlayerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Possible states of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    /// Waiting for a result
    Open,
    /// Result recorded (terminal state)
    Closed,
}

/// Snapshot of a match created from a started lobby
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: MatchId,
    pub creator: PlayerId,
    pub season: u32,
    pub format: MatchFormat,
    /// Teams with the rating snapshots taken when the lobby started
    pub partition: Partition,
    pub outcome: Option<Outcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<PlayerId>,
}

impl Game {
    pub fn open(
        id: MatchId,
        creator: PlayerId,
        season: u32,
        format: MatchFormat,
        partition: Partition,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            creator,
            season,
            format,
            partition,
            outcome: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            closed_by: None,
        }
    }

    pub fn state(&self) -> GameState {
        if self.closed_at.is_some() {
            GameState::Closed
        } else {
            GameState::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == GameState::Open
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.partition.contains(player_id)
    }

    /// Record the result reported by `actor`, closing the match.
    ///
    /// The first valid report wins; there is no quorum.
    pub fn confirm(&self, actor: &str, outcome: Outcome, now: DateTime<Utc>) -> Result<Self> {
        if !self.has_player(actor) {
            return Err(MatchmakingError::NotMatchParticipant {
                player_id: actor.to_string(),
                match_id: self.id,
            }
            .into());
        }
        if !self.is_open() {
            return Err(MatchmakingError::MatchClosed { match_id: self.id }.into());
        }
        if let Outcome::Team(index) = outcome {
            if index >= self.partition.team_count() {
                return Err(MatchmakingError::InvalidOutcome {
                    value: (index + 1).to_string(),
                }
                .into());
            }
        }

        let mut next = self.clone();
        next.outcome = Some(outcome);
        next.updated_at = now;
        next.closed_at = Some(now);
        next.closed_by = Some(actor.to_string());
        Ok(next)
    }

    /// Multi-line description of teams and result
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Match {} ({}, season {}) created by {}",
            self.id, self.format.id, self.season, self.creator
        )];

        for team in self.partition.teams() {
            let names: Vec<&str> = team.players.iter().map(|p| p.id.as_str()).collect();
            lines.push(format!("Team {}: {}", team.index + 1, names.join(", ")));
        }

        match (&self.outcome, &self.closed_by) {
            (Some(Outcome::Draw), Some(by)) => lines.push(format!("Result: draw (confirmed by {})", by)),
            (Some(Outcome::Team(index)), Some(by)) => {
                lines.push(format!("Result: Team {} won (confirmed by {})", index + 1, by))
            }
            _ => lines.push("Result: pending".to_string()),
        }

        lines.join("\n")
    }
}
