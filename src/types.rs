//! Common types used throughout the scrim-room service

use crate::error::{MatchmakingError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skillratings::trueskill::TrueSkillRating;
use std::hash::{Hash, Hasher};

/// Stable external identifier of a user, as supplied by the messaging gateway
pub type PlayerId = String;

/// Store-assigned lobby number
pub type LobbyId = u64;

/// Store-assigned match number, shown to players
pub type MatchId = u64;

/// Name of a match format, e.g. "2v2"
pub type FormatId = String;

/// Largest pool the balancer will enumerate for team formats
pub const MAX_BALANCED_PLAYERS: usize = 16;

/// Rating information for a player
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerRating {
    pub rating: f64,
    pub uncertainty: f64,
}

impl Default for PlayerRating {
    fn default() -> Self {
        Self {
            rating: 25.0,
            uncertainty: 25.0 / 3.0,
        }
    }
}

impl From<TrueSkillRating> for PlayerRating {
    fn from(rating: TrueSkillRating) -> Self {
        Self {
            rating: rating.rating,
            uncertainty: rating.uncertainty,
        }
    }
}

impl From<PlayerRating> for TrueSkillRating {
    fn from(rating: PlayerRating) -> Self {
        Self {
            rating: rating.rating,
            uncertainty: rating.uncertainty,
        }
    }
}

/// Immutable rating snapshot of a player taken when they joined a lobby.
///
/// Equality and hashing use the id only, so the same player with a refreshed
/// rating is still the same player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub rating: PlayerRating,
    pub games: u32,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, rating: PlayerRating, games: u32) -> Self {
        Self {
            id: id.into(),
            rating,
            games,
        }
    }
}

impl PartialEq for Player {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Player {}

impl Hash for Player {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// One side of a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub index: usize,
    pub players: Vec<Player>,
}

impl Team {
    pub fn new(index: usize, players: Vec<Player>) -> Self {
        Self { index, players }
    }

    pub fn ratings(&self) -> Vec<PlayerRating> {
        self.players.iter().map(|p| p.rating).collect()
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p.id == player_id)
    }
}

/// A split of a player pool into teams, indexed `0..teams.len()`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    teams: Vec<Team>,
}

impl Partition {
    /// Build a partition from team member lists, assigning indices in order
    pub fn from_teams(teams: Vec<Vec<Player>>) -> Self {
        Self {
            teams: teams
                .into_iter()
                .enumerate()
                .map(|(index, players)| Team::new(index, players))
                .collect(),
        }
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn team(&self, index: usize) -> Option<&Team> {
        self.teams.get(index)
    }

    pub fn team_count(&self) -> usize {
        self.teams.len()
    }

    /// Index of the team the player is on
    pub fn team_of(&self, player_id: &str) -> Option<usize> {
        self.teams
            .iter()
            .find(|team| team.contains(player_id))
            .map(|team| team.index)
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.team_of(player_id).is_some()
    }

    /// All players, team by team
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.teams.iter().flat_map(|team| team.players.iter())
    }

    /// Rating lists per team, in team order
    pub fn ratings(&self) -> Vec<Vec<PlayerRating>> {
        self.teams.iter().map(Team::ratings).collect()
    }

    /// Order-insensitive identity: sorted teams of sorted player ids
    pub fn canonical_key(&self) -> Vec<Vec<PlayerId>> {
        let mut key: Vec<Vec<PlayerId>> = self
            .teams
            .iter()
            .map(|team| {
                let mut ids: Vec<PlayerId> = team.players.iter().map(|p| p.id.clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        key.sort();
        key
    }
}

impl PartialEq for Partition {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}

/// Named ruleset specifying team size and player-count bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFormat {
    pub id: FormatId,
    pub team_size: usize,
    pub min_player: usize,
    pub max_player: usize,
}

impl MatchFormat {
    pub fn new(id: impl Into<FormatId>, team_size: usize, min_player: usize, max_player: usize) -> Self {
        Self {
            id: id.into(),
            team_size,
            min_player,
            max_player,
        }
    }

    /// Whether each player forms their own team
    pub fn is_free_for_all(&self) -> bool {
        self.team_size == 1
    }

    /// Number of teams a full lobby is split into
    pub fn team_count(&self) -> usize {
        if self.team_size == 0 {
            0
        } else {
            self.max_player / self.team_size
        }
    }

    /// Check the format invariants
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> anyhow::Error {
            MatchmakingError::InvalidFormat {
                format_id: self.id.clone(),
                reason,
            }
            .into()
        };

        if self.id.trim().is_empty() {
            return Err(invalid("format id cannot be empty".to_string()));
        }
        if self.team_size == 0 {
            return Err(invalid("team_size must be greater than 0".to_string()));
        }
        if self.min_player == 0 {
            return Err(invalid("min_player must be greater than 0".to_string()));
        }
        if self.min_player > self.max_player {
            return Err(invalid(format!(
                "min_player ({}) exceeds max_player ({})",
                self.min_player, self.max_player
            )));
        }
        if self.is_free_for_all() {
            if self.max_player < 2 {
                return Err(invalid(format!(
                    "free-for-all needs at least 2 players, got max_player ({})",
                    self.max_player
                )));
            }
        } else {
            if self.max_player % self.team_size != 0 {
                return Err(invalid(format!(
                    "max_player ({}) is not a multiple of team_size ({})",
                    self.max_player, self.team_size
                )));
            }
            if self.team_count() != 2 {
                return Err(invalid(format!(
                    "team formats split into exactly 2 teams, got {}",
                    self.team_count()
                )));
            }
            if self.max_player > MAX_BALANCED_PLAYERS {
                return Err(invalid(format!(
                    "max_player ({}) exceeds the balancing limit of {}",
                    self.max_player, MAX_BALANCED_PLAYERS
                )));
            }
        }

        Ok(())
    }
}

impl std::fmt::Display for MatchFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Declared result of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Draw,
    /// Zero-based index of the winning team
    Team(usize),
}

impl Outcome {
    /// Parse user input: `draw` (any case) or a 1-based team number
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("draw") {
            return Ok(Outcome::Draw);
        }

        let digits_only = !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit());
        match trimmed.parse::<usize>() {
            Ok(number) if digits_only && number >= 1 => Ok(Outcome::Team(number - 1)),
            _ => Err(MatchmakingError::InvalidOutcome {
                value: trimmed.to_string(),
            }
            .into()),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Draw => write!(f, "draw"),
            Outcome::Team(index) => write!(f, "team {}", index + 1),
        }
    }
}

/// Identity of the user behind a command, as delivered by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: PlayerId,
    pub name: String,
}

impl Identity {
    pub fn new(user_id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
        }
    }
}

/// Registered community member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: PlayerId,
    pub name: String,
    pub admin: bool,
    pub moderator: bool,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(identity: &Identity, now: DateTime<Utc>) -> Self {
        Self {
            id: identity.user_id.clone(),
            name: identity.name.clone(),
            admin: false,
            moderator: false,
            disabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moderators and admins may override lobby ownership rules
    pub fn is_privileged(&self) -> bool {
        self.moderator || self.admin
    }
}

/// Per-season, per-format rating record of a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub player_id: PlayerId,
    pub season: u32,
    pub format_id: FormatId,
    pub rating: PlayerRating,
    pub win: u32,
    pub lose: u32,
    pub draw: u32,
    pub updated_at: DateTime<Utc>,
}

impl Score {
    pub fn new(
        player_id: impl Into<PlayerId>,
        season: u32,
        format_id: impl Into<FormatId>,
        rating: PlayerRating,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            player_id: player_id.into(),
            season,
            format_id: format_id.into(),
            rating,
            win: 0,
            lose: 0,
            draw: 0,
            updated_at: now,
        }
    }

    pub fn games(&self) -> u32 {
        self.win + self.lose + self.draw
    }

    /// Snapshot used when the player queues up
    pub fn to_player(&self) -> Player {
        Player::new(self.player_id.clone(), self.rating, self.games())
    }
}

/// Rating change information for a player after a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingChange {
    pub player_id: PlayerId,
    pub old_rating: PlayerRating,
    pub new_rating: PlayerRating,
}
