//! Persistence interface
//!
//! All reads and writes of an operation happen inside one [`Transaction`].
//! Dropping a transaction without calling [`Transaction::commit`] discards
//! every write made through it. Implementations enforce the lifecycle
//! constraints themselves and report violations as
//! [`MatchmakingError::StateConflict`](crate::error::MatchmakingError::StateConflict).

pub mod memory;

use crate::error::Result;
use crate::game::Game;
use crate::lobby::Lobby;
use crate::types::{MatchFormat, MatchId, Partition, Player, PlayerId, Score, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::InMemoryStore;

/// Lobby to be inserted; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewLobby {
    pub creator: Player,
    pub format: MatchFormat,
    pub created_at: DateTime<Utc>,
}

/// Match to be inserted; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewGame {
    pub creator: PlayerId,
    pub season: u32,
    pub format: MatchFormat,
    pub partition: Partition,
    pub created_at: DateTime<Utc>,
}

/// Transactional storage backend
#[async_trait]
pub trait Store: Send + Sync {
    /// Start a transaction
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

/// Unit of work against the store
#[async_trait]
pub trait Transaction: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    async fn upsert_user(&mut self, user: User) -> Result<()>;

    async fn get_format(&self, format_id: &str) -> Result<Option<MatchFormat>>;

    /// All formats ordered by id
    async fn list_formats(&self) -> Result<Vec<MatchFormat>>;

    /// Add a format; fails if the id is taken
    async fn insert_format(&mut self, format: MatchFormat) -> Result<()>;

    /// The single open lobby, if any
    async fn open_lobby(&self) -> Result<Option<Lobby>>;

    /// Insert a lobby; fails if another lobby is open
    async fn insert_lobby(&mut self, lobby: NewLobby) -> Result<Lobby>;

    /// Replace a lobby snapshot; only open lobbies may be updated and the
    /// new snapshot must fit its format
    async fn update_lobby(&mut self, lobby: Lobby) -> Result<()>;

    async fn get_game(&self, match_id: MatchId) -> Result<Option<Game>>;

    /// The open match the player is part of, if any
    async fn active_game_for(&self, player_id: &str) -> Result<Option<Game>>;

    /// Insert a match; fails if any participant is in another open match
    async fn insert_game(&mut self, game: NewGame) -> Result<Game>;

    /// Replace a match snapshot; closed matches cannot be updated
    async fn update_game(&mut self, game: Game) -> Result<()>;

    async fn get_score(&self, player_id: &str, season: u32, format_id: &str) -> Result<Option<Score>>;

    async fn upsert_score(&mut self, score: Score) -> Result<()>;

    /// Scores of a player in a season, ordered by format
    async fn scores_for(&self, player_id: &str, season: u32) -> Result<Vec<Score>>;

    /// Make every write of this transaction visible
    async fn commit(&mut self) -> Result<()>;
}
