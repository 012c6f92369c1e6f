//! In-memory store with commit/rollback semantics
//!
//! A transaction holds the store-wide lock for its whole lifetime and works
//! on a private copy of the state. Commit swaps the copy in; drop discards it.

use crate::error::{MatchmakingError, Result};
use crate::game::Game;
use crate::lobby::Lobby;
use crate::store::{NewGame, NewLobby, Store, Transaction};
use crate::types::{FormatId, LobbyId, MatchFormat, MatchId, PlayerId, Score, User};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

type ScoreKey = (PlayerId, u32, FormatId);

#[derive(Debug, Clone)]
struct StoreState {
    users: HashMap<PlayerId, User>,
    formats: BTreeMap<FormatId, MatchFormat>,
    lobbies: BTreeMap<LobbyId, Lobby>,
    games: BTreeMap<MatchId, Game>,
    scores: HashMap<ScoreKey, Score>,
    next_lobby_id: LobbyId,
    next_game_id: MatchId,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            users: HashMap::new(),
            formats: BTreeMap::new(),
            lobbies: BTreeMap::new(),
            games: BTreeMap::new(),
            scores: HashMap::new(),
            next_lobby_id: 1,
            next_game_id: 1,
        }
    }
}

fn conflict(reason: impl Into<String>) -> anyhow::Error {
    MatchmakingError::StateConflict {
        reason: reason.into(),
    }
    .into()
}

/// Counts of stored entities, for health and stats reporting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub users: usize,
    pub formats: usize,
    pub lobbies: usize,
    pub open_lobbies: usize,
    pub games: usize,
    pub open_games: usize,
}

/// Store keeping everything in process memory
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
    available: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate an outage; `begin` fails while unavailable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Entity counts as of the last commit
    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.lock().await;
        StoreSnapshot {
            users: state.users.len(),
            formats: state.formats.len(),
            lobbies: state.lobbies.len(),
            open_lobbies: state.lobbies.values().filter(|l| l.is_open()).count(),
            games: state.games.len(),
            open_games: state.games.values().filter(|g| g.is_open()).count(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        if !self.is_available() {
            return Err(MatchmakingError::StorageUnavailable {
                message: "in-memory store is marked unavailable".to_string(),
            }
            .into());
        }

        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            committed: false,
        }))
    }
}

/// Transaction over [`InMemoryStore`]
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<StoreState>,
    working: StoreState,
    committed: bool,
}

impl InMemoryTransaction {
    fn ensure_active(&self) -> Result<()> {
        if self.committed {
            Err(MatchmakingError::InternalError {
                message: "transaction already committed".to_string(),
            }
            .into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.working.users.get(user_id).cloned())
    }

    async fn upsert_user(&mut self, user: User) -> Result<()> {
        self.ensure_active()?;
        self.working.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get_format(&self, format_id: &str) -> Result<Option<MatchFormat>> {
        Ok(self.working.formats.get(format_id).cloned())
    }

    async fn list_formats(&self) -> Result<Vec<MatchFormat>> {
        Ok(self.working.formats.values().cloned().collect())
    }

    async fn insert_format(&mut self, format: MatchFormat) -> Result<()> {
        self.ensure_active()?;
        if self.working.formats.contains_key(&format.id) {
            return Err(conflict(format!("format {} already exists", format.id)));
        }
        self.working.formats.insert(format.id.clone(), format);
        Ok(())
    }

    async fn open_lobby(&self) -> Result<Option<Lobby>> {
        Ok(self.working.lobbies.values().find(|l| l.is_open()).cloned())
    }

    async fn insert_lobby(&mut self, lobby: NewLobby) -> Result<Lobby> {
        self.ensure_active()?;
        if let Some(open) = self.working.lobbies.values().find(|l| l.is_open()) {
            return Err(conflict(format!("lobby {} is already open", open.id)));
        }

        let id = self.working.next_lobby_id;
        self.working.next_lobby_id += 1;
        let lobby = Lobby::open(id, lobby.creator, lobby.format, lobby.created_at);
        self.working.lobbies.insert(id, lobby.clone());
        Ok(lobby)
    }

    async fn update_lobby(&mut self, lobby: Lobby) -> Result<()> {
        self.ensure_active()?;
        match self.working.lobbies.get(&lobby.id) {
            None => return Err(conflict(format!("lobby {} does not exist", lobby.id))),
            Some(stored) if !stored.is_open() => {
                return Err(conflict(format!("lobby {} is already closed", lobby.id)))
            }
            Some(_) => {}
        }
        if lobby.population() > lobby.format.max_player {
            return Err(conflict(format!(
                "lobby {} would hold {} of {} players",
                lobby.id,
                lobby.population(),
                lobby.format.max_player
            )));
        }

        self.working.lobbies.insert(lobby.id, lobby);
        Ok(())
    }

    async fn get_game(&self, match_id: MatchId) -> Result<Option<Game>> {
        Ok(self.working.games.get(&match_id).cloned())
    }

    async fn active_game_for(&self, player_id: &str) -> Result<Option<Game>> {
        Ok(self
            .working
            .games
            .values()
            .find(|g| g.is_open() && g.has_player(player_id))
            .cloned())
    }

    async fn insert_game(&mut self, game: NewGame) -> Result<Game> {
        self.ensure_active()?;
        for player in game.partition.players() {
            let busy = self
                .working
                .games
                .values()
                .find(|g| g.is_open() && g.has_player(&player.id));
            if let Some(busy) = busy {
                return Err(conflict(format!(
                    "{} is already in open match {}",
                    player.id, busy.id
                )));
            }
        }

        let id = self.working.next_game_id;
        self.working.next_game_id += 1;
        let game = Game::open(
            id,
            game.creator,
            game.season,
            game.format,
            game.partition,
            game.created_at,
        );
        self.working.games.insert(id, game.clone());
        Ok(game)
    }

    async fn update_game(&mut self, game: Game) -> Result<()> {
        self.ensure_active()?;
        match self.working.games.get(&game.id) {
            None => return Err(conflict(format!("match {} does not exist", game.id))),
            Some(stored) if !stored.is_open() => {
                return Err(conflict(format!("match {} is already closed", game.id)))
            }
            Some(_) => {}
        }

        self.working.games.insert(game.id, game);
        Ok(())
    }

    async fn get_score(&self, player_id: &str, season: u32, format_id: &str) -> Result<Option<Score>> {
        let key = (player_id.to_string(), season, format_id.to_string());
        Ok(self.working.scores.get(&key).cloned())
    }

    async fn upsert_score(&mut self, score: Score) -> Result<()> {
        self.ensure_active()?;
        let key = (score.player_id.clone(), score.season, score.format_id.clone());
        self.working.scores.insert(key, score);
        Ok(())
    }

    async fn scores_for(&self, player_id: &str, season: u32) -> Result<Vec<Score>> {
        let mut scores: Vec<Score> = self
            .working
            .scores
            .values()
            .filter(|s| s.player_id == player_id && s.season == season)
            .cloned()
            .collect();
        scores.sort_by(|a, b| a.format_id.cmp(&b.format_id));
        Ok(scores)
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        *self.guard = std::mem::take(&mut self.working);
        self.committed = true;
        debug!("Committed in-memory transaction");
        Ok(())
    }
}
