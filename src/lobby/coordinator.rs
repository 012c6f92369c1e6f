//! Lifecycle coordinator
//!
//! Every operation here runs inside exactly one store transaction: it reads
//! the current snapshots, applies a pure transition, writes the result and
//! commits. Any error drops the transaction, discarding its writes.

use crate::balance::Balancer;
use crate::config::LobbyConfig;
use crate::error::{as_matchmaking_error, MatchmakingError, Result};
use crate::game::Game;
use crate::lobby::instance::{LeaveOutcome, Lobby};
use crate::metrics::MetricsCollector;
use crate::rating::{settle_scores, SkillModel};
use crate::store::{NewGame, NewLobby, Store, Transaction};
use crate::types::{Identity, MatchFormat, MatchId, Outcome, Player, RatingChange, Score, User};
use crate::utils::Clock;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a player currently is
#[derive(Debug, Clone)]
pub enum Location {
    /// Playing an open match
    InMatch(Game),
    /// Signed up for the open lobby
    InLobby(Lobby),
    /// Neither; carries the open lobby if there is one
    Idle(Option<Lobby>),
}

/// Result of starting a lobby
#[derive(Debug, Clone)]
pub struct StartedMatch {
    pub lobby: Lobby,
    pub game: Game,
}

/// Result of confirming a match
#[derive(Debug, Clone)]
pub struct ConfirmedMatch {
    pub game: Game,
    pub changes: Vec<RatingChange>,
}

/// Runs lobby and match operations against the store
pub struct LifecycleCoordinator {
    store: Arc<dyn Store>,
    model: Arc<dyn SkillModel>,
    balancer: Balancer,
    rng: Mutex<StdRng>,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
    season: u32,
    inactivity: Duration,
}

impl LifecycleCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        model: Arc<dyn SkillModel>,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
        config: &LobbyConfig,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            store,
            balancer: Balancer::new(model.clone()),
            model,
            rng: Mutex::new(rng),
            clock,
            metrics,
            season: config.season,
            inactivity: config.inactivity_window(),
        }
    }

    pub fn season(&self) -> u32 {
        self.season
    }

    /// Insert missing formats and grant configured roles
    pub async fn bootstrap(
        &self,
        formats: &[MatchFormat],
        admins: &[String],
        moderators: &[String],
    ) -> Result<()> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        for format in formats {
            format.validate()?;
            if tx.get_format(&format.id).await?.is_none() {
                tx.insert_format(format.clone()).await?;
                info!("Registered match format {}", format.id);
            }
        }

        let grants = admins
            .iter()
            .map(|id| (id, true))
            .chain(moderators.iter().map(|id| (id, false)));
        for (id, admin) in grants {
            let mut user = match tx.get_user(id).await? {
                Some(user) => user,
                None => User::new(&Identity::new(id.clone(), id.clone()), now),
            };
            if admin {
                user.admin = true;
            } else {
                user.moderator = true;
            }
            user.updated_at = now;
            tx.upsert_user(user).await?;
        }

        tx.commit().await?;
        info!(
            "Bootstrapped {} formats, {} admins, {} moderators",
            formats.len(),
            admins.len(),
            moderators.len()
        );
        Ok(())
    }

    /// Get or create the user behind `identity`, refreshing the display name
    pub async fn register(&self, identity: &Identity) -> Result<User> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let user = self.ensure_user(tx.as_mut(), identity, now).await?;
        tx.commit().await?;
        Ok(user)
    }

    /// Formats players can create lobbies for
    pub async fn list_formats(&self) -> Result<Vec<MatchFormat>> {
        let tx = self.store.begin().await?;
        tx.list_formats().await
    }

    /// Open a new lobby with the caller as creator
    pub async fn create_lobby(&self, identity: &Identity, format_id: &str) -> Result<Lobby> {
        let result = self.create_lobby_inner(identity, format_id).await;
        self.observe("create", identity, result.as_ref().err());

        let lobby = result?;
        self.metrics.record_lobby_created(&lobby.format.id);
        info!(
            "Lobby {} ({}) created by {}",
            lobby.id, lobby.format.id, lobby.creator
        );
        Ok(lobby)
    }

    async fn create_lobby_inner(&self, identity: &Identity, format_id: &str) -> Result<Lobby> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let user = self.ensure_user(tx.as_mut(), identity, now).await?;

        if let Some(open) = tx.open_lobby().await? {
            return Err(MatchmakingError::LobbyAlreadyOpen {
                creator: open.creator,
            }
            .into());
        }

        let format = match tx.get_format(format_id).await? {
            Some(format) => format,
            None => {
                let available = tx.list_formats().await?.into_iter().map(|f| f.id).collect();
                return Err(MatchmakingError::UnknownFormat {
                    format_id: format_id.to_string(),
                    available,
                }
                .into());
            }
        };
        format.validate()?;

        if user.disabled {
            return Err(MatchmakingError::PlayerDisabled { player_id: user.id }.into());
        }
        if let Some(game) = tx.active_game_for(&user.id).await? {
            return Err(MatchmakingError::PlayerInActiveMatch {
                player_id: user.id,
                match_id: game.id,
            }
            .into());
        }

        let creator = self.snapshot(tx.as_ref(), &user.id, &format).await?;
        let lobby = tx
            .insert_lobby(NewLobby {
                creator,
                format,
                created_at: now,
            })
            .await?;

        tx.commit().await?;
        Ok(lobby)
    }

    /// Add the caller to the open lobby
    pub async fn join_lobby(&self, identity: &Identity) -> Result<Lobby> {
        let result = self.join_lobby_inner(identity).await;
        self.observe("join", identity, result.as_ref().err());

        let lobby = result?;
        self.metrics.record_lobby_population(lobby.population(), true);
        info!(
            "{} joined lobby {} ({}/{})",
            identity.user_id,
            lobby.id,
            lobby.population(),
            lobby.format.max_player
        );
        Ok(lobby)
    }

    async fn join_lobby_inner(&self, identity: &Identity) -> Result<Lobby> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let user = self.ensure_user(tx.as_mut(), identity, now).await?;

        let lobby = Self::require_open_lobby(tx.as_ref()).await?;
        let active_match = tx.active_game_for(&user.id).await?.map(|game| game.id);
        let player = self.snapshot(tx.as_ref(), &user.id, &lobby.format).await?;

        let joined = lobby.join(player, &user, active_match, now)?;
        tx.update_lobby(joined.clone()).await?;

        tx.commit().await?;
        Ok(joined)
    }

    /// Remove the caller from the open lobby
    pub async fn leave_lobby(&self, identity: &Identity) -> Result<LeaveOutcome> {
        let result = self.leave_lobby_inner(identity).await;
        self.observe("leave", identity, result.as_ref().err());

        let outcome = result?;
        match &outcome {
            LeaveOutcome::Left(lobby) => {
                self.metrics.record_lobby_population(lobby.population(), false);
                info!("{} left lobby {}", identity.user_id, lobby.id);
            }
            LeaveOutcome::Closed(lobby) => {
                self.record_closed(lobby);
                info!("Creator {} left, lobby {} closed", identity.user_id, lobby.id);
            }
        }
        Ok(outcome)
    }

    async fn leave_lobby_inner(&self, identity: &Identity) -> Result<LeaveOutcome> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        self.ensure_user(tx.as_mut(), identity, now).await?;

        let lobby = Self::require_open_lobby(tx.as_ref()).await?;
        let outcome = lobby.leave(&identity.user_id, now)?;
        tx.update_lobby(outcome.lobby().clone()).await?;

        tx.commit().await?;
        Ok(outcome)
    }

    /// Close the open lobby
    pub async fn close_lobby(&self, identity: &Identity) -> Result<Lobby> {
        let result = self.close_lobby_inner(identity).await;
        self.observe("close", identity, result.as_ref().err());

        let lobby = result?;
        self.record_closed(&lobby);
        info!(
            "Lobby {} closed by {} ({:?})",
            lobby.id, identity.user_id, lobby.close_reason
        );
        Ok(lobby)
    }

    async fn close_lobby_inner(&self, identity: &Identity) -> Result<Lobby> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let user = self.ensure_user(tx.as_mut(), identity, now).await?;

        let lobby = Self::require_open_lobby(tx.as_ref()).await?;
        let closed = lobby.close(&user, self.inactivity, now)?;
        tx.update_lobby(closed.clone()).await?;

        tx.commit().await?;
        Ok(closed)
    }

    /// Remove `target` from the open lobby on behalf of a moderator
    pub async fn kick_player(&self, identity: &Identity, target: &str) -> Result<Lobby> {
        let result = self.kick_player_inner(identity, target).await;
        self.observe("kick", identity, result.as_ref().err());

        let lobby = result?;
        self.metrics.record_lobby_population(lobby.population(), false);
        info!(
            "{} kicked {} from lobby {}",
            identity.user_id, target, lobby.id
        );
        Ok(lobby)
    }

    async fn kick_player_inner(&self, identity: &Identity, target: &str) -> Result<Lobby> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let user = self.ensure_user(tx.as_mut(), identity, now).await?;

        let lobby = Self::require_open_lobby(tx.as_ref()).await?;
        let kicked = lobby.kick(&user, target, now)?;
        tx.update_lobby(kicked.clone()).await?;

        tx.commit().await?;
        Ok(kicked)
    }

    /// Close the full lobby, balance teams and open the match
    pub async fn start_lobby(&self, identity: &Identity) -> Result<StartedMatch> {
        let result = self.start_lobby_inner(identity).await;
        self.observe("start", identity, result.as_ref().err());

        let (started, balance_time) = result?;
        self.record_closed(&started.lobby);
        self.metrics
            .record_game_started(&started.game.format.id, balance_time);
        info!(
            "Lobby {} started as match {} ({} teams)",
            started.lobby.id,
            started.game.id,
            started.game.partition.team_count()
        );
        Ok(started)
    }

    async fn start_lobby_inner(
        &self,
        identity: &Identity,
    ) -> Result<(StartedMatch, std::time::Duration)> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        self.ensure_user(tx.as_mut(), identity, now).await?;

        let lobby = Self::require_open_lobby(tx.as_ref()).await?;

        let timer = Instant::now();
        let (closed, partition) = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| MatchmakingError::InternalError {
                    message: "Failed to acquire balancer rng lock".to_string(),
                })?;
            lobby.start(&identity.user_id, &self.balancer, &mut *rng, now)?
        };
        let balance_time = timer.elapsed();
        debug!(
            "Balanced lobby {} in {:?}",
            lobby.id, balance_time
        );

        tx.update_lobby(closed.clone()).await?;
        let game = tx
            .insert_game(NewGame {
                creator: closed.creator.clone(),
                season: self.season,
                format: closed.format.clone(),
                partition,
                created_at: now,
            })
            .await?;

        tx.commit().await?;
        Ok((StartedMatch { lobby: closed, game }, balance_time))
    }

    /// Report the result of the caller's open match and settle ratings
    pub async fn confirm_match(&self, identity: &Identity, outcome: Outcome) -> Result<ConfirmedMatch> {
        let result = self.confirm_match_inner(identity, outcome).await;
        self.observe("confirm", identity, result.as_ref().err());

        let (confirmed, rating_time) = result?;
        self.metrics.record_game_confirmed(&outcome, rating_time);
        info!(
            "Match {} confirmed as {} by {}",
            confirmed.game.id, outcome, identity.user_id
        );
        Ok(confirmed)
    }

    async fn confirm_match_inner(
        &self,
        identity: &Identity,
        outcome: Outcome,
    ) -> Result<(ConfirmedMatch, std::time::Duration)> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        self.ensure_user(tx.as_mut(), identity, now).await?;

        let game = tx
            .active_game_for(&identity.user_id)
            .await?
            .ok_or_else(|| MatchmakingError::NotInActiveMatch {
                player_id: identity.user_id.clone(),
            })?;

        let closed = game.confirm(&identity.user_id, outcome, now)?;
        tx.update_game(closed.clone()).await?;

        let timer = Instant::now();
        let rated = self.model.rate(&closed.partition.ratings(), &outcome)?;

        let mut current = HashMap::new();
        for player in closed.partition.players() {
            if let Some(score) = tx
                .get_score(&player.id, closed.season, &closed.format.id)
                .await?
            {
                current.insert(player.id.clone(), score);
            }
        }

        let settlement = settle_scores(
            &closed.partition,
            &outcome,
            &rated,
            &current,
            closed.season,
            &closed.format.id,
            now,
        )?;
        let rating_time = timer.elapsed();

        for score in settlement.scores {
            tx.upsert_score(score).await?;
        }

        tx.commit().await?;
        Ok((
            ConfirmedMatch {
                game: closed,
                changes: settlement.changes,
            },
            rating_time,
        ))
    }

    /// Whether the caller is in a match, in the lobby, or neither
    pub async fn locate(&self, identity: &Identity) -> Result<Location> {
        let tx = self.store.begin().await?;

        if let Some(game) = tx.active_game_for(&identity.user_id).await? {
            return Ok(Location::InMatch(game));
        }

        let lobby = tx.open_lobby().await?;
        Ok(match lobby {
            Some(lobby) if lobby.contains(&identity.user_id) => Location::InLobby(lobby),
            other => Location::Idle(other),
        })
    }

    /// Look up a match by id
    pub async fn match_info(&self, match_id: MatchId) -> Result<Game> {
        let tx = self.store.begin().await?;
        tx.get_game(match_id)
            .await?
            .ok_or_else(|| MatchmakingError::MatchNotFound { match_id }.into())
    }

    /// Look up a registered user
    pub async fn user(&self, user_id: &str) -> Result<User> {
        let tx = self.store.begin().await?;
        Self::require_user(tx.as_ref(), user_id).await
    }

    /// Scores of a player in the current season
    pub async fn player_stats(&self, player_id: &str) -> Result<(User, Vec<Score>)> {
        let tx = self.store.begin().await?;
        let user = Self::require_user(tx.as_ref(), player_id).await?;
        let scores = tx.scores_for(player_id, self.season).await?;
        Ok((user, scores))
    }

    /// Enable or disable a user; admin only
    pub async fn set_disabled(&self, identity: &Identity, target: &str, disabled: bool) -> Result<User> {
        let result = self.set_disabled_inner(identity, target, disabled).await;
        self.observe(if disabled { "disable" } else { "enable" }, identity, result.as_ref().err());

        let user = result?;
        info!(
            "{} {} user {}",
            identity.user_id,
            if disabled { "disabled" } else { "enabled" },
            user.id
        );
        Ok(user)
    }

    async fn set_disabled_inner(&self, identity: &Identity, target: &str, disabled: bool) -> Result<User> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let actor = self.ensure_user(tx.as_mut(), identity, now).await?;

        if !actor.admin {
            return Err(MatchmakingError::PermissionDenied {
                action: if disabled { "disable" } else { "enable" }.to_string(),
                role: "admin".to_string(),
            }
            .into());
        }

        let mut user = Self::require_user(tx.as_ref(), target).await?;
        user.disabled = disabled;
        user.updated_at = now;
        tx.upsert_user(user.clone()).await?;

        tx.commit().await?;
        Ok(user)
    }

    /// Whether `identity` holds the admin role
    pub async fn is_admin(&self, identity: &Identity) -> Result<bool> {
        let tx = self.store.begin().await?;
        Ok(tx
            .get_user(&identity.user_id)
            .await?
            .map(|user| user.admin)
            .unwrap_or(false))
    }

    async fn ensure_user(
        &self,
        tx: &mut dyn Transaction,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<User> {
        match tx.get_user(&identity.user_id).await? {
            Some(user) if user.name == identity.name => Ok(user),
            Some(mut user) => {
                user.name = identity.name.clone();
                user.updated_at = now;
                tx.upsert_user(user.clone()).await?;
                Ok(user)
            }
            None => {
                let user = User::new(identity, now);
                tx.upsert_user(user.clone()).await?;
                debug!("Registered new user {}", user.id);
                Ok(user)
            }
        }
    }

    /// Rating snapshot of a player for the current season and `format`
    async fn snapshot(
        &self,
        tx: &dyn Transaction,
        player_id: &str,
        format: &MatchFormat,
    ) -> Result<Player> {
        let player = match tx.get_score(player_id, self.season, &format.id).await? {
            Some(score) => score.to_player(),
            None => Player::new(player_id, self.model.initial_rating(), 0),
        };
        Ok(player)
    }

    async fn require_open_lobby(tx: &dyn Transaction) -> Result<Lobby> {
        tx.open_lobby()
            .await?
            .ok_or_else(|| MatchmakingError::NoActiveLobby.into())
    }

    async fn require_user(tx: &dyn Transaction, user_id: &str) -> Result<User> {
        tx.get_user(user_id).await?.ok_or_else(|| {
            MatchmakingError::UserNotFound {
                user_id: user_id.to_string(),
            }
            .into()
        })
    }

    fn record_closed(&self, lobby: &Lobby) {
        if let Some(reason) = lobby.close_reason {
            self.metrics.record_lobby_closed(reason);
        }
    }

    fn observe(&self, operation: &str, identity: &Identity, error: Option<&anyhow::Error>) {
        if let Some(e) = error {
            match as_matchmaking_error(e) {
                Some(MatchmakingError::StateConflict { .. }) => {
                    self.metrics.record_conflict();
                    warn!("{} by {} lost a race: {}", operation, identity.user_id, e);
                }
                Some(error) if error.is_user_facing() => {
                    warn!("{} by {} rejected: {}", operation, identity.user_id, e);
                }
                _ => {}
            }
        }
    }
}

impl std::fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("season", &self.season)
            .field("inactivity", &self.inactivity)
            .finish_non_exhaustive()
    }
}
