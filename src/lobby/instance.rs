//! Lobby instance implementation and lifecycle rules
//!
//! A [`Lobby`] is an immutable snapshot. Every transition validates the
//! request against the current snapshot and returns a new one stamped with
//! the caller's `now`; the store decides whether the new snapshot is kept.

use crate::balance::Balancer;
use crate::error::{MatchmakingError, Result};
use crate::types::{LobbyId, MatchFormat, MatchId, Partition, Player, PlayerId, User};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Possible states of a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyState {
    /// Lobby is accepting players
    Open,
    /// Lobby was closed or started (terminal state)
    Closed,
}

/// Why a lobby was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    ClosedByCreator,
    ClosedByModerator,
    Inactive,
    CreatorLeft,
    Started,
}

/// Result of a player leaving
#[derive(Debug, Clone)]
pub enum LeaveOutcome {
    /// The player was removed and the lobby stays open
    Left(Lobby),
    /// The creator left, taking the lobby down with them
    Closed(Lobby),
}

impl LeaveOutcome {
    pub fn lobby(&self) -> &Lobby {
        match self {
            LeaveOutcome::Left(lobby) | LeaveOutcome::Closed(lobby) => lobby,
        }
    }

    pub fn into_lobby(self) -> Lobby {
        match self {
            LeaveOutcome::Left(lobby) | LeaveOutcome::Closed(lobby) => lobby,
        }
    }
}

/// Snapshot of a lobby
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lobby {
    pub id: LobbyId,
    pub creator: PlayerId,
    pub format: MatchFormat,
    /// Joined players in join order
    pub players: Vec<Player>,
    pub created_at: DateTime<Utc>,
    /// Last membership activity
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
}

impl Lobby {
    /// Open a new lobby with the creator as its first player
    pub fn open(id: LobbyId, creator: Player, format: MatchFormat, now: DateTime<Utc>) -> Self {
        Self {
            id,
            creator: creator.id.clone(),
            format,
            players: vec![creator],
            created_at: now,
            updated_at: now,
            closed_at: None,
            close_reason: None,
        }
    }

    pub fn state(&self) -> LobbyState {
        if self.closed_at.is_some() {
            LobbyState::Closed
        } else {
            LobbyState::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == LobbyState::Open
    }

    pub fn population(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.format.max_player
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p.id == player_id)
    }

    /// Whether anyone may close the lobby because it has been idle too long
    pub fn is_inactive(&self, inactivity: Duration, now: DateTime<Utc>) -> bool {
        now - self.updated_at > inactivity
    }

    /// One-line summary for replies
    pub fn status(&self) -> String {
        let names: Vec<&str> = self.players.iter().map(|p| p.id.as_str()).collect();
        format!(
            "Lobby {} ({}) by {}: {}/{} players [{}]",
            self.id,
            self.format.id,
            self.creator,
            self.population(),
            self.format.max_player,
            names.join(", ")
        )
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(MatchmakingError::LobbyClosed { lobby_id: self.id }.into())
        }
    }

    fn touched(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.updated_at = now;
        next
    }

    fn closed(&self, reason: CloseReason, now: DateTime<Utc>) -> Self {
        let mut next = self.touched(now);
        next.closed_at = Some(now);
        next.close_reason = Some(reason);
        next
    }

    fn without(&self, player_id: &str, now: DateTime<Utc>) -> Result<Self> {
        if !self.contains(player_id) {
            return Err(MatchmakingError::NotInLobby {
                player_id: player_id.to_string(),
            }
            .into());
        }
        let mut next = self.touched(now);
        next.players.retain(|p| p.id != player_id);
        Ok(next)
    }

    /// Add a player.
    ///
    /// `active_match` is the open match the player is currently in, if any.
    pub fn join(
        &self,
        player: Player,
        user: &User,
        active_match: Option<MatchId>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        self.ensure_open()?;

        if self.contains(&player.id) {
            return Err(MatchmakingError::AlreadyInLobby {
                player_id: player.id,
            }
            .into());
        }
        if user.disabled {
            return Err(MatchmakingError::PlayerDisabled {
                player_id: player.id,
            }
            .into());
        }
        if let Some(match_id) = active_match {
            return Err(MatchmakingError::PlayerInActiveMatch {
                player_id: player.id,
                match_id,
            }
            .into());
        }
        if self.is_full() {
            return Err(MatchmakingError::LobbyFull {
                current: self.population(),
                max: self.format.max_player,
            }
            .into());
        }

        let mut next = self.touched(now);
        next.players.push(player);
        Ok(next)
    }

    /// Remove a player; the lobby closes if it was the creator
    pub fn leave(&self, player_id: &str, now: DateTime<Utc>) -> Result<LeaveOutcome> {
        self.ensure_open()?;

        if player_id == self.creator && self.contains(player_id) {
            return Ok(LeaveOutcome::Closed(self.closed(CloseReason::CreatorLeft, now)));
        }

        Ok(LeaveOutcome::Left(self.without(player_id, now)?))
    }

    /// Close on request of `actor`
    pub fn close(&self, actor: &User, inactivity: Duration, now: DateTime<Utc>) -> Result<Self> {
        self.ensure_open()?;

        let reason = if actor.id == self.creator {
            CloseReason::ClosedByCreator
        } else if self.is_inactive(inactivity, now) {
            CloseReason::Inactive
        } else if actor.is_privileged() {
            CloseReason::ClosedByModerator
        } else {
            return Err(MatchmakingError::CloseNotPermitted {
                creator: self.creator.clone(),
            }
            .into());
        };

        Ok(self.closed(reason, now))
    }

    /// Remove `target` on behalf of a moderator; never closes the lobby
    pub fn kick(&self, actor: &User, target: &str, now: DateTime<Utc>) -> Result<Self> {
        self.ensure_open()?;

        if !actor.is_privileged() {
            return Err(MatchmakingError::PermissionDenied {
                action: "kick".to_string(),
                role: "moderator".to_string(),
            }
            .into());
        }
        if target == self.creator {
            return Err(MatchmakingError::CannotKickCreator.into());
        }

        self.without(target, now)
    }

    /// Close the lobby and split its players into teams
    pub fn start<R: Rng + ?Sized>(
        &self,
        actor: &str,
        balancer: &Balancer,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<(Self, Partition)> {
        self.ensure_open()?;

        if actor != self.creator {
            return Err(MatchmakingError::NotLobbyCreator {
                creator: self.creator.clone(),
            }
            .into());
        }
        if self.population() < self.format.max_player {
            return Err(MatchmakingError::InsufficientPlayers {
                current: self.population(),
                required: self.format.max_player,
            }
            .into());
        }

        let partition = balancer.balance(&self.players, &self.format, rng)?;
        Ok((self.closed(CloseReason::Started, now), partition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::TrueSkillModel;
    use crate::types::{Identity, PlayerRating};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn player(id: &str) -> Player {
        Player::new(id, PlayerRating::default(), 0)
    }

    fn user(id: &str) -> User {
        User::new(&Identity::new(id, id), Utc::now())
    }

    fn lobby(now: DateTime<Utc>) -> Lobby {
        Lobby::open(1, player("host"), MatchFormat::new("2v2", 2, 4, 4), now)
    }

    fn full_lobby(now: DateTime<Utc>) -> Lobby {
        ["b", "c", "d"].iter().fold(lobby(now), |lobby, id| {
            lobby.join(player(id), &user(id), None, now).unwrap()
        })
    }

    fn error_of<T: std::fmt::Debug>(result: Result<T>) -> MatchmakingError {
        let error = result.unwrap_err();
        match error.downcast::<MatchmakingError>() {
            Ok(error) => error,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_open_includes_creator() {
        let now = Utc::now();
        let lobby = lobby(now);
        assert!(lobby.is_open());
        assert_eq!(lobby.population(), 1);
        assert!(lobby.contains("host"));
        assert_eq!(lobby.updated_at, now);
    }

    #[test]
    fn test_join_grows_by_one_and_touches() {
        let start = Utc::now();
        let later = start + Duration::seconds(5);
        let lobby = lobby(start);

        let joined = lobby.join(player("b"), &user("b"), None, later).unwrap();
        assert_eq!(joined.population(), 2);
        assert_eq!(joined.updated_at, later);
        // Original snapshot is untouched
        assert_eq!(lobby.population(), 1);
        assert_eq!(lobby.updated_at, start);
    }

    #[test]
    fn test_join_rejections() {
        let now = Utc::now();
        let lobby = lobby(now);

        assert!(matches!(
            error_of(lobby.join(player("host"), &user("host"), None, now)),
            MatchmakingError::AlreadyInLobby { .. }
        ));

        let mut disabled = user("x");
        disabled.disabled = true;
        assert!(matches!(
            error_of(lobby.join(player("x"), &disabled, None, now)),
            MatchmakingError::PlayerDisabled { .. }
        ));

        assert!(matches!(
            error_of(lobby.join(player("y"), &user("y"), Some(7), now)),
            MatchmakingError::PlayerInActiveMatch { match_id: 7, .. }
        ));

        let full = full_lobby(now);
        assert!(matches!(
            error_of(full.join(player("e"), &user("e"), None, now)),
            MatchmakingError::LobbyFull { current: 4, max: 4 }
        ));
        assert_eq!(full.population(), 4);
    }

    #[test]
    fn test_join_closed_lobby() {
        let now = Utc::now();
        let closed = lobby(now).close(&user("host"), Duration::seconds(60), now).unwrap();
        assert!(matches!(
            error_of(closed.join(player("b"), &user("b"), None, now)),
            MatchmakingError::LobbyClosed { lobby_id: 1 }
        ));
    }

    #[test]
    fn test_leave() {
        let now = Utc::now();
        let lobby = lobby(now).join(player("b"), &user("b"), None, now).unwrap();

        match lobby.leave("b", now).unwrap() {
            LeaveOutcome::Left(next) => {
                assert!(next.is_open());
                assert_eq!(next.population(), 1);
            }
            other => panic!("expected Left, got {:?}", other),
        }

        assert!(matches!(
            error_of(lobby.leave("zed", now)),
            MatchmakingError::NotInLobby { .. }
        ));

        match lobby.leave("host", now).unwrap() {
            LeaveOutcome::Closed(next) => {
                assert_eq!(next.state(), LobbyState::Closed);
                assert_eq!(next.close_reason, Some(CloseReason::CreatorLeft));
            }
            other => panic!("expected Closed, got {:?}", other),
        }
    }

    #[test]
    fn test_close_authorization() {
        let start = Utc::now();
        let window = Duration::seconds(60);
        let lobby = lobby(start);

        let by_creator = lobby.close(&user("host"), window, start).unwrap();
        assert_eq!(by_creator.close_reason, Some(CloseReason::ClosedByCreator));
        assert_eq!(by_creator.closed_at, Some(start));

        assert!(matches!(
            error_of(lobby.close(&user("rando"), window, start + Duration::seconds(60))),
            MatchmakingError::CloseNotPermitted { .. }
        ));

        let idle = lobby
            .close(&user("rando"), window, start + Duration::seconds(61))
            .unwrap();
        assert_eq!(idle.close_reason, Some(CloseReason::Inactive));

        let mut moderator = user("mod");
        moderator.moderator = true;
        let moderated = lobby.close(&moderator, window, start).unwrap();
        assert_eq!(moderated.close_reason, Some(CloseReason::ClosedByModerator));

        assert!(matches!(
            error_of(by_creator.close(&user("host"), window, start)),
            MatchmakingError::LobbyClosed { .. }
        ));
    }

    #[test]
    fn test_kick() {
        let now = Utc::now();
        let lobby = lobby(now).join(player("b"), &user("b"), None, now).unwrap();
        let mut moderator = user("mod");
        moderator.moderator = true;

        assert!(matches!(
            error_of(lobby.kick(&user("b"), "b", now)),
            MatchmakingError::PermissionDenied { .. }
        ));
        assert!(matches!(
            error_of(lobby.kick(&moderator, "host", now)),
            MatchmakingError::CannotKickCreator
        ));

        let kicked = lobby.kick(&moderator, "b", now).unwrap();
        assert!(kicked.is_open());
        assert!(!kicked.contains("b"));
    }

    #[test]
    fn test_start() {
        let now = Utc::now();
        let balancer = Balancer::new(Arc::new(TrueSkillModel::default()));
        let mut rng = StdRng::seed_from_u64(3);

        let partial = lobby(now).join(player("b"), &user("b"), None, now).unwrap();
        assert!(matches!(
            error_of(partial.start("host", &balancer, &mut rng, now)),
            MatchmakingError::InsufficientPlayers {
                current: 2,
                required: 4
            }
        ));

        let full = full_lobby(now);
        assert!(matches!(
            error_of(full.start("b", &balancer, &mut rng, now)),
            MatchmakingError::NotLobbyCreator { .. }
        ));

        let (closed, partition) = full.start("host", &balancer, &mut rng, now).unwrap();
        assert_eq!(closed.close_reason, Some(CloseReason::Started));
        assert_eq!(partition.team_count(), 2);
        assert_eq!(partition.players().count(), 4);
        assert!(full.is_open());
    }

    #[test]
    fn test_status_line() {
        let lobby = lobby(Utc::now());
        assert_eq!(lobby.status(), "Lobby 1 (2v2) by host: 1/4 players [host]");
    }
}
