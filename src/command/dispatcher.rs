//! Command dispatch and reply rendering

use crate::command::{help_text, Command, CommandParser};
use crate::error::{as_matchmaking_error, ErrorKind, MatchmakingError, Result};
use crate::lobby::{LeaveOutcome, LifecycleCoordinator, Location};
use crate::metrics::MetricsCollector;
use crate::types::Identity;
use std::sync::Arc;
use tracing::{debug, error};

const FAILURE_REPLY: &str = "Something went wrong on our side, please try again later.";

/// Routes parsed commands to the coordinator and renders plain-text replies
pub struct Dispatcher {
    coordinator: Arc<LifecycleCoordinator>,
    parser: CommandParser,
    metrics: Arc<MetricsCollector>,
}

impl Dispatcher {
    pub fn new(
        coordinator: Arc<LifecycleCoordinator>,
        parser: CommandParser,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            coordinator,
            parser,
            metrics,
        }
    }

    pub fn parser(&self) -> &CommandParser {
        &self.parser
    }

    /// Handle one chat message; `None` means the message was not a command
    pub async fn handle(&self, identity: &Identity, content: &str) -> Option<String> {
        let command = match self.parser.parse(content) {
            Ok(Some(command)) => command,
            Ok(None) => return None,
            Err(e) => {
                self.metrics
                    .record_command("invalid", "rejected", std::time::Duration::ZERO);
                return Some(self.render_error(identity, "parse", &e));
            }
        };

        Some(self.dispatch(identity, command).await)
    }

    /// Run a parsed command and render the reply, including failures
    pub async fn dispatch(&self, identity: &Identity, command: Command) -> String {
        let name = command.kind().name();
        let timer = self.metrics.start_timer();
        debug!("Dispatching {} for {}", name, identity.user_id);

        let result = match command {
            Command::Spoof { target, command } => match self.impersonate(identity, &target).await {
                Ok(spoofed) => {
                    debug!("{} runs {:?} as {}", identity.user_id, command, spoofed.user_id);
                    self.execute(&spoofed, *command).await
                }
                Err(e) => Err(e),
            },
            command => self.execute(identity, command).await,
        };

        let (status, reply) = match result {
            Ok(reply) => ("ok", reply),
            Err(e) => (self.status_of(&e), self.render_error(identity, name, &e)),
        };
        self.metrics.record_command(name, status, timer.stop());
        reply
    }

    async fn impersonate(&self, identity: &Identity, target: &str) -> Result<Identity> {
        if !self.coordinator.is_admin(identity).await? {
            return Err(MatchmakingError::PermissionDenied {
                action: "spoof".to_string(),
                role: "admin".to_string(),
            }
            .into());
        }
        let user = self.coordinator.user(target).await?;
        Ok(Identity::new(user.id, user.name))
    }

    async fn execute(&self, identity: &Identity, command: Command) -> Result<String> {
        let prefix = self.parser.prefix();

        let reply = match command {
            Command::Help => help_text(prefix),
            Command::Create { format_id } => {
                let lobby = self.coordinator.create_lobby(identity, &format_id).await?;
                format!(
                    "{} opened a {} lobby, type {}join to sign up.\n{}",
                    identity.name,
                    lobby.format,
                    prefix,
                    lobby.status()
                )
            }
            Command::Join => {
                let lobby = self.coordinator.join_lobby(identity).await?;
                if lobby.is_full() {
                    format!(
                        "{} joined. The lobby is full, {} can now {}start.\n{}",
                        identity.name,
                        lobby.creator,
                        prefix,
                        lobby.status()
                    )
                } else {
                    format!("{} joined.\n{}", identity.name, lobby.status())
                }
            }
            Command::Leave => match self.coordinator.leave_lobby(identity).await? {
                LeaveOutcome::Left(lobby) => {
                    format!("{} left.\n{}", identity.name, lobby.status())
                }
                LeaveOutcome::Closed(lobby) => format!(
                    "{} left and lobby {} was closed.",
                    identity.name, lobby.id
                ),
            },
            Command::Close => {
                let lobby = self.coordinator.close_lobby(identity).await?;
                format!("Lobby {} was closed by {}.", lobby.id, identity.name)
            }
            Command::Start => {
                let started = self.coordinator.start_lobby(identity).await?;
                format!(
                    "{}\nReport the result with {}confirm <team|draw>.",
                    started.game.summary(),
                    prefix
                )
            }
            Command::Confirm { outcome } => {
                let confirmed = self.coordinator.confirm_match(identity, outcome).await?;
                let mut lines = vec![confirmed.game.summary(), "Rating changes:".to_string()];
                for change in &confirmed.changes {
                    lines.push(format!(
                        "{}: {:.1} -> {:.1}",
                        change.player_id, change.old_rating.rating, change.new_rating.rating
                    ));
                }
                lines.join("\n")
            }
            Command::Where => match self.coordinator.locate(identity).await? {
                Location::InMatch(game) => format!(
                    "You are playing match {}, report it with {}confirm <team|draw>.\n{}",
                    game.id,
                    prefix,
                    game.summary()
                ),
                Location::InLobby(lobby) => format!("You are signed up.\n{}", lobby.status()),
                Location::Idle(Some(lobby)) => format!(
                    "You are not signed up, type {}join.\n{}",
                    prefix,
                    lobby.status()
                ),
                Location::Idle(None) => format!(
                    "You are not in a lobby or match. Open one with {}create <format>.",
                    prefix
                ),
            },
            Command::Info { match_id } => self.coordinator.match_info(match_id).await?.summary(),
            Command::Stats { player_id } => {
                let player_id = player_id.unwrap_or_else(|| identity.user_id.clone());
                let (user, scores) = self.coordinator.player_stats(&player_id).await?;
                let mut lines = vec![format!(
                    "{} in season {}:",
                    user.name,
                    self.coordinator.season()
                )];
                if scores.is_empty() {
                    lines.push("No rated matches yet.".to_string());
                }
                for score in scores {
                    lines.push(format!(
                        "{}: {:.1} ± {:.1} ({}W {}L {}D)",
                        score.format_id,
                        score.rating.rating,
                        score.rating.uncertainty,
                        score.win,
                        score.lose,
                        score.draw
                    ));
                }
                lines.join("\n")
            }
            Command::Kick { target } => {
                let lobby = self.coordinator.kick_player(identity, &target).await?;
                format!("{} was removed from the lobby.\n{}", target, lobby.status())
            }
            Command::Enable { target } => {
                let user = self.coordinator.set_disabled(identity, &target, false).await?;
                format!("{} can join lobbies again.", user.name)
            }
            Command::Disable { target } => {
                let user = self.coordinator.set_disabled(identity, &target, true).await?;
                format!("{} can no longer join lobbies.", user.name)
            }
            Command::Spoof { .. } => {
                return Err(MatchmakingError::InvalidCommand {
                    usage: format!("{}spoof @player <command>", prefix),
                }
                .into())
            }
        };

        Ok(reply)
    }

    fn status_of(&self, error: &anyhow::Error) -> &'static str {
        match as_matchmaking_error(error).map(MatchmakingError::kind) {
            Some(ErrorKind::Validation) => "rejected",
            Some(ErrorKind::Conflict) => "conflict",
            _ => "error",
        }
    }

    fn render_error(&self, identity: &Identity, command: &str, error: &anyhow::Error) -> String {
        match as_matchmaking_error(error) {
            Some(e) if e.is_user_facing() => e.to_string(),
            _ => {
                error!(
                    "Command {} from {} failed: {:#}",
                    command, identity.user_id, error
                );
                FAILURE_REPLY.to_string()
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("prefix", &self.parser.prefix())
            .finish_non_exhaustive()
    }
}
