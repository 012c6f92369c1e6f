//! Lobby lifecycle configuration

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Longest accepted inactivity window (30 days)
pub const MAX_INACTIVITY_CLOSE_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Settings for lobby handling and command parsing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Prefix marking a chat message as a command
    pub command_prefix: String,
    /// Idle time after which any player may close the lobby
    pub inactivity_close_seconds: i64,
    /// Season that new matches and scores are recorded under
    pub season: u32,
    /// Seed for the tie-break RNG; entropy when unset
    pub rng_seed: Option<u64>,
    /// User ids granted the admin role at startup
    pub admins: Vec<String>,
    /// User ids granted the moderator role at startup
    pub moderators: Vec<String>,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            command_prefix: "!".to_string(),
            inactivity_close_seconds: 60,
            season: 0,
            rng_seed: None,
            admins: Vec::new(),
            moderators: Vec::new(),
        }
    }
}

impl LobbyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.command_prefix.trim().is_empty() {
            return Err(anyhow!("Command prefix cannot be empty"));
        }
        if self.inactivity_close_seconds < 0 {
            return Err(anyhow!("Inactivity close window cannot be negative"));
        }
        if self.inactivity_close_seconds > MAX_INACTIVITY_CLOSE_SECONDS {
            return Err(anyhow!(
                "Inactivity close window of {}s exceeds the limit of {}s",
                self.inactivity_close_seconds,
                MAX_INACTIVITY_CLOSE_SECONDS
            ));
        }
        Ok(())
    }

    /// Inactivity window, clamped to the accepted range for unvalidated configs
    pub fn inactivity_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            self.inactivity_close_seconds
                .clamp(0, MAX_INACTIVITY_CLOSE_SECONDS),
        )
    }
}
