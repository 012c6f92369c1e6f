//! Scrim Room - lobby and team-balancing service for community in-house matches
//!
//! Players open lobbies for a match format through chat commands, the lobby
//! is split into teams of maximum predicted quality when it starts, and the
//! reported result feeds per-season TrueSkill ratings.

pub mod amqp;
pub mod balance;
pub mod command;
pub mod config;
pub mod error;
pub mod game;
pub mod lobby;
pub mod metrics;
pub mod rating;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use balance::Balancer;
pub use command::{Command, CommandParser, Dispatcher};
pub use lobby::LifecycleCoordinator;
pub use rating::{SkillModel, TrueSkillModel};
pub use store::{InMemoryStore, Store};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
