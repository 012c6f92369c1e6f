//! Matches created from started lobbies

pub mod instance;

pub use instance::{Game, GameState};
