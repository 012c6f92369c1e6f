//! Lobby management for the scrim-room service
//!
//! This module holds the lobby state machine and the coordinator that runs
//! every lobby and match operation inside a single store transaction.

pub mod coordinator;
pub mod instance;

// Re-export commonly used types
pub use coordinator::{ConfirmedMatch, LifecycleCoordinator, Location, StartedMatch};
pub use instance::{CloseReason, LeaveOutcome, Lobby, LobbyState};
