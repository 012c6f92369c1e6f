//! Error types for the scrim-room service
//!
//! Operations return `anyhow::Result` and raise [`MatchmakingError`] for every
//! condition a caller may want to inspect. Use [`MatchmakingError::kind`] to
//! decide whether a failure is shown to the user or treated as an outage.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Broad classification of a [`MatchmakingError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request is not legal in the current state; nothing was changed
    Validation,
    /// State moved underneath the request; the transaction was rolled back
    Conflict,
    /// Balancing or format configuration cannot produce a result
    Algorithm,
    /// Storage, rating library or transport failure
    Collaborator,
    /// Bug or misconfiguration inside the service
    Internal,
}

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Unknown match format '{format_id}', available formats: {}", available.join(", "))]
    UnknownFormat {
        format_id: String,
        available: Vec<String>,
    },

    #[error("Invalid match format '{format_id}': {reason}")]
    InvalidFormat { format_id: String, reason: String },

    #[error("A lobby created by {creator} is already open, use join to queue up")]
    LobbyAlreadyOpen { creator: String },

    #[error("No lobby is open, use create <format> to start one")]
    NoActiveLobby,

    #[error("Lobby {lobby_id} is already closed")]
    LobbyClosed { lobby_id: u64 },

    #[error("{player_id} is already signed up for the current lobby")]
    AlreadyInLobby { player_id: String },

    #[error("{player_id} is not in the lobby")]
    NotInLobby { player_id: String },

    #[error("{player_id} is disabled and cannot join lobbies")]
    PlayerDisabled { player_id: String },

    #[error("{player_id} is currently in match {match_id}, use confirm <team|draw> to report the result")]
    PlayerInActiveMatch { player_id: String, match_id: u64 },

    #[error("Lobby is full ({current}/{max}), waiting for the creator to start")]
    LobbyFull { current: usize, max: usize },

    #[error("Only the lobby creator {creator} can do that")]
    NotLobbyCreator { creator: String },

    #[error("Lobby created by {creator} can't be closed yet")]
    CloseNotPermitted { creator: String },

    #[error("Not enough players to start ({current}/{required})")]
    InsufficientPlayers { current: usize, required: usize },

    #[error("The lobby creator cannot be kicked, close the lobby instead")]
    CannotKickCreator,

    #[error("{player_id} is not currently in an active match")]
    NotInActiveMatch { player_id: String },

    #[error("{player_id} did not play in match {match_id}")]
    NotMatchParticipant { player_id: String, match_id: u64 },

    #[error("Match {match_id} is already closed")]
    MatchClosed { match_id: u64 },

    #[error("Match {match_id} not found")]
    MatchNotFound { match_id: u64 },

    #[error("Invalid outcome '{value}', use a team number or draw")]
    InvalidOutcome { value: String },

    #[error("User {user_id} not found")]
    UserNotFound { user_id: String },

    #[error("Permission denied: {action} requires {role}")]
    PermissionDenied { action: String, role: String },

    #[error("Unknown command '{name}', use help for the command list")]
    UnknownCommand { name: String },

    #[error("Invalid command, usage: {usage}")]
    InvalidCommand { usage: String },

    #[error("State changed while processing the request ({reason}), please try again")]
    StateConflict { reason: String },

    #[error("Team balancing failed: {reason}")]
    BalanceFailed { reason: String },

    #[error("Rating calculation failed: {reason}")]
    RatingCalculationFailed { reason: String },

    #[error("Storage unavailable: {message}")]
    StorageUnavailable { message: String },

    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakingError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        use MatchmakingError::*;

        match self {
            UnknownFormat { .. }
            | LobbyAlreadyOpen { .. }
            | NoActiveLobby
            | LobbyClosed { .. }
            | AlreadyInLobby { .. }
            | NotInLobby { .. }
            | PlayerDisabled { .. }
            | PlayerInActiveMatch { .. }
            | LobbyFull { .. }
            | NotLobbyCreator { .. }
            | CloseNotPermitted { .. }
            | InsufficientPlayers { .. }
            | CannotKickCreator
            | NotInActiveMatch { .. }
            | NotMatchParticipant { .. }
            | MatchClosed { .. }
            | MatchNotFound { .. }
            | InvalidOutcome { .. }
            | UserNotFound { .. }
            | PermissionDenied { .. }
            | UnknownCommand { .. }
            | InvalidCommand { .. } => ErrorKind::Validation,
            StateConflict { .. } => ErrorKind::Conflict,
            InvalidFormat { .. } | BalanceFailed { .. } => ErrorKind::Algorithm,
            RatingCalculationFailed { .. }
            | StorageUnavailable { .. }
            | AmqpConnectionFailed { .. } => ErrorKind::Collaborator,
            ConfigurationError { .. } | InternalError { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the message is safe and useful to show to the requesting user
    pub fn is_user_facing(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::Conflict)
    }
}

/// Find the [`MatchmakingError`] behind an `anyhow::Error`, if there is one
pub fn as_matchmaking_error(error: &anyhow::Error) -> Option<&MatchmakingError> {
    error.downcast_ref::<MatchmakingError>()
}
