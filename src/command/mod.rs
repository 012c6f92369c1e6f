//! Chat commands
//!
//! [`COMMANDS`] is the single table of command names. Parsing, help output
//! and permission hints are all driven from it.

pub mod dispatcher;
pub mod parser;

pub use dispatcher::Dispatcher;
pub use parser::CommandParser;

use crate::types::{FormatId, MatchId, Outcome, PlayerId};

/// Every command the service understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Help,
    Create,
    Join,
    Leave,
    Close,
    Start,
    Confirm,
    Where,
    Info,
    Stats,
    Kick,
    Enable,
    Disable,
    Spoof,
}

/// Role needed to run a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Everyone,
    Moderator,
    Admin,
}

/// Entry of the command table
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub kind: CommandKind,
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
    pub role: Role,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        kind: CommandKind::Help,
        name: "help",
        usage: "help",
        description: "Show this list",
        role: Role::Everyone,
    },
    CommandSpec {
        kind: CommandKind::Create,
        name: "create",
        usage: "create <format>",
        description: "Open a lobby for a match format",
        role: Role::Everyone,
    },
    CommandSpec {
        kind: CommandKind::Join,
        name: "join",
        usage: "join",
        description: "Sign up for the open lobby",
        role: Role::Everyone,
    },
    CommandSpec {
        kind: CommandKind::Leave,
        name: "leave",
        usage: "leave",
        description: "Leave the lobby; closes it if you created it",
        role: Role::Everyone,
    },
    CommandSpec {
        kind: CommandKind::Close,
        name: "close",
        usage: "close",
        description: "Close the lobby (creator, moderators, or anyone once it is idle)",
        role: Role::Everyone,
    },
    CommandSpec {
        kind: CommandKind::Start,
        name: "start",
        usage: "start",
        description: "Balance teams and start the match (creator only)",
        role: Role::Everyone,
    },
    CommandSpec {
        kind: CommandKind::Confirm,
        name: "confirm",
        usage: "confirm <team|draw>",
        description: "Report the result of your match",
        role: Role::Everyone,
    },
    CommandSpec {
        kind: CommandKind::Where,
        name: "where",
        usage: "where",
        description: "Show your current lobby or match",
        role: Role::Everyone,
    },
    CommandSpec {
        kind: CommandKind::Info,
        name: "info",
        usage: "info <match>",
        description: "Show teams and result of a match",
        role: Role::Everyone,
    },
    CommandSpec {
        kind: CommandKind::Stats,
        name: "stats",
        usage: "stats [@player]",
        description: "Show season ratings",
        role: Role::Everyone,
    },
    CommandSpec {
        kind: CommandKind::Kick,
        name: "kick",
        usage: "kick @player",
        description: "Remove a player from the lobby",
        role: Role::Moderator,
    },
    CommandSpec {
        kind: CommandKind::Enable,
        name: "enable",
        usage: "enable @player",
        description: "Allow a player to join lobbies again",
        role: Role::Admin,
    },
    CommandSpec {
        kind: CommandKind::Disable,
        name: "disable",
        usage: "disable @player",
        description: "Prevent a player from joining lobbies",
        role: Role::Admin,
    },
    CommandSpec {
        kind: CommandKind::Spoof,
        name: "spoof",
        usage: "spoof @player <command>",
        description: "Run a command as another player",
        role: Role::Admin,
    },
];

impl CommandKind {
    pub fn spec(self) -> &'static CommandSpec {
        // The table holds one entry per variant, in declaration order
        &COMMANDS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn usage(self) -> &'static str {
        self.spec().usage
    }

    pub fn from_name(name: &str) -> Option<Self> {
        COMMANDS
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name))
            .map(|spec| spec.kind)
    }
}

/// A parsed command with its arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Create { format_id: FormatId },
    Join,
    Leave,
    Close,
    Start,
    Confirm { outcome: Outcome },
    Where,
    Info { match_id: MatchId },
    Stats { player_id: Option<PlayerId> },
    Kick { target: PlayerId },
    Enable { target: PlayerId },
    Disable { target: PlayerId },
    Spoof { target: PlayerId, command: Box<Command> },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Help => CommandKind::Help,
            Command::Create { .. } => CommandKind::Create,
            Command::Join => CommandKind::Join,
            Command::Leave => CommandKind::Leave,
            Command::Close => CommandKind::Close,
            Command::Start => CommandKind::Start,
            Command::Confirm { .. } => CommandKind::Confirm,
            Command::Where => CommandKind::Where,
            Command::Info { .. } => CommandKind::Info,
            Command::Stats { .. } => CommandKind::Stats,
            Command::Kick { .. } => CommandKind::Kick,
            Command::Enable { .. } => CommandKind::Enable,
            Command::Disable { .. } => CommandKind::Disable,
            Command::Spoof { .. } => CommandKind::Spoof,
        }
    }
}

/// Help text listing every command with the given prefix
pub fn help_text(prefix: &str) -> String {
    let mut lines = vec!["Commands:".to_string()];
    for spec in COMMANDS {
        let suffix = match spec.role {
            Role::Everyone => "",
            Role::Moderator => " [moderator]",
            Role::Admin => " [admin]",
        };
        lines.push(format!(
            "{}{} - {}{}",
            prefix, spec.usage, spec.description, suffix
        ));
    }
    lines.join("\n")
}
