//! Turning chat text into [`Command`]s

use crate::command::{Command, CommandKind};
use crate::error::{MatchmakingError, Result};
use crate::types::Outcome;
use crate::utils::parse_mention;

/// Parser for prefixed chat commands
#[derive(Debug, Clone)]
pub struct CommandParser {
    prefix: String,
}

impl CommandParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Parse a chat message
    ///
    /// Returns `Ok(None)` for text that is not addressed to the service, so
    /// ordinary chat is ignored silently.
    pub fn parse(&self, content: &str) -> Result<Option<Command>> {
        let body = match content.trim_start().strip_prefix(self.prefix.as_str()) {
            Some(body) => body.trim(),
            None => return Ok(None),
        };
        if body.is_empty() {
            return Ok(None);
        }

        self.parse_body(body, true).map(Some)
    }

    fn parse_body(&self, body: &str, allow_spoof: bool) -> Result<Command> {
        let mut words = body.split_whitespace();
        let name = words.next().unwrap_or_default();
        let kind = CommandKind::from_name(name).ok_or_else(|| MatchmakingError::UnknownCommand {
            name: name.to_string(),
        })?;
        let args: Vec<&str> = words.collect();

        let command = match kind {
            CommandKind::Help => {
                self.no_args(kind, &args)?;
                Command::Help
            }
            CommandKind::Create => Command::Create {
                format_id: self.single(kind, &args)?.to_string(),
            },
            CommandKind::Join => {
                self.no_args(kind, &args)?;
                Command::Join
            }
            CommandKind::Leave => {
                self.no_args(kind, &args)?;
                Command::Leave
            }
            CommandKind::Close => {
                self.no_args(kind, &args)?;
                Command::Close
            }
            CommandKind::Start => {
                self.no_args(kind, &args)?;
                Command::Start
            }
            CommandKind::Confirm => Command::Confirm {
                outcome: Outcome::parse(self.single(kind, &args)?)?,
            },
            CommandKind::Where => {
                self.no_args(kind, &args)?;
                Command::Where
            }
            CommandKind::Info => {
                let value = self.single(kind, &args)?;
                let match_id = value
                    .trim_start_matches('#')
                    .parse()
                    .map_err(|_| self.usage_error(kind))?;
                Command::Info { match_id }
            }
            CommandKind::Stats => match args.as_slice() {
                [] => Command::Stats { player_id: None },
                [mention] => Command::Stats {
                    player_id: Some(self.mention(kind, mention)?),
                },
                _ => return Err(self.usage_error(kind)),
            },
            CommandKind::Kick => Command::Kick {
                target: self.mention(kind, self.single(kind, &args)?)?,
            },
            CommandKind::Enable => Command::Enable {
                target: self.mention(kind, self.single(kind, &args)?)?,
            },
            CommandKind::Disable => Command::Disable {
                target: self.mention(kind, self.single(kind, &args)?)?,
            },
            CommandKind::Spoof => {
                if !allow_spoof || args.len() < 2 {
                    return Err(self.usage_error(kind));
                }
                let target = self.mention(kind, args[0])?;
                let inner = args[1..].join(" ");
                let inner = inner.strip_prefix(self.prefix.as_str()).unwrap_or(&inner);
                Command::Spoof {
                    target,
                    command: Box::new(self.parse_body(inner, false)?),
                }
            }
        };

        Ok(command)
    }

    fn no_args(&self, kind: CommandKind, args: &[&str]) -> Result<()> {
        if args.is_empty() {
            Ok(())
        } else {
            Err(self.usage_error(kind))
        }
    }

    fn single<'a>(&self, kind: CommandKind, args: &[&'a str]) -> Result<&'a str> {
        match args {
            [value] => Ok(value),
            _ => Err(self.usage_error(kind)),
        }
    }

    fn mention(&self, kind: CommandKind, value: &str) -> Result<String> {
        parse_mention(value).ok_or_else(|| self.usage_error(kind))
    }

    fn usage_error(&self, kind: CommandKind) -> anyhow::Error {
        MatchmakingError::InvalidCommand {
            usage: format!("{}{}", self.prefix, kind.usage()),
        }
        .into()
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new("!")
    }
}
