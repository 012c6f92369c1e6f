//! Gateway message definitions and serialization

use crate::error::{MatchmakingError, Result};
use crate::types::Identity;
use serde::{Deserialize, Serialize};

/// Routing key prefix for replies; the channel id is appended
pub const REPLY_ROUTING_PREFIX: &str = "reply";

/// Chat message forwarded by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundCommand {
    pub user_id: String,
    pub user_name: String,
    pub channel_id: String,
    pub content: String,
}

impl InboundCommand {
    pub fn identity(&self) -> Identity {
        Identity::new(self.user_id.clone(), self.user_name.clone())
    }
}

/// Text reply to be posted back into a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
}

impl CommandReply {
    pub fn to(command: &InboundCommand, text: impl Into<String>) -> Self {
        Self {
            channel_id: command.channel_id.clone(),
            user_id: command.user_id.clone(),
            text: text.into(),
        }
    }

    pub fn routing_key(&self) -> String {
        format!("{}.{}", REPLY_ROUTING_PREFIX, self.channel_id)
    }
}

/// Message envelope with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            MatchmakingError::InvalidCommand {
                usage: format!("malformed message: {}", e),
            }
            .into()
        })
    }
}

/// Decode an inbound command
///
/// The gateway may send the bare command or wrap it in a [`MessageEnvelope`].
pub fn decode_command(bytes: &[u8]) -> Result<InboundCommand> {
    let command = match serde_json::from_slice::<InboundCommand>(bytes) {
        Ok(command) => command,
        Err(_) => MessageEnvelope::<InboundCommand>::from_bytes(bytes)?.payload,
    };

    if command.user_id.trim().is_empty() {
        return Err(MatchmakingError::InvalidCommand {
            usage: "message is missing user_id".to_string(),
        }
        .into());
    }
    if command.channel_id.trim().is_empty() {
        return Err(MatchmakingError::InvalidCommand {
            usage: "message is missing channel_id".to_string(),
        }
        .into());
    }

    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound() -> InboundCommand {
        InboundCommand {
            user_id: "42".to_string(),
            user_name: "alice".to_string(),
            channel_id: "lobby".to_string(),
            content: "!join".to_string(),
        }
    }

    #[test]
    fn test_decode_bare_and_enveloped() {
        let bare = serde_json::to_vec(&inbound()).unwrap();
        assert_eq!(decode_command(&bare).unwrap(), inbound());

        let envelope = MessageEnvelope::new(inbound(), "command".to_string());
        assert_eq!(decode_command(&envelope.to_bytes().unwrap()).unwrap(), inbound());
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(decode_command(b"not json").is_err());

        let mut missing = inbound();
        missing.channel_id = " ".to_string();
        let bytes = serde_json::to_vec(&missing).unwrap();
        assert!(decode_command(&bytes).is_err());
    }

    #[test]
    fn test_reply_routing() {
        let reply = CommandReply::to(&inbound(), "hello");
        assert_eq!(reply.routing_key(), "reply.lobby");
        assert_eq!(reply.user_id, "42");
        assert_eq!(inbound().identity(), Identity::new("42", "alice"));
    }
}
