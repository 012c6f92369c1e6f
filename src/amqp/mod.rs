//! AMQP gateway for chat commands
//!
//! Commands arrive as JSON on a durable queue; replies go out on a topic
//! exchange keyed by channel.

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod publisher;

pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{CommandConsumer, CommandHandler, MessageHandler};
pub use messages::*;
pub use publisher::{AmqpReplyPublisher, ConsoleReplyPublisher, PublisherConfig, ReplyPublisher};
