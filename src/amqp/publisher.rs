//! Outbound replies

use crate::amqp::messages::{CommandReply, MessageEnvelope};
use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use amqprs::{
    channel::{BasicPublishArguments, Channel},
    BasicProperties,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

/// Sink for command replies
#[async_trait]
pub trait ReplyPublisher: Send + Sync {
    async fn publish_reply(&self, reply: CommandReply) -> Result<()>;
}

/// Configuration for reply publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub publish_timeout_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange: "scrim.replies".to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
            publish_timeout_ms: 5000,
        }
    }
}

/// Publishes replies to the reply topic exchange
pub struct AmqpReplyPublisher {
    channel: Channel,
    config: PublisherConfig,
    metrics: Option<Arc<MetricsCollector>>,
}

impl AmqpReplyPublisher {
    pub fn new(channel: Channel, config: PublisherConfig) -> Self {
        Self {
            channel,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn publish_with_retry(&self, envelope: &MessageEnvelope<CommandReply>) -> Result<()> {
        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            let start = Instant::now();
            let result = self.try_publish(envelope).await;
            if let Some(metrics) = &self.metrics {
                metrics.record_amqp_operation("publish", result.is_ok(), start.elapsed());
            }

            match result {
                Ok(()) => {
                    debug!(
                        "Published reply {} to {}",
                        envelope.correlation_id, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish reply {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for reply {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );
                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    async fn try_publish(&self, envelope: &MessageEnvelope<CommandReply>) -> Result<()> {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(&self.config.exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        let limit = Duration::from_millis(self.config.publish_timeout_ms);
        match timeout(limit, self.channel.basic_publish(properties, payload, args)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to publish message: {}", e),
            }
            .into()),
            Err(_) => Err(MatchmakingError::AmqpConnectionFailed {
                message: format!("Publish timed out after {:?}", limit),
            }
            .into()),
        }
    }
}

#[async_trait]
impl ReplyPublisher for AmqpReplyPublisher {
    async fn publish_reply(&self, reply: CommandReply) -> Result<()> {
        let routing_key = reply.routing_key();
        let envelope = MessageEnvelope::new(reply, routing_key);
        self.publish_with_retry(&envelope).await
    }
}

/// Prints replies to stdout, for the console gateway
#[derive(Debug, Default)]
pub struct ConsoleReplyPublisher;

#[async_trait]
impl ReplyPublisher for ConsoleReplyPublisher {
    async fn publish_reply(&self, reply: CommandReply) -> Result<()> {
        println!("[{} -> {}]", reply.channel_id, reply.user_id);
        println!("{}", reply.text);
        Ok(())
    }
}

/// Mock reply publisher for testing
#[derive(Debug, Default)]
pub struct MockReplyPublisher {
    replies: std::sync::Mutex<Vec<CommandReply>>,
}

impl MockReplyPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replies(&self) -> Vec<CommandReply> {
        self.replies
            .lock()
            .map(|replies| replies.clone())
            .unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.replies().into_iter().map(|reply| reply.text).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.clear();
        }
    }
}

#[async_trait]
impl ReplyPublisher for MockReplyPublisher {
    async fn publish_reply(&self, reply: CommandReply) -> Result<()> {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push(reply);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(text: &str) -> CommandReply {
        CommandReply {
            channel_id: "general".to_string(),
            user_id: "7".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_publisher_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.exchange, "scrim.replies");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 500);
    }

    #[test]
    fn test_envelope_uses_channel_routing_key() {
        let reply = reply("hi");
        let envelope = MessageEnvelope::new(reply.clone(), reply.routing_key());
        assert_eq!(envelope.routing_key, "reply.general");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn test_mock_records_replies() {
        let publisher = MockReplyPublisher::new();
        publisher.publish_reply(reply("one")).await.unwrap();
        publisher.publish_reply(reply("two")).await.unwrap();
        assert_eq!(publisher.texts(), vec!["one", "two"]);

        publisher.clear();
        assert!(publisher.replies().is_empty());
    }
}
