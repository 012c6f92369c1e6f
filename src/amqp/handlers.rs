//! Inbound command consumption
//!
//! Each delivery is acknowledged on receipt and then handled on its own task,
//! so a slow command never holds up the queue.

use crate::amqp::messages::{decode_command, CommandReply, InboundCommand};
use crate::amqp::publisher::ReplyPublisher;
use crate::command::Dispatcher;
use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use amqprs::{
    channel::{BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, Channel},
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Handles decoded gateway messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_command(&self, command: InboundCommand) -> Result<()>;

    /// Called when a delivery could not be decoded or handled
    async fn handle_error(&self, error: &anyhow::Error, message_data: &[u8]);
}

/// Runs commands through the dispatcher and publishes the replies
pub struct CommandHandler {
    dispatcher: Arc<Dispatcher>,
    publisher: Arc<dyn ReplyPublisher>,
}

impl CommandHandler {
    pub fn new(dispatcher: Arc<Dispatcher>, publisher: Arc<dyn ReplyPublisher>) -> Self {
        Self {
            dispatcher,
            publisher,
        }
    }
}

#[async_trait]
impl MessageHandler for CommandHandler {
    async fn handle_command(&self, command: InboundCommand) -> Result<()> {
        let identity = command.identity();
        if let Some(text) = self.dispatcher.handle(&identity, &command.content).await {
            self.publisher
                .publish_reply(CommandReply::to(&command, text))
                .await?;
        }
        Ok(())
    }

    async fn handle_error(&self, error: &anyhow::Error, message_data: &[u8]) {
        warn!(
            "Dropping message of {} bytes: {:#}",
            message_data.len(),
            error
        );
    }
}

/// Consumer bound to the command queue
pub struct CommandConsumer {
    handler: Arc<dyn MessageHandler>,
    metrics: Arc<MetricsCollector>,
    channel: Channel,
    consumer_tag: String,
}

impl CommandConsumer {
    pub fn new(
        handler: Arc<dyn MessageHandler>,
        metrics: Arc<MetricsCollector>,
        channel: Channel,
    ) -> Self {
        let consumer_tag = format!("scrim-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            metrics,
            channel,
            consumer_tag,
        }
    }

    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag);

        self.channel
            .basic_consume(
                DeliveryConsumer::new(self.handler.clone(), self.metrics.clone()),
                args,
            )
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming commands from queue: {}", queue_name);
        Ok(())
    }

    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel.basic_cancel(args).await.map_err(|e| {
            MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            }
        })?;

        info!("Stopped consuming commands");
        Ok(())
    }
}

struct DeliveryConsumer {
    handler: Arc<dyn MessageHandler>,
    metrics: Arc<MetricsCollector>,
}

impl DeliveryConsumer {
    fn new(handler: Arc<dyn MessageHandler>, metrics: Arc<MetricsCollector>) -> Self {
        Self { handler, metrics }
    }
}

#[async_trait]
impl AsyncConsumer for DeliveryConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        debug!(
            "AMQP message received - delivery_tag: {}, routing_key: '{}', size: {} bytes",
            delivery_tag,
            deliver.routing_key(),
            content.len()
        );

        let start = std::time::Instant::now();
        let acked = channel
            .basic_ack(BasicAckArguments::new(delivery_tag, false))
            .await;
        self.metrics
            .record_amqp_operation("ack", acked.is_ok(), start.elapsed());
        if let Err(e) = acked {
            error!("Failed to ack delivery {}: {}", delivery_tag, e);
        }

        let handler = self.handler.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let start = std::time::Instant::now();
            let result = process_delivery(handler.as_ref(), &content).await;
            metrics.record_amqp_operation("consume", result.is_ok(), start.elapsed());

            if let Err(e) = result {
                handler.handle_error(&e, &content).await;
            }
        });
    }
}

async fn process_delivery(handler: &dyn MessageHandler, content: &[u8]) -> Result<()> {
    let command = decode_command(content)?;
    debug!(
        "Command from {} in {}: {}",
        command.user_id, command.channel_id, command.content
    );
    handler.handle_command(command).await
}

/// Mock message handler for testing
#[derive(Default)]
pub struct MockMessageHandler {
    pub received: tokio::sync::Mutex<Vec<InboundCommand>>,
    pub errors: tokio::sync::Mutex<Vec<String>>,
}

impl MockMessageHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageHandler for MockMessageHandler {
    async fn handle_command(&self, command: InboundCommand) -> Result<()> {
        self.received.lock().await.push(command);
        Ok(())
    }

    async fn handle_error(&self, error: &anyhow::Error, _message_data: &[u8]) {
        self.errors.lock().await.push(error.to_string());
    }
}
