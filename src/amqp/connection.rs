//! Broker connection with retry and topology setup

use crate::error::{MatchmakingError, Result};
use amqprs::channel::{Channel, ExchangeDeclareArguments, QueueDeclareArguments};
use amqprs::connection::{Connection, OpenConnectionArguments};
use anyhow::Context;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Backoff never waits longer than this between connection attempts
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Connection parameters for the broker
#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub connection_timeout_ms: u64,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            max_retries: 5,
            retry_delay_ms: 1000,
            connection_timeout_ms: 30000,
        }
    }
}

impl AmqpConfig {
    /// Delay before the given retry attempt (1-based), doubling up to a cap
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(
            self.retry_delay_ms
                .saturating_mul(factor)
                .min(MAX_RETRY_DELAY_MS),
        )
    }
}

/// Open broker connection
pub struct AmqpConnection {
    connection: Connection,
    config: AmqpConfig,
}

impl AmqpConnection {
    /// Connect, retrying with exponential backoff
    pub async fn new(config: AmqpConfig) -> Result<Self> {
        let connection = Self::connect_with_retry(&config).await?;
        Ok(Self { connection, config })
    }

    async fn connect_with_retry(config: &AmqpConfig) -> Result<Connection> {
        let mut attempt = 0;

        loop {
            match Self::try_connect(config).await {
                Ok(connection) => {
                    info!(
                        "Connected to AMQP broker at {}:{}{}",
                        config.host, config.port, config.vhost
                    );
                    return Ok(connection);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > config.max_retries {
                        error!(
                            "Failed to connect to AMQP after {} retries",
                            config.max_retries
                        );
                        return Err(MatchmakingError::AmqpConnectionFailed {
                            message: format!("Max retries exceeded: {}", e),
                        }
                        .into());
                    }

                    let delay = config.backoff(attempt);
                    warn!(
                        "AMQP connection attempt {} failed: {}. Retrying in {:?}",
                        attempt, e, delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn try_connect(config: &AmqpConfig) -> Result<Connection> {
        let mut args = OpenConnectionArguments::new(
            &config.host,
            config.port,
            &config.username,
            &config.password,
        );
        args.virtual_host(&config.vhost);

        let limit = Duration::from_millis(config.connection_timeout_ms);
        match timeout(limit, Connection::open(&args)).await {
            Ok(Ok(connection)) => Ok(connection),
            Ok(Err(e)) => Err(MatchmakingError::AmqpConnectionFailed {
                message: e.to_string(),
            }
            .into()),
            Err(_) => Err(MatchmakingError::AmqpConnectionFailed {
                message: format!("Connection timed out after {:?}", limit),
            }
            .into()),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn config(&self) -> &AmqpConfig {
        &self.config
    }

    pub fn is_alive(&self) -> bool {
        self.connection.is_open()
    }

    pub async fn open_channel(&self) -> Result<Channel> {
        self.connection.open_channel(None).await.map_err(|e| {
            MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to open channel: {}", e),
            }
            .into()
        })
    }

    /// Declare the durable command queue and the reply topic exchange
    pub async fn declare_topology(
        &self,
        channel: &Channel,
        command_queue: &str,
        reply_exchange: &str,
    ) -> Result<()> {
        let args = QueueDeclareArguments::new(command_queue).durable(true).finish();
        channel
            .queue_declare(args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to declare queue {}: {}", command_queue, e),
            })?;

        let args = ExchangeDeclareArguments::new(reply_exchange, "topic")
            .durable(true)
            .finish();
        channel
            .exchange_declare(args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to declare exchange {}: {}", reply_exchange, e),
            })?;

        debug!(
            "Declared queue {} and exchange {}",
            command_queue, reply_exchange
        );
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        self.connection
            .close()
            .await
            .context("Failed to close AMQP connection")
    }
}
