//! Application state and service coordination
//!
//! [`AppState`] owns every long-lived component. Construction never touches
//! the network; the AMQP gateway and the health server are started later by
//! [`AppState::start`].

use crate::amqp::{
    AmqpConnection, AmqpReplyPublisher, CommandConsumer, CommandHandler, MessageHandler,
    PublisherConfig, ReplyPublisher,
};
use crate::command::{CommandParser, Dispatcher};
use crate::config::{validate_config, AppConfig};
use crate::lobby::LifecycleCoordinator;
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector};
use crate::rating::TrueSkillModel;
use crate::service::health::HealthCheck;
use crate::store::InMemoryStore;
use crate::utils::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// How chat commands reach the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gateway {
    /// Consume from the broker and publish replies to it
    Amqp,
    /// Lines are fed in by the caller, replies printed locally
    Console,
}

/// Broker resources held while the AMQP gateway runs
struct AmqpGateway {
    connection: Arc<AmqpConnection>,
    consumer: CommandConsumer,
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,
    store: InMemoryStore,
    coordinator: Arc<LifecycleCoordinator>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<MetricsCollector>,
    health_server: Mutex<Option<Arc<HealthServer>>>,
    amqp: Mutex<Option<AmqpGateway>>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    is_running: RwLock<bool>,
    started_at: Instant,
}

impl AppState {
    /// Build the service with the system clock
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Build the service reading time from `clock`
    pub async fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self, ServiceError> {
        info!("Initializing {}", config.service.name);

        validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            }
        })?);

        let model = Arc::new(TrueSkillModel::new(&config.rating).map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to initialize rating model: {}", e),
            }
        })?);

        let store = InMemoryStore::new();
        let coordinator = Arc::new(LifecycleCoordinator::new(
            Arc::new(store.clone()),
            model,
            clock,
            metrics.clone(),
            &config.lobby,
        ));

        coordinator
            .bootstrap(&config.formats, &config.lobby.admins, &config.lobby.moderators)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to seed store: {}", e),
            })?;

        let dispatcher = Arc::new(Dispatcher::new(
            coordinator.clone(),
            CommandParser::new(config.lobby.command_prefix.clone()),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            store,
            coordinator,
            dispatcher,
            metrics,
            health_server: Mutex::new(None),
            amqp: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            is_running: RwLock::new(false),
            started_at: Instant::now(),
        })
    }

    /// Start the health server, the background tasks and, for
    /// [`Gateway::Amqp`], the broker consumer
    pub async fn start(self: &Arc<Self>, gateway: Gateway) -> Result<(), ServiceError> {
        info!("Starting {} with {:?} gateway", self.config.service.name, gateway);

        self.mark_running(true).await;
        self.start_health_server().await;

        if gateway == Gateway::Amqp {
            if let Err(e) = self.start_amqp().await {
                self.mark_running(false).await;
                return Err(e);
            }
        }

        self.start_background_tasks().await;
        info!("{} started", self.config.service.name);
        Ok(())
    }

    /// Stop consuming, stop the health server and background tasks
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {}", self.config.service.name);
        self.mark_running(false).await;

        if let Some(gateway) = self.amqp.lock().await.take() {
            if let Err(e) = gateway.consumer.stop_consuming().await {
                warn!("Failed to stop AMQP consumer: {}", e);
            }
            match Arc::try_unwrap(gateway.connection) {
                Ok(connection) => {
                    if let Err(e) = connection.close().await {
                        warn!("Failed to close AMQP connection: {}", e);
                    }
                }
                Err(_) => debug!("AMQP connection still shared, leaving it to drop"),
            }
        }

        if let Some(server) = self.health_server.lock().await.take() {
            if let Err(e) = server.stop().await {
                warn!("Failed to stop health server: {}", e);
            }
        }

        let tasks: Vec<JoinHandle<()>> = self.background_tasks.lock().await.drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        debug!("Aborted {} background tasks", tasks.len());

        let snapshot = self.store.snapshot().await;
        info!("Final store statistics: {:?}", snapshot);
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    pub fn coordinator(&self) -> Arc<LifecycleCoordinator> {
        self.coordinator.clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub(crate) async fn mark_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    /// Whether the broker connection is open; `None` without an AMQP gateway
    pub async fn amqp_alive(&self) -> Option<bool> {
        self.amqp
            .lock()
            .await
            .as_ref()
            .map(|gateway| gateway.connection.is_alive())
    }

    /// Handler that replies through `publisher`, for gateways driven by the caller
    pub fn command_handler(&self, publisher: Arc<dyn ReplyPublisher>) -> Arc<dyn MessageHandler> {
        Arc::new(CommandHandler::new(self.dispatcher.clone(), publisher))
    }

    async fn start_health_server(self: &Arc<Self>) {
        let config = HealthServerConfig {
            port: self.config.service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let server = Arc::new(
            HealthServer::new(config, self.metrics.clone()).with_app_state(self.clone()),
        );
        *self.health_server.lock().await = Some(server.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("Health server failed: {}", e);
            }
        });
        self.background_tasks.lock().await.push(handle);
        info!(
            "Health endpoints starting on port {}",
            self.config.service.health_port
        );
    }

    async fn start_amqp(&self) -> Result<(), ServiceError> {
        let amqp_config = self.config.amqp.connection_config();
        info!(
            "Connecting to AMQP broker at {}:{}",
            amqp_config.host, amqp_config.port
        );

        let connection = Arc::new(AmqpConnection::new(amqp_config).await.map_err(|e| {
            ServiceError::AmqpConnection {
                message: format!("Failed to connect to AMQP: {}", e),
            }
        })?);

        let amqp_error = |e: anyhow::Error| ServiceError::AmqpConnection {
            message: e.to_string(),
        };

        let consume_channel = connection.open_channel().await.map_err(amqp_error)?;
        connection
            .declare_topology(
                &consume_channel,
                &self.config.amqp.command_queue,
                &self.config.amqp.reply_exchange,
            )
            .await
            .map_err(amqp_error)?;

        let publish_channel = connection.open_channel().await.map_err(amqp_error)?;
        let publisher = AmqpReplyPublisher::new(
            publish_channel,
            PublisherConfig {
                exchange: self.config.amqp.reply_exchange.clone(),
                ..Default::default()
            },
        )
        .with_metrics(self.metrics.clone());

        let handler = self.command_handler(Arc::new(publisher));
        let consumer = CommandConsumer::new(handler, self.metrics.clone(), consume_channel);
        consumer
            .start_consuming(&self.config.amqp.command_queue)
            .await
            .map_err(amqp_error)?;

        *self.amqp.lock().await = Some(AmqpGateway {
            connection,
            consumer,
        });
        Ok(())
    }

    async fn start_background_tasks(self: &Arc<Self>) {
        let app = self.clone();
        let health_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            debug!("Health metrics task started");

            while app.is_running().await {
                interval.tick().await;

                app.metrics.update_uptime(app.uptime());
                match HealthCheck::check(app.clone()).await {
                    Ok(health) => {
                        app.metrics
                            .update_health_status(health.status.gauge_value());
                        for check in &health.checks {
                            app.metrics.update_component_health(
                                &check.name,
                                check.status != crate::service::HealthStatus::Unhealthy,
                            );
                        }
                        debug!(
                            "Health: {} - {} open lobbies, {} open matches",
                            health.status, health.stats.open_lobbies, health.stats.open_matches
                        );
                    }
                    Err(e) => warn!("Health check failed: {}", e),
                }
            }

            debug!("Health metrics task stopped");
        });

        self.background_tasks.lock().await.push(health_task);
    }
}
