//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the scrim-room service using
//! Prometheus metrics.

use crate::lobby::CloseReason;
use crate::types::Outcome;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the scrim-room service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Command handling metrics
    command_metrics: CommandMetrics,

    /// Lobby-related metrics
    lobby_metrics: LobbyMetrics,

    /// Match-related metrics
    game_metrics: GameMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Command handling metrics
#[derive(Clone)]
pub struct CommandMetrics {
    /// Commands handled, by command and result (ok, rejected, error)
    pub commands_total: IntCounterVec,

    /// Store conflicts reported back to users
    pub conflicts_total: IntCounter,
}

/// Lobby-related metrics
#[derive(Clone)]
pub struct LobbyMetrics {
    /// Lobbies created by format
    pub lobbies_created_total: IntCounterVec,

    /// Lobbies closed by reason
    pub lobbies_closed_total: IntCounterVec,

    /// Players in the open lobby
    pub lobby_population: IntGauge,

    /// Player joins
    pub players_joined_total: IntCounter,
}

/// Match-related metrics
#[derive(Clone)]
pub struct GameMetrics {
    /// Matches started by format
    pub games_started_total: IntCounterVec,

    /// Matches confirmed by outcome (team, draw)
    pub games_confirmed_total: IntCounterVec,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Command processing time
    pub command_duration: HistogramVec,

    /// Team balancing time by format
    pub balance_duration: HistogramVec,

    /// Rating settlement time
    pub rating_calculation_duration: Histogram,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let command_metrics = CommandMetrics::new(&registry)?;
        let lobby_metrics = LobbyMetrics::new(&registry)?;
        let game_metrics = GameMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            command_metrics,
            lobby_metrics,
            game_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get command metrics
    pub fn command(&self) -> &CommandMetrics {
        &self.command_metrics
    }

    /// Get lobby metrics
    pub fn lobby(&self) -> &LobbyMetrics {
        &self.lobby_metrics
    }

    /// Get match metrics
    pub fn game(&self) -> &GameMetrics {
        &self.game_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Record a handled command
    pub fn record_command(&self, command: &str, status: &str, duration: Duration) {
        self.command_metrics
            .commands_total
            .with_label_values(&[command, status])
            .inc();

        self.performance_metrics
            .command_duration
            .with_label_values(&[command])
            .observe(duration.as_secs_f64());
    }

    /// Record a transaction that lost a race
    pub fn record_conflict(&self) {
        self.command_metrics.conflicts_total.inc();
    }

    /// Record a lobby being created
    pub fn record_lobby_created(&self, format_id: &str) {
        self.lobby_metrics
            .lobbies_created_total
            .with_label_values(&[format_id])
            .inc();
        self.lobby_metrics.lobby_population.set(1);
    }

    /// Record a player joining or leaving the open lobby
    pub fn record_lobby_population(&self, population: usize, joined: bool) {
        if joined {
            self.lobby_metrics.players_joined_total.inc();
        }
        self.lobby_metrics.lobby_population.set(population as i64);
    }

    /// Record a lobby being closed
    pub fn record_lobby_closed(&self, reason: CloseReason) {
        let reason_str = match reason {
            CloseReason::ClosedByCreator => "creator",
            CloseReason::ClosedByModerator => "moderator",
            CloseReason::Inactive => "inactive",
            CloseReason::CreatorLeft => "creator_left",
            CloseReason::Started => "started",
        };

        self.lobby_metrics
            .lobbies_closed_total
            .with_label_values(&[reason_str])
            .inc();
        self.lobby_metrics.lobby_population.set(0);
    }

    /// Record a match starting and how long balancing took
    pub fn record_game_started(&self, format_id: &str, balance_duration: Duration) {
        self.game_metrics
            .games_started_total
            .with_label_values(&[format_id])
            .inc();

        self.performance_metrics
            .balance_duration
            .with_label_values(&[format_id])
            .observe(balance_duration.as_secs_f64());
    }

    /// Record a match result
    pub fn record_game_confirmed(&self, outcome: &Outcome, rating_duration: Duration) {
        let outcome_str = match outcome {
            Outcome::Draw => "draw",
            Outcome::Team(_) => "team",
        };

        self.game_metrics
            .games_confirmed_total
            .with_label_values(&[outcome_str])
            .inc();

        self.performance_metrics
            .rating_calculation_duration
            .observe(rating_duration.as_secs_f64());
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Update uptime gauge
    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("scrim_room_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "scrim_room_amqp_messages_total",
                "Total AMQP messages processed",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("scrim_room_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "scrim_room_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("scrim_room_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            health_status,
            component_health,
        })
    }
}

impl CommandMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let commands_total = IntCounterVec::new(
            Opts::new("scrim_room_commands_total", "Total chat commands handled"),
            &["command", "status"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let conflicts_total = IntCounter::new(
            "scrim_room_state_conflicts_total",
            "Transactions rejected because state changed underneath them",
        )?;
        registry.register(Box::new(conflicts_total.clone()))?;

        Ok(Self {
            commands_total,
            conflicts_total,
        })
    }
}

impl LobbyMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let lobbies_created_total = IntCounterVec::new(
            Opts::new("scrim_room_lobbies_created_total", "Total lobbies created"),
            &["format"],
        )?;
        registry.register(Box::new(lobbies_created_total.clone()))?;

        let lobbies_closed_total = IntCounterVec::new(
            Opts::new("scrim_room_lobbies_closed_total", "Total lobbies closed"),
            &["reason"],
        )?;
        registry.register(Box::new(lobbies_closed_total.clone()))?;

        let lobby_population = IntGauge::new(
            "scrim_room_lobby_population",
            "Players in the open lobby",
        )?;
        registry.register(Box::new(lobby_population.clone()))?;

        let players_joined_total =
            IntCounter::new("scrim_room_players_joined_total", "Total lobby joins")?;
        registry.register(Box::new(players_joined_total.clone()))?;

        Ok(Self {
            lobbies_created_total,
            lobbies_closed_total,
            lobby_population,
            players_joined_total,
        })
    }
}

impl GameMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let games_started_total = IntCounterVec::new(
            Opts::new("scrim_room_games_started_total", "Total matches started"),
            &["format"],
        )?;
        registry.register(Box::new(games_started_total.clone()))?;

        let games_confirmed_total = IntCounterVec::new(
            Opts::new("scrim_room_games_confirmed_total", "Total matches confirmed"),
            &["outcome"],
        )?;
        registry.register(Box::new(games_confirmed_total.clone()))?;

        Ok(Self {
            games_started_total,
            games_confirmed_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let command_duration = HistogramVec::new(
            HistogramOpts::new(
                "scrim_room_command_duration_seconds",
                "Command processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        let balance_duration = HistogramVec::new(
            HistogramOpts::new(
                "scrim_room_balance_duration_seconds",
                "Team balancing time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["format"],
        )?;
        registry.register(Box::new(balance_duration.clone()))?;

        let rating_calculation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "scrim_room_rating_calculation_duration_seconds",
                "Rating calculation time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(rating_calculation_duration.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "scrim_room_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        Ok(Self {
            command_duration,
            balance_duration,
            rating_calculation_duration,
            amqp_operation_duration,
        })
    }
}
