//! Metrics and monitoring for the scrim-room service

pub mod collector;
pub mod health;

pub use collector::{
    CommandMetrics, GameMetrics, LobbyMetrics, MetricsCollector, MetricsTimer, PerformanceMetrics,
    ServiceMetrics,
};
pub use health::{HealthServer, HealthServerConfig};
