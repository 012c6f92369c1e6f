//! Service layer: application wiring and health checks

pub mod app;
pub mod health;

pub use app::{AppState, Gateway, ServiceError};
pub use health::{HealthCheck, HealthStatus};
