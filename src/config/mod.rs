//! Configuration management for the scrim-room service
//!
//! This module handles configuration loading from environment variables and
//! TOML files, validation, and default values.

pub mod app;
pub mod lobby;
pub mod rating;

// Re-export commonly used types
pub use app::{default_formats, validate_config, AmqpSettings, AppConfig, ServiceSettings};
pub use lobby::LobbyConfig;
pub use rating::RatingConfig;
