//! Rating system configuration

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// TrueSkill parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    pub initial_rating: f64,
    pub initial_uncertainty: f64,
    pub beta: f64,
    pub draw_probability: f64,
    pub dynamics: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            initial_rating: 25.0,
            initial_uncertainty: 25.0 / 3.0,
            beta: 25.0 / 6.0,
            draw_probability: 0.1,
            dynamics: 25.0 / 300.0,
        }
    }
}

impl RatingConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.initial_rating.is_finite() {
            return Err(anyhow!("Initial rating must be finite"));
        }
        if !(self.initial_uncertainty.is_finite() && self.initial_uncertainty > 0.0) {
            return Err(anyhow!("Initial uncertainty must be positive"));
        }
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return Err(anyhow!("Beta must be positive"));
        }
        if !(0.0..1.0).contains(&self.draw_probability) {
            return Err(anyhow!(
                "Draw probability must be in [0, 1): {}",
                self.draw_probability
            ));
        }
        if !(self.dynamics.is_finite() && self.dynamics >= 0.0) {
            return Err(anyhow!("Dynamics cannot be negative"));
        }
        Ok(())
    }
}
