//! Partition scoring through the skill model

use crate::error::{MatchmakingError, Result};
use crate::rating::SkillModel;
use crate::types::Partition;
use std::sync::Arc;

/// Maps a partition to its predicted match quality
#[derive(Clone)]
pub struct BalanceScorer {
    model: Arc<dyn SkillModel>,
}

impl BalanceScorer {
    pub fn new(model: Arc<dyn SkillModel>) -> Self {
        Self { model }
    }

    /// Quality of the partition; higher is more balanced
    pub fn score(&self, partition: &Partition) -> Result<f64> {
        let quality = self.model.match_quality(&partition.ratings())?;

        if !quality.is_finite() {
            return Err(MatchmakingError::BalanceFailed {
                reason: format!("skill model returned non-finite quality {}", quality),
            }
            .into());
        }

        Ok(quality)
    }
}

impl std::fmt::Debug for BalanceScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceScorer").finish_non_exhaustive()
    }
}
