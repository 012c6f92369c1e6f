//! TrueSkill rating system implementation
//!
//! This module provides a concrete implementation of the skill model
//! using the TrueSkill algorithm from the skillratings crate.

use crate::config::RatingConfig;
use crate::error::{MatchmakingError, Result};
use crate::rating::model::SkillModel;
use crate::types::{Outcome, PlayerRating};
use skillratings::trueskill::{
    match_quality_multi_team, match_quality_two_teams, trueskill_multi_team,
    trueskill_two_teams, TrueSkillConfig, TrueSkillRating,
};
use skillratings::{MultiTeamOutcome, Outcomes};

/// TrueSkill-backed skill model
#[derive(Debug, Clone)]
pub struct TrueSkillModel {
    config: TrueSkillConfig,
    initial: PlayerRating,
}

impl TrueSkillModel {
    /// Create a new model, validating the configuration first
    pub fn new(config: &RatingConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| MatchmakingError::ConfigurationError {
                message: e.to_string(),
            })?;

        Ok(Self {
            config: TrueSkillConfig {
                draw_probability: config.draw_probability,
                beta: config.beta,
                default_dynamics: config.dynamics,
            },
            initial: PlayerRating {
                rating: config.initial_rating,
                uncertainty: config.initial_uncertainty,
            },
        })
    }

    fn to_trueskill(teams: &[Vec<PlayerRating>]) -> Vec<Vec<TrueSkillRating>> {
        teams
            .iter()
            .map(|team| team.iter().map(|&r| r.into()).collect())
            .collect()
    }

    fn from_trueskill(teams: Vec<Vec<TrueSkillRating>>) -> Vec<Vec<PlayerRating>> {
        teams
            .into_iter()
            .map(|team| team.into_iter().map(PlayerRating::from).collect())
            .collect()
    }

    fn check_teams(teams: &[Vec<PlayerRating>]) -> Result<()> {
        if teams.len() < 2 {
            return Err(MatchmakingError::RatingCalculationFailed {
                reason: format!("at least two teams are required, got {}", teams.len()),
            }
            .into());
        }
        if teams.iter().any(|team| team.is_empty()) {
            return Err(MatchmakingError::RatingCalculationFailed {
                reason: "teams cannot be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for TrueSkillModel {
    fn default() -> Self {
        let rating = RatingConfig::default();
        Self {
            config: TrueSkillConfig {
                draw_probability: rating.draw_probability,
                beta: rating.beta,
                default_dynamics: rating.dynamics,
            },
            initial: PlayerRating::default(),
        }
    }
}

impl SkillModel for TrueSkillModel {
    fn match_quality(&self, teams: &[Vec<PlayerRating>]) -> Result<f64> {
        Self::check_teams(teams)?;
        let teams = Self::to_trueskill(teams);

        let quality = if teams.len() == 2 {
            match_quality_two_teams(&teams[0], &teams[1], &self.config)
        } else {
            let refs: Vec<&[TrueSkillRating]> = teams.iter().map(Vec::as_slice).collect();
            match_quality_multi_team(&refs, &self.config)
        };

        Ok(quality)
    }

    fn rate(&self, teams: &[Vec<PlayerRating>], outcome: &Outcome) -> Result<Vec<Vec<PlayerRating>>> {
        Self::check_teams(teams)?;
        if let Outcome::Team(index) = outcome {
            if *index >= teams.len() {
                return Err(MatchmakingError::InvalidOutcome {
                    value: outcome.to_string(),
                }
                .into());
            }
        }

        let teams = Self::to_trueskill(teams);

        let rated = if teams.len() == 2 {
            let result = match outcome {
                Outcome::Draw => Outcomes::DRAW,
                Outcome::Team(0) => Outcomes::WIN,
                Outcome::Team(_) => Outcomes::LOSS,
            };
            let (first, second) = trueskill_two_teams(&teams[0], &teams[1], &result, &self.config);
            vec![first, second]
        } else {
            // Winner ranks first, everyone else shares second place
            let ranked: Vec<(&[TrueSkillRating], MultiTeamOutcome)> = teams
                .iter()
                .enumerate()
                .map(|(index, team)| {
                    let rank = match outcome {
                        Outcome::Draw => 1,
                        Outcome::Team(winner) if *winner == index => 1,
                        Outcome::Team(_) => 2,
                    };
                    (team.as_slice(), MultiTeamOutcome::new(rank))
                })
                .collect();
            trueskill_multi_team(&ranked, &self.config)
        };

        let rated = Self::from_trueskill(rated);
        let finite = rated
            .iter()
            .flatten()
            .all(|r| r.rating.is_finite() && r.uncertainty.is_finite());
        if !finite {
            return Err(MatchmakingError::RatingCalculationFailed {
                reason: "rating update produced non-finite values".to_string(),
            }
            .into());
        }

        Ok(rated)
    }

    fn initial_rating(&self) -> PlayerRating {
        self.initial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(mu: f64, sigma: f64) -> PlayerRating {
        PlayerRating {
            rating: mu,
            uncertainty: sigma,
        }
    }

    #[test]
    fn test_initial_rating_from_config() {
        let model = TrueSkillModel::new(&RatingConfig::default()).unwrap();
        assert_eq!(model.initial_rating(), PlayerRating::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RatingConfig {
            beta: 0.0,
            ..Default::default()
        };
        assert!(TrueSkillModel::new(&config).is_err());
    }

    #[test]
    fn test_equal_teams_score_higher_than_lopsided() {
        let model = TrueSkillModel::default();
        let even = model
            .match_quality(&[
                vec![rating(25.0, 8.333), rating(25.0, 8.333)],
                vec![rating(25.0, 8.333), rating(25.0, 8.333)],
            ])
            .unwrap();
        let lopsided = model
            .match_quality(&[
                vec![rating(40.0, 3.0), rating(38.0, 3.0)],
                vec![rating(10.0, 3.0), rating(12.0, 3.0)],
            ])
            .unwrap();

        assert!(even > 0.0 && even <= 1.0);
        assert!(lopsided < even);
    }

    #[test]
    fn test_single_team_rejected() {
        let model = TrueSkillModel::default();
        assert!(model.match_quality(&[vec![rating(25.0, 8.0)]]).is_err());
    }

    #[test]
    fn test_two_team_win_moves_ratings() {
        let model = TrueSkillModel::default();
        let teams = vec![
            vec![PlayerRating::default(), PlayerRating::default()],
            vec![PlayerRating::default(), PlayerRating::default()],
        ];

        let rated = model.rate(&teams, &Outcome::Team(1)).unwrap();
        assert_eq!(rated.len(), 2);
        assert_eq!(rated[0].len(), 2);
        assert!(rated[0][0].rating < 25.0);
        assert!(rated[1][0].rating > 25.0);
        assert!(rated[1][1].uncertainty < PlayerRating::default().uncertainty);
    }

    #[test]
    fn test_free_for_all_winner_gains() {
        let model = TrueSkillModel::default();
        let teams: Vec<Vec<PlayerRating>> = (0..4).map(|_| vec![PlayerRating::default()]).collect();

        let rated = model.rate(&teams, &Outcome::Team(2)).unwrap();
        assert_eq!(rated.len(), 4);
        assert!(rated[2][0].rating > 25.0);
        assert!(rated[0][0].rating < 25.0);
    }

    #[test]
    fn test_out_of_range_outcome() {
        let model = TrueSkillModel::default();
        let teams = vec![vec![PlayerRating::default()], vec![PlayerRating::default()]];
        assert!(model.rate(&teams, &Outcome::Team(2)).is_err());
    }
}
