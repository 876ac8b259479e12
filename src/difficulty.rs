//! Difficulty mapping
//!
//! Maps a stress score and a performance score to an adaptive state, and the
//! state to a difficulty profile a game can apply.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// What the controller is trying to do to the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdaptiveState {
    Monitor,
    Assist,
    DeEscalate,
    Provoke,
}

/// Game-side multipliers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyProfile {
    pub spawn_rate: f64,
    pub enemy_accuracy: f64,
    pub game_speed: f64,
}

/// Thresholds for [`DifficultyMapper`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyConfig {
    pub low_arousal: f64,
    pub high_arousal: f64,
    pub high_performance: f64,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            low_arousal: 0.3,
            high_arousal: 0.7,
            high_performance: 0.7,
        }
    }
}

impl DifficultyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.low_arousal <= self.high_arousal) {
            return Err(ConfigError::ArousalBand {
                low: self.low_arousal,
                high: self.high_arousal,
            });
        }
        Ok(())
    }
}

/// Lookup-table controller
#[derive(Debug, Clone, Default)]
pub struct DifficultyMapper {
    config: DifficultyConfig,
}

impl DifficultyMapper {
    pub fn new(config: DifficultyConfig) -> Self {
        Self { config }
    }

    pub fn decide_state(&self, stress_score: f64, performance_score: f64) -> AdaptiveState {
        if stress_score >= self.config.high_arousal {
            if performance_score >= self.config.high_performance {
                return AdaptiveState::Assist;
            }
            return AdaptiveState::DeEscalate;
        }
        if stress_score <= self.config.low_arousal {
            return AdaptiveState::Provoke;
        }
        AdaptiveState::Monitor
    }

    pub fn build_profile(&self, state: AdaptiveState) -> DifficultyProfile {
        let (spawn_rate, enemy_accuracy, game_speed) = match state {
            AdaptiveState::Assist => (0.8, 0.8, 0.9),
            AdaptiveState::DeEscalate => (0.6, 0.6, 0.8),
            AdaptiveState::Provoke => (1.2, 1.1, 1.1),
            AdaptiveState::Monitor => (1.0, 1.0, 1.0),
        };
        DifficultyProfile {
            spawn_rate,
            enemy_accuracy,
            game_speed,
        }
    }
}

/// Game controls the connector drives
pub trait GameApi {
    fn set_spawn_rate(&mut self, value: f64);
    fn set_enemy_accuracy(&mut self, value: f64);
    fn set_game_speed(&mut self, value: f64);
}

/// Pushes difficulty profiles into a game
pub struct GameConnector<G: GameApi> {
    api: G,
}

impl<G: GameApi> GameConnector<G> {
    pub fn new(api: G) -> Self {
        Self { api }
    }

    pub fn apply_profile(&mut self, profile: &DifficultyProfile) {
        self.api.set_spawn_rate(profile.spawn_rate);
        self.api.set_enemy_accuracy(profile.enemy_accuracy);
        self.api.set_game_speed(profile.game_speed);
    }

    pub fn api(&self) -> &G {
        &self.api
    }

    pub fn into_inner(self) -> G {
        self.api
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingGame {
        calls: Vec<(&'static str, f64)>,
    }

    impl GameApi for RecordingGame {
        fn set_spawn_rate(&mut self, value: f64) {
            self.calls.push(("spawn_rate", value));
        }
        fn set_enemy_accuracy(&mut self, value: f64) {
            self.calls.push(("enemy_accuracy", value));
        }
        fn set_game_speed(&mut self, value: f64) {
            self.calls.push(("game_speed", value));
        }
    }

    #[test]
    fn test_decide_state_table() {
        let mapper = DifficultyMapper::default();
        assert_eq!(mapper.decide_state(0.8, 0.9), AdaptiveState::Assist);
        assert_eq!(mapper.decide_state(0.7, 0.7), AdaptiveState::Assist);
        assert_eq!(mapper.decide_state(0.8, 0.2), AdaptiveState::DeEscalate);
        assert_eq!(mapper.decide_state(0.3, 0.9), AdaptiveState::Provoke);
        assert_eq!(mapper.decide_state(0.1, 0.1), AdaptiveState::Provoke);
        assert_eq!(mapper.decide_state(0.5, 0.9), AdaptiveState::Monitor);
    }

    #[test]
    fn test_profiles() {
        let mapper = DifficultyMapper::default();
        assert_eq!(
            mapper.build_profile(AdaptiveState::Provoke),
            DifficultyProfile {
                spawn_rate: 1.2,
                enemy_accuracy: 1.1,
                game_speed: 1.1
            }
        );
        assert_eq!(mapper.build_profile(AdaptiveState::DeEscalate).spawn_rate, 0.6);
        assert_eq!(mapper.build_profile(AdaptiveState::Assist).game_speed, 0.9);
        assert_eq!(mapper.build_profile(AdaptiveState::Monitor).enemy_accuracy, 1.0);
    }

    #[test]
    fn test_connector_applies_all_controls() {
        let mapper = DifficultyMapper::default();
        let mut connector = GameConnector::new(RecordingGame::default());
        connector.apply_profile(&mapper.build_profile(AdaptiveState::Assist));

        assert_eq!(
            connector.into_inner().calls,
            vec![("spawn_rate", 0.8), ("enemy_accuracy", 0.8), ("game_speed", 0.9)]
        );
    }

    #[test]
    fn test_config_validation() {
        let bad = DifficultyConfig {
            low_arousal: 0.8,
            high_arousal: 0.2,
            high_performance: 0.7,
        };
        assert!(bad.validate().is_err());
        assert!(DifficultyConfig::default().validate().is_ok());
    }
}
