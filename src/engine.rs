//! Hysteretic stress-state engine (UATR smoother)
//!
//! Turns a noisy per-reading stress score into one of three discrete states.
//! Two independent guards keep the state from flapping:
//!
//! - a dwell guard: no transition until `min_state_seconds` have passed since
//!   the last one;
//! - a change-cost guard: the smoothed score must sit at least `change_cost`
//!   away from 0.5 for a transition to apply.
//!
//! The engine has no failure path. Out-of-range scores are absorbed by the
//! threshold comparisons.

use crate::error::ConfigError;
use crate::predictor::{Prediction, PredictionLabel};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Wall clock in unix seconds
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Discrete stress state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StressState {
    Neutral,
    Stress,
    NoStress,
}

impl StressState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StressState::Neutral => "NEUTRAL",
            StressState::Stress => "STRESS",
            StressState::NoStress => "NO_STRESS",
        }
    }
}

/// One piece of stress evidence from a predictor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StressSignal {
    /// Expected in 0-1
    pub score: f64,
    /// 0-1
    pub confidence: f64,
    /// Unix seconds; `None` uses the wall clock
    pub timestamp: Option<f64>,
}

impl StressSignal {
    pub fn new(score: f64, confidence: f64, timestamp: Option<f64>) -> Self {
        Self {
            score,
            confidence,
            timestamp,
        }
    }

    pub fn resolved_time(&self) -> f64 {
        self.timestamp.unwrap_or_else(unix_now)
    }
}

/// Smoother parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UatrConfig {
    /// Scale applied to each incoming score, in (0, 1]
    pub evidence_weight: f64,
    /// EMA memory, in [0, 1)
    pub decay: f64,
    pub threshold_high: f64,
    pub threshold_low: f64,
    pub min_state_seconds: f64,
    pub change_cost: f64,
}

impl Default for UatrConfig {
    fn default() -> Self {
        Self {
            evidence_weight: 0.7,
            decay: 0.9,
            threshold_high: 0.7,
            threshold_low: 0.3,
            min_state_seconds: 10.0,
            change_cost: 0.1,
        }
    }
}

impl UatrConfig {
    /// Build a validated configuration
    pub fn new(
        evidence_weight: f64,
        decay: f64,
        threshold_high: f64,
        threshold_low: f64,
        min_state_seconds: f64,
        change_cost: f64,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            evidence_weight,
            decay,
            threshold_high,
            threshold_low,
            min_state_seconds,
            change_cost,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.evidence_weight > 0.0 && self.evidence_weight <= 1.0) {
            return Err(ConfigError::EvidenceWeight(self.evidence_weight));
        }
        if !(self.decay >= 0.0 && self.decay < 1.0) {
            return Err(ConfigError::Decay(self.decay));
        }
        if !(self.threshold_low.is_finite()
            && self.threshold_high.is_finite()
            && self.threshold_low < self.threshold_high)
        {
            return Err(ConfigError::Thresholds {
                low: self.threshold_low,
                high: self.threshold_high,
            });
        }
        if !(self.min_state_seconds >= 0.0 && self.min_state_seconds.is_finite()) {
            return Err(ConfigError::MinStateSeconds(self.min_state_seconds));
        }
        if !(self.change_cost >= 0.0 && self.change_cost.is_finite()) {
            return Err(ConfigError::ChangeCost(self.change_cost));
        }
        Ok(())
    }
}

/// Mutable engine state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StressEngineState {
    pub state: StressState,
    /// Smoothed score
    pub score: f64,
    /// Unix seconds of the last transition
    pub last_change_time: f64,
}

impl Default for StressEngineState {
    fn default() -> Self {
        Self {
            state: StressState::Neutral,
            score: 0.5,
            last_change_time: 0.0,
        }
    }
}

/// Hysteretic smoother. One instance per monitored subject.
#[derive(Debug, Clone)]
pub struct StressStateEngine {
    config: UatrConfig,
    inner: StressEngineState,
}

impl StressStateEngine {
    pub fn new(config: UatrConfig) -> Self {
        Self {
            config,
            inner: StressEngineState::default(),
        }
    }

    pub fn config(&self) -> &UatrConfig {
        &self.config
    }

    pub fn state(&self) -> StressState {
        self.inner.state
    }

    pub fn score(&self) -> f64 {
        self.inner.score
    }

    pub fn last_change_time(&self) -> f64 {
        self.inner.last_change_time
    }

    pub fn snapshot(&self) -> StressEngineState {
        self.inner
    }

    pub fn restore(&mut self, state: StressEngineState) {
        self.inner = state;
    }

    /// Fold one signal into the smoothed score and return the resulting state
    pub fn update(&mut self, signal: StressSignal) -> StressState {
        if !signal.score.is_finite() {
            debug!(score = signal.score, "ignoring non-finite stress score");
            return self.inner.state;
        }

        let ts = signal.resolved_time();
        let cfg = &self.config;

        let weighted = cfg.evidence_weight * signal.score;
        self.inner.score = cfg.decay * self.inner.score + (1.0 - cfg.decay) * weighted;
        let score = self.inner.score;

        if ts - self.inner.last_change_time < cfg.min_state_seconds {
            return self.inner.state;
        }

        let candidate = self.candidate(score);
        if candidate != self.inner.state {
            if (score - 0.5).abs() >= cfg.change_cost {
                info!(
                    from = self.inner.state.as_str(),
                    to = candidate.as_str(),
                    score,
                    ts,
                    "stress state changed"
                );
                self.inner.state = candidate;
                self.inner.last_change_time = ts;
            } else {
                debug!(candidate = candidate.as_str(), score, "transition below change cost");
            }
        }

        self.inner.state
    }

    fn candidate(&self, score: f64) -> StressState {
        if score >= self.config.threshold_high {
            StressState::Stress
        } else if score <= self.config.threshold_low {
            StressState::NoStress
        } else {
            StressState::Neutral
        }
    }
}

/// A prediction together with the engine state it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothedPrediction {
    pub label: PredictionLabel,
    pub score: f64,
    pub confidence: f64,
    pub state: StressState,
}

/// Feed a prediction through the engine
pub fn apply_smoothing(
    engine: &mut StressStateEngine,
    prediction: &Prediction,
    timestamp: Option<f64>,
) -> SmoothedPrediction {
    let state = engine.update(prediction.to_signal(timestamp));
    SmoothedPrediction {
        label: prediction.label,
        score: prediction.score,
        confidence: prediction.confidence,
        state,
    }
}
