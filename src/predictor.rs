//! Predictor seam
//!
//! A predictor turns a [`SignalPacket`] into a stress score. Trained models
//! live outside this crate and plug in through [`Predictor`]; the crate ships
//! [`DeviceStressPredictor`], which trusts the ring's own stress estimate.

use crate::engine::StressSignal;
use crate::error::ComputeError;
use crate::packet::{Channel, SignalPacket};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse label attached to a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionLabel {
    Baseline,
    LowStress,
    HighStress,
}

impl PredictionLabel {
    /// Scores in the 0.35-0.65 band are `LowStress`; otherwise the side of 0.5
    /// decides.
    pub fn from_score(score: f64) -> Self {
        if (0.35..=0.65).contains(&score) {
            PredictionLabel::LowStress
        } else if score >= 0.5 {
            PredictionLabel::HighStress
        } else {
            PredictionLabel::Baseline
        }
    }
}

impl fmt::Display for PredictionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PredictionLabel::Baseline => "Baseline",
            PredictionLabel::LowStress => "Low Stress",
            PredictionLabel::HighStress => "High Stress",
        };
        f.write_str(text)
    }
}

/// Output of a predictor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: PredictionLabel,
    pub score: f64,
    pub confidence: f64,
}

impl Prediction {
    pub fn new(score: f64, confidence: f64) -> Self {
        Self {
            label: PredictionLabel::from_score(score),
            score,
            confidence,
        }
    }

    pub fn to_signal(&self, timestamp: Option<f64>) -> StressSignal {
        StressSignal::new(self.score, self.confidence, timestamp)
    }
}

/// Produces stress evidence from a packet
pub trait Predictor {
    fn predict(&self, packet: &SignalPacket) -> Result<Prediction, ComputeError>;
}

/// Uses the ring's on-board stress estimate (`stress_percent / 100`)
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceStressPredictor;

impl Predictor for DeviceStressPredictor {
    fn predict(&self, packet: &SignalPacket) -> Result<Prediction, ComputeError> {
        let percent = packet
            .get_channel(Channel::StressPercent)
            .ok_or_else(|| ComputeError::MissingChannel(Channel::StressPercent.to_string()))?;
        Ok(Prediction::new((percent / 100.0).clamp(0.0, 1.0), 1.0))
    }
}

/// Collect named values in order, features before signals. A missing name is
/// an error rather than a silent zero.
pub fn feature_vector(packet: &SignalPacket, order: &[&str]) -> Result<Vec<f64>, ComputeError> {
    order
        .iter()
        .map(|name| {
            packet
                .get(name)
                .ok_or_else(|| ComputeError::MissingChannel((*name).to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_label_bands() {
        assert_eq!(PredictionLabel::from_score(0.1), PredictionLabel::Baseline);
        assert_eq!(PredictionLabel::from_score(0.35), PredictionLabel::LowStress);
        assert_eq!(PredictionLabel::from_score(0.5), PredictionLabel::LowStress);
        assert_eq!(PredictionLabel::from_score(0.65), PredictionLabel::LowStress);
        assert_eq!(PredictionLabel::from_score(0.9), PredictionLabel::HighStress);
        assert_eq!(PredictionLabel::HighStress.to_string(), "High Stress");
    }

    #[test]
    fn test_device_predictor() {
        let mut packet = SignalPacket::new(1.0, "ring", None);
        packet.insert(Channel::StressPercent, 80.0);

        let prediction = DeviceStressPredictor.predict(&packet).unwrap();
        assert!((prediction.score - 0.8).abs() < 1e-12);
        assert_eq!(prediction.confidence, 1.0);
        assert_eq!(prediction.label, PredictionLabel::HighStress);
    }

    #[test]
    fn test_device_predictor_missing_channel() {
        let packet = SignalPacket::new(1.0, "ring", None);
        let err = DeviceStressPredictor.predict(&packet).unwrap_err();
        assert!(matches!(err, ComputeError::MissingChannel(name) if name == "stress_percent"));
    }

    #[test]
    fn test_feature_vector_order_and_lookup() {
        let mut packet = SignalPacket::new(1.0, "ring", None);
        packet.insert(Channel::Rmssd, 42.0);
        packet.insert(Channel::HrBpm, 70.0);

        assert_eq!(feature_vector(&packet, &["rmssd", "hr_bpm"]).unwrap(), vec![42.0, 70.0]);
        assert!(feature_vector(&packet, &["rmssd", "eda_mean"]).is_err());
    }
}
