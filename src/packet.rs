//! Signal packets
//!
//! A [`SignalPacket`] is the envelope every downstream consumer receives:
//! sinks, predictors and the state engine. Consumers read values by name only,
//! and every name comes from the closed [`Channel`] vocabulary.

use crate::baseline::ChannelStats;
use crate::decoder::PhysioReading;
use crate::heart::HeartFeatures;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Version of the channel vocabulary below
pub const CHANNEL_VOCABULARY_VERSION: &str = "ringstress.channels.v1";

/// Which map of the packet a channel lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Measured values
    Signal,
    /// Values derived from measurements
    Feature,
}

/// Named channels producers may write and consumers may read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    StressRaw,
    StressPercent,
    EdaMean,
    HrBpm,
    StressBaseline,
    StressPhasic,
    StressPeak,
    EdaBaseline,
    EdaPhasic,
    EdaPeak,
    Rmssd,
}

impl Channel {
    pub const ALL: [Channel; 11] = [
        Channel::StressRaw,
        Channel::StressPercent,
        Channel::EdaMean,
        Channel::HrBpm,
        Channel::StressBaseline,
        Channel::StressPhasic,
        Channel::StressPeak,
        Channel::EdaBaseline,
        Channel::EdaPhasic,
        Channel::EdaPeak,
        Channel::Rmssd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::StressRaw => "stress_raw",
            Channel::StressPercent => "stress_percent",
            Channel::EdaMean => "eda_mean",
            Channel::HrBpm => "hr_bpm",
            Channel::StressBaseline => "stress_baseline",
            Channel::StressPhasic => "stress_phasic",
            Channel::StressPeak => "stress_peak",
            Channel::EdaBaseline => "eda_baseline",
            Channel::EdaPhasic => "eda_phasic",
            Channel::EdaPeak => "eda_peak",
            Channel::Rmssd => "rmssd",
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            Channel::StressRaw | Channel::StressPercent | Channel::EdaMean | Channel::HrBpm => {
                ChannelKind::Signal
            }
            _ => ChannelKind::Feature,
        }
    }

    /// Short description for schema listings
    pub fn description(&self) -> &'static str {
        match self {
            Channel::StressRaw => "Device stress byte (0-255)",
            Channel::StressPercent => "Device stress scaled to 0-100",
            Channel::EdaMean => "Mean of the 77 raw EDA intensity bytes",
            Channel::HrBpm => "Average heart rate over the last 10 beats reported",
            Channel::StressBaseline => "Tonic (EMA) component of stress_percent",
            Channel::StressPhasic => "stress_percent minus its baseline",
            Channel::StressPeak => "1.0 when stress_percent is in a rising peak",
            Channel::EdaBaseline => "Tonic (EMA) component of eda_mean",
            Channel::EdaPhasic => "eda_mean minus its baseline",
            Channel::EdaPeak => "1.0 when eda_mean is in a rising peak",
            Channel::Rmssd => "RMSSD of recent RR intervals (ms)",
        }
    }

    pub fn from_name(name: &str) -> Option<Channel> {
        Channel::ALL.iter().copied().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical envelope handed to downstream consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPacket {
    /// Unix seconds
    pub timestamp: f64,
    pub source: String,
    pub subject_id: Option<String>,
    #[serde(default)]
    pub signals: BTreeMap<String, f64>,
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
}

impl SignalPacket {
    pub fn new(timestamp: f64, source: impl Into<String>, subject_id: Option<String>) -> Self {
        Self {
            timestamp,
            source: source.into(),
            subject_id,
            signals: BTreeMap::new(),
            features: BTreeMap::new(),
        }
    }

    /// Write a channel into the map its kind belongs to
    pub fn insert(&mut self, channel: Channel, value: f64) {
        let map = match channel.kind() {
            ChannelKind::Signal => &mut self.signals,
            ChannelKind::Feature => &mut self.features,
        };
        map.insert(channel.as_str().to_string(), value);
    }

    /// Look up a name, features first, then signals
    pub fn get(&self, name: &str) -> Option<f64> {
        self.features
            .get(name)
            .or_else(|| self.signals.get(name))
            .copied()
    }

    pub fn get_channel(&self, channel: Channel) -> Option<f64> {
        self.get(channel.as_str())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Builds packets for one source / subject pair
#[derive(Debug, Clone)]
pub struct PacketAssembler {
    source: String,
    subject_id: Option<String>,
}

impl PacketAssembler {
    pub fn new(source: impl Into<String>, subject_id: Option<String>) -> Self {
        Self {
            source: source.into(),
            subject_id,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.subject_id.as_deref()
    }

    /// Assemble a packet from one decoded reading and its channel statistics
    pub fn assemble(
        &self,
        reading: &PhysioReading,
        stress: &ChannelStats,
        eda: Option<&ChannelStats>,
        heart: Option<&HeartFeatures>,
        timestamp: f64,
    ) -> SignalPacket {
        let mut packet = SignalPacket::new(timestamp, self.source.clone(), self.subject_id.clone());

        packet.insert(Channel::StressRaw, f64::from(reading.stress_raw));
        packet.insert(Channel::StressPercent, reading.stress_percent());
        packet.insert(Channel::StressBaseline, stress.baseline);
        packet.insert(Channel::StressPhasic, stress.phasic);
        packet.insert(Channel::StressPeak, flag(stress.is_peak));

        if let Some(eda) = eda {
            packet.insert(Channel::EdaMean, eda.current);
            packet.insert(Channel::EdaBaseline, eda.baseline);
            packet.insert(Channel::EdaPhasic, eda.phasic);
            packet.insert(Channel::EdaPeak, flag(eda.is_peak));
        }

        if let Some(heart) = heart {
            packet.insert(Channel::HrBpm, heart.hr_bpm);
            packet.insert(Channel::Rmssd, heart.rmssd);
        }

        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::BaselineTracker;
    use crate::decoder::PacketDecoder;
    use pretty_assertions::assert_eq;

    fn full_frame(stress: u8, eda: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; 92];
        bytes[14] = stress;
        for b in &mut bytes[15..92] {
            *b = eda;
        }
        bytes
    }

    #[test]
    fn test_vocabulary_names_unique() {
        let mut names: Vec<&str> = Channel::ALL.iter().map(|c| c.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Channel::ALL.len());

        for channel in Channel::ALL {
            assert_eq!(Channel::from_name(channel.as_str()), Some(channel));
        }
        assert_eq!(Channel::from_name("unknown"), None);
    }

    #[test]
    fn test_serde_name_matches_as_str() {
        for channel in Channel::ALL {
            let json = serde_json::to_string(&channel).unwrap();
            assert_eq!(json, format!("\"{}\"", channel.as_str()));
        }
    }

    #[test]
    fn test_assemble_full_frame() {
        let reading = PacketDecoder::decode(&full_frame(128, 20)).unwrap();
        let mut stress_tracker = BaselineTracker::new();
        let mut eda_tracker = BaselineTracker::new();
        let stress = stress_tracker.add_reading(reading.stress_percent());
        let eda = eda_tracker.add_reading(reading.eda_block.unwrap().mean_intensity());

        let assembler = PacketAssembler::new("nuanic-ring", Some("subject-1".to_string()));
        let heart = HeartFeatures {
            hr_bpm: 72.0,
            rmssd: 41.5,
        };
        let packet = assembler.assemble(&reading, &stress, Some(&eda), Some(&heart), 1_700_000_000.0);

        assert_eq!(packet.source, "nuanic-ring");
        assert_eq!(packet.subject_id.as_deref(), Some("subject-1"));
        assert_eq!(packet.signals.get("stress_raw"), Some(&128.0));
        assert_eq!(packet.get_channel(Channel::EdaMean), Some(20.0));
        assert_eq!(packet.features.get("stress_peak"), Some(&0.0));
        assert_eq!(packet.get("rmssd"), Some(41.5));
        assert_eq!(packet.signals.len(), 4);
        assert_eq!(packet.features.len(), 7);
    }

    #[test]
    fn test_assemble_stress_only_frame() {
        let reading = PacketDecoder::decode(&[0u8; 20]).unwrap();
        let stress = BaselineTracker::new().add_reading(reading.stress_percent());
        let packet = PacketAssembler::new("ring", None).assemble(&reading, &stress, None, None, 1.0);

        assert!(packet.get_channel(Channel::EdaMean).is_none());
        assert!(packet.get_channel(Channel::HrBpm).is_none());
        assert_eq!(packet.get_channel(Channel::StressPercent), Some(0.0));
    }

    #[test]
    fn test_json_round_trip() {
        let mut packet = SignalPacket::new(1_700_000_123.25, "ring", Some("s-9".to_string()));
        packet.insert(Channel::StressPercent, 50.19607843137255);
        packet.insert(Channel::EdaPhasic, -3.125);
        packet.insert(Channel::Rmssd, 38.7);

        let json = packet.to_json().unwrap();
        let parsed = SignalPacket::from_json(&json).unwrap();

        assert_eq!(parsed.signals.keys().collect::<Vec<_>>(), packet.signals.keys().collect::<Vec<_>>());
        assert_eq!(parsed.features.keys().collect::<Vec<_>>(), packet.features.keys().collect::<Vec<_>>());
        for (key, value) in packet.signals.iter().chain(packet.features.iter()) {
            assert!((parsed.get(key).unwrap() - value).abs() < 1e-9);
        }
        assert_eq!(parsed.subject_id, packet.subject_id);
        assert!((parsed.timestamp - packet.timestamp).abs() < 1e-6);
    }

    #[test]
    fn test_from_json_missing_maps() {
        let parsed =
            SignalPacket::from_json(r#"{"timestamp": 1.0, "source": "ring", "subject_id": null}"#).unwrap();
        assert!(parsed.signals.is_empty());
        assert!(parsed.features.is_empty());
    }
}
