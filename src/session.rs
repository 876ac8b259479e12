//! Monitoring session
//!
//! A [`MonitoringSession`] owns all mutable state for one subject: the stress
//! and EDA baselines, the heart window, the predictor and the state engine.
//! Frames go in, [`SessionUpdate`]s come out. Baselines and engine state can be
//! saved and restored across runs.

use crate::baseline::BaselineTracker;
use crate::config::MonitorConfig;
use crate::decoder::{FrameKind, PacketDecoder, RawFrame};
use crate::engine::{unix_now, StressEngineState, StressState, StressStateEngine, UatrConfig};
use crate::error::{ComputeError, DecodeError};
use crate::heart::{decode_heart_rate, HeartFeatures, HeartWindow};
use crate::packet::{PacketAssembler, SignalPacket};
use crate::predictor::{DeviceStressPredictor, Prediction, Predictor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Format tag written into saved baselines
pub const SNAPSHOT_VERSION: &str = "ringstress.baselines.v1";

/// Result of ingesting one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub packet: SignalPacket,
    /// `None` when the predictor could not score the packet
    pub prediction: Option<Prediction>,
    pub state: StressState,
    /// Smoothed engine score after this frame
    pub smoothed_score: f64,
    pub transitioned: bool,
}

/// Frame counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub frames_ingested: u64,
    pub frames_rejected: u64,
    pub full_frames: u64,
    pub stress_only_frames: u64,
    pub heart_notifications: u64,
    pub prediction_failures: u64,
    pub transitions: u64,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub source: String,
    pub subject_id: Option<String>,
    pub engine: StressEngineState,
    pub counters: SessionCounters,
}

/// Persisted session state
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionSnapshot {
    version: String,
    stress: BaselineTracker,
    eda: BaselineTracker,
    heart: HeartWindow,
    engine: StressEngineState,
}

/// Stateful per-subject processor
pub struct MonitoringSession {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    assembler: PacketAssembler,
    stress: BaselineTracker,
    eda: BaselineTracker,
    heart: HeartWindow,
    predictor: Box<dyn Predictor + Send>,
    engine: StressStateEngine,
    counters: SessionCounters,
}

impl Default for MonitoringSession {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

impl MonitoringSession {
    /// Create a session that scores packets with [`DeviceStressPredictor`]
    pub fn new(source: impl Into<String>, subject_id: Option<String>, uatr: UatrConfig) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            assembler: PacketAssembler::new(source, subject_id),
            stress: BaselineTracker::new(),
            eda: BaselineTracker::new(),
            heart: HeartWindow::new(),
            predictor: Box::new(DeviceStressPredictor),
            engine: StressStateEngine::new(uatr),
            counters: SessionCounters::default(),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.source.clone(), config.subject_id.clone(), config.uatr)
    }

    /// Replace the predictor
    pub fn with_predictor(mut self, predictor: Box<dyn Predictor + Send>) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> StressState {
        self.engine.state()
    }

    pub fn engine(&self) -> &StressStateEngine {
        &self.engine
    }

    pub fn stats(&self) -> &SessionCounters {
        &self.counters
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.session_id,
            started_at: self.started_at,
            source: self.assembler.source().to_string(),
            subject_id: self.assembler.subject_id().map(str::to_string),
            engine: self.engine.snapshot(),
            counters: self.counters.clone(),
        }
    }

    /// Decode one ring notification and run it through baselines, predictor
    /// and engine. `timestamp` defaults to the wall clock.
    pub fn ingest(&mut self, bytes: &[u8], timestamp: Option<f64>) -> Result<SessionUpdate, DecodeError> {
        let reading = match PacketDecoder::decode(bytes) {
            Ok(reading) => reading,
            Err(e) => {
                self.counters.frames_rejected += 1;
                return Err(e);
            }
        };
        let ts = timestamp.unwrap_or_else(unix_now);

        self.counters.frames_ingested += 1;
        match reading.frame_kind() {
            FrameKind::Full => self.counters.full_frames += 1,
            FrameKind::StressOnly => self.counters.stress_only_frames += 1,
        }

        let stress = self.stress.add_reading(reading.stress_percent());
        let eda = reading
            .eda_block
            .as_ref()
            .map(|block| self.eda.add_reading(block.mean_intensity()));
        let heart = self.heart.features();
        let packet = self
            .assembler
            .assemble(&reading, &stress, eda.as_ref(), heart.as_ref(), ts);

        let prediction = match self.predictor.predict(&packet) {
            Ok(prediction) => Some(prediction),
            Err(e) => {
                self.counters.prediction_failures += 1;
                warn!(error = %e, ts, "predictor failed, engine not updated");
                None
            }
        };

        let previous = self.engine.state();
        let state = match &prediction {
            Some(p) => self.engine.update(p.to_signal(Some(ts))),
            None => previous,
        };
        let transitioned = state != previous;
        if transitioned {
            self.counters.transitions += 1;
        }

        debug!(
            stress_percent = reading.stress_percent(),
            state = state.as_str(),
            "frame ingested"
        );

        Ok(SessionUpdate {
            packet,
            prediction,
            state,
            smoothed_score: self.engine.score(),
            transitioned,
        })
    }

    pub fn ingest_frame(&mut self, frame: &RawFrame) -> Result<SessionUpdate, DecodeError> {
        self.ingest(&frame.bytes, frame.received_at)
    }

    /// Feed a BLE Heart Rate Measurement notification into the heart window.
    /// The window is sample-count based, so no timestamp is taken; the
    /// features land in the packet of the next ring frame. Returns the heart
    /// features once enough samples are buffered.
    pub fn ingest_heart_rate(&mut self, bytes: &[u8]) -> Result<Option<HeartFeatures>, DecodeError> {
        let measurement = decode_heart_rate(bytes)?;
        self.counters.heart_notifications += 1;
        self.heart.record(&measurement);
        Ok(self.heart.features())
    }

    /// Load baselines, heart window and engine state from JSON
    pub fn load_baselines(&mut self, json: &str) -> Result<(), ComputeError> {
        let snapshot: SessionSnapshot =
            serde_json::from_str(json).map_err(|e| ComputeError::ParseError(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ComputeError::ParseError(format!(
                "unsupported baseline snapshot version: {}",
                snapshot.version
            )));
        }
        self.stress = snapshot.stress;
        self.eda = snapshot.eda;
        self.stress.enforce_capacity();
        self.eda.enforce_capacity();
        self.heart = snapshot.heart;
        self.engine.restore(snapshot.engine);
        Ok(())
    }

    /// Save baselines, heart window and engine state to JSON
    pub fn save_baselines(&self) -> Result<String, ComputeError> {
        let snapshot = SessionSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            stress: self.stress.clone(),
            eda: self.eda.clone(),
            heart: self.heart.clone(),
            engine: self.engine.snapshot(),
        };
        serde_json::to_string(&snapshot).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Channel;
    use pretty_assertions::assert_eq;

    fn stress_frame(stress: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; 20];
        bytes[14] = stress;
        bytes
    }

    fn full_frame(stress: u8, eda: u8) -> Vec<u8> {
        let mut bytes = vec![eda; 92];
        bytes[14] = stress;
        bytes
    }

    fn fast_config() -> UatrConfig {
        UatrConfig::new(1.0, 0.5, 0.7, 0.3, 10.0, 0.1).unwrap()
    }

    #[test]
    fn test_ingest_builds_packet() {
        let mut session = MonitoringSession::new("ring", Some("s-1".to_string()), UatrConfig::default());
        let update = session.ingest(&full_frame(255, 40), Some(100.0)).unwrap();

        assert_eq!(update.packet.timestamp, 100.0);
        assert_eq!(update.packet.get_channel(Channel::StressPercent), Some(100.0));
        assert_eq!(update.packet.get_channel(Channel::EdaMean), Some(40.0));
        assert_eq!(update.prediction.as_ref().map(|p| p.score), Some(1.0));
        assert_eq!(session.stats().full_frames, 1);
    }

    #[test]
    fn test_short_frame_rejected_and_counted() {
        let mut session = MonitoringSession::default();
        let err = session.ingest(&[0u8; 10], Some(1.0)).unwrap_err();
        assert_eq!(err, DecodeError::TooShort { len: 10, min: 15 });
        assert_eq!(session.stats().frames_rejected, 1);
        assert_eq!(session.stats().frames_ingested, 0);
        assert_eq!(session.state(), StressState::Neutral);
    }

    #[test]
    fn test_sustained_stress_transitions_once() {
        let mut session = MonitoringSession::new("ring", None, fast_config());
        let mut transitions = Vec::new();
        for t in 0..30 {
            let update = session.ingest(&stress_frame(255), Some(t as f64)).unwrap();
            if update.transitioned {
                transitions.push((t, update.state));
            }
        }
        assert_eq!(transitions, vec![(10, StressState::Stress)]);
        assert_eq!(session.stats().transitions, 1);
    }

    #[test]
    fn test_heart_features_reach_packet() {
        let mut session = MonitoringSession::default();
        // u8 HR 70 with one RR interval of 1024/1024 s
        let notification = [0x10, 70, 0x00, 0x04];
        let mut features = None;
        for _ in 0..5 {
            features = session.ingest_heart_rate(&notification).unwrap();
        }
        assert!(features.is_some());

        let update = session.ingest(&stress_frame(10), Some(1.0)).unwrap();
        assert_eq!(update.packet.get_channel(Channel::HrBpm), Some(70.0));
        assert_eq!(update.packet.get_channel(Channel::Rmssd), Some(0.0));
        assert_eq!(session.stats().heart_notifications, 5);
    }

    #[test]
    fn test_save_and_load_baselines() {
        let mut session = MonitoringSession::new("ring", None, fast_config());
        for t in 0..15 {
            session.ingest(&full_frame(255, 30), Some(t as f64)).unwrap();
        }
        let saved = session.save_baselines().unwrap();

        let mut restored = MonitoringSession::new("ring", None, fast_config());
        restored.load_baselines(&saved).unwrap();
        assert_eq!(restored.state(), session.state());
        assert_eq!(restored.engine().last_change_time(), 10.0);
        assert!((restored.engine().score() - session.engine().score()).abs() < 1e-9);

        let a = session.ingest(&full_frame(200, 35), Some(15.0)).unwrap();
        let b = restored.ingest(&full_frame(200, 35), Some(15.0)).unwrap();
        assert_eq!(a.state, b.state);
        assert_eq!(a.packet.features.keys().collect::<Vec<_>>(), b.packet.features.keys().collect::<Vec<_>>());
        for (key, value) in &a.packet.features {
            assert!((b.packet.get(key).unwrap() - value).abs() < 1e-9, "{key}");
        }
    }

    #[test]
    fn test_load_trims_oversized_history() {
        let mut session = MonitoringSession::default();
        session.ingest(&stress_frame(50), Some(1.0)).unwrap();
        let mut snapshot: serde_json::Value = serde_json::from_str(&session.save_baselines().unwrap()).unwrap();
        snapshot["stress"]["history"] = serde_json::json!((0..100).map(f64::from).collect::<Vec<f64>>());

        let mut restored = MonitoringSession::default();
        restored.load_baselines(&snapshot.to_string()).unwrap();

        let resaved: serde_json::Value = serde_json::from_str(&restored.save_baselines().unwrap()).unwrap();
        let history = resaved["stress"]["history"].as_array().unwrap();
        assert_eq!(history.len(), 60);
        assert_eq!(history[0], 40.0);
        assert_eq!(history[59], 99.0);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut session = MonitoringSession::default();
        assert!(matches!(
            session.load_baselines("{}").unwrap_err(),
            ComputeError::ParseError(_)
        ));
    }

    struct FailingPredictor;

    impl Predictor for FailingPredictor {
        fn predict(&self, _packet: &SignalPacket) -> Result<Prediction, ComputeError> {
            Err(ComputeError::MissingChannel("rmssd".to_string()))
        }
    }

    #[test]
    fn test_predictor_failure_keeps_state() {
        let mut session = MonitoringSession::default().with_predictor(Box::new(FailingPredictor));
        let update = session.ingest(&stress_frame(255), Some(50.0)).unwrap();
        assert!(update.prediction.is_none());
        assert_eq!(update.state, StressState::Neutral);
        assert_eq!(update.smoothed_score, 0.5);
        assert_eq!(session.stats().prediction_failures, 1);
    }

    #[test]
    fn test_status_reports_identity() {
        let session = MonitoringSession::new("ring", Some("s-2".to_string()), UatrConfig::default());
        let status = session.status();
        assert_eq!(status.session_id, session.session_id());
        assert_eq!(status.subject_id.as_deref(), Some("s-2"));
        assert_eq!(status.engine, StressEngineState::default());
    }
}
