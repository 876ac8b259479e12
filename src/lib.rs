//! ringstress - on-device stress state engine for wearable ring biosignals
//!
//! Raw ring notifications flow through a deterministic pipeline: payload
//! decoding → per-channel baseline tracking → signal packet assembly →
//! prediction → hysteretic state smoothing. The resulting stress state can
//! drive a difficulty controller or be written to sinks.
//!
//! ## Modules
//!
//! - **Decoding**: `decoder` (ring payloads), `heart` (BLE heart-rate payloads)
//! - **Signal processing**: `baseline`, `packet`, `predictor`, `engine`
//! - **Consumers**: `difficulty`, `sink`
//! - **Runtime**: `session`, `queue`, `config`, `ffi`

pub mod baseline;
pub mod config;
pub mod decoder;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod heart;
pub mod packet;
pub mod predictor;
pub mod queue;
pub mod session;
pub mod sink;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use baseline::{analyze_session, BaselineTracker, ChannelStats, SessionStats};
pub use config::MonitorConfig;
pub use decoder::{PacketDecoder, PhysioReading, RawFrame};
pub use difficulty::{AdaptiveState, DifficultyMapper, DifficultyProfile};
pub use engine::{StressSignal, StressState, StressStateEngine, UatrConfig};
pub use error::{ComputeError, ConfigError, DecodeError};
pub use packet::{Channel, SignalPacket};
pub use predictor::{DeviceStressPredictor, Prediction, Predictor};
pub use session::{MonitoringSession, SessionUpdate};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name used in logs and reports
pub const PRODUCER_NAME: &str = "ringstress";
