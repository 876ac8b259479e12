//! Error types for ringstress

use thiserror::Error;

/// Errors produced while decoding a single transport payload.
///
/// These are local to one frame: a session logs and drops the frame and keeps
/// going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Packet too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("Invalid hex frame: {0}")]
    InvalidHex(String),
}

/// Rejected engine or mapper configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("evidence_weight must be in (0, 1], got {0}")]
    EvidenceWeight(f64),

    #[error("decay must be in [0, 1), got {0}")]
    Decay(f64),

    #[error("threshold_low ({low}) must be below threshold_high ({high})")]
    Thresholds { low: f64, high: f64 },

    #[error("min_state_seconds must be >= 0, got {0}")]
    MinStateSeconds(f64),

    #[error("change_cost must be >= 0, got {0}")]
    ChangeCost(f64),

    #[error("low_arousal ({low}) must not exceed high_arousal ({high})")]
    ArousalBand { low: f64, high: f64 },

    #[error("queue_capacity must be at least 1")]
    QueueCapacity,
}

/// Errors that can occur outside the per-frame path
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing channel: {0}")]
    MissingChannel(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
