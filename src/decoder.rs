//! Ring payload decoding
//!
//! Each transport notification carries one fixed-offset payload:
//!
//! | Offset | Length | Field                                   |
//! |--------|--------|-----------------------------------------|
//! | 0-13   | 14     | Header / counter (opaque)               |
//! | 14     | 1      | Stress, `u8` scaled 0-255 to 0-100 %    |
//! | 15-91  | 77     | EDA intensity block, raw `u8` samples   |
//!
//! Frames of 15 to 91 bytes are keep-alive frames that only carry the stress
//! byte. The header and the internal layout of the EDA block are not decoded.

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

/// Offset of the stress byte
pub const STRESS_OFFSET: usize = 14;

/// First byte of the EDA block
pub const EDA_START: usize = 15;

/// One past the last byte of the EDA block
pub const EDA_END: usize = 92;

/// Number of bytes in the EDA block
pub const EDA_BLOCK_LEN: usize = EDA_END - EDA_START;

/// Shortest frame that still carries the stress byte
pub const MIN_STRESS_FRAME_LEN: usize = STRESS_OFFSET + 1;

/// Shortest frame that carries the full EDA block
pub const FULL_FRAME_LEN: usize = EDA_END;

/// The 77 raw EDA intensity bytes of a full frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdaBlock([u8; EDA_BLOCK_LEN]);

impl EdaBlock {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Mean of the raw intensity bytes, used as the aggregated EDA channel
    pub fn mean_intensity(&self) -> f64 {
        let sum: u32 = self.0.iter().map(|&b| u32::from(b)).sum();
        f64::from(sum) / EDA_BLOCK_LEN as f64
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Which layout a frame was decoded with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// 15-91 bytes: stress byte only
    StressOnly,
    /// 92 bytes or more: stress byte plus EDA block
    Full,
}

/// Decoded physiological reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysioReading {
    /// Device stress value (0-255)
    pub stress_raw: u8,
    /// EDA block, present only for full frames
    pub eda_block: Option<EdaBlock>,
}

impl PhysioReading {
    /// Stress scaled linearly to 0-100 %
    pub fn stress_percent(&self) -> f64 {
        f64::from(self.stress_raw) / 255.0 * 100.0
    }

    pub fn frame_kind(&self) -> FrameKind {
        match self.eda_block {
            Some(_) => FrameKind::Full,
            None => FrameKind::StressOnly,
        }
    }

    pub fn summary(&self) -> ReadingSummary {
        ReadingSummary {
            frame_kind: self.frame_kind(),
            stress_raw: self.stress_raw,
            stress_percent: self.stress_percent(),
            eda_mean: self.eda_block.as_ref().map(EdaBlock::mean_intensity),
            eda_hex: self.eda_block.as_ref().map(EdaBlock::to_hex),
        }
    }
}

/// JSON view of a decoded reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSummary {
    pub frame_kind: FrameKind,
    pub stress_raw: u8,
    pub stress_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eda_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eda_hex: Option<String>,
}

/// Stateless decoder for ring payloads
pub struct PacketDecoder;

impl PacketDecoder {
    /// Decode one payload. Never panics, whatever the input length.
    pub fn decode(bytes: &[u8]) -> Result<PhysioReading, DecodeError> {
        let stress_raw = *bytes.get(STRESS_OFFSET).ok_or(DecodeError::TooShort {
            len: bytes.len(),
            min: MIN_STRESS_FRAME_LEN,
        })?;

        let eda_block = bytes
            .get(EDA_START..EDA_END)
            .and_then(|slice| <[u8; EDA_BLOCK_LEN]>::try_from(slice).ok())
            .map(EdaBlock);

        Ok(PhysioReading {
            stress_raw,
            eda_block,
        })
    }
}

/// A payload as handed over by the transport, before decoding
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Arrival time (unix seconds); `None` means "stamp on ingest"
    pub received_at: Option<f64>,
    pub bytes: Vec<u8>,
}

impl RawFrame {
    pub fn new(bytes: Vec<u8>, received_at: Option<f64>) -> Self {
        Self { received_at, bytes }
    }

    /// Parse a hex dump such as the `full_packet_hex` column of a capture log.
    /// Whitespace and a single optional `0x`/`0X` prefix are ignored.
    pub fn from_hex(text: &str, received_at: Option<f64>) -> Result<Self, DecodeError> {
        let trimmed = text.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let cleaned: String = body
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = hex::decode(&cleaned).map_err(|e| DecodeError::InvalidHex(e.to_string()))?;
        Ok(Self { received_at, bytes })
    }

    pub fn decode(&self) -> Result<PhysioReading, DecodeError> {
        PacketDecoder::decode(&self.bytes)
    }
}
