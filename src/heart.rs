//! Heart-rate producer
//!
//! Decodes the standard BLE Heart Rate Measurement payload and keeps the
//! short HR / RR windows needed for an RMSSD feature. RR input arrives either
//! as one interval or as a batch; the [`Signal`] variant is chosen once, at the
//! decoding boundary.

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

/// Flag bit: heart rate is a little-endian u16 instead of a u8
const FLAG_HR_U16: u8 = 0x01;
/// Flag bit: a 2-byte energy expended field follows the heart rate
const FLAG_ENERGY: u8 = 0x08;
/// Flag bit: RR intervals follow
const FLAG_RR: u8 = 0x10;

/// RR interval resolution in the payload (1/1024 s)
const RR_UNITS_PER_SECOND: f64 = 1024.0;

/// Trim the HR list to `HR_KEEP` once it grows past `HR_LIMIT`
const HR_LIMIT: usize = 50;
const HR_KEEP: usize = 30;
/// Trim the RR list to `RR_KEEP` once it grows past `RR_LIMIT`
const RR_LIMIT: usize = 100;
const RR_KEEP: usize = 50;

/// RR intervals used for RMSSD
const RMSSD_WINDOW: usize = 20;
/// HR samples averaged for the HR feature
const HR_AVERAGE_WINDOW: usize = 10;
/// Minimum samples before features are produced
const MIN_HR_SAMPLES: usize = 5;
const MIN_RR_SAMPLES: usize = 3;

/// A scalar reading or a batch of readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Signal {
    Scalar(f64),
    Series(Vec<f64>),
}

impl Signal {
    pub fn values(&self) -> &[f64] {
        match self {
            Signal::Scalar(v) => std::slice::from_ref(v),
            Signal::Series(values) => values,
        }
    }
}

/// One decoded Heart Rate Measurement notification
#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateMeasurement {
    pub bpm: u16,
    pub energy_expended: Option<u16>,
    pub rr_intervals_ms: Vec<f64>,
}

impl HeartRateMeasurement {
    /// RR intervals of this notification, if any
    pub fn rr_signal(&self) -> Option<Signal> {
        match self.rr_intervals_ms.as_slice() {
            [] => None,
            [single] => Some(Signal::Scalar(*single)),
            many => Some(Signal::Series(many.to_vec())),
        }
    }
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let pair = bytes.get(at..at + 2)?;
    Some(u16::from_le_bytes([pair[0], pair[1]]))
}

/// Decode a Heart Rate Measurement payload
pub fn decode_heart_rate(bytes: &[u8]) -> Result<HeartRateMeasurement, DecodeError> {
    let flags = *bytes
        .first()
        .ok_or(DecodeError::TooShort { len: 0, min: 2 })?;
    let hr_len = if flags & FLAG_HR_U16 != 0 { 2 } else { 1 };
    let too_short = |min: usize| DecodeError::TooShort {
        len: bytes.len(),
        min,
    };

    let bpm = if hr_len == 2 {
        read_u16(bytes, 1).ok_or_else(|| too_short(3))?
    } else {
        u16::from(*bytes.get(1).ok_or_else(|| too_short(2))?)
    };

    let mut offset = 1 + hr_len;
    let energy_expended = if flags & FLAG_ENERGY != 0 {
        let value = read_u16(bytes, offset).ok_or_else(|| too_short(offset + 2))?;
        offset += 2;
        Some(value)
    } else {
        None
    };

    let rr_intervals_ms = if flags & FLAG_RR != 0 {
        bytes[offset..]
            .chunks_exact(2)
            .map(|pair| f64::from(u16::from_le_bytes([pair[0], pair[1]])) / RR_UNITS_PER_SECOND * 1000.0)
            .collect()
    } else {
        Vec::new()
    };

    Ok(HeartRateMeasurement {
        bpm,
        energy_expended,
        rr_intervals_ms,
    })
}

/// Root mean square of successive differences, ignoring non-positive intervals
pub fn rmssd(rr_intervals_ms: &[f64]) -> Option<f64> {
    let valid: Vec<f64> = rr_intervals_ms.iter().copied().filter(|&rr| rr > 0.0).collect();
    if valid.len() < 2 {
        return None;
    }
    let sum_sq: f64 = valid.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    Some((sum_sq / (valid.len() - 1) as f64).sqrt())
}

/// Heart features ready for a packet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartFeatures {
    pub hr_bpm: f64,
    pub rmssd: f64,
}

/// Short rolling window of HR and RR samples
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartWindow {
    hr: Vec<f64>,
    rr: Vec<f64>,
}

impl HeartWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_hr(&mut self, bpm: f64) {
        self.hr.push(bpm);
        if self.hr.len() > HR_LIMIT {
            self.hr.drain(..self.hr.len() - HR_KEEP);
        }
    }

    pub fn push_rr(&mut self, rr: &Signal) {
        self.rr.extend_from_slice(rr.values());
        if self.rr.len() > RR_LIMIT {
            self.rr.drain(..self.rr.len() - RR_KEEP);
        }
    }

    /// Record a decoded notification
    pub fn record(&mut self, measurement: &HeartRateMeasurement) {
        self.push_hr(f64::from(measurement.bpm));
        if let Some(rr) = measurement.rr_signal() {
            self.push_rr(&rr);
        }
    }

    pub fn hr_average(&self) -> Option<f64> {
        if self.hr.is_empty() {
            return None;
        }
        let recent = &self.hr[self.hr.len().saturating_sub(HR_AVERAGE_WINDOW)..];
        Some(recent.iter().sum::<f64>() / recent.len() as f64)
    }

    pub fn rmssd(&self) -> Option<f64> {
        rmssd(&self.rr[self.rr.len().saturating_sub(RMSSD_WINDOW)..])
    }

    /// HR average and RMSSD, once enough samples have been seen
    pub fn features(&self) -> Option<HeartFeatures> {
        if self.hr.len() < MIN_HR_SAMPLES || self.rr.len() < MIN_RR_SAMPLES {
            return None;
        }
        Some(HeartFeatures {
            hr_bpm: self.hr_average()?,
            rmssd: self.rmssd()?,
        })
    }

    pub fn hr_len(&self) -> usize {
        self.hr.len()
    }

    pub fn rr_len(&self) -> usize {
        self.rr.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_u8_heart_rate() {
        let m = decode_heart_rate(&[0x00, 72]).unwrap();
        assert_eq!(m.bpm, 72);
        assert!(m.rr_intervals_ms.is_empty());
        assert!(m.rr_signal().is_none());
    }

    #[test]
    fn test_decode_u16_heart_rate() {
        let m = decode_heart_rate(&[0x01, 0x2C, 0x01]).unwrap();
        assert_eq!(m.bpm, 300);
    }

    #[test]
    fn test_decode_rr_intervals() {
        // 1024 -> 1000 ms, 512 -> 500 ms
        let m = decode_heart_rate(&[0x10, 60, 0x00, 0x04, 0x00, 0x02]).unwrap();
        assert_eq!(m.bpm, 60);
        assert_eq!(m.rr_intervals_ms, vec![1000.0, 500.0]);
        assert_eq!(m.rr_signal(), Some(Signal::Series(vec![1000.0, 500.0])));
    }

    #[test]
    fn test_decode_energy_then_rr() {
        let m = decode_heart_rate(&[0x18, 80, 0x10, 0x00, 0x00, 0x04]).unwrap();
        assert_eq!(m.energy_expended, Some(16));
        assert_eq!(m.rr_signal(), Some(Signal::Scalar(1000.0)));
    }

    #[test]
    fn test_decode_truncated() {
        assert!(decode_heart_rate(&[]).is_err());
        assert!(decode_heart_rate(&[0x00]).is_err());
        assert!(decode_heart_rate(&[0x01, 0x50]).is_err());
        assert!(decode_heart_rate(&[0x08, 70, 0x01]).is_err());
    }

    #[test]
    fn test_rmssd_known_series() {
        // diffs 10, -20, 10 -> mean square 200
        let value = rmssd(&[800.0, 810.0, 790.0, 800.0]).unwrap();
        assert!((value - 200.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_rmssd_filters_invalid() {
        assert!(rmssd(&[800.0]).is_none());
        assert!(rmssd(&[800.0, 0.0, -5.0]).is_none());
        assert_eq!(rmssd(&[800.0, 0.0, 820.0]), Some(20.0));
    }

    #[test]
    fn test_window_features_require_samples() {
        let mut window = HeartWindow::new();
        for bpm in [70.0, 72.0, 74.0, 76.0] {
            window.push_hr(bpm);
        }
        window.push_rr(&Signal::Series(vec![800.0, 810.0, 790.0]));
        assert!(window.features().is_none());

        window.push_hr(78.0);
        let features = window.features().unwrap();
        assert!((features.hr_bpm - 74.0).abs() < 1e-9);
        assert!((features.rmssd - 250.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_window_trims() {
        let mut window = HeartWindow::new();
        for i in 0..51 {
            window.push_hr(i as f64);
        }
        assert_eq!(window.hr_len(), 30);

        for _ in 0..101 {
            window.push_rr(&Signal::Scalar(800.0));
        }
        assert_eq!(window.rr_len(), 50);
    }
}
