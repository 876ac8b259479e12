//! Baseline tracking
//!
//! Splits a channel into a slow tonic baseline (exponential moving average)
//! and the phasic deviation from it, and flags rising peaks over a bounded
//! history window.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// EMA weight of a new sample
pub const BASELINE_ALPHA: f64 = 0.02;

/// Number of samples kept in the history window (one minute at 1 Hz)
pub const HISTORY_CAPACITY: usize = 60;

/// Samples used for the `_recent` statistics
pub const RECENT_WINDOW: usize = 10;

/// Minimum phasic rise for a peak
pub const MIN_PEAK_HEIGHT: f64 = 0.1;

/// A peak must keep at least this share of the previous rise
pub const PEAK_SUSTAIN_RATIO: f64 = 0.8;

/// Per-sample output of [`BaselineTracker::add_reading`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub current: f64,
    /// Tonic component after this sample
    pub baseline: f64,
    /// `current - baseline`
    pub phasic: f64,
    pub is_peak: bool,
    pub min_recent: f64,
    pub max_recent: f64,
    pub avg_recent: f64,
    pub history_len: usize,
}

/// Online baseline tracker for a single channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineTracker {
    baseline: Option<f64>,
    history: VecDeque<f64>,
}

impl BaselineTracker {
    pub fn new() -> Self {
        Self {
            baseline: None,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Current baseline, `None` before the first sample
    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }

    /// Add a sample, update the baseline and report the channel state
    pub fn add_reading(&mut self, value: f64) -> ChannelStats {
        // The rise of the previous sample is judged against the baseline it
        // was measured under, not the one this sample is about to produce.
        let previous_phasic = match (self.history.back(), self.baseline) {
            (Some(&previous), Some(before)) => Some(previous - before),
            _ => None,
        };

        self.history.push_back(value);
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }

        let baseline = match self.baseline {
            None => value,
            Some(b) => BASELINE_ALPHA * value + (1.0 - BASELINE_ALPHA) * b,
        };
        self.baseline = Some(baseline);

        let phasic = value - baseline;
        let is_peak = match previous_phasic {
            Some(prev) => phasic > MIN_PEAK_HEIGHT && phasic >= prev * PEAK_SUSTAIN_RATIO,
            None => false,
        };

        let window = self.history.len().min(RECENT_WINDOW);
        let recent = self.history.iter().skip(self.history.len() - window);
        let (min_recent, max_recent, sum) = recent.fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(lo, hi, sum), &v| (lo.min(v), hi.max(v), sum + v),
        );

        ChannelStats {
            current: value,
            baseline,
            phasic,
            is_peak,
            min_recent,
            max_recent,
            avg_recent: sum / window as f64,
            history_len: self.history.len(),
        }
    }

    /// Forget the baseline and history
    pub fn clear(&mut self) {
        self.baseline = None;
        self.history.clear();
    }

    /// Load tracker state from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut tracker: Self = serde_json::from_str(json)?;
        tracker.enforce_capacity();
        Ok(tracker)
    }

    /// Drop the oldest entries of a history restored from outside
    pub(crate) fn enforce_capacity(&mut self) {
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
    }

    /// Serialize tracker state to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Summary of a recorded session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub duration_seconds: f64,
    pub reading_count: usize,
    pub min_value: f64,
    pub max_value: f64,
    pub mean_value: f64,
    pub std_dev: f64,
    pub range: f64,
    pub peak_count: usize,
    pub peaks_per_minute: f64,
}

/// Analyze a stored session of `(unix seconds, value)` pairs.
///
/// Returns `None` for an empty session. Peaks are entries into the region
/// above `mean + stddev` (population stddev).
pub fn analyze_session(readings: &[(f64, f64)]) -> Option<SessionStats> {
    let (first, last) = (readings.first()?, readings.last()?);
    let n = readings.len() as f64;

    let (min_value, max_value, sum) = readings.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, 0.0),
        |(lo, hi, sum), &(_, v)| (lo.min(v), hi.max(v), sum + v),
    );
    let mean_value = sum / n;
    let variance = readings
        .iter()
        .map(|&(_, v)| (v - mean_value).powi(2))
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();
    let threshold = mean_value + std_dev;

    let mut peak_count = 0;
    let mut above = false;
    for &(_, v) in readings {
        if v > threshold {
            if !above {
                peak_count += 1;
            }
            above = true;
        } else {
            above = false;
        }
    }

    let duration_seconds = last.0 - first.0;
    let peaks_per_minute = if duration_seconds > 0.0 {
        peak_count as f64 / duration_seconds * 60.0
    } else {
        0.0
    };

    Some(SessionStats {
        duration_seconds,
        reading_count: readings.len(),
        min_value,
        max_value,
        mean_value,
        std_dev,
        range: max_value - min_value,
        peak_count,
        peaks_per_minute,
    })
}

impl BaselineTracker {
    /// Session analysis over an arbitrary recording (not this tracker's history)
    pub fn analyze_session(readings: &[(f64, f64)]) -> Option<SessionStats> {
        analyze_session(readings)
    }
}

/// How often the signal produced peaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reactivity {
    Low,
    Moderate,
    High,
}

/// Spread between the lowest and highest value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicRange {
    Small,
    Large,
}

/// Coarse reading of a session's statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInterpretation {
    pub reactivity: Reactivity,
    pub dynamic_range: DynamicRange,
}

impl SessionStats {
    pub fn interpret(&self) -> SessionInterpretation {
        let reactivity = if self.peaks_per_minute > 5.0 {
            Reactivity::High
        } else if self.peaks_per_minute > 2.0 {
            Reactivity::Moderate
        } else {
            Reactivity::Low
        };
        let dynamic_range = if self.range > 50.0 {
            DynamicRange::Large
        } else {
            DynamicRange::Small
        };
        SessionInterpretation {
            reactivity,
            dynamic_range,
        }
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interpretation = self.interpret();
        writeln!(f, "Duration: {:.0}s", self.duration_seconds)?;
        writeln!(f, "Readings: {}", self.reading_count)?;
        writeln!(f, "Range: {:.1} - {:.1}", self.min_value, self.max_value)?;
        writeln!(f, "Mean: {:.1}", self.mean_value)?;
        writeln!(f, "Peak count: {}", self.peak_count)?;
        writeln!(f, "Peaks/min: {:.1}", self.peaks_per_minute)?;
        let reactivity = match interpretation.reactivity {
            Reactivity::High => "HIGH reactivity (frequent peaks)",
            Reactivity::Moderate => "MODERATE reactivity",
            Reactivity::Low => "LOW reactivity (few peaks)",
        };
        let range = match interpretation.dynamic_range {
            DynamicRange::Large => "LARGE dynamic range (high variation)",
            DynamicRange::Small => "SMALL dynamic range (more stable)",
        };
        writeln!(f, "-> {reactivity}")?;
        write!(f, "-> {range}")
    }
}
