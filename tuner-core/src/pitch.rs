//! # Pitch Detection Module
//!
//! Time-domain autocorrelation pitch detection tuned for the singing voice.
//!
//! ## Features
//! - RMS noise gate as a fast path for silence
//! - Normalized average-magnitude self-similarity per lag
//! - First-peak selection to avoid octave-down errors
//! - Caller-side vocal range policy kept separate from the estimator

use serde::{Deserialize, Serialize};

/// RMS level below which a buffer is treated as room noise.
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 0.01;

/// Similarity a lag must exceed before it can be picked as the period.
pub const DEFAULT_CORRELATION_THRESHOLD: f32 = 0.9;

/// Root-mean-square amplitude of a buffer. Empty buffers have zero energy.
pub fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// Detects the fundamental frequency of a buffer by autocorrelation.
///
/// For every lag in `1..N/2` the buffer is compared with itself shifted by
/// that lag over the first `N/2` samples. The average absolute difference is
/// turned into a similarity in `[0, 1]` (1 = perfect self-match). A lag
/// qualifies when its similarity is above `correlation_threshold` and rising
/// over the previous lag; the best lag of the first rising run wins and the
/// scan stops as soon as that run ends.
///
/// # Arguments
/// * `signal` - Time-domain samples, typically a power-of-two length
/// * `sample_rate` - Sample rate in Hz
/// * `silence_threshold` - Minimum RMS for analysis to run
/// * `correlation_threshold` - Minimum similarity for a candidate lag
///
/// # Returns
/// * `Some(frequency)` - Detected frequency in Hz
/// * `None` - Silence, unvoiced input or no clear period
pub fn detect_pitch(
    signal: &[f32],
    sample_rate: u32,
    silence_threshold: f32,
    correlation_threshold: f32,
) -> Option<f32> {
    let max_lag = signal.len() / 2;
    if max_lag < 2 {
        return None;
    }

    // --- Noise gate ---
    if rms(signal) < silence_threshold {
        return None;
    }

    let window = &signal[..max_lag];
    let mut best_lag: Option<usize> = None;
    let mut best_similarity = 0.0;
    let mut previous_similarity = 1.0;
    let mut found_peak = false;

    for lag in 1..max_lag {
        let shifted = &signal[lag..lag + max_lag];
        let distance: f32 = window
            .iter()
            .zip(shifted)
            .map(|(a, b)| (a - b).abs())
            .sum();
        let similarity = 1.0 - distance / max_lag as f32;

        if similarity > correlation_threshold && similarity > previous_similarity {
            found_peak = true;
            if similarity > best_similarity {
                best_similarity = similarity;
                best_lag = Some(lag);
            }
        } else if found_peak {
            // Past the first peak; later peaks are sub-harmonics.
            break;
        }
        previous_similarity = similarity;
    }

    let frequency = sample_rate as f32 / best_lag? as f32;
    if frequency.is_finite() && frequency > 0.0 {
        Some(frequency)
    } else {
        None
    }
}

/// Plausible range of sung fundamentals, applied by callers of
/// [`detect_pitch`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocalRange {
    pub min_hz: f32,
    pub max_hz: f32,
}

impl Default for VocalRange {
    fn default() -> Self {
        Self {
            min_hz: 80.0,
            max_hz: 1000.0,
        }
    }
}

impl VocalRange {
    pub fn contains(&self, frequency: f32) -> bool {
        frequency >= self.min_hz && frequency <= self.max_hz
    }

    /// Drops estimates outside the range.
    pub fn filter(&self, estimate: Option<f32>) -> Option<f32> {
        estimate.filter(|&f| self.contains(f))
    }
}
