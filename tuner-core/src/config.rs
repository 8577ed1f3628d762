//! # Configuration Module
//!
//! Startup configuration for the analysis pipeline and the metronome, read
//! from a JSON file. Missing fields fall back to defaults; out-of-range
//! values are normalized by [`TunerConfig::sanitized`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::metronome::{self, Meter};
use crate::pitch::{DEFAULT_CORRELATION_THRESHOLD, DEFAULT_SILENCE_THRESHOLD, VocalRange};
use crate::smoothing::DEFAULT_SMOOTHING_ALPHA;

/// File name looked up in the working directory by the GUI.
pub const DEFAULT_CONFIG_FILE: &str = "vocal_tuner.json";

/// Analysis window length in samples.
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

const MIN_BUFFER_SIZE: usize = 64;
const MAX_BUFFER_SIZE: usize = 16_384;

/// Gain applied to the live monitor when it is switched on.
pub const DEFAULT_MONITOR_GAIN: f32 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Samples per analysis buffer; a power of two.
    pub buffer_size: usize,
    pub silence_threshold: f32,
    pub correlation_threshold: f32,
    pub smoothing_alpha: f32,
    pub vocal_range: VocalRange,
    pub monitor_gain: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            correlation_threshold: DEFAULT_CORRELATION_THRESHOLD,
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
            vocal_range: VocalRange::default(),
            monitor_gain: DEFAULT_MONITOR_GAIN,
        }
    }
}

impl AnalysisConfig {
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();

        let buffer_size = self
            .buffer_size
            .clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE)
            .next_power_of_two();

        let vocal_range = {
            let VocalRange { min_hz, max_hz } = self.vocal_range;
            if min_hz.is_finite() && max_hz.is_finite() && min_hz > 0.0 && min_hz < max_hz {
                self.vocal_range
            } else {
                log::warn!("Invalid vocal range {min_hz}..{max_hz} Hz; using default");
                defaults.vocal_range
            }
        };

        let monitor_gain = if self.monitor_gain.is_finite() && self.monitor_gain > 0.0 {
            self.monitor_gain.min(1.0)
        } else {
            defaults.monitor_gain
        };

        Self {
            buffer_size,
            silence_threshold: finite_or(self.silence_threshold, defaults.silence_threshold)
                .clamp(0.0, 1.0),
            correlation_threshold: finite_or(
                self.correlation_threshold,
                defaults.correlation_threshold,
            )
            .clamp(0.0, 1.0),
            smoothing_alpha: finite_or(self.smoothing_alpha, defaults.smoothing_alpha)
                .clamp(f32::EPSILON, 1.0),
            vocal_range,
            monitor_gain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Beats per minute.
    pub tempo: u16,
    /// 4 or 8.
    pub beats_per_cycle: u8,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            tempo: metronome::DEFAULT_TEMPO,
            beats_per_cycle: Meter::default().beats(),
        }
    }
}

impl MetronomeConfig {
    pub fn meter(&self) -> Meter {
        Meter::from_beats(self.beats_per_cycle)
    }

    pub fn sanitized(self) -> Self {
        Self {
            tempo: metronome::clamp_tempo(self.tempo),
            beats_per_cycle: self.meter().beats(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub analysis: AnalysisConfig,
    pub metronome: MetronomeConfig,
}

impl TunerConfig {
    /// Reads and sanitizes a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: TunerConfig = serde_json::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config.sanitized())
    }

    /// Like [`TunerConfig::load`], but a missing or broken file yields defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No config at {}; using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring config: {e:#}");
                Self::default()
            }
        }
    }

    pub fn sanitized(self) -> Self {
        Self {
            analysis: self.analysis.sanitized(),
            metronome: self.metronome.sanitized(),
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "metronome": {{ "tempo": 132 }} }}"#).expect("write");

        let config = TunerConfig::load(file.path()).expect("load");
        assert_eq!(config.metronome.tempo, 132);
        assert_eq!(config.metronome.beats_per_cycle, 4);
        assert_eq!(config.analysis, AnalysisConfig::default());
    }

    #[test]
    fn out_of_range_values_are_normalized() {
        let config = TunerConfig {
            analysis: AnalysisConfig {
                buffer_size: 3000,
                silence_threshold: -1.0,
                correlation_threshold: 2.0,
                smoothing_alpha: f32::NAN,
                vocal_range: VocalRange {
                    min_hz: 900.0,
                    max_hz: 100.0,
                },
                monitor_gain: 0.0,
            },
            metronome: MetronomeConfig {
                tempo: 500,
                beats_per_cycle: 7,
            },
        }
        .sanitized();

        assert_eq!(config.analysis.buffer_size, 4096);
        assert_eq!(config.analysis.silence_threshold, 0.0);
        assert_eq!(config.analysis.correlation_threshold, 1.0);
        assert_eq!(config.analysis.smoothing_alpha, DEFAULT_SMOOTHING_ALPHA);
        assert_eq!(config.analysis.vocal_range, VocalRange::default());
        assert_eq!(config.analysis.monitor_gain, DEFAULT_MONITOR_GAIN);
        assert_eq!(config.metronome.tempo, metronome::MAX_TEMPO);
        assert_eq!(config.metronome.beats_per_cycle, 8);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = TunerConfig::load_or_default(dir.path().join("absent.json"));
        assert_eq!(config, TunerConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not json").expect("write");
        assert!(TunerConfig::load(file.path()).is_err());
        assert_eq!(TunerConfig::load_or_default(file.path()), TunerConfig::default());
    }
}
