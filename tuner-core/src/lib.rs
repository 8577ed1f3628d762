// tuner-core/src/lib.rs

//! The core logic for the vocal tuner.
//! This crate is responsible for live capture, pitch detection, smoothing,
//! note naming and the visual metronome's beat scheduling. It is completely
//! headless and contains no GUI code.

pub mod audio;
pub mod config;
pub mod error;
pub mod metronome;
pub mod pipeline;
pub mod pitch;
pub mod smoothing;
pub mod tone;
pub mod tuning;

pub use audio::{AudioHost, AudioStream, CaptureConstraints, CpalHost};
pub use config::{AnalysisConfig, MetronomeConfig, TunerConfig};
pub use error::TunerError;
pub use metronome::{BeatScheduler, Meter, Metronome, MetronomeStatus, SchedulerState};
pub use pipeline::CapturePipeline;
pub use tuning::NoteReading;
