//! # Capture & Analysis Pipeline
//!
//! Owns one live capture session. The capture callback feeds two independent
//! consumers of the same signal:
//!
//! - **Analysis stage**: a lock-free ring drained once per [`CapturePipeline::tick`]
//!   into a rolling window of the latest `buffer_size` samples, which goes
//!   through pitch detection and smoothing.
//! - **Monitor stage**: a lock-free ring drained by an output stream that
//!   plays the raw input back at a shared gain, re-read every audio quantum.

use rtrb::{Consumer, RingBuffer};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::audio::{AudioHost, AudioStream, CaptureConstraints, CpalHost, OutputCallback};
use crate::config::AnalysisConfig;
use crate::error::{Result, TunerError};
use crate::pitch;
use crate::smoothing::PitchSmoother;

/// Samples the analysis ring can hold between ticks (about 1.4 s at 48 kHz).
const ANALYSIS_RING_CAPACITY: usize = 1 << 16;

/// Upper bound on monitor latency, in samples.
const MONITOR_RING_CAPACITY: usize = 4096;

/// Receives the smoothed frequency (or `None`) once per tick.
pub type PitchListener = Box<dyn FnMut(Option<f32>) + 'static>;

/// Monitor gain shared with the output callback.
#[derive(Debug, Clone, Default)]
pub struct MonitorGain(Arc<AtomicU32>);

impl MonitorGain {
    pub fn set(&self, gain: f32) {
        self.0.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Everything that lives for exactly one `start()`..`stop()` span.
struct Session {
    input: Box<dyn AudioStream>,
    monitor: Option<Box<dyn AudioStream>>,
    analysis_rx: Consumer<f32>,
    window: Vec<f32>,
    smoother: PitchSmoother,
    gain: MonitorGain,
    monitoring: bool,
    listener: PitchListener,
    sample_rate: u32,
}

impl Session {
    /// Appends everything captured since the last tick and keeps the newest
    /// `window.len()` samples.
    fn pull_samples(&mut self) {
        let size = self.window.len();
        let available = self.analysis_rx.slots();
        if available == 0 {
            return;
        }
        self.window.reserve(available);
        while let Ok(sample) = self.analysis_rx.pop() {
            self.window.push(sample);
        }
        let excess = self.window.len().saturating_sub(size);
        self.window.drain(..excess);
    }
}

/// Live pitch tracker over an [`AudioHost`].
pub struct CapturePipeline<H: AudioHost = CpalHost> {
    host: H,
    config: AnalysisConfig,
    session: Option<Session>,
}

impl CapturePipeline<CpalHost> {
    pub fn with_cpal(config: AnalysisConfig) -> Self {
        Self::new(CpalHost, config)
    }
}

impl<H: AudioHost> CapturePipeline<H> {
    pub fn new(host: H, config: AnalysisConfig) -> Self {
        Self {
            host,
            config: config.sanitized(),
            session: None,
        }
    }

    /// Acquires the raw input and begins a fresh session.
    ///
    /// Any running session is stopped first. The monitor path starts muted;
    /// if no output can be opened the session runs without one.
    ///
    /// # Errors
    /// * `TunerError::Acquisition` - the input could not be obtained. Nothing
    ///   is retried; calling `start()` again is the retry.
    pub fn start(&mut self, listener: PitchListener) -> Result<()> {
        self.stop();

        let (mut analysis_tx, analysis_rx) = RingBuffer::<f32>::new(ANALYSIS_RING_CAPACITY);
        let (mut monitor_tx, monitor_rx) = RingBuffer::<f32>::new(MONITOR_RING_CAPACITY);

        let input = self.host.acquire_input(
            &CaptureConstraints::RAW,
            Box::new(move |samples: &[f32]| {
                // A full ring drops samples; neither consumer may block capture.
                for &sample in samples {
                    let _ = analysis_tx.push(sample);
                    let _ = monitor_tx.push(sample);
                }
            }),
        );
        let input = match input {
            Ok(input) => input,
            Err(e) => {
                log::error!("Failed to start capture: {e}");
                return Err(e);
            }
        };
        let sample_rate = input.sample_rate();

        let gain = MonitorGain::default();
        let monitor = match self
            .host
            .create_output_path(sample_rate, monitor_render(monitor_rx, gain.clone()))
        {
            Ok(stream) => Some(stream),
            Err(e) => {
                log::warn!("Live monitor unavailable: {e}");
                None
            }
        };

        log::info!(
            "Capture started: {sample_rate} Hz, {}-sample analysis window",
            self.config.buffer_size
        );

        self.session = Some(Session {
            input,
            monitor,
            analysis_rx,
            window: vec![0.0; self.config.buffer_size],
            smoother: PitchSmoother::new(self.config.smoothing_alpha),
            gain,
            monitoring: false,
            listener,
            sample_rate,
        });
        Ok(())
    }

    /// Runs one analysis step and publishes the result to the listener.
    ///
    /// Does nothing when no session is running.
    ///
    /// # Errors
    /// * `TunerError::DeviceLost` - the input vanished; the pipeline has
    ///   already stopped itself
    pub fn tick(&mut self) -> Result<()> {
        let input_alive = match &self.session {
            Some(session) => session.input.is_alive(),
            None => return Ok(()),
        };
        if !input_alive {
            log::warn!("Input device lost; stopping capture");
            self.stop();
            return Err(TunerError::DeviceLost);
        }

        let config = &self.config;
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        session.pull_samples();

        let estimate = pitch::detect_pitch(
            &session.window,
            session.sample_rate,
            config.silence_threshold,
            config.correlation_threshold,
        );
        let published = match config.vocal_range.filter(estimate) {
            Some(frequency) => Some(session.smoother.update(frequency)),
            None => {
                session.smoother.reset();
                None
            }
        };

        (session.listener)(published);
        Ok(())
    }

    /// Unmutes the live monitor. Takes effect at the next audio quantum.
    pub fn enable_monitoring(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(TunerError::NotRunning)?;
        if session.monitor.is_none() {
            return Err(TunerError::MonitorUnavailable);
        }
        session.gain.set(self.config.monitor_gain);
        session.monitoring = true;
        log::info!("Live monitoring on (gain {})", self.config.monitor_gain);
        Ok(())
    }

    /// Mutes the live monitor. Takes effect at the next audio quantum.
    pub fn disable_monitoring(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.gain.set(0.0);
            if session.monitoring {
                log::info!("Live monitoring off");
            }
            session.monitoring = false;
        }
    }

    /// Tears the session down and releases the devices. Safe to call at any
    /// time, any number of times.
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.gain.set(0.0);
        if let Some(mut monitor) = session.monitor.take() {
            monitor.stop();
        }
        session.input.stop();
        log::info!("Capture stopped");
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_monitoring(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.monitoring)
    }

    /// Whether the running session has a monitor output.
    pub fn monitor_available(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.monitor.is_some())
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.sample_rate)
    }

    pub fn smoothed_frequency(&self) -> Option<f32> {
        self.session.as_ref().and_then(|s| s.smoother.value())
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H: AudioHost> Drop for CapturePipeline<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Plays captured samples back at the current monitor gain.
fn monitor_render(mut monitor_rx: Consumer<f32>, gain: MonitorGain) -> OutputCallback {
    Box::new(move |out: &mut [f32]| {
        let level = gain.get();
        for sample in out.iter_mut() {
            *sample = monitor_rx.pop().map_or(0.0, |s| s * level);
        }
    })
}
