//! # Audio Host Module
//!
//! The platform audio capability the rest of the core is written against,
//! plus its CPAL (Cross-Platform Audio Library) implementation.
//!
//! ## Features
//! - Raw mono capture with every processing stage disabled
//! - Output paths rendered by a caller-supplied callback
//! - One worker thread per stream, joined on stop so devices are released
//! - Device-loss detection through the stream error callback

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, SupportedStreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::error::{Result, TunerError};

/// Sample rate requested from input devices when they offer a choice.
pub const PREFERRED_SAMPLE_RATE: u32 = 44_100;

/// Receives captured mono samples on the platform audio thread.
pub type InputCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Fills one quantum of mono output on the platform audio thread.
pub type OutputCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Processing stages requested from the input device.
///
/// Pitch detection needs the raw waveform, so tuner captures ask for all of
/// them to be off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub channel_count: u16,
}

impl CaptureConstraints {
    /// Untouched mono signal.
    pub const RAW: Self = Self {
        echo_cancellation: false,
        noise_suppression: false,
        auto_gain_control: false,
        channel_count: 1,
    };
}

/// A running capture or playback stream.
pub trait AudioStream: Send {
    /// Actual sample rate of the stream in Hz.
    fn sample_rate(&self) -> u32;

    /// `false` once the device has gone away or the stream was stopped.
    fn is_alive(&self) -> bool;

    /// Stops the stream and releases the device. Idempotent.
    fn stop(&mut self);
}

/// Audio source/sink capability provided by the host platform.
pub trait AudioHost {
    /// Opens the live input and starts delivering mono samples to `on_samples`.
    fn acquire_input(
        &mut self,
        constraints: &CaptureConstraints,
        on_samples: InputCallback,
    ) -> Result<Box<dyn AudioStream>>;

    /// Opens an output at `sample_rate` whose samples are produced by `render`.
    fn create_output_path(
        &mut self,
        sample_rate: u32,
        render: OutputCallback,
    ) -> Result<Box<dyn AudioStream>>;

    /// Label of the output device audio would currently play through.
    fn output_device_name(&self) -> Option<String> {
        None
    }
}

/// Guesses from a device label whether output goes to headphones, where live
/// monitoring cannot feed back into the microphone.
pub fn looks_like_headphones(label: &str) -> bool {
    const HINTS: [&str; 7] = [
        "headphone", "headset", "earphone", "earbud", "airpods", "buds", "in-ear",
    ];
    let label = label.to_lowercase();
    HINTS.iter().any(|hint| label.contains(hint))
}

/// [`AudioHost`] backed by the default CPAL host.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalHost;

impl AudioHost for CpalHost {
    fn acquire_input(
        &mut self,
        constraints: &CaptureConstraints,
        on_samples: InputCallback,
    ) -> Result<Box<dyn AudioStream>> {
        let constraints = *constraints;
        let worker = StreamWorker::spawn("capture", TunerError::Acquisition, move |alive| {
            build_input_stream(constraints, on_samples, alive)
        })?;
        Ok(Box::new(worker))
    }

    fn create_output_path(
        &mut self,
        sample_rate: u32,
        render: OutputCallback,
    ) -> Result<Box<dyn AudioStream>> {
        let worker = StreamWorker::spawn("playback", TunerError::Output, move |alive| {
            build_output_stream(sample_rate, render, alive)
        })?;
        Ok(Box::new(worker))
    }

    fn output_device_name(&self) -> Option<String> {
        cpal::default_host()
            .default_output_device()
            .and_then(|device| device.name().ok())
    }
}

/// Owns a `cpal::Stream` on a dedicated thread.
///
/// The thread builds and plays the stream, reports readiness, then parks on
/// the shutdown channel. Stopping pauses and drops the stream on that thread
/// and joins it.
struct StreamWorker {
    shutdown_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
    sample_rate: u32,
    alive: Arc<AtomicBool>,
}

impl StreamWorker {
    fn spawn<F>(label: &'static str, to_error: fn(String) -> TunerError, build: F) -> Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) -> Result<(cpal::Stream, u32)> + Send + 'static,
    {
        let alive = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let worker_alive = Arc::clone(&alive);
        let thread_handle = thread::Builder::new()
            .name(format!("{label}-stream"))
            .spawn(move || {
                let stream = match build(Arc::clone(&worker_alive)) {
                    Ok((stream, sample_rate)) => {
                        let _ = ready_tx.send(Ok(sample_rate));
                        stream
                    }
                    Err(e) => {
                        worker_alive.store(false, Ordering::Release);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Either a shutdown message or the handle being dropped wakes us.
                let _ = shutdown_rx.recv();

                if let Err(e) = stream.pause() {
                    log::warn!("Error pausing {label} stream: {e}");
                }
                drop(stream);
                worker_alive.store(false, Ordering::Release);
                log::debug!("{label} stream released");
            })
            .map_err(|e| to_error(format!("could not spawn {label} thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => Ok(Self {
                shutdown_tx: Some(shutdown_tx),
                thread_handle: Some(thread_handle),
                sample_rate,
                alive,
            }),
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread_handle.join();
                Err(to_error(format!("{label} thread exited before the stream started")))
            }
        }
    }
}

impl AudioStream for StreamWorker {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Audio stream thread panicked during shutdown");
            }
        }
        self.alive.store(false, Ordering::Release);
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Logs stream errors and marks the stream dead when the device disappears.
fn stream_error_handler(
    label: &'static str,
    alive: Arc<AtomicBool>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        log::error!("An error occurred on the {label} stream: {err}");
        if matches!(err, cpal::StreamError::DeviceNotAvailable) {
            alive.store(false, Ordering::Release);
        }
    }
}

fn build_input_stream(
    constraints: CaptureConstraints,
    mut on_samples: InputCallback,
    alive: Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32)> {
    let acquisition = |e: &dyn std::fmt::Display| TunerError::Acquisition(e.to_string());

    // CPAL hands out the device signal as-is; nothing to switch off.
    if constraints.echo_cancellation
        || constraints.noise_suppression
        || constraints.auto_gain_control
    {
        log::warn!("Requested input processing is not available on this host; capturing raw");
    }

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| TunerError::Acquisition("No input device available".into()))?;

    log::info!(
        "Using audio input device: {}",
        device.name().unwrap_or_else(|_| "<unnamed>".into())
    );

    let configs = device
        .supported_input_configs()
        .map_err(|e| acquisition(&e))?
        .collect::<Vec<_>>();
    let supported = find_supported_config(configs, PREFERRED_SAMPLE_RATE, constraints.channel_count)
        .ok_or_else(|| TunerError::Acquisition("No suitable f32 input format found".into()))?;

    let sample_rate = supported.sample_rate().0;
    let channels = usize::from(supported.channels().max(1));
    let config: cpal::StreamConfig = supported.into();

    log::info!("Selected input: {sample_rate} Hz, {channels} channel(s)");

    let mut mono = Vec::with_capacity(4096);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Downmix interleaved frames to mono.
                mono.clear();
                mono.extend(
                    data.chunks(channels)
                        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                );
                on_samples(&mono);
            },
            stream_error_handler("capture", alive),
            None,
        )
        .map_err(|e| acquisition(&e))?;

    stream.play().map_err(|e| acquisition(&e))?;

    Ok((stream, sample_rate))
}

fn build_output_stream(
    sample_rate: u32,
    mut render: OutputCallback,
    alive: Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32)> {
    let output = |e: &dyn std::fmt::Display| TunerError::Output(e.to_string());

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| TunerError::Output("No output device available".into()))?;

    let supported = device
        .supported_output_configs()
        .map_err(|e| output(&e))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.min_sample_rate().0 <= sample_rate && sample_rate <= c.max_sample_rate().0)
        .min_by_key(|c| c.channels())
        .map(|c| c.with_sample_rate(SampleRate(sample_rate)))
        .ok_or_else(|| TunerError::Output(format!("No f32 output format at {sample_rate} Hz")))?;

    let channels = usize::from(supported.channels().max(1));
    let config: cpal::StreamConfig = supported.into();

    log::info!(
        "Opened output on {}: {sample_rate} Hz, {channels} channel(s)",
        device.name().unwrap_or_else(|_| "<unnamed>".into())
    );

    let mut mono: Vec<f32> = Vec::with_capacity(4096);
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                mono.resize(frames, 0.0);
                render(&mut mono);
                for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                    frame.fill(sample);
                }
            },
            stream_error_handler("playback", alive),
            None,
        )
        .map_err(|e| output(&e))?;

    stream.play().map_err(|e| output(&e))?;

    Ok((stream, sample_rate))
}

/// Finds the best supported input configuration.
///
/// Only 32-bit float formats are considered. Configurations with the wanted
/// channel count win, then the one whose range lies closest to
/// `target_rate`. The rate is clamped into the chosen range.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
    channels: u16,
) -> Option<SupportedStreamConfig> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            let in_range =
                c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0;
            let rate_penalty = if in_range { 0 } else { min_diff.min(max_diff) };
            (c.channels() != channels, rate_penalty)
        })
        .map(|c| {
            let rate = target_rate.clamp(c.min_sample_rate().0, c.max_sample_rate().0);
            c.with_sample_rate(SampleRate(rate))
        })
}
