//! # Reference Tone Module
//!
//! Plays a steady sine at a target note so a singer can match it.

use std::f32::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::audio::{AudioHost, AudioStream, OutputCallback};
use crate::error::{Result, TunerError};

/// Output level of the tone.
pub const TONE_LEVEL: f32 = 0.2;

/// Output rates tried in order.
const TONE_SAMPLE_RATES: [u32; 2] = [48_000, 44_100];

/// A retunable sine played through the host's output path.
#[derive(Default)]
pub struct ReferenceTone {
    stream: Option<Box<dyn AudioStream>>,
    frequency: Arc<AtomicU32>,
}

impl ReferenceTone {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the tone, or retunes it if it is already sounding.
    pub fn play<H: AudioHost>(&mut self, host: &mut H, frequency: f32) -> Result<()> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(TunerError::Output(format!("invalid tone frequency {frequency}")));
        }
        self.frequency.store(frequency.to_bits(), Ordering::Relaxed);

        if self.is_playing() {
            return Ok(());
        }
        self.stop();

        let mut last_error = TunerError::Output("no output sample rate tried".into());
        for sample_rate in TONE_SAMPLE_RATES {
            let render = sine_render(sample_rate, self.frequency.clone());
            match host.create_output_path(sample_rate, render) {
                Ok(stream) => {
                    log::info!("Reference tone at {frequency:.2} Hz");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => last_error = e,
            }
        }
        log::warn!("Reference tone unavailable: {last_error}");
        Err(last_error)
    }

    pub fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_alive())
    }

    pub fn frequency(&self) -> f32 {
        f32::from_bits(self.frequency.load(Ordering::Relaxed))
    }
}

impl Drop for ReferenceTone {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sine_render(sample_rate: u32, frequency: Arc<AtomicU32>) -> OutputCallback {
    let mut phase = 0.0_f32;
    Box::new(move |out: &mut [f32]| {
        let step = TAU * f32::from_bits(frequency.load(Ordering::Relaxed)) / sample_rate as f32;
        for sample in out.iter_mut() {
            *sample = TONE_LEVEL * phase.sin();
            phase = (phase + step) % TAU;
        }
    })
}
