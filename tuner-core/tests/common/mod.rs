//! Scripted audio host for driving the core without hardware.

#![allow(dead_code)]

use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use vocal_tuner_core::TunerError;
use vocal_tuner_core::audio::{
    AudioHost, AudioStream, CaptureConstraints, InputCallback, OutputCallback,
};

#[derive(Default)]
struct Inner {
    input: Option<InputCallback>,
    outputs: Vec<OutputCallback>,
    input_alive: Option<Arc<AtomicBool>>,
    last_constraints: Option<CaptureConstraints>,
    open_streams: usize,
    inputs_acquired: usize,
    fail_input: bool,
    fail_output: bool,
}

/// Host whose input is fed by the test and whose outputs are rendered on demand.
#[derive(Clone)]
pub struct FakeHost {
    inner: Arc<Mutex<Inner>>,
    sample_rate: u32,
}

impl FakeHost {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            sample_rate,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("fake host lock")
    }

    /// Pushes samples through the capture callback, as the audio thread would.
    pub fn feed(&self, samples: &[f32]) {
        if let Some(callback) = self.lock().input.as_mut() {
            callback(samples);
        }
    }

    /// Pulls `frames` samples from the most recently opened output.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![f32::NAN; frames];
        if let Some(callback) = self.lock().outputs.last_mut() {
            callback(&mut out);
        }
        out
    }

    /// Simulates the input device disappearing.
    pub fn lose_input(&self) {
        if let Some(alive) = self.lock().input_alive.as_ref() {
            alive.store(false, Ordering::Release);
        }
    }

    pub fn set_fail_input(&self, fail: bool) {
        self.lock().fail_input = fail;
    }

    pub fn set_fail_output(&self, fail: bool) {
        self.lock().fail_output = fail;
    }

    pub fn open_streams(&self) -> usize {
        self.lock().open_streams
    }

    pub fn inputs_acquired(&self) -> usize {
        self.lock().inputs_acquired
    }

    pub fn outputs_opened(&self) -> usize {
        self.lock().outputs.len()
    }

    pub fn last_constraints(&self) -> Option<CaptureConstraints> {
        self.lock().last_constraints
    }
}

impl AudioHost for FakeHost {
    fn acquire_input(
        &mut self,
        constraints: &CaptureConstraints,
        on_samples: InputCallback,
    ) -> Result<Box<dyn AudioStream>, TunerError> {
        let mut inner = self.lock();
        if inner.fail_input {
            return Err(TunerError::Acquisition("permission denied".into()));
        }
        let alive = Arc::new(AtomicBool::new(true));
        inner.input = Some(on_samples);
        inner.input_alive = Some(Arc::clone(&alive));
        inner.last_constraints = Some(*constraints);
        inner.open_streams += 1;
        inner.inputs_acquired += 1;
        Ok(Box::new(FakeStream {
            inner: Arc::clone(&self.inner),
            sample_rate: self.sample_rate,
            alive,
            is_input: true,
            released: false,
        }))
    }

    fn create_output_path(
        &mut self,
        sample_rate: u32,
        render: OutputCallback,
    ) -> Result<Box<dyn AudioStream>, TunerError> {
        let mut inner = self.lock();
        if inner.fail_output {
            return Err(TunerError::Output("no output device".into()));
        }
        inner.outputs.push(render);
        inner.open_streams += 1;
        Ok(Box::new(FakeStream {
            inner: Arc::clone(&self.inner),
            sample_rate,
            alive: Arc::new(AtomicBool::new(true)),
            is_input: false,
            released: false,
        }))
    }

    fn output_device_name(&self) -> Option<String> {
        Some("Fake Headphones".into())
    }
}

struct FakeStream {
    inner: Arc<Mutex<Inner>>,
    sample_rate: u32,
    alive: Arc<AtomicBool>,
    is_input: bool,
    released: bool,
}

impl AudioStream for FakeStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_alive(&self) -> bool {
        !self.released && self.alive.load(Ordering::Acquire)
    }

    fn stop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.alive.store(false, Ordering::Release);
        let mut inner = self.inner.lock().expect("fake host lock");
        inner.open_streams -= 1;
        if self.is_input {
            inner.input = None;
        }
    }
}

pub fn sine(freq: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
        .collect()
}

pub fn assert_close(actual: f32, expected: f32, tolerance: f32) {
    assert!(
        (actual - expected).abs() / expected < tolerance,
        "expected ~{expected}, got {actual}"
    );
}
