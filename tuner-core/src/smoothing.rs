//! # Smoothing Module
//!
//! First-order low-pass over successive pitch estimates. It steadies the
//! displayed pitch between analysis frames while still following glides.

/// Default smoothing coefficient.
pub const DEFAULT_SMOOTHING_ALPHA: f32 = 0.25;

/// Exponential moving average of frequency estimates.
///
/// Small `alpha` smooths heavily and lags; `alpha` near 1 tracks almost
/// instantly.
#[derive(Debug, Clone)]
pub struct PitchSmoother {
    alpha: f32,
    value: Option<f32>,
}

impl Default for PitchSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_ALPHA)
    }
}

impl PitchSmoother {
    /// Creates an unset smoother. `alpha` is clamped into `(0, 1]`.
    pub fn new(alpha: f32) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(f32::EPSILON, 1.0)
        } else {
            DEFAULT_SMOOTHING_ALPHA
        };
        Self { alpha, value: None }
    }

    /// Folds a new estimate in and returns the smoothed value.
    pub fn update(&mut self, estimate: f32) -> f32 {
        let next = match self.value {
            None => estimate,
            Some(previous) => previous * (1.0 - self.alpha) + estimate * self.alpha,
        };
        self.value = Some(next);
        next
    }

    /// Forgets the running value so silence is never averaged with a stale pitch.
    pub fn reset(&mut self) {
        self.value = None;
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}
