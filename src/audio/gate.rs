//! RMS noise gate applied to captured audio when noise suppression is on.

/// Calculate RMS (Root Mean Square) of 16-bit samples, normalized to 0.0..=1.0.
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

/// Zeroes buffers whose level falls below a threshold.
///
/// Operates per read buffer, so the gate opens and closes at the capture
/// poll granularity rather than per sample.
#[derive(Debug, Clone, Copy)]
pub struct NoiseGate {
    threshold: f32,
}

impl NoiseGate {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Silence `samples` in place if they are below the gate threshold.
    ///
    /// Returns `true` when the buffer was gated.
    pub fn apply(&self, samples: &mut [i16]) -> bool {
        if samples.is_empty() || calculate_rms(samples) >= self.threshold {
            return false;
        }
        samples.fill(0);
        true
    }
}
