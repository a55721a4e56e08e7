// src/analysis.rs
//
// Amplitude statistics used to compare runner strategies.

/// Threshold below which a sample counts as silent.
pub const SILENCE_FLOOR: f32 = 1e-4;

/// Peak / RMS summary of a mono signal.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioStats {
    pub peak: f32,
    pub rms: f32,
    /// Fraction of samples above `SILENCE_FLOOR`
    pub non_zero_ratio: f32,
    pub frames: usize,
}

impl AudioStats {
    pub fn measure(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut peak = 0.0f32;
        let mut sum_squares = 0.0f64;
        let mut non_zero = 0usize;

        for &s in samples {
            let a = s.abs();
            peak = peak.max(a);
            sum_squares += (s as f64) * (s as f64);
            if a > SILENCE_FLOOR {
                non_zero += 1;
            }
        }

        Self {
            peak,
            rms: (sum_squares / samples.len() as f64).sqrt() as f32,
            non_zero_ratio: non_zero as f32 / samples.len() as f32,
            frames: samples.len(),
        }
    }

    /// True unless both peak and RMS clear their thresholds.
    pub fn is_silent(&self, peak_threshold: f32, rms_threshold: f32) -> bool {
        !(self.peak > peak_threshold && self.rms > rms_threshold)
    }

    /// Relative RMS difference, `|a - b| / max(a, b)`. Zero when both are silent.
    pub fn rms_difference(&self, other: &AudioStats) -> f32 {
        let max = self.rms.max(other.rms);
        if max == 0.0 {
            return 0.0;
        }
        (self.rms - other.rms).abs() / max
    }
}
