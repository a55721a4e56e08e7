// src/transport.rs

use std::rc::Rc;

/// Position→frame mapping supplied by the scene/tempo layer.
///
/// Assumed monotonic, not required to be exactly invertible.
pub type FrameForPosition = Rc<dyn Fn(f64) -> i64>;

//
// ===============================
// MARK: Constant-tempo clock
// ===============================
//

/// Musical clock with a fixed tempo and meter.
///
/// This struct:
/// - is copyable
/// - converts measure positions into absolute frames
/// - contains NO playback state
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MeasureClock {
    /// Tempo in BPM
    bpm: f64,

    /// Beats per measure (4.0 for 4/4)
    beats_per_measure: f64,

    /// Sample rate (Hz)
    sample_rate: f64,
}

impl Default for MeasureClock {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beats_per_measure: 4.0,
            sample_rate: 44_100.0,
        }
    }
}

impl MeasureClock {
    pub fn new(bpm: f64, beats_per_measure: f64, sample_rate: f64) -> Self {
        Self {
            bpm,
            beats_per_measure,
            sample_rate,
        }
    }

    // -------------------------------
    // MARK: Conversions
    // -------------------------------

    #[inline]
    pub fn seconds_per_measure(&self) -> f64 {
        self.beats_per_measure * 60.0 / self.bpm
    }

    #[inline]
    pub fn frames_per_measure(&self) -> f64 {
        self.seconds_per_measure() * self.sample_rate
    }

    /// Absolute frame of a measure position (rounded to the nearest frame).
    #[inline]
    pub fn frame_for_position(&self, measure: f64) -> i64 {
        (measure * self.frames_per_measure()).round() as i64
    }

    /// Approximate inverse of `frame_for_position`.
    #[inline]
    pub fn position_for_frame(&self, frame: i64) -> f64 {
        frame as f64 / self.frames_per_measure()
    }

    /// Package the clock as a shareable mapping function.
    pub fn mapping(&self) -> FrameForPosition {
        let clock = *self;
        Rc::new(move |measure| clock.frame_for_position(measure))
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    #[inline]
    pub fn beats_per_measure(&self) -> f64 {
        self.beats_per_measure
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}
