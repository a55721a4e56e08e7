// src/arrangement.rs
//
// Reference arrangement: sine notes placed on a measure grid.
//
// Every sample is a pure function of its absolute frame, so any window
// can be rendered in isolation and adjacent windows stitch together
// exactly.

use std::f64::consts::{FRAC_PI_4, TAU};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::{ConfigError, RenderError};
use crate::frame_window::FrameWindow;
use crate::render_cell::ArrangementRenderer;
use crate::scene::{ChannelInfo, StereoChannel};

/// Semitone offsets of a minor pentatonic scale.
const PENTATONIC: [i32; 5] = [0, 3, 5, 7, 10];

/// Convert MIDI note number to frequency in Hz.
#[inline]
fn midi_note_to_freq(note: u8) -> f64 {
    440.0 * 2.0_f64.powf((note as f64 - 69.0) / 12.0)
}

/// One note on the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    /// Channel the note belongs to
    pub channel: usize,

    /// Start position in measures
    pub start: f64,

    /// Duration in measures
    pub duration: f64,

    /// MIDI note number (0-127)
    pub note: u8,

    /// Linear gain (0.0 - 1.0)
    pub gain: f32,

    /// Pan (-1.0 = left, 0.0 = center, 1.0 = right)
    pub pan: f32,
}

impl NoteEvent {
    pub fn new(channel: usize, start: f64, duration: f64, note: u8, gain: f32) -> Self {
        Self {
            channel,
            start,
            duration,
            note: note.min(127),
            gain: gain.clamp(0.0, 1.0),
            pan: 0.0,
        }
    }

    pub fn with_pan(mut self, pan: f32) -> Self {
        self.pan = pan.clamp(-1.0, 1.0);
        self
    }

    /// End position in measures.
    #[inline]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Equal-power gain for one stereo side.
    fn pan_gain(&self, stereo: StereoChannel) -> f64 {
        let angle = (self.pan as f64 + 1.0) * FRAC_PI_4;
        match stereo {
            StereoChannel::Left => angle.cos(),
            StereoChannel::Right => angle.sin(),
        }
    }
}

/// Notes plus the envelope shared by all of them.
#[derive(Debug, Clone)]
pub struct NoteArrangement {
    notes: Vec<NoteEvent>,
    sample_rate: f64,

    /// Linear attack time (seconds)
    attack: f64,

    /// Linear release time at the end of each note (seconds)
    release: f64,
}

impl NoteArrangement {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            notes: Vec::new(),
            sample_rate,
            attack: 0.005,
            release: 0.05,
        }
    }

    /// Build from a list of notes, validating each one.
    pub fn from_notes(sample_rate: f64, notes: Vec<NoteEvent>) -> Result<Self, ConfigError> {
        let mut arrangement = Self::new(sample_rate);
        for note in notes {
            arrangement.add_note(note)?;
        }
        Ok(arrangement)
    }

    /// Seeded pseudo-random arrangement over `measures` measures.
    ///
    /// Every channel gets a note on the downbeat of each measure plus a few
    /// off-beat notes, so the result is never silent for non-zero sizes.
    pub fn generate(seed: u64, measures: u32, channels: usize, sample_rate: f64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut arrangement = Self::new(sample_rate);

        for channel in 0..channels {
            let root = rng.gen_range(45..=57) as i32;
            for measure in 0..measures {
                let hits = rng.gen_range(1..=4);
                for hit in 0..hits {
                    let start = if hit == 0 {
                        measure as f64
                    } else {
                        measure as f64 + rng.gen_range(1..8) as f64 / 8.0
                    };
                    let degree = PENTATONIC[rng.gen_range(0..PENTATONIC.len())];
                    let octave = 12 * rng.gen_range(0..2);
                    let note = (root + degree + octave).clamp(0, 127) as u8;

                    arrangement.notes.push(
                        NoteEvent::new(
                            channel,
                            start,
                            rng.gen_range(0.125..0.75),
                            note,
                            rng.gen_range(0.2..0.5),
                        )
                        .with_pan(rng.gen_range(-0.5..0.5)),
                    );
                }
            }
        }

        arrangement
    }

    pub fn add_note(&mut self, note: NoteEvent) -> Result<(), ConfigError> {
        if !note.start.is_finite() || !note.duration.is_finite() || note.duration <= 0.0 {
            return Err(ConfigError::InvalidArrangement(format!(
                "note at {} with duration {}",
                note.start, note.duration
            )));
        }
        self.notes.push(note);
        Ok(())
    }

    pub fn with_envelope(mut self, attack: f64, release: f64) -> Self {
        self.attack = attack.max(0.0);
        self.release = release.max(0.0);
        self
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Attack/release envelope at `t` seconds into a note of `length` seconds.
    #[inline]
    fn envelope(&self, t: f64, length: f64) -> f64 {
        let attack = if self.attack > 0.0 {
            (t / self.attack).min(1.0)
        } else {
            1.0
        };
        let remaining = length - t;
        let release = if self.release > 0.0 {
            (remaining / self.release).clamp(0.0, 1.0)
        } else {
            1.0
        };
        attack * release
    }
}

impl ArrangementRenderer for NoteArrangement {
    fn render(
        &mut self,
        window: &FrameWindow<'_>,
        channel: ChannelInfo,
        output: &mut [f32],
    ) -> Result<(), RenderError> {
        if output.len() < window.frame_count() {
            return Err(RenderError::WindowMismatch {
                expected: window.frame_count(),
                actual: output.len(),
            });
        }

        for note in &self.notes {
            if note.channel != channel.index || !window.overlaps_frame_range(note.start, note.end()) {
                continue;
            }

            let note_start = window.frame_for_position(note.start);
            let note_end = window.frame_for_position(note.end());
            let length = (note_end - note_start) as f64 / self.sample_rate;
            let freq = midi_note_to_freq(note.note);
            let gain = note.gain as f64 * note.pan_gain(channel.stereo);

            // Notes may begin before the window or run past it
            let from = note_start.max(window.start_frame());
            let to = note_end.min(window.end_frame());

            for frame in from..to {
                let t = (frame - note_start) as f64 / self.sample_rate;
                let sample = (TAU * freq * t).sin() * gain * self.envelope(t, length);
                output[(frame - window.start_frame()) as usize] += sample as f32;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AudioStats;
    use crate::scene::SceneContext;
    use crate::transport::MeasureClock;

    fn scene() -> SceneContext {
        SceneContext::new(4, MeasureClock::default())
    }

    fn render(arrangement: &mut NoteArrangement, scene: &SceneContext, start: i64, frames: usize) -> Vec<f32> {
        let window = FrameWindow::new(scene, start, frames);
        let mut out = vec![0.0; frames];
        arrangement.render(&window, ChannelInfo::left(0), &mut out).unwrap();
        out
    }

    #[test]
    fn test_midi_note_to_freq() {
        assert!((midi_note_to_freq(69) - 440.0).abs() < 1e-9);
        assert!((midi_note_to_freq(57) - 220.0).abs() < 1e-9);
    }

    #[test]
    fn test_adjacent_windows_match_one_large_window() {
        let scene = scene();
        let mut arrangement = NoteArrangement::generate(7, 4, 1, 44_100.0);

        let whole = render(&mut arrangement, &scene, 0, 4096);
        let mut pieces = render(&mut arrangement, &scene, 0, 1024);
        for k in 1..4 {
            pieces.extend(render(&mut arrangement, &scene, k * 1024, 1024));
        }

        assert_eq!(whole, pieces);
    }

    #[test]
    fn test_note_started_before_window_still_sounds() {
        let scene = scene();
        let note = NoteEvent::new(0, 0.0, 1.0, 69, 0.5);
        let mut arrangement = NoteArrangement::from_notes(44_100.0, vec![note]).unwrap();

        // Window in the middle of the note
        let out = render(&mut arrangement, &scene, 40_000, 512);
        assert!(AudioStats::measure(&out).peak > 0.1);

        // Window after the note has ended
        let out = render(&mut arrangement, &scene, 100_000, 512);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_other_channels_ignored() {
        let scene = scene();
        let note = NoteEvent::new(1, 0.0, 1.0, 69, 0.5);
        let mut arrangement = NoteArrangement::from_notes(44_100.0, vec![note]).unwrap();
        let out = render(&mut arrangement, &scene, 0, 512);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let a = NoteArrangement::generate(42, 8, 2, 44_100.0);
        let b = NoteArrangement::generate(42, 8, 2, 44_100.0);
        let c = NoteArrangement::generate(43, 8, 2, 44_100.0);
        assert_eq!(a.notes(), b.notes());
        assert_ne!(a.notes(), c.notes());
        assert!(a.notes().iter().any(|n| n.start == 0.0 && n.channel == 0));
    }

    #[test]
    fn test_rejects_invalid_notes() {
        let result = NoteArrangement::from_notes(44_100.0, vec![NoteEvent::new(0, 0.0, 0.0, 60, 0.5)]);
        assert!(matches!(result, Err(ConfigError::InvalidArrangement(_))));
    }

    #[test]
    fn test_pan_is_equal_power() {
        let note = NoteEvent::new(0, 0.0, 1.0, 60, 1.0).with_pan(0.3);
        let l = note.pan_gain(StereoChannel::Left);
        let r = note.pan_gain(StereoChannel::Right);
        assert!((l * l + r * r - 1.0).abs() < 1e-9);
        assert!(r > l);
    }
}
