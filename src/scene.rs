// src/scene.rs
//
// Session-scoped description of the whole timeline.

use std::cell::RefCell;
use std::fmt;

use crate::transport::{FrameForPosition, MeasureClock};

/// Selects which stereo side of a channel is rendered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StereoChannel {
    Left,
    Right,
}

/// Channel selector handed to the arrangement renderer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ChannelInfo {
    pub index: usize,
    pub stereo: StereoChannel,
}

impl ChannelInfo {
    pub fn new(index: usize, stereo: StereoChannel) -> Self {
        Self { index, stereo }
    }

    pub fn left(index: usize) -> Self {
        Self::new(index, StereoChannel::Left)
    }

    pub fn right(index: usize) -> Self {
        Self::new(index, StereoChannel::Right)
    }
}

/// Shared timeline state for one render session.
///
/// Created once per session and shared by reference with every
/// `FrameWindow`. Only the driver mutates the destination, and only
/// between ticks.
pub struct SceneContext {
    measures: u32,
    frames: usize,
    frame_for_position: FrameForPosition,
    destination: RefCell<Vec<f32>>,
}

impl SceneContext {
    /// Build a context whose length is `measures` measures of `clock`.
    pub fn new(measures: u32, clock: MeasureClock) -> Self {
        let frames = clock.frame_for_position(measures as f64).max(0) as usize;
        Self::with_mapping(measures, frames, clock.mapping())
    }

    /// Build a context from an externally supplied mapping.
    pub fn with_mapping(measures: u32, frames: usize, frame_for_position: FrameForPosition) -> Self {
        Self {
            measures,
            frames,
            frame_for_position,
            destination: RefCell::new(Vec::new()),
        }
    }

    /// Context with no timeline at all.
    pub fn empty() -> Self {
        Self::with_mapping(0, 0, std::rc::Rc::new(|_| 0))
    }

    #[inline]
    pub fn measures(&self) -> u32 {
        self.measures
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn frame_for_position(&self, measure: f64) -> i64 {
        (self.frame_for_position)(measure)
    }

    pub fn mapping(&self) -> &FrameForPosition {
        &self.frame_for_position
    }

    /// Shared destination buffer (bulk renders land here).
    pub fn destination(&self) -> &RefCell<Vec<f32>> {
        &self.destination
    }
}

impl fmt::Debug for SceneContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneContext")
            .field("measures", &self.measures)
            .field("frames", &self.frames)
            .field("destination_len", &self.destination.borrow().len())
            .finish()
    }
}
