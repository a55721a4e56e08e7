// src/frame_window.rs

use std::cell::RefCell;

use crate::scene::SceneContext;

/// A contiguous `[start, start + count)` slice of the timeline.
///
/// One window is created per batch render and dropped afterwards.
/// It borrows the session's `SceneContext` and never mutates it, so any
/// number of windows may share one context.
#[derive(Debug, Clone, Copy)]
pub struct FrameWindow<'a> {
    base: &'a SceneContext,
    start_frame: i64,
    frame_count: usize,
}

impl<'a> FrameWindow<'a> {
    pub fn new(base: &'a SceneContext, start_frame: i64, frame_count: usize) -> Self {
        Self {
            base,
            start_frame,
            frame_count,
        }
    }

    #[inline]
    pub fn start_frame(&self) -> i64 {
        self.start_frame
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Exclusive end of the window.
    #[inline]
    pub fn end_frame(&self) -> i64 {
        self.start_frame + self.frame_count as i64
    }

    /// Best-effort inverse of the base mapping.
    ///
    /// Uses the average frames-per-measure of the whole timeline, so it is
    /// exact only for constant-tempo mappings. Returns 0.0 for an empty scene.
    pub fn frame_to_measure(&self, frame: i64) -> f64 {
        if self.base.frames() == 0 || self.base.measures() == 0 {
            return 0.0;
        }
        let frames_per_measure = self.base.frames() as f64 / self.base.measures() as f64;
        frame as f64 / frames_per_measure
    }

    /// True if `[measure_start, measure_end)` intersects this window.
    pub fn overlaps_frame_range(&self, measure_start: f64, measure_end: f64) -> bool {
        let range_start = self.base.frame_for_position(measure_start);
        let range_end = self.base.frame_for_position(measure_end);
        self.overlaps_absolute_frame_range(range_start, range_end)
    }

    /// True if `[frame_start, frame_end)` intersects this window.
    #[inline]
    pub fn overlaps_absolute_frame_range(&self, frame_start: i64, frame_end: i64) -> bool {
        frame_start < self.end_frame() && frame_end > self.start_frame
    }

    /// Offset of a measure position inside this window's buffer.
    ///
    /// `None` when the position falls outside `[start, end)`.
    pub fn measure_to_buffer_offset(&self, measure: f64) -> Option<usize> {
        self.absolute_to_buffer_offset(self.base.frame_for_position(measure))
    }

    /// Offset of an absolute frame inside this window's buffer.
    pub fn absolute_to_buffer_offset(&self, frame: i64) -> Option<usize> {
        let relative = frame - self.start_frame;
        if relative < 0 || relative >= self.frame_count as i64 {
            return None;
        }
        Some(relative as usize)
    }

    pub fn start_measure(&self) -> f64 {
        self.frame_to_measure(self.start_frame)
    }

    pub fn end_measure(&self) -> f64 {
        self.frame_to_measure(self.end_frame())
    }

    // Delegates to the session context

    #[inline]
    pub fn measures(&self) -> u32 {
        self.base.measures()
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.base.frames()
    }

    #[inline]
    pub fn frame_for_position(&self, measure: f64) -> i64 {
        self.base.frame_for_position(measure)
    }

    #[inline]
    pub fn destination(&self) -> &'a RefCell<Vec<f32>> {
        self.base.destination()
    }

    #[inline]
    pub fn context(&self) -> &'a SceneContext {
        self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MeasureClock;
    use approx::assert_relative_eq;

    fn scene() -> SceneContext {
        // 1 measure = 1000 frames
        SceneContext::new(8, MeasureClock::new(60.0, 4.0, 250.0))
    }

    #[test]
    fn test_window_bounds() {
        let scene = scene();
        let window = FrameWindow::new(&scene, 1024, 512);
        assert_eq!(window.start_frame(), 1024);
        assert_eq!(window.frame_count(), 512);
        assert_eq!(window.end_frame(), 1536);
        assert_eq!(window.frames(), 8000);
        assert_eq!(window.measures(), 8);
    }

    #[test]
    fn test_frame_to_measure() {
        let scene = scene();
        let window = FrameWindow::new(&scene, 0, 100);
        assert_relative_eq!(window.frame_to_measure(2500), 2.5);
        assert_relative_eq!(window.start_measure(), 0.0);
        assert_relative_eq!(window.end_measure(), 0.1);

        let empty = SceneContext::empty();
        let window = FrameWindow::new(&empty, 0, 100);
        assert_eq!(window.frame_to_measure(2500), 0.0);
    }

    #[test]
    fn test_measure_overlap() {
        let scene = scene();
        let window = FrameWindow::new(&scene, 1000, 500);

        assert!(window.overlaps_frame_range(0.5, 1.2));
        assert!(window.overlaps_frame_range(1.4, 3.0));
        // Ends exactly at the window start
        assert!(!window.overlaps_frame_range(0.0, 1.0));
        // Starts exactly at the window end
        assert!(!window.overlaps_frame_range(1.5, 2.0));
    }

    #[test]
    fn test_absolute_overlap_is_half_open() {
        let scene = scene();
        let window = FrameWindow::new(&scene, 100, 50);
        assert!(window.overlaps_absolute_frame_range(149, 200));
        assert!(window.overlaps_absolute_frame_range(-10, 101));
        assert!(!window.overlaps_absolute_frame_range(150, 200));
        assert!(!window.overlaps_absolute_frame_range(0, 100));
    }

    #[test]
    fn test_measure_to_buffer_offset() {
        let scene = scene();
        let window = FrameWindow::new(&scene, 1000, 500);
        assert_eq!(window.measure_to_buffer_offset(1.0), Some(0));
        assert_eq!(window.measure_to_buffer_offset(1.25), Some(250));
        assert_eq!(window.measure_to_buffer_offset(1.5), None);
        assert_eq!(window.measure_to_buffer_offset(0.5), None);
    }

    #[test]
    fn test_windows_share_context() {
        let scene = scene();
        let a = FrameWindow::new(&scene, 0, 10);
        let b = FrameWindow::new(&scene, 10, 10);
        assert!(std::ptr::eq(a.context(), b.context()));
        assert_eq!(scene.frames(), 8000);
    }
}
