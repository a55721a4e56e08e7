// src/batch.rs
//
// Tick-driven batch scheduler.
//
// The driver calls `tick()` once per sample (or once per logical step);
// the expensive render action runs once every `batch_size` ticks.

use log::{debug, error};

use crate::audio_buffer::OutputBuffer;
use crate::error::{ConfigError, RenderError, Result, SchedulerError};
use crate::sink::AudioSink;

/// Observer invoked with the start frame of each completed batch.
pub type FrameCallback = Box<dyn FnMut(u64)>;

/// The expensive per-batch action.
///
/// Implementations fill `output` with the audio for the batch starting at
/// `start_frame`. They are called at most once per batch boundary, plus once
/// per explicit `render_now()`.
pub trait BatchRender {
    fn render_batch(&mut self, start_frame: u64, output: &mut [f32]) -> std::result::Result<(), RenderError>;
}

impl<F> BatchRender for F
where
    F: FnMut(u64, &mut [f32]) -> std::result::Result<(), RenderError>,
{
    #[inline]
    fn render_batch(&mut self, start_frame: u64, output: &mut [f32]) -> std::result::Result<(), RenderError> {
        self(start_frame, output)
    }
}

/// Fires a render action exactly once per `batch_size` ticks.
///
/// This struct:
/// - owns its counters and output buffer exclusively
/// - performs no threading or locking
/// - never renders as a side effect of `push`
///
/// If a render fails the scheduler stalls: every later `tick()` returns
/// `SchedulerError::Stalled` until `reset()` or `setup()` is called.
pub struct BatchScheduler<R> {
    batch_size: usize,
    output: OutputBuffer,
    render: R,

    /// Ticks since the last boundary, in `[0, batch_size)`
    tick_count: usize,

    /// Completed batches since construction / reset
    current_batch: u64,

    /// Every render, natural or forced
    renders: u64,

    /// Batch whose render failed, if any
    stalled: Option<u64>,

    frame_callback: Option<FrameCallback>,
    sink: Option<Box<dyn AudioSink>>,
}

impl<R: BatchRender> BatchScheduler<R> {
    /// Create a scheduler whose output buffer holds exactly one batch.
    pub fn new(batch_size: usize, render: R) -> std::result::Result<Self, ConfigError> {
        Self::with_output_size(batch_size, batch_size, render)
    }

    /// Create a scheduler with an output buffer of `output_size` frames.
    ///
    /// `output_size` must be at least `batch_size`.
    pub fn with_output_size(
        batch_size: usize,
        output_size: usize,
        render: R,
    ) -> std::result::Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if output_size == 0 {
            return Err(ConfigError::ZeroOutputSize);
        }
        if output_size < batch_size {
            return Err(ConfigError::OutputSmallerThanBatch {
                batch: batch_size,
                output: output_size,
            });
        }

        Ok(Self {
            batch_size,
            output: OutputBuffer::new(output_size),
            render,
            tick_count: 0,
            current_batch: 0,
            renders: 0,
            stalled: None,
            frame_callback: None,
            sink: None,
        })
    }

    /// Attach a frame observer (builder form).
    pub fn with_frame_callback(mut self, callback: impl FnMut(u64) + 'static) -> Self {
        self.frame_callback = Some(Box::new(callback));
        self
    }

    pub fn set_frame_callback(&mut self, callback: impl FnMut(u64) + 'static) {
        self.frame_callback = Some(Box::new(callback));
    }

    /// Register the downstream consumer for `push` / `push_buffer`.
    pub fn set_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.sink = Some(sink);
    }

    // -------------------------------
    // MARK: Driver operations
    // -------------------------------

    /// Count one tick; render when the batch is complete.
    ///
    /// Returns `true` if this tick closed a batch.
    pub fn tick(&mut self) -> Result<bool> {
        if !self.advance_tick()? {
            return Ok(false);
        }
        self.complete_batch(|_, _| Ok(()))?;
        Ok(true)
    }

    /// Forward one sample downstream. Touches no counters.
    #[inline]
    pub fn push(&mut self, sample: f32) {
        if let Some(sink) = self.sink.as_mut() {
            sink.push(&[sample]);
        }
    }

    /// Forward the whole output buffer downstream. Touches no counters.
    pub fn push_buffer(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.push(self.output.samples());
        }
    }

    /// Render once, immediately, at the current frame.
    ///
    /// The tick counter and batch index are left alone, so the next natural
    /// boundary still arrives after the same number of ticks.
    pub fn render_now(&mut self) -> Result<()> {
        let start_frame = self.current_frame();
        self.render
            .render_batch(start_frame, self.output.samples_mut())?;
        self.renders += 1;
        Ok(())
    }

    /// Return counters and output to their initial state.
    pub fn setup(&mut self) {
        self.reset();
    }

    /// Clear counters, the stall flag, and the output buffer. Idempotent.
    pub fn reset(&mut self) {
        self.tick_count = 0;
        self.current_batch = 0;
        self.renders = 0;
        self.stalled = None;
        self.output.clear();
    }

    // -------------------------------
    // MARK: Boundary mechanics (shared with CompiledDispatch)
    // -------------------------------

    /// Increment the tick counter. `true` when a boundary has been reached.
    pub(crate) fn advance_tick(&mut self) -> Result<bool> {
        if let Some(batch) = self.stalled {
            return Err(SchedulerError::Stalled { batch });
        }
        self.tick_count += 1;
        Ok(self.tick_count >= self.batch_size)
    }

    /// Jump the tick counter straight to the boundary.
    pub(crate) fn advance_to_boundary(&mut self) -> Result<usize> {
        if let Some(batch) = self.stalled {
            return Err(SchedulerError::Stalled { batch });
        }
        let skipped = self.batch_size - self.tick_count;
        self.tick_count = self.batch_size;
        Ok(skipped)
    }

    /// Render, run `after_render` over the fresh output, then advance
    /// bookkeeping together.
    ///
    /// Either everything advances or nothing does and the scheduler stalls.
    pub(crate) fn complete_batch<F>(&mut self, after_render: F) -> Result<()>
    where
        F: FnOnce(u64, &[f32]) -> std::result::Result<(), RenderError>,
    {
        let start_frame = self.current_frame();

        let outcome = self
            .render
            .render_batch(start_frame, self.output.samples_mut())
            .and_then(|_| after_render(start_frame, self.output.samples()));

        if let Err(e) = outcome {
            error!(
                "Render of batch {} (frame {}) failed: {}",
                self.current_batch, start_frame, e
            );
            self.stalled = Some(self.current_batch);
            return Err(e.into());
        }

        self.renders += 1;
        self.current_batch += 1;
        if let Some(callback) = self.frame_callback.as_mut() {
            callback(start_frame);
        }
        self.tick_count = 0;

        debug!("Batch {} complete at frame {}", self.current_batch, start_frame);
        Ok(())
    }

    pub(crate) fn sink_mut(&mut self) -> Option<&mut Box<dyn AudioSink>> {
        self.sink.as_mut()
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn output_size(&self) -> usize {
        self.output.len()
    }

    #[inline]
    pub fn output_buffer(&self) -> &OutputBuffer {
        &self.output
    }

    /// Start frame of the batch currently being accumulated.
    #[inline]
    pub fn current_frame(&self) -> u64 {
        self.current_batch * self.batch_size as u64
    }

    #[inline]
    pub fn current_batch(&self) -> u64 {
        self.current_batch
    }

    #[inline]
    pub fn tick_count(&self) -> usize {
        self.tick_count
    }

    #[inline]
    pub fn renders(&self) -> u64 {
        self.renders
    }

    #[inline]
    pub fn is_stalled(&self) -> bool {
        self.stalled.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    type CountingRender = Box<dyn FnMut(u64, &mut [f32]) -> std::result::Result<(), RenderError>>;

    fn counting(count: Rc<Cell<usize>>) -> CountingRender {
        Box::new(move |_: u64, out: &mut [f32]| {
            count.set(count.get() + 1);
            out.fill(count.get() as f32);
            Ok(())
        })
    }

    #[test]
    fn test_render_fires_on_boundary_only() {
        let count = Rc::new(Cell::new(0));
        let mut scheduler = BatchScheduler::new(4, counting(count.clone())).unwrap();

        for _ in 0..3 {
            assert!(!scheduler.tick().unwrap());
        }
        assert_eq!(count.get(), 0);

        assert!(scheduler.tick().unwrap());
        assert_eq!(count.get(), 1);

        for _ in 0..4 {
            scheduler.tick().unwrap();
        }
        assert_eq!(count.get(), 2);
        assert_eq!(scheduler.renders(), 2);
    }

    #[test]
    fn test_push_never_renders() {
        let count = Rc::new(Cell::new(0));
        let mut scheduler = BatchScheduler::new(4, counting(count.clone())).unwrap();
        let captured = Rc::new(RefCell::new(Vec::new()));
        scheduler.set_sink(Box::new(captured.clone()));

        for i in 0..100 {
            scheduler.push(i as f32);
        }

        assert_eq!(count.get(), 0);
        assert_eq!(scheduler.tick_count(), 0);
        assert_eq!(scheduler.current_batch(), 0);
        assert_eq!(captured.borrow().len(), 100);
    }

    #[test]
    fn test_push_buffer_forwards_output() {
        let count = Rc::new(Cell::new(0));
        let mut scheduler = BatchScheduler::new(4, counting(count.clone())).unwrap();
        let captured = Rc::new(RefCell::new(Vec::new()));
        scheduler.set_sink(Box::new(captured.clone()));

        for _ in 0..4 {
            scheduler.tick().unwrap();
        }
        scheduler.push_buffer();

        assert_eq!(*captured.borrow(), vec![1.0; 4]);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_render_now_is_orthogonal_to_ticks() {
        let count = Rc::new(Cell::new(0));
        let mut scheduler = BatchScheduler::new(1024, counting(count.clone())).unwrap();

        scheduler.render_now().unwrap();
        assert_eq!(count.get(), 1);

        for _ in 0..1023 {
            scheduler.tick().unwrap();
        }
        assert_eq!(count.get(), 1);

        scheduler.tick().unwrap();
        assert_eq!(count.get(), 2);
        assert_eq!(scheduler.current_batch(), 1);
    }

    #[test]
    fn test_frame_advancement() {
        let count = Rc::new(Cell::new(0));
        let mut scheduler = BatchScheduler::new(100, counting(count)).unwrap();
        assert_eq!(scheduler.current_frame(), 0);
        assert_eq!(scheduler.current_batch(), 0);

        for _ in 0..300 {
            scheduler.tick().unwrap();
        }
        assert_eq!(scheduler.current_batch(), 3);
        assert_eq!(scheduler.current_frame(), 300);
    }

    #[test]
    fn test_frame_callback_receives_batch_start() {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let seen = frames.clone();
        let count = Rc::new(Cell::new(0));
        let mut scheduler = BatchScheduler::new(8, counting(count))
            .unwrap()
            .with_frame_callback(move |frame| seen.borrow_mut().push(frame));

        for _ in 0..24 {
            scheduler.tick().unwrap();
        }
        assert_eq!(*frames.borrow(), vec![0, 8, 16]);
    }

    #[test]
    fn test_reset_restarts_counting() {
        let count = Rc::new(Cell::new(0));
        let mut scheduler = BatchScheduler::new(4, counting(count)).unwrap();
        for _ in 0..10 {
            scheduler.tick().unwrap();
        }
        assert_eq!(scheduler.renders(), 2);

        scheduler.reset();
        assert_eq!(scheduler.current_batch(), 0);
        assert_eq!(scheduler.current_frame(), 0);
        assert!(scheduler.output_buffer().samples().iter().all(|s| *s == 0.0));

        for _ in 0..4 {
            scheduler.tick().unwrap();
        }
        assert_eq!(scheduler.renders(), 1);

        scheduler.reset();
        scheduler.reset();
        assert_eq!(scheduler.renders(), 0);
    }

    #[test]
    fn test_failed_render_stalls_until_reset() {
        let fail = Rc::new(Cell::new(true));
        let flag = fail.clone();
        let render = move |_: u64, _: &mut [f32]| {
            if flag.get() {
                Err(RenderError::Renderer("boom".into()))
            } else {
                Ok(())
            }
        };
        let mut scheduler = BatchScheduler::new(2, render).unwrap();

        scheduler.tick().unwrap();
        let err = scheduler.tick().unwrap_err();
        assert!(matches!(err, SchedulerError::Render(_)));
        assert!(scheduler.is_stalled());
        assert_eq!(scheduler.current_batch(), 0);
        assert!(matches!(
            scheduler.tick(),
            Err(SchedulerError::Stalled { batch: 0 })
        ));

        fail.set(false);
        scheduler.reset();
        scheduler.tick().unwrap();
        assert!(scheduler.tick().unwrap());
        assert_eq!(scheduler.current_batch(), 1);
    }

    #[test]
    fn test_rejects_bad_sizes() {
        let render = |_: u64, _: &mut [f32]| Ok::<(), RenderError>(());
        assert!(matches!(
            BatchScheduler::new(0, render),
            Err(ConfigError::ZeroBatchSize)
        ));
        assert!(matches!(
            BatchScheduler::with_output_size(4, 2, render),
            Err(ConfigError::OutputSmallerThanBatch { batch: 4, output: 2 })
        ));

        let scheduler = BatchScheduler::with_output_size(4, 8, render).unwrap();
        assert_eq!(scheduler.output_size(), 8);
        assert_eq!(scheduler.batch_size(), 4);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn renders_once_per_batch(batch_size in 1usize..64, batches in 0usize..6, extra in 0usize..64) {
                let count = Rc::new(Cell::new(0));
                let mut scheduler = BatchScheduler::new(batch_size, counting(count.clone())).unwrap();
                let extra = extra % batch_size;

                for _ in 0..(batches * batch_size + extra) {
                    scheduler.tick().unwrap();
                }

                prop_assert_eq!(count.get(), batches);
                prop_assert_eq!(scheduler.current_batch(), batches as u64);
                prop_assert_eq!(scheduler.current_frame(), (batches * batch_size) as u64);
                prop_assert_eq!(scheduler.tick_count(), extra);
            }
        }
    }
}
