// src/dispatch.rs
//
// Batch scheduling plus per-sample work, dispatched either through a
// host-side loop (opaque procedures) or a compiled kernel (fusable
// expressions).

use std::fmt;

use log::debug;

use crate::audio_buffer::OutputBuffer;
use crate::batch::{BatchRender, BatchScheduler};
use crate::error::{ConfigError, Result};
use crate::kernel::{FrameExpr, FrameKernel, KernelCompiler};
use crate::sink::AudioSink;

/// Opaque per-sample procedure: `(absolute_frame, input) -> output`.
pub type OpaqueFn = Box<dyn FnMut(u64, f32) -> f32>;

/// The unit of per-sample work inside a batch.
///
/// The tag is fixed when the operation is handed to `CompiledDispatch`
/// and decides the dispatch path for its whole lifetime.
pub enum FrameOperation {
    /// Must be called once per sample from the host
    Opaque(OpaqueFn),

    /// Can be lowered into one call per buffer
    Fusable(FrameExpr),
}

impl FrameOperation {
    pub fn opaque(f: impl FnMut(u64, f32) -> f32 + 'static) -> Self {
        FrameOperation::Opaque(Box::new(f))
    }

    pub fn fusable(expr: FrameExpr) -> Self {
        FrameOperation::Fusable(expr)
    }

    /// Identity operation.
    pub fn passthrough() -> Self {
        FrameOperation::Fusable(FrameExpr::input())
    }

    #[inline]
    pub fn is_fusable(&self) -> bool {
        matches!(self, FrameOperation::Fusable(_))
    }

    /// Process a single sample on the host.
    #[inline]
    pub fn apply(&mut self, frame: u64, input: f32) -> f32 {
        match self {
            FrameOperation::Opaque(f) => f(frame, input),
            FrameOperation::Fusable(expr) => expr.eval(input, frame),
        }
    }
}

impl fmt::Debug for FrameOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameOperation::Opaque(_) => f.write_str("Opaque(..)"),
            FrameOperation::Fusable(expr) => f.debug_tuple("Fusable").field(expr).finish(),
        }
    }
}

/// A `BatchScheduler` that also runs a `FrameOperation` over every
/// rendered batch and forwards the processed buffer downstream.
///
/// Boundary bookkeeping (tick counter, batch index, frame callback) is
/// delegated to the inner scheduler unchanged, so the opaque and fusable
/// paths differ only in execution cost.
pub struct CompiledDispatch<R> {
    scheduler: BatchScheduler<R>,
    operation: FrameOperation,

    /// Present iff the operation is fusable
    kernel: Option<Box<dyn FrameKernel>>,

    /// Per-sample output of the last batch
    processed: OutputBuffer,
}

impl<R: BatchRender> CompiledDispatch<R> {
    /// Wrap `scheduler` with `operation`.
    ///
    /// A fusable operation is compiled here, so a missing or failing
    /// backend is reported at construction rather than at the first tick.
    pub fn new(
        scheduler: BatchScheduler<R>,
        operation: FrameOperation,
        compiler: Option<&dyn KernelCompiler>,
    ) -> std::result::Result<Self, ConfigError> {
        let kernel = match &operation {
            FrameOperation::Opaque(_) => None,
            FrameOperation::Fusable(expr) => {
                let compiler = compiler.ok_or(ConfigError::MissingCompiler)?;
                Some(compiler.compile(expr)?)
            }
        };

        debug!(
            "CompiledDispatch: batch size {}, {} path",
            scheduler.batch_size(),
            if kernel.is_some() { "fused" } else { "per-sample" }
        );

        let processed = OutputBuffer::new(scheduler.batch_size());

        Ok(Self {
            scheduler,
            operation,
            kernel,
            processed,
        })
    }

    /// True iff the operation was fusable. Fixed at construction.
    #[inline]
    pub fn is_frame_op_compilable(&self) -> bool {
        self.kernel.is_some()
    }

    /// Count one tick; on a boundary render, process, and forward the batch.
    pub fn tick(&mut self) -> Result<bool> {
        if !self.scheduler.advance_tick()? {
            return Ok(false);
        }
        self.dispatch_batch()?;
        Ok(true)
    }

    /// Perform every remaining tick of the current batch in one call.
    ///
    /// Equivalent to calling `tick()` until it returns `true`.
    pub fn tick_batch(&mut self) -> Result<()> {
        self.scheduler.advance_to_boundary()?;
        self.dispatch_batch()
    }

    fn dispatch_batch(&mut self) -> Result<()> {
        let Self {
            scheduler,
            operation,
            kernel,
            processed,
        } = self;
        let batch_size = scheduler.batch_size();

        scheduler.complete_batch(|start_frame, rendered| {
            let input = &rendered[..batch_size];
            let out = processed.samples_mut();

            match kernel {
                Some(kernel) => kernel.execute(start_frame, input, out),
                None => {
                    for (i, (o, s)) in out.iter_mut().zip(input).enumerate() {
                        *o = operation.apply(start_frame + i as u64, *s);
                    }
                    Ok(())
                }
            }
        })?;

        if let Some(sink) = scheduler.sink_mut() {
            sink.push(processed.samples());
        }
        Ok(())
    }

    /// Forward one sample downstream. Touches no counters.
    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.scheduler.push(sample);
    }

    /// Render immediately without touching counters (no frame operation).
    pub fn render_now(&mut self) -> Result<()> {
        self.scheduler.render_now()
    }

    pub fn setup(&mut self) {
        self.reset();
    }

    pub fn reset(&mut self) {
        self.scheduler.reset();
        self.processed.clear();
    }

    pub fn set_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.scheduler.set_sink(sink);
    }

    pub fn set_frame_callback(&mut self, callback: impl FnMut(u64) + 'static) {
        self.scheduler.set_frame_callback(callback);
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.scheduler.batch_size()
    }

    #[inline]
    pub fn current_frame(&self) -> u64 {
        self.scheduler.current_frame()
    }

    #[inline]
    pub fn current_batch(&self) -> u64 {
        self.scheduler.current_batch()
    }

    #[inline]
    pub fn renders(&self) -> u64 {
        self.scheduler.renders()
    }

    #[inline]
    pub fn is_stalled(&self) -> bool {
        self.scheduler.is_stalled()
    }

    /// Raw rendered batch, before the frame operation.
    pub fn output_buffer(&self) -> &OutputBuffer {
        self.scheduler.output_buffer()
    }

    /// Batch after the frame operation.
    pub fn processed_buffer(&self) -> &OutputBuffer {
        &self.processed
    }

    pub fn scheduler(&self) -> &BatchScheduler<R> {
        &self.scheduler
    }
}
