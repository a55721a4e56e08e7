// src/runner.rs
//
// Three execution strategies over the same arrangement:
//
// - Bulk:     one non-real-time pass over the requested duration
// - RealTime: one tick per output sample, rendering amortized per buffer
// - Compiled: one tick per buffer, frame operation fused when possible
//
// All three expose the same `AudioRunner` contract and feed an `AudioSink`.

use std::rc::Rc;
use std::time::{Duration, Instant};

use log::info;

use crate::batch::BatchScheduler;
use crate::config::EngineConfig;
use crate::dispatch::{CompiledDispatch, FrameOperation};
use crate::error::{ConfigError, Result, SchedulerError};
use crate::frame_window::FrameWindow;
use crate::kernel::{BlockCompiler, KernelCompiler};
use crate::monitor::RealtimeMonitor;
use crate::render_cell::{ArrangementRenderer, RenderCell};
use crate::scene::{ChannelInfo, SceneContext};
use crate::sink::AudioSink;

/// Runner lifecycle. There is no terminal state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunnerState {
    Uninitialized,
    Ready,
}

/// Which execution strategy a runner uses.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Render `frames` frames per tick in one pass
    Bulk { frames: usize },

    /// One tick per sample
    RealTime,

    /// One tick per buffer
    Compiled,
}

/// Common driver-facing contract of every strategy.
pub trait AudioRunner {
    /// Uninitialized → Ready. Never fails, even with an empty arrangement.
    fn setup(&mut self);

    fn tick(&mut self) -> Result<()>;

    /// Rewind to frame 0. Reusable afterwards.
    fn reset(&mut self);

    fn state(&self) -> RunnerState;

    fn strategy(&self) -> Strategy;

    /// Frames of output produced by one `tick()`.
    fn frames_per_tick(&self) -> usize;

    fn monitor(&self) -> &RealtimeMonitor;

    /// Tick until at least `frames` frames have been produced.
    fn run_frames(&mut self, frames: usize) -> Result<()> {
        let per_tick = self.frames_per_tick().max(1);
        for _ in 0..frames.div_ceil(per_tick) {
            self.tick()?;
        }
        Ok(())
    }
}

//
// ===============================
// MARK: Bulk
// ===============================
//

/// Non-real-time reference renderer.
///
/// Each tick renders the next `frames` frames in one window, applies the
/// frame operation sample by sample, pushes the result downstream, and
/// leaves a copy in the scene's destination buffer.
pub struct BulkRunner<A> {
    scene: Rc<SceneContext>,
    renderer: A,
    channel: ChannelInfo,
    operation: FrameOperation,
    frames: usize,
    buffer: Vec<f32>,
    sink: Box<dyn AudioSink>,
    monitor: RealtimeMonitor,
    state: RunnerState,
    passes: u64,
}

impl<A: ArrangementRenderer> BulkRunner<A> {
    pub fn new(
        config: &EngineConfig,
        scene: Rc<SceneContext>,
        renderer: A,
        channel: ChannelInfo,
        operation: FrameOperation,
        frames: usize,
        sink: Box<dyn AudioSink>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        if frames == 0 {
            return Err(ConfigError::ZeroOutputSize);
        }

        let budget = Duration::from_secs_f64(frames as f64 / config.sample_rate as f64);
        Ok(Self {
            scene,
            renderer,
            channel,
            operation,
            frames,
            buffer: vec![0.0; frames],
            sink,
            monitor: RealtimeMonitor::new(budget, config.degraded_after, config.recovery_cycles)
                .with_buffer_frames(frames),
            state: RunnerState::Uninitialized,
            passes: 0,
        })
    }
}

impl<A: ArrangementRenderer> AudioRunner for BulkRunner<A> {
    fn setup(&mut self) {
        self.reset();
        self.state = RunnerState::Ready;
        info!("Bulk runner ready: {} frames per pass", self.frames);
    }

    fn tick(&mut self) -> Result<()> {
        if self.state != RunnerState::Ready {
            return Err(SchedulerError::NotReady);
        }

        let started = Instant::now();
        let start_frame = self.passes * self.frames as u64;
        let window = FrameWindow::new(&self.scene, start_frame as i64, self.frames);

        self.buffer.fill(0.0);
        self.renderer.render(&window, self.channel, &mut self.buffer)?;
        for (i, s) in self.buffer.iter_mut().enumerate() {
            *s = self.operation.apply(start_frame + i as u64, *s);
        }

        self.sink.push(&self.buffer);
        self.scene.destination().borrow_mut().clone_from(&self.buffer);
        self.passes += 1;
        self.monitor.record(started.elapsed());
        Ok(())
    }

    fn reset(&mut self) {
        self.passes = 0;
        self.buffer.fill(0.0);
        self.scene.destination().borrow_mut().clear();
        self.monitor.reset();
    }

    fn state(&self) -> RunnerState {
        self.state
    }

    fn strategy(&self) -> Strategy {
        Strategy::Bulk { frames: self.frames }
    }

    fn frames_per_tick(&self) -> usize {
        self.frames
    }

    fn monitor(&self) -> &RealtimeMonitor {
        &self.monitor
    }
}

//
// ===============================
// MARK: Real-time, per sample
// ===============================
//

/// Ticked once per output sample.
///
/// Each tick advances the scheduler and then pushes one sample of the
/// previous batch through the frame operation and downstream; every
/// `buffer_size` ticks the next batch is rendered. Output therefore lags
/// the timeline by one buffer, and the first buffer is silent. A tick that
/// fails pushes nothing.
pub struct RealTimeRunner<A> {
    scheduler: BatchScheduler<RenderCell<A>>,
    operation: FrameOperation,
    monitor: RealtimeMonitor,
    state: RunnerState,

    /// Time spent in ticks of the buffer being accumulated
    pending: Duration,
}

impl<A: ArrangementRenderer> RealTimeRunner<A> {
    pub fn new(
        config: &EngineConfig,
        scene: Rc<SceneContext>,
        renderer: A,
        channel: ChannelInfo,
        operation: FrameOperation,
        sink: Box<dyn AudioSink>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let mut scheduler =
            RenderCell::new(scene, renderer, channel, config.buffer_size)?.into_scheduler()?;
        scheduler.set_sink(sink);

        Ok(Self {
            scheduler,
            operation,
            monitor: RealtimeMonitor::for_config(config),
            state: RunnerState::Uninitialized,
            pending: Duration::ZERO,
        })
    }

    pub fn scheduler(&self) -> &BatchScheduler<RenderCell<A>> {
        &self.scheduler
    }
}

impl<A: ArrangementRenderer> AudioRunner for RealTimeRunner<A> {
    fn setup(&mut self) {
        self.reset();
        self.state = RunnerState::Ready;
        info!(
            "Real-time runner ready: {} ticks per buffer",
            self.scheduler.batch_size()
        );
    }

    fn tick(&mut self) -> Result<()> {
        if self.state != RunnerState::Ready {
            return Err(SchedulerError::NotReady);
        }

        let started = Instant::now();
        let position = self.scheduler.tick_count();
        let batch_size = self.scheduler.batch_size() as u64;

        // The buffer being played back was rendered one batch ago
        let frame = (self.scheduler.current_frame() + position as u64).saturating_sub(batch_size);
        let rendered = self.scheduler.output_buffer().sample(position);

        // Read before the boundary overwrites the buffer; emit only on success
        let closed = self.scheduler.tick()?;
        let sample = self.operation.apply(frame, rendered);
        self.scheduler.push(sample);
        self.pending += started.elapsed();

        if closed {
            let elapsed = std::mem::take(&mut self.pending);
            self.monitor.record(elapsed);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.scheduler.reset();
        self.monitor.reset();
        self.pending = Duration::ZERO;
    }

    fn state(&self) -> RunnerState {
        self.state
    }

    fn strategy(&self) -> Strategy {
        Strategy::RealTime
    }

    fn frames_per_tick(&self) -> usize {
        1
    }

    fn monitor(&self) -> &RealtimeMonitor {
        &self.monitor
    }
}

//
// ===============================
// MARK: Compiled, per buffer
// ===============================
//

/// Ticked once per buffer.
///
/// Each tick renders one batch, runs the frame operation over it (fused
/// into a single kernel call when the operation is fusable), and forwards
/// the processed buffer downstream. No latency.
pub struct CompiledRunner<A> {
    dispatch: CompiledDispatch<RenderCell<A>>,
    monitor: RealtimeMonitor,
    state: RunnerState,
}

impl<A: ArrangementRenderer> CompiledRunner<A> {
    pub fn new(
        config: &EngineConfig,
        scene: Rc<SceneContext>,
        renderer: A,
        channel: ChannelInfo,
        operation: FrameOperation,
        compiler: Option<&dyn KernelCompiler>,
        sink: Box<dyn AudioSink>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let mut dispatch = RenderCell::new(scene, renderer, channel, config.buffer_size)?
            .into_dispatch(operation, compiler)?;
        dispatch.set_sink(sink);

        Ok(Self {
            dispatch,
            monitor: RealtimeMonitor::for_config(config),
            state: RunnerState::Uninitialized,
        })
    }

    pub fn is_frame_op_compilable(&self) -> bool {
        self.dispatch.is_frame_op_compilable()
    }

    pub fn dispatch(&self) -> &CompiledDispatch<RenderCell<A>> {
        &self.dispatch
    }
}

impl<A: ArrangementRenderer> AudioRunner for CompiledRunner<A> {
    fn setup(&mut self) {
        self.reset();
        self.state = RunnerState::Ready;
        info!(
            "Compiled runner ready: {} frames per tick, fused: {}",
            self.dispatch.batch_size(),
            self.dispatch.is_frame_op_compilable()
        );
    }

    fn tick(&mut self) -> Result<()> {
        if self.state != RunnerState::Ready {
            return Err(SchedulerError::NotReady);
        }

        let started = Instant::now();
        self.dispatch.tick_batch()?;
        self.monitor.record(started.elapsed());
        Ok(())
    }

    fn reset(&mut self) {
        self.dispatch.reset();
        self.monitor.reset();
    }

    fn state(&self) -> RunnerState {
        self.state
    }

    fn strategy(&self) -> Strategy {
        Strategy::Compiled
    }

    fn frames_per_tick(&self) -> usize {
        self.dispatch.batch_size()
    }

    fn monitor(&self) -> &RealtimeMonitor {
        &self.monitor
    }
}

/// Build a runner for `strategy`. The compiled strategy uses the default
/// `BlockCompiler` backend.
pub fn build_runner<A: ArrangementRenderer + 'static>(
    strategy: Strategy,
    config: &EngineConfig,
    scene: Rc<SceneContext>,
    renderer: A,
    channel: ChannelInfo,
    operation: FrameOperation,
    sink: Box<dyn AudioSink>,
) -> std::result::Result<Box<dyn AudioRunner>, ConfigError> {
    Ok(match strategy {
        Strategy::Bulk { frames } => Box::new(BulkRunner::new(
            config, scene, renderer, channel, operation, frames, sink,
        )?),
        Strategy::RealTime => Box::new(RealTimeRunner::new(
            config, scene, renderer, channel, operation, sink,
        )?),
        Strategy::Compiled => {
            let compiler = BlockCompiler::default();
            Box::new(CompiledRunner::new(
                config,
                scene,
                renderer,
                channel,
                operation,
                Some(&compiler),
                sink,
            )?)
        }
    })
}
