// src/render_cell.rs
//
// Binds a batch scheduler to an arrangement renderer and a channel.

use std::rc::Rc;

use crate::batch::{BatchRender, BatchScheduler};
use crate::dispatch::{CompiledDispatch, FrameOperation};
use crate::error::{ConfigError, RenderError};
use crate::frame_window::FrameWindow;
use crate::kernel::KernelCompiler;
use crate::scene::{ChannelInfo, SceneContext};

/// External capability that knows which notes sound when.
///
/// Must accept non-overlapping, increasing windows it has never seen
/// before, and must tolerate material that starts before the window or
/// runs past its end. `output` is zeroed by the caller and holds exactly
/// `window.frame_count()` frames; renderers sum into it.
pub trait ArrangementRenderer {
    fn render(
        &mut self,
        window: &FrameWindow<'_>,
        channel: ChannelInfo,
        output: &mut [f32],
    ) -> Result<(), RenderError>;
}

impl<A: ArrangementRenderer + ?Sized> ArrangementRenderer for Box<A> {
    fn render(
        &mut self,
        window: &FrameWindow<'_>,
        channel: ChannelInfo,
        output: &mut [f32],
    ) -> Result<(), RenderError> {
        (**self).render(window, channel, output)
    }
}

/// The render action of a scheduler: on each boundary it renders exactly
/// `[start_frame, start_frame + buffer_size)` of one channel.
pub struct RenderCell<A> {
    scene: Rc<SceneContext>,
    renderer: A,
    channel: ChannelInfo,
    buffer_size: usize,
}

impl<A: ArrangementRenderer> RenderCell<A> {
    pub fn new(
        scene: Rc<SceneContext>,
        renderer: A,
        channel: ChannelInfo,
        buffer_size: usize,
    ) -> Result<Self, ConfigError> {
        if buffer_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(Self {
            scene,
            renderer,
            channel,
            buffer_size,
        })
    }

    /// Drive this cell from a plain per-tick scheduler.
    pub fn into_scheduler(self) -> Result<BatchScheduler<Self>, ConfigError> {
        BatchScheduler::new(self.buffer_size, self)
    }

    /// Drive this cell from a dispatching scheduler.
    pub fn into_dispatch(
        self,
        operation: FrameOperation,
        compiler: Option<&dyn KernelCompiler>,
    ) -> Result<CompiledDispatch<Self>, ConfigError> {
        CompiledDispatch::new(self.into_scheduler()?, operation, compiler)
    }

    #[inline]
    pub fn channel(&self) -> ChannelInfo {
        self.channel
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.buffer_size
    }
}

impl<A: ArrangementRenderer> BatchRender for RenderCell<A> {
    fn render_batch(&mut self, start_frame: u64, output: &mut [f32]) -> Result<(), RenderError> {
        if output.len() < self.buffer_size {
            return Err(RenderError::WindowMismatch {
                expected: self.buffer_size,
                actual: output.len(),
            });
        }

        let out = &mut output[..self.buffer_size];
        out.fill(0.0);

        let window = FrameWindow::new(&self.scene, start_frame as i64, self.buffer_size);
        self.renderer.render(&window, self.channel, out)
    }
}
