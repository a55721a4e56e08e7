// src/lib.rs
//
// Library entry point: batch scheduling and dispatch for real-time
// arrangement rendering.

pub mod analysis;
pub mod arrangement;
pub mod audio_buffer;
pub mod batch;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod frame_window;
pub mod kernel;
pub mod monitor;
pub mod render_cell;
pub mod runner;
pub mod scene;
pub mod sink;
pub mod transport;


// Re-export key types for Rust consumers
pub use analysis::AudioStats;
pub use arrangement::{NoteArrangement, NoteEvent};
pub use batch::{BatchRender, BatchScheduler};
pub use config::EngineConfig;
pub use dispatch::{CompiledDispatch, FrameOperation};
pub use error::{CompileError, ConfigError, RenderError, SchedulerError};
pub use frame_window::FrameWindow;
pub use kernel::{BlockCompiler, FrameExpr, FrameKernel, KernelCompiler};
pub use monitor::RealtimeMonitor;
pub use render_cell::{ArrangementRenderer, RenderCell};
pub use runner::{
    build_runner, AudioRunner, BulkRunner, CompiledRunner, RealTimeRunner, RunnerState, Strategy,
};
pub use scene::{ChannelInfo, SceneContext, StereoChannel};
pub use sink::{AudioSink, NullSink};
pub use transport::MeasureClock;
