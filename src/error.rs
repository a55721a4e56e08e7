// src/error.rs
//
// Error taxonomy for the batch scheduler and its collaborators.

use thiserror::Error;

/// Fatal problems detected while building a scheduler, cell, or runner.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Batch size must be positive")]
    ZeroBatchSize,

    #[error("Output buffer size must be positive")]
    ZeroOutputSize,

    #[error("Output buffer ({output} frames) is smaller than one batch ({batch} frames)")]
    OutputSmallerThanBatch { batch: usize, output: usize },

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Fusable frame operation supplied without a compiled-execution backend")]
    MissingCompiler,

    #[error("Frame operation failed to compile: {0}")]
    Compile(#[from] CompileError),

    #[error("Invalid arrangement: {0}")]
    InvalidArrangement(String),
}

/// Failure to lower a declarative frame expression into a kernel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Expression needs {needed} registers, backend supports {limit}")]
    TooManyRegisters { needed: usize, limit: usize },
}

/// Failures raised while producing a batch of audio.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Arrangement renderer failed: {0}")]
    Renderer(String),

    #[error("Compiled kernel failed: {0}")]
    Kernel(String),

    #[error("Window holds {expected} frames but the buffer holds {actual}")]
    WindowMismatch { expected: usize, actual: usize },
}

/// Errors surfaced to the driver by `tick()`, `render_now()`, and the runners.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Scheduler stalled after a failed render of batch {batch}; reset() required")]
    Stalled { batch: u64 },

    #[error("Runner ticked before setup()")]
    NotReady,
}

/// Result type for driver-facing operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
