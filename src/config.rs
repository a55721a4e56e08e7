// src/config.rs
//
// Engine configuration shared by every runner strategy.

use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for one render session.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Output sample rate (Hz)
    pub sample_rate: u32,

    /// Frames per batch / buffer
    pub buffer_size: usize,

    /// Consecutive overruns before the monitor reports degraded mode
    pub degraded_after: u32,

    /// Consecutive on-time buffers required to leave degraded mode
    pub recovery_cycles: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            buffer_size: 1024,
            degraded_after: 3,
            recovery_cycles: 4,
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_degraded_after(mut self, overruns: u32) -> Self {
        self.degraded_after = overruns;
        self
    }

    pub fn with_recovery_cycles(mut self, cycles: u32) -> Self {
        self.recovery_cycles = cycles;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }

    /// Wall-clock budget for rendering one buffer in real time.
    #[inline]
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_secs_f64(self.buffer_size as f64 / self.sample_rate as f64)
    }
}
