// src/monitor.rs
//
// Wall-clock observation of buffer renders against the real-time budget.
// An overrun is a soft signal: it is counted and logged, never enforced.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::EngineConfig;

/// Per-buffer timing statistics for one runner.
#[derive(Debug, Clone)]
pub struct RealtimeMonitor {
    /// Time available to render one buffer
    budget: Duration,

    /// Frames produced per recorded buffer
    buffer_frames: usize,

    degraded_after: u32,
    recovery_cycles: u32,

    buffers: u64,
    overruns: u64,
    total: Duration,
    longest: Duration,

    overrun_streak: u32,
    on_time_streak: u32,
    degraded: bool,

    /// Wall-clock start of the session, set by the first record
    started: Option<Instant>,
}

impl RealtimeMonitor {
    pub fn new(budget: Duration, degraded_after: u32, recovery_cycles: u32) -> Self {
        Self {
            budget,
            buffer_frames: 0,
            degraded_after: degraded_after.max(1),
            recovery_cycles: recovery_cycles.max(1),
            buffers: 0,
            overruns: 0,
            total: Duration::ZERO,
            longest: Duration::ZERO,
            overrun_streak: 0,
            on_time_streak: 0,
            degraded: false,
            started: None,
        }
    }

    /// Set the frames each recorded buffer contributes to `rendered_frames()`.
    pub fn with_buffer_frames(mut self, frames: usize) -> Self {
        self.buffer_frames = frames;
        self
    }

    /// Monitor for buffers of `config.buffer_size` frames.
    pub fn for_config(config: &EngineConfig) -> Self {
        Self::new(
            config.buffer_duration(),
            config.degraded_after,
            config.recovery_cycles,
        )
        .with_buffer_frames(config.buffer_size)
    }

    /// Record one buffer's render time. Returns `true` on overrun.
    pub fn record(&mut self, elapsed: Duration) -> bool {
        if self.started.is_none() {
            let now = Instant::now();
            self.started = Some(now.checked_sub(elapsed).unwrap_or(now));
        }
        self.buffers += 1;
        self.total += elapsed;
        self.longest = self.longest.max(elapsed);

        let overrun = elapsed > self.budget;
        if overrun {
            self.overruns += 1;
            self.overrun_streak = self.overrun_streak.saturating_add(1);
            debug!("Buffer overrun: {:?} > {:?}", elapsed, self.budget);
            self.on_time_streak = 0;
        } else {
            self.overrun_streak = 0;
            self.on_time_streak = self.on_time_streak.saturating_add(1);
        }

        self.update_degraded_mode(elapsed);
        overrun
    }

    /// Enter degraded mode after a streak of overruns; leave it only after
    /// a streak of on-time buffers.
    fn update_degraded_mode(&mut self, elapsed: Duration) {
        if !self.degraded && self.overrun_streak >= self.degraded_after {
            self.degraded = true;
            warn!(
                "Entering degraded mode: {} consecutive overruns (last {:?}, budget {:?})",
                self.overrun_streak, elapsed, self.budget
            );
        } else if self.degraded && self.on_time_streak >= self.recovery_cycles {
            self.degraded = false;
            info!("Exiting degraded mode: performance restored");
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.budget, self.degraded_after, self.recovery_cycles)
            .with_buffer_frames(self.buffer_frames);
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    #[inline]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    #[inline]
    pub fn buffers(&self) -> u64 {
        self.buffers
    }

    #[inline]
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn overrun_ratio(&self) -> f64 {
        if self.buffers == 0 {
            return 0.0;
        }
        self.overruns as f64 / self.buffers as f64
    }

    pub fn average_duration(&self) -> Duration {
        if self.buffers == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.total.as_nanos() / self.buffers as u128) as u64)
    }

    #[inline]
    pub fn longest_duration(&self) -> Duration {
        self.longest
    }

    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    #[inline]
    pub fn rendered_frames(&self) -> u64 {
        self.buffers * self.buffer_frames as u64
    }

    /// Audio time produced so far: one budget per recorded buffer.
    pub fn rendered_duration(&self) -> Duration {
        Duration::from_secs_f64(self.budget.as_secs_f64() * self.buffers as f64)
    }

    /// Wall-clock time since the first recorded buffer started.
    pub fn real_duration(&self) -> Duration {
        self.started.map_or(Duration::ZERO, |started| started.elapsed())
    }

    /// Seconds of rendered audio ahead of wall-clock time. Negative when
    /// rendering has fallen behind.
    pub fn rendering_gap(&self) -> f64 {
        self.rendered_duration().as_secs_f64() - self.real_duration().as_secs_f64()
    }

    /// True when buffers have been measured and they fit the budget on average.
    pub fn is_feasible(&self) -> bool {
        self.buffers > 0 && self.average_duration() <= self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_counts_overruns() {
        let mut monitor = RealtimeMonitor::new(ms(10), 3, 4);
        assert!(!monitor.record(ms(5)));
        assert!(monitor.record(ms(15)));
        assert!(!monitor.record(ms(10)));

        assert_eq!(monitor.buffers(), 3);
        assert_eq!(monitor.overruns(), 1);
        assert!((monitor.overrun_ratio() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(monitor.average_duration(), ms(10));
        assert_eq!(monitor.longest_duration(), ms(15));
        assert!(monitor.is_feasible());
    }

    #[test]
    fn test_degraded_mode_hysteresis() {
        let mut monitor = RealtimeMonitor::new(ms(10), 3, 4);
        monitor.record(ms(20));
        monitor.record(ms(20));
        assert!(!monitor.is_degraded());
        monitor.record(ms(20));
        assert!(monitor.is_degraded());

        for _ in 0..3 {
            monitor.record(ms(1));
        }
        assert!(monitor.is_degraded());

        // A single overrun restarts the recovery count
        monitor.record(ms(20));
        for _ in 0..3 {
            monitor.record(ms(1));
        }
        assert!(monitor.is_degraded());
        monitor.record(ms(1));
        assert!(!monitor.is_degraded());
    }

    #[test]
    fn test_empty_monitor() {
        let monitor = RealtimeMonitor::for_config(&EngineConfig::default());
        assert_eq!(monitor.average_duration(), Duration::ZERO);
        assert_eq!(monitor.overrun_ratio(), 0.0);
        assert!(!monitor.is_feasible());
    }

    #[test]
    fn test_streaks_saturate() {
        let mut monitor = RealtimeMonitor::new(ms(10), 3, 4);
        monitor.on_time_streak = u32::MAX;
        monitor.record(ms(1));
        assert_eq!(monitor.on_time_streak, u32::MAX);

        monitor.overrun_streak = u32::MAX;
        monitor.degraded = true;
        monitor.record(ms(20));
        assert_eq!(monitor.overrun_streak, u32::MAX);
        assert!(monitor.is_degraded());
    }

    #[test]
    fn test_rendered_frames_and_gap() {
        let config = EngineConfig::default().with_buffer_size(441);
        let mut monitor = RealtimeMonitor::for_config(&config);
        assert_eq!(monitor.rendered_frames(), 0);
        assert_eq!(monitor.rendering_gap(), 0.0);

        // Ten 10ms buffers recorded almost instantly run well ahead of the clock
        for _ in 0..10 {
            monitor.record(Duration::from_micros(1));
        }
        assert_eq!(monitor.rendered_frames(), 4410);
        assert_relative_eq!(monitor.rendered_duration().as_secs_f64(), 0.1, epsilon = 1e-6);
        assert!(monitor.rendering_gap() > 0.05);

        monitor.reset();
        assert_eq!(monitor.rendered_frames(), 0);
        assert_eq!(monitor.real_duration(), Duration::ZERO);
    }

    #[test]
    fn test_reset_keeps_budget() {
        let mut monitor = RealtimeMonitor::new(ms(10), 1, 1);
        monitor.record(ms(50));
        assert!(monitor.is_degraded());
        monitor.reset();
        assert_eq!(monitor.buffers(), 0);
        assert!(!monitor.is_degraded());
        assert_eq!(monitor.budget(), ms(10));
    }
}
