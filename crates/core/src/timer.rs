//! Wall-clock timer and deterministic simulation clock.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-step clock that advances once per rendered frame.
///
/// Animation driven by this clock depends only on the number of frames
/// rendered, never on wall-clock pacing, so two runs that render the same
/// number of frames produce identical wave states.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationClock {
    ticks: u64,
    step: f64,
}

impl SimulationClock {
    /// Default step: one 60 Hz frame.
    pub const DEFAULT_STEP: f64 = 1.0 / 60.0;

    /// Create a clock with the given step in seconds.
    ///
    /// Non-finite or non-positive steps fall back to [`Self::DEFAULT_STEP`].
    pub fn new(step: f64) -> Self {
        let step = if step.is_finite() && step > 0.0 {
            step
        } else {
            Self::DEFAULT_STEP
        };
        Self { ticks: 0, step }
    }

    /// Advance by exactly one step.
    pub fn advance(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    /// Number of steps taken so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Simulated time in seconds.
    pub fn seconds(&self) -> f64 {
        self.ticks as f64 * self.step
    }

    /// Phase of a sinusoid advancing `rate` radians per simulated second,
    /// wrapped to `[0, 2π)`. See [`wrapped_phase`].
    pub fn phase(&self, rate: f64) -> f32 {
        wrapped_phase(self.seconds(), rate)
    }
}

/// `seconds * rate` reduced to `[0, 2π)` in `f64` before narrowing.
///
/// `sin(wrapped_phase(t, r))` equals `sin(t * r)` for any `r`, so shaders can
/// add the result to a spatial phase without losing `f32` precision as `t`
/// grows.
pub fn wrapped_phase(seconds: f64, rate: f64) -> f32 {
    (seconds * rate).rem_euclid(std::f64::consts::TAU) as f32
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STEP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_clock_is_monotonic() {
        let mut clock = SimulationClock::default();
        let mut last = clock.seconds();
        for _ in 0..1000 {
            clock.advance();
            assert!(clock.seconds() > last);
            last = clock.seconds();
        }
        assert_eq!(clock.ticks(), 1000);
    }

    #[test]
    fn test_simulation_clock_is_deterministic() {
        let mut a = SimulationClock::new(0.01);
        let mut b = SimulationClock::new(0.01);
        for _ in 0..250 {
            a.advance();
        }
        // Interleave with unrelated work; only the tick count matters.
        for _ in 0..250 {
            std::thread::yield_now();
            b.advance();
        }
        assert_eq!(a, b);
        assert!((a.seconds() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_step_uses_default() {
        assert_eq!(
            SimulationClock::new(0.0),
            SimulationClock::new(SimulationClock::DEFAULT_STEP)
        );
        assert_eq!(
            SimulationClock::new(f64::NAN),
            SimulationClock::new(SimulationClock::DEFAULT_STEP)
        );
    }

    #[test]
    fn test_phase_wraps_into_one_period() {
        let mut clock = SimulationClock::new(1000.0);
        for _ in 0..10 {
            clock.advance();
        }
        let phase = clock.phase(1.0);
        assert!(phase >= 0.0);
        assert!(f64::from(phase) < std::f64::consts::TAU);
        assert!(wrapped_phase(1.0, -0.5) >= 0.0);
    }

    #[test]
    fn test_phase_matches_unwrapped_sine_for_fractional_rates() {
        let mut clock = SimulationClock::default();
        // Hours of frames, well past where f32 seconds lose sub-frame detail.
        for _ in 0..1_000_000 {
            clock.advance();
        }
        for rate in [0.37, 1.0, 2.5, -1.3] {
            let exact = (clock.seconds() * rate).sin();
            let wrapped = f64::from(clock.phase(rate)).sin();
            assert!((exact - wrapped).abs() < 1e-5, "rate {rate}: {exact} vs {wrapped}");
        }
    }
}
