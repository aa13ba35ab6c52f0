//! Timing for the editor's hot paths.
//!
//! Work that takes longer than one frame is logged at debug, the rest at
//! trace, both under the `quire::perf` target.

use web_time::Instant;

/// Slower than this is worth noticing in an interactive editor.
pub const FRAME_BUDGET_MS: f64 = 16.0;

/// Run `f` inside a [`TimingGuard`].
pub fn measure<T>(label: &'static str, f: impl FnOnce() -> T) -> T {
    let _guard = TimingGuard::new(label);
    f()
}

/// Logs the time between construction and drop.
pub struct TimingGuard {
    label: &'static str,
    start: Instant,
}

impl TimingGuard {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        if elapsed_ms > FRAME_BUDGET_MS {
            tracing::debug!(target: "quire::perf", label = self.label, elapsed_ms, "over frame budget");
        } else {
            tracing::trace!(target: "quire::perf", label = self.label, elapsed_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_returns_value() {
        assert_eq!(measure("add", || 2 + 2), 4);
    }

    #[test]
    fn test_guard_counts_up() {
        let guard = TimingGuard::new("noop");
        assert!(guard.elapsed_ms() >= 0.0);
    }
}
