use std::time::Duration;

/// Delay before retry `n` (0-indexed) is `first × factor^n`, capped at `max`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub first: Duration,
    pub max: Duration,
    pub factor: f64,
}

impl BackoffPolicy {
    /// Doubling delays starting at `first`
    pub fn doubling(first: Duration, max: Duration) -> Self {
        BackoffPolicy { first, max, factor: 2.0 }
    }

    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
