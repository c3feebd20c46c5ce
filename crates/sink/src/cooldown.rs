use std::time::Duration;

use tokio::time::Instant;

/// Earliest instant the next send attempt is allowed.
///
/// Backed by the monotonic clock, so wall-clock adjustments cannot shrink or
/// stretch the spacing between posts. The deadline never moves backwards.
#[derive(Debug, Default)]
pub struct CooldownState {
    next_allowed: Option<Instant>,
}

impl CooldownState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.is_ready_at(Instant::now())
    }

    #[must_use]
    pub fn is_ready_at(&self, now: Instant) -> bool {
        self.next_allowed.is_none_or(|deadline| now >= deadline)
    }

    /// Arm the cooldown after an attempt made at `now`. The longer of the
    /// configured minimum interval and the server-requested wait applies.
    pub fn arm(&mut self, min_interval: Duration, wait: Duration) {
        self.arm_at(Instant::now(), min_interval, wait);
    }

    pub fn arm_at(&mut self, now: Instant, min_interval: Duration, wait: Duration) {
        let deadline = now + min_interval.max(wait);
        self.next_allowed = Some(match self.next_allowed {
            Some(existing) => existing.max(deadline),
            None => deadline,
        });
    }
}
