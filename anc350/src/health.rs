//! Communication health tracking
//!
//! Individual exchange failures are routine on a busy serial line, so a
//! single miss means nothing. Health latches to "lost" only after a long
//! unbroken run of failed poll cycles, and any success clears the run.

/// Consecutive failed poll cycles at which communication counts as lost.
pub const COMM_FAILURE_THRESHOLD: u32 = 200;

/// Consecutive-failure latch for one axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommHealth {
    failures: u32,
    lost: bool,
}

impl CommHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed poll cycle. Returns true exactly once, on the
    /// failure that trips the latch.
    pub fn record_failure(&mut self) -> bool {
        self.failures = self.failures.saturating_add(1);
        if self.failures == COMM_FAILURE_THRESHOLD {
            self.lost = true;
            return true;
        }
        false
    }

    /// Record a successful poll cycle. Returns true when this clears a
    /// tripped latch.
    pub fn record_success(&mut self) -> bool {
        let recovered = self.lost;
        self.failures = 0;
        self.lost = false;
        recovered
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn lost(&self) -> bool {
        self.lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_healthy_below_threshold() {
        let mut health = CommHealth::new();
        for _ in 0..COMM_FAILURE_THRESHOLD - 1 {
            assert!(!health.record_failure());
        }
        assert!(!health.lost());
        assert_eq!(health.failures(), COMM_FAILURE_THRESHOLD - 1);
    }

    #[test]
    fn latches_on_threshold_failure() {
        let mut health = CommHealth::new();
        for _ in 0..COMM_FAILURE_THRESHOLD - 1 {
            health.record_failure();
        }
        assert!(health.record_failure());
        assert!(health.lost());

        // Only the tripping failure reports the transition.
        assert!(!health.record_failure());
        assert!(health.lost());
    }

    #[test]
    fn any_success_clears_the_run() {
        let mut health = CommHealth::new();
        for _ in 0..COMM_FAILURE_THRESHOLD - 1 {
            health.record_failure();
        }
        assert!(!health.record_success());
        assert_eq!(health.failures(), 0);

        for _ in 0..COMM_FAILURE_THRESHOLD {
            health.record_failure();
        }
        assert!(health.lost());
        assert!(health.record_success());
        assert!(!health.lost());
    }
}
