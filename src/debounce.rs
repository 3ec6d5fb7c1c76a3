use std::time::{Duration, Instant};

/// Coalesces bursts of events into one evaluation per quiet period. Every
/// `schedule` pushes the deadline out again.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True exactly once per quiet period that has elapsed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bursts_collapse_into_one_fire() {
        let quiet = Duration::from_millis(100);
        let mut debouncer = Debouncer::new(quiet);
        let t0 = Instant::now();

        debouncer.schedule(t0);
        debouncer.schedule(t0 + Duration::from_millis(60));
        assert!(!debouncer.fire(t0 + Duration::from_millis(120)));
        assert!(debouncer.fire(t0 + Duration::from_millis(160)));
        assert!(!debouncer.fire(t0 + Duration::from_millis(500)));
    }

    #[test]
    fn cancel_drops_the_pending_fire() {
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        let t0 = Instant::now();
        debouncer.schedule(t0);
        assert_eq!(debouncer.deadline(), Some(t0 + Duration::from_millis(10)));
        debouncer.cancel();
        assert!(!debouncer.fire(t0 + Duration::from_secs(1)));
        assert_eq!(debouncer.deadline(), None);
    }
}
