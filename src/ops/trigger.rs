// ============================================================================
// DEBOUNCE: trailing-edge timers driven by an explicit clock
// ============================================================================
//
// The session is polled from the UI loop (or the CLI's virtual clock), so a
// timer here is just a deadline. Rescheduling overwrites the deadline, which
// makes "cancel and restart" the only possible behavior: there is never more
// than one pending fire.

use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None }
    }

    /// Start (or restart) the quiet period at `now`.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` exactly once when the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
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
    use pretty_assertions::assert_eq;

    const DELAY: Duration = Duration::from_millis(800);

    #[test]
    fn fires_once_after_quiet_period() {
        let t0 = Instant::now();
        let mut timer = Debouncer::new(DELAY);
        assert!(!timer.poll(t0 + DELAY));

        timer.schedule(t0);
        assert!(timer.is_pending());
        assert!(!timer.poll(t0 + Duration::from_millis(799)));
        assert!(timer.poll(t0 + DELAY));
        assert!(!timer.poll(t0 + DELAY * 2));
        assert!(!timer.is_pending());
    }

    #[test]
    fn burst_coalesces_to_the_last_event() {
        let t0 = Instant::now();
        let mut timer = Debouncer::new(DELAY);
        let mut fires = 0;
        for i in 0..5u64 {
            let now = t0 + Duration::from_millis(i * 150);
            if timer.poll(now) {
                fires += 1;
            }
            timer.schedule(now);
        }
        let last = t0 + Duration::from_millis(600);
        assert_eq!(timer.deadline(), Some(last + DELAY));
        assert!(!timer.poll(t0 + Duration::from_millis(1300)));
        if timer.poll(last + DELAY) {
            fires += 1;
        }
        assert_eq!(fires, 1);
    }

    #[test]
    fn cancel_drops_pending_fire() {
        let t0 = Instant::now();
        let mut timer = Debouncer::new(DELAY);
        timer.schedule(t0);
        timer.cancel();
        assert!(!timer.poll(t0 + DELAY * 3));
    }
}
