use std::time::{Duration, Instant};

/// A single-owner timer driven by the event loop.
///
/// The timer never fires on its own: the loop sleeps until the earliest
/// [`Timer::deadline`] and then calls [`Timer::fire`] with the current time.
/// `start` always replaces a pending deadline, so a timer can never be
/// queued twice.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    deadline: Option<Instant>,
    period: Option<Duration>,
}

impl Timer {
    pub fn single_shot() -> Self {
        Self::default()
    }

    pub fn periodic(period: Duration) -> Self {
        Self {
            deadline: None,
            period: Some(period),
        }
    }

    /// Cancels any pending fire and schedules the next one `after` from `now`.
    pub fn start(&mut self, now: Instant, after: Duration) {
        self.deadline = Some(now + after);
    }

    /// Starts a periodic timer with its own period.
    pub fn start_periodic(&mut self, now: Instant) {
        if let Some(period) = self.period {
            self.start(now, period);
        }
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true when the timer was due at `now`, consuming the fire.
    /// Periodic timers re-arm from `now`; single-shot timers go idle.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = self.period.map(|period| now + period);
                true
            }
            _ => false,
        }
    }
}

/// Earliest of a set of optional deadlines.
pub fn earliest(deadlines: impl IntoIterator<Item = Option<Instant>>) -> Option<Instant> {
    deadlines.into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn single_shot_fires_once() {
        let t0 = Instant::now();
        let mut timer = Timer::single_shot();
        timer.start(t0, 10 * MS);

        assert!(!timer.fire(t0 + 9 * MS));
        assert!(timer.fire(t0 + 10 * MS));
        assert!(!timer.fire(t0 + 20 * MS));
        assert!(!timer.is_active());
    }

    #[test]
    fn restart_replaces_pending_deadline() {
        let t0 = Instant::now();
        let mut timer = Timer::single_shot();
        timer.start(t0, 10 * MS);
        timer.start(t0 + 5 * MS, 10 * MS);

        assert!(!timer.fire(t0 + 10 * MS));
        assert!(timer.fire(t0 + 15 * MS));
    }

    #[test]
    fn periodic_rearms_after_fire() {
        let t0 = Instant::now();
        let mut timer = Timer::periodic(100 * MS);
        timer.start_periodic(t0);

        assert!(timer.fire(t0 + 100 * MS));
        assert_eq!(timer.deadline(), Some(t0 + 200 * MS));
        timer.stop();
        assert!(!timer.fire(t0 + 300 * MS));
    }

    #[test]
    fn earliest_ignores_idle_timers() {
        let t0 = Instant::now();
        assert_eq!(earliest([None, Some(t0 + MS), Some(t0)]), Some(t0));
        assert_eq!(earliest([None, None]), None);
    }
}
