use crate::probe::{AudioProbe, VolumeState};
use crate::timer::Timer;
use std::time::{Duration, Instant};
use tracing::debug;

/// Quiet period after the last `pactl subscribe` line before polling.
pub const POLL_QUIET: Duration = Duration::from_millis(80);

/// Turns bursts of "maybe the volume moved" into at most one change event
/// per settled burst, and only when the observed pair actually differs.
#[derive(Debug)]
pub struct Coordinator {
    last: Option<VolumeState>,
    debounce: Timer,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            last: None,
            debounce: Timer::single_shot(),
        }
    }

    pub fn possible_change(&mut self, now: Instant) {
        self.debounce.start(now, POLL_QUIET);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// Runs the pending poll if its quiet period is over.
    pub fn poll_due(&mut self, now: Instant, audio: &dyn AudioProbe) -> Option<VolumeState> {
        if !self.debounce.fire(now) {
            return None;
        }
        match audio.read() {
            Ok(observed) => self.observe(observed),
            Err(e) => {
                debug!("volume poll skipped: {}", e);
                None
            }
        }
    }

    /// Compares against the baseline; the first observation only sets it.
    pub fn observe(&mut self, observed: VolumeState) -> Option<VolumeState> {
        match self.last.replace(observed) {
            None => None,
            Some(previous) if previous == observed => None,
            Some(_) => Some(observed),
        }
    }
}
