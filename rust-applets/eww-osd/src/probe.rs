use crate::error::ProbeError;
use crate::exec::CommandRunner;
use serde::Serialize;
use std::sync::Arc;

const PACTL: &str = "pactl";
const DEFAULT_SINK: &str = "@DEFAULT_SINK@";

#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
pub struct VolumeState {
    pub level: u32,
    pub muted: bool,
}

// ==================================================================================
// TRAIT DEFINITION (Allows Mocking for Tests)
// ==================================================================================

pub trait AudioProbe: Send {
    fn volume(&self) -> Result<u32, ProbeError>;
    fn muted(&self) -> Result<bool, ProbeError>;

    /// Both values, or the first failure.
    fn read(&self) -> Result<VolumeState, ProbeError> {
        Ok(VolumeState {
            level: self.volume()?,
            muted: self.muted()?,
        })
    }
}

// ==================================================================================
// PACTL CLIENT (Real Implementation)
// ==================================================================================

#[derive(Clone)]
pub struct Pactl {
    runner: Arc<dyn CommandRunner>,
}

impl Pactl {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn set_volume(&self, percent: u32) -> Result<(), ProbeError> {
        let level = format!("{}%", percent);
        self.runner
            .run(PACTL, &["set-sink-volume", DEFAULT_SINK, &level])
            .map(|_| ())
    }

    pub fn set_muted(&self, muted: bool) -> Result<(), ProbeError> {
        let flag = if muted { "1" } else { "0" };
        self.runner
            .run(PACTL, &["set-sink-mute", DEFAULT_SINK, flag])
            .map(|_| ())
    }
}

impl AudioProbe for Pactl {
    fn volume(&self) -> Result<u32, ProbeError> {
        let out = self.runner.run(PACTL, &["get-sink-volume", DEFAULT_SINK])?;
        parse_volume(&out).ok_or_else(|| ProbeError::malformed(PACTL))
    }

    fn muted(&self) -> Result<bool, ProbeError> {
        let out = self.runner.run(PACTL, &["get-sink-mute", DEFAULT_SINK])?;
        Ok(parse_mute(&out))
    }
}

/// First whitespace token of the form `<digits>%`.
///
/// `Volume: front-left: 32768 /  50% / -18.06 dB, ...` yields 50.
pub fn parse_volume(out: &str) -> Option<u32> {
    out.split_whitespace().find_map(|token| {
        let digits = token.strip_suffix('%')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    })
}

pub fn parse_mute(out: &str) -> bool {
    out.contains("yes")
}

/// The next level for a relative step, clamped to `[0, ceiling]`.
pub fn step_level(current: u32, step: u32, up: bool, ceiling: u32) -> u32 {
    if up {
        current.saturating_add(step).min(ceiling)
    } else {
        current.saturating_sub(step).min(ceiling)
    }
}
