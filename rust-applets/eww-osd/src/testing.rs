//! Mock backends shared by the state machine and event loop tests.

use crate::error::ProbeError;
use crate::media::{ControlHandle, MediaAction, MediaSource, TrackState};
use crate::probe::{AudioProbe, VolumeState};
use crate::surface::{Content, Frame, Rect, Surface};
use std::sync::{Arc, Mutex};

pub type Log<T> = Arc<Mutex<Vec<T>>>;

pub fn new_log<T>() -> Log<T> {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    Display(i32, i32, u32, bool),
    AnimateIn,
    AnimateOut,
    Hide,
    Update(String),
}

pub struct RecordingSurface {
    pub log: Log<Cmd>,
}

impl Surface for RecordingSurface {
    fn screen(&mut self) -> Rect {
        Rect {
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
        }
    }
    fn display(&mut self, frame: &Frame) {
        self.log.lock().unwrap().push(Cmd::Display(
            frame.x,
            frame.y,
            frame.content.volume,
            frame.content.muted,
        ));
    }
    fn animate_in(&mut self) {
        self.log.lock().unwrap().push(Cmd::AnimateIn);
    }
    fn animate_out(&mut self) {
        self.log.lock().unwrap().push(Cmd::AnimateOut);
    }
    fn hide(&mut self) {
        self.log.lock().unwrap().push(Cmd::Hide);
    }
    fn update(&mut self, content: &Content) {
        self.log
            .lock()
            .unwrap()
            .push(Cmd::Update(content.track.title.clone()));
    }
}

pub struct FakeMedia {
    pub track: Option<TrackState>,
    pub resolves: Arc<Mutex<u32>>,
    pub controls: Log<(ControlHandle, MediaAction)>,
}

impl MediaSource for FakeMedia {
    fn resolve(&mut self) -> Result<TrackState, ProbeError> {
        *self.resolves.lock().unwrap() += 1;
        self.track.clone().ok_or(ProbeError::NoPlayers)
    }
    fn control(&mut self, handle: &ControlHandle, action: MediaAction) -> Result<(), ProbeError> {
        self.controls.lock().unwrap().push((handle.clone(), action));
        Ok(())
    }
}

/// Returns whatever the test last stored; `None` means pactl is missing.
#[derive(Clone, Default)]
pub struct ScriptedAudio {
    pub state: Arc<Mutex<Option<VolumeState>>>,
    pub reads: Arc<Mutex<u32>>,
}

impl ScriptedAudio {
    pub fn set(&self, level: u32, muted: bool) {
        *self.state.lock().unwrap() = Some(VolumeState { level, muted });
    }
}

impl AudioProbe for ScriptedAudio {
    fn volume(&self) -> Result<u32, ProbeError> {
        *self.reads.lock().unwrap() += 1;
        self.state
            .lock()
            .unwrap()
            .map(|s| s.level)
            .ok_or_else(|| ProbeError::unavailable("pactl", "not installed"))
    }
    fn muted(&self) -> Result<bool, ProbeError> {
        self.state
            .lock()
            .unwrap()
            .map(|s| s.muted)
            .ok_or_else(|| ProbeError::unavailable("pactl", "not installed"))
    }
}
