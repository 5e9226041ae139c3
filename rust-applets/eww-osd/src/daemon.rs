use crate::config::OverlayConfig;
use crate::coordinator::Coordinator;
use crate::dbus::{self, Registration};
use crate::exec::SystemRunner;
use crate::listener::{Listener, Subscription};
use crate::media::{MprisBus, Playerctl, Resolver};
use crate::osd::Osd;
use crate::probe::{AudioProbe, Pactl};
use crate::surface::{EwwSurface, Rect, SwayOutputs};
use crate::timer::earliest;
use std::ops::ControlFlow;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

/// Everything that can wake the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A `pactl subscribe` line mentioned a sink or the server.
    PossibleVolumeChange,
    /// `playerctl -F` printed a line.
    PossibleMediaChange,
    /// Probe the current volume and show it.
    ShowCurrent,
    ShowVolume { level: i64, muted: bool },
    Hover(bool),
    PlayPause,
    Next,
    Previous,
    Shutdown,
}

// ==================================================================================
// EVENT LOOP
// ==================================================================================

/// Owns the overlay and the coordinator; runs on a single thread.
pub struct EventLoop {
    osd: Osd,
    coordinator: Coordinator,
    audio: Box<dyn AudioProbe>,
}

impl EventLoop {
    pub fn new(osd: Osd, audio: Box<dyn AudioProbe>) -> Self {
        Self {
            osd,
            coordinator: Coordinator::new(),
            audio,
        }
    }

    #[cfg(test)]
    pub fn osd(&self) -> &Osd {
        &self.osd
    }

    pub fn dispatch(&mut self, signal: Signal, now: Instant) -> ControlFlow<()> {
        match signal {
            Signal::PossibleVolumeChange => self.coordinator.possible_change(now),
            // Media changes skip the debounce and the change gate.
            Signal::PossibleMediaChange | Signal::ShowCurrent => self.show_current(now),
            Signal::ShowVolume { level, muted } => self.osd.show_volume(level, muted, now),
            Signal::Hover(hovering) => self.osd.hover_changed(hovering, now),
            Signal::PlayPause => self.osd.play_pause(),
            Signal::Next => self.osd.next(),
            Signal::Previous => self.osd.previous(),
            Signal::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    pub fn fire_due(&mut self, now: Instant) {
        if let Some(changed) = self.coordinator.poll_due(now, self.audio.as_ref()) {
            self.osd
                .show_volume(i64::from(changed.level), changed.muted, now);
        }
        self.osd.fire_due(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([self.coordinator.deadline(), self.osd.next_deadline()])
    }

    fn show_current(&mut self, now: Instant) {
        let level = self.audio.volume().unwrap_or_else(|e| {
            debug!("volume unknown, showing 0: {}", e);
            0
        });
        let muted = self.audio.muted().unwrap_or_else(|e| {
            debug!("mute state unknown, assuming unmuted: {}", e);
            false
        });
        self.osd.show_volume(i64::from(level), muted, now);
    }

    /// Blocks until `Shutdown` arrives or every sender is gone.
    pub fn run(&mut self, signals: &Receiver<Signal>) {
        loop {
            let received = match self.next_deadline() {
                Some(deadline) => {
                    match signals.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(signal) => Some(signal),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match signals.recv() {
                    Ok(signal) => Some(signal),
                    Err(_) => break,
                },
            };

            let now = Instant::now();
            if let Some(signal) = received {
                if self.dispatch(signal, now).is_break() {
                    break;
                }
            }
            self.fire_due(now);
        }
    }
}

// ==================================================================================
// DAEMON LOGIC
// ==================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Follow `pactl subscribe` and `playerctl -F` until shut down.
    Listen,
    /// Show the current volume once, then keep serving the bus.
    ShowOnce,
}

pub fn run(handle: &Handle, config: Arc<OverlayConfig>, mode: Mode) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel();

    let _connection = match handle.block_on(dbus::serve(tx.clone()))? {
        Registration::Serving(connection) => connection,
        Registration::AlreadyRunning => {
            info!("{} is already running", dbus::SERVICE_NAME);
            return Ok(());
        }
    };
    info!("serving {} at {}", dbus::SERVICE_NAME, dbus::OBJECT_PATH);

    let runner = Arc::new(SystemRunner::new(handle.clone(), config.command_timeout()));
    let audio = Pactl::new(runner.clone());
    let media = Resolver::new(
        Playerctl::new(runner),
        MprisBus::new(handle.clone(), config.command_timeout()),
    );
    let fallback = Rect {
        x: 0,
        y: 0,
        width: config.screen_width,
        height: config.screen_height,
    };
    let outputs = SwayOutputs::new(handle.clone(), config.command_timeout());
    let surface = EwwSurface::new(std::io::stdout(), fallback, Some(outputs));
    let osd = Osd::new(config.clone(), Box::new(surface), Box::new(media));
    let mut event_loop = EventLoop::new(osd, Box::new(audio));

    let mut listeners = Vec::new();
    match mode {
        Mode::Listen => {
            if config.listen_pactl {
                listeners.push(Listener::spawn(handle, Subscription::audio(), tx.clone()));
            }
            if config.listen_media {
                listeners.push(Listener::spawn(handle, Subscription::media(), tx.clone()));
            }
        }
        Mode::ShowOnce => {
            let _ = tx.send(Signal::ShowCurrent);
        }
    }

    handle.spawn(wait_for_shutdown(tx));
    event_loop.run(&rx);

    for listener in listeners {
        listener.stop(handle);
    }
    info!("shut down");
    Ok(())
}

async fn wait_for_shutdown(signals: Sender<Signal>) {
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("SIGTERM handler unavailable: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
    let _ = signals.send(Signal::Shutdown);
}
