use crate::config::OverlayConfig;
use crate::media::{MediaAction, MediaSource, TrackState};
use crate::probe::VolumeState;
use crate::surface::{place, Colors, Content, Frame, Surface};
use crate::timer::{earliest, Timer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Time the surface needs for its fade-out before it is hidden.
pub const HIDE_ANIMATION: Duration = Duration::from_millis(180);
/// Track info refresh period while the overlay is up.
pub const REFRESH_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    /// Visible with the auto-hide timer armed.
    Showing,
    /// Visible and hovered; the auto-hide timer is disarmed.
    Pinned,
}

/// The overlay state machine. Owns what is displayed and every timer that
/// decides when it goes away.
pub struct Osd {
    config: Arc<OverlayConfig>,
    surface: Box<dyn Surface>,
    media: Box<dyn MediaSource>,
    volume: VolumeState,
    track: TrackState,
    visibility: Visibility,
    hovered: bool,
    hide_timer: Timer,
    finish_hide: Timer,
    refresh: Timer,
}

impl Osd {
    pub fn new(
        config: Arc<OverlayConfig>,
        surface: Box<dyn Surface>,
        media: Box<dyn MediaSource>,
    ) -> Self {
        Self {
            config,
            surface,
            media,
            volume: VolumeState::default(),
            track: TrackState::default(),
            visibility: Visibility::Hidden,
            hovered: false,
            hide_timer: Timer::single_shot(),
            finish_hide: Timer::single_shot(),
            refresh: Timer::periodic(REFRESH_PERIOD),
        }
    }

    #[cfg(test)]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    #[cfg(test)]
    pub fn volume(&self) -> VolumeState {
        self.volume
    }

    #[cfg(test)]
    pub fn track(&self) -> &TrackState {
        &self.track
    }

    pub fn show_volume(&mut self, level: i64, muted: bool, now: Instant) {
        let ceiling = self.config.max_volume;
        self.volume = VolumeState {
            level: level.clamp(0, i64::from(ceiling)) as u32,
            muted,
        };
        self.refresh_media();
        self.show(now);
    }

    pub fn show(&mut self, now: Instant) {
        let config = Arc::clone(&self.config);
        let screen = self.surface.screen();
        let (x, y) = place(
            config.anchor,
            screen,
            config.width,
            config.height,
            config.margin_x,
            config.margin_y,
        );
        let frame = Frame {
            x,
            y,
            width: config.width,
            height: config.height,
            colors: Colors::from_config(&config),
            font: config.font_family.clone(),
            content: self.content(),
        };

        self.surface.display(&frame);
        self.surface.animate_in();
        self.finish_hide.stop();

        if self.hovered {
            self.hide_timer.stop();
            self.visibility = Visibility::Pinned;
        } else {
            self.hide_timer.start(now, config.timeout());
            self.visibility = Visibility::Showing;
        }

        if config.show_player && !self.refresh.is_active() {
            self.refresh.start_periodic(now);
        }
    }

    pub fn hover_changed(&mut self, hovering: bool, now: Instant) {
        self.hovered = hovering;
        if hovering {
            self.hide_timer.stop();
            if self.visibility == Visibility::Showing {
                self.visibility = Visibility::Pinned;
            }
        } else if self.visibility != Visibility::Hidden {
            // Always a fresh full timeout, never the remainder.
            self.hide_timer.start(now, self.config.timeout());
            self.visibility = Visibility::Showing;
        }
    }

    pub fn play_pause(&mut self) {
        self.control(MediaAction::PlayPause);
    }

    pub fn next(&mut self) {
        self.control(MediaAction::Next);
    }

    pub fn previous(&mut self) {
        self.control(MediaAction::Previous);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.hide_timer.deadline(),
            self.finish_hide.deadline(),
            self.refresh.deadline(),
        ])
    }

    pub fn fire_due(&mut self, now: Instant) {
        if self.hide_timer.fire(now) {
            self.auto_hide(now);
        }
        if self.finish_hide.fire(now) {
            self.surface.hide();
        }
        if self.refresh.fire(now) {
            self.refresh_media();
            if self.visibility != Visibility::Hidden {
                let content = self.content();
                self.surface.update(&content);
            }
        }
    }

    fn auto_hide(&mut self, now: Instant) {
        // Hover may have started after the timer was armed.
        if self.hovered {
            return;
        }
        self.refresh.stop();
        self.surface.animate_out();
        self.visibility = Visibility::Hidden;
        self.finish_hide.start(now, HIDE_ANIMATION);
    }

    fn refresh_media(&mut self) {
        self.track = match self.media.resolve() {
            Ok(track) => track,
            Err(e) => {
                debug!("no media source: {}", e);
                TrackState::default()
            }
        };
    }

    fn control(&mut self, action: MediaAction) {
        let Some(handle) = self.track.control.clone() else {
            return;
        };
        if let Err(e) = self.media.control(&handle, action) {
            debug!("{:?} on {:?} failed: {}", action, handle, e);
        }
    }

    fn content(&self) -> Content {
        Content::new(
            self.volume,
            self.config.max_volume,
            self.config.show_player,
            &self.track,
        )
    }
}
