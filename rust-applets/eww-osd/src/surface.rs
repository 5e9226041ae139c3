use crate::config::{Anchor, OverlayConfig};
use crate::media::TrackState;
use crate::probe::VolumeState;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use swayipc::Connection;
use tokio::runtime::Handle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Top-left corner of a `width`x`height` box anchored inside `screen`.
pub fn place(anchor: Anchor, screen: Rect, width: i32, height: i32, margin_x: i32, margin_y: i32) -> (i32, i32) {
    let left = screen.x + margin_x;
    let right = screen.x + screen.width - width - margin_x;
    let top = screen.y + margin_y;
    let bottom = screen.y + screen.height - height - margin_y;
    match anchor {
        Anchor::TopLeft => (left, top),
        Anchor::TopRight => (right, top),
        Anchor::BottomLeft => (left, bottom),
        Anchor::BottomRight => (right, bottom),
    }
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct Colors {
    pub background: String,
    pub accent: String,
    pub text: String,
}

impl Colors {
    pub fn from_config(config: &OverlayConfig) -> Self {
        Colors {
            background: config.background_color.clone(),
            accent: config.accent_color.clone(),
            text: config.text_color.clone(),
        }
    }
}

/// What the overlay shows.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct Content {
    pub volume: u32,
    pub muted: bool,
    /// Level as a share of the configured ceiling, for progress bars.
    pub percent: u32,
    pub show_player: bool,
    pub track: TrackState,
}

impl Content {
    pub fn new(volume: VolumeState, ceiling: u32, show_player: bool, track: &TrackState) -> Self {
        Content {
            volume: volume.level,
            muted: volume.muted,
            percent: if ceiling == 0 {
                0
            } else {
                (u64::from(volume.level) * 100 / u64::from(ceiling)) as u32
            },
            show_player,
            track: track.clone(),
        }
    }
}

/// Everything `display` needs: where, how big, how it looks, what it says.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct Frame {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub colors: Colors,
    pub font: String,
    pub content: Content,
}

// ==================================================================================
// TRAIT DEFINITION (Allows Mocking for Tests)
// ==================================================================================

pub trait Surface: Send {
    /// Area the overlay is anchored in.
    fn screen(&mut self) -> Rect;
    fn display(&mut self, frame: &Frame);
    fn animate_in(&mut self);
    fn animate_out(&mut self);
    fn hide(&mut self);
    /// New content for an already displayed frame.
    fn update(&mut self, content: &Content);
}

// ==================================================================================
// EWW SURFACE (Real Implementation)
// ==================================================================================

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum Animation {
    None,
    In,
    Out,
}

#[derive(Serialize)]
struct EwwLine<'a> {
    visible: bool,
    animation: Animation,
    #[serde(flatten)]
    frame: &'a Frame,
}

/// Prints one JSON line per command for an eww `deflisten` widget.
pub struct EwwSurface<W: Write + Send> {
    out: W,
    fallback: Rect,
    outputs: Option<SwayOutputs>,
    frame: Frame,
    visible: bool,
    animation: Animation,
}

impl<W: Write + Send> EwwSurface<W> {
    /// Without sway outputs the overlay always anchors in `fallback`.
    pub fn new(out: W, fallback: Rect, outputs: Option<SwayOutputs>) -> Self {
        Self {
            out,
            fallback,
            outputs,
            frame: Frame::default(),
            visible: false,
            animation: Animation::None,
        }
    }

    fn emit(&mut self) {
        let line = EwwLine {
            visible: self.visible,
            animation: self.animation,
            frame: &self.frame,
        };
        let written = serde_json::to_string(&line)
            .map_err(std::io::Error::from)
            .and_then(|json| {
                writeln!(self.out, "{}", json)?;
                self.out.flush()
            });
        if let Err(e) = written {
            warn!("failed to write overlay state: {}", e);
        }
    }
}

impl<W: Write + Send> Surface for EwwSurface<W> {
    fn screen(&mut self) -> Rect {
        self.outputs
            .as_mut()
            .and_then(SwayOutputs::focused)
            .unwrap_or(self.fallback)
    }

    fn display(&mut self, frame: &Frame) {
        self.frame = frame.clone();
        self.visible = true;
        self.animation = Animation::None;
        self.emit();
    }

    fn animate_in(&mut self) {
        self.animation = Animation::In;
        self.emit();
    }

    fn animate_out(&mut self) {
        self.animation = Animation::Out;
        self.emit();
    }

    fn hide(&mut self) {
        self.visible = false;
        self.animation = Animation::None;
        self.emit();
    }

    fn update(&mut self, content: &Content) {
        if self.frame.content == *content {
            return;
        }
        self.frame.content = content.clone();
        self.emit();
    }
}

// ==================================================================================
// SWAY OUTPUT GEOMETRY
// ==================================================================================

/// One geometry query. Takes the previous connection, if any, and hands back
/// the one worth keeping.
pub type OutputLookup = fn(Option<Connection>) -> (Option<Connection>, Option<Rect>);

/// Asks sway for the focused output on the blocking pool, bounded by a
/// timeout, reusing one IPC connection between shows.
pub struct SwayOutputs {
    handle: Handle,
    timeout: Duration,
    lookup: OutputLookup,
    connection: Option<Connection>,
    unresponsive: bool,
}

impl SwayOutputs {
    pub fn new(handle: Handle, timeout: Duration) -> Self {
        Self::with_lookup(handle, timeout, focused_output)
    }

    pub fn with_lookup(handle: Handle, timeout: Duration, lookup: OutputLookup) -> Self {
        Self {
            handle,
            timeout,
            lookup,
            connection: None,
            unresponsive: false,
        }
    }

    /// `None` when sway is unreachable. A lookup that once ran past the
    /// timeout is not attempted again.
    pub fn focused(&mut self) -> Option<Rect> {
        if self.unresponsive {
            return None;
        }
        let lookup = self.lookup;
        let connection = self.connection.take();
        let task = self.handle.spawn_blocking(move || lookup(connection));
        match self.handle.block_on(tokio::time::timeout(self.timeout, task)) {
            Ok(Ok((connection, rect))) => {
                self.connection = connection;
                rect
            }
            Ok(Err(e)) => {
                warn!("output lookup failed: {}", e);
                None
            }
            Err(_) => {
                warn!(
                    "sway did not answer within {:?}, using the configured screen size",
                    self.timeout
                );
                self.unresponsive = true;
                None
            }
        }
    }
}

/// Geometry of the focused sway output. A connection that fails a query is
/// dropped so the next call reconnects.
pub fn focused_output(connection: Option<Connection>) -> (Option<Connection>, Option<Rect>) {
    let mut connection = match connection {
        Some(connection) => connection,
        None => match Connection::new() {
            Ok(connection) => connection,
            Err(e) => {
                debug!("sway unreachable: {}", e);
                return (None, None);
            }
        },
    };
    match connection.get_outputs() {
        Ok(outputs) => {
            let rect = outputs.into_iter().find(|output| output.focused).map(|output| Rect {
                x: output.rect.x,
                y: output.rect.y,
                width: output.rect.width,
                height: output.rect.height,
            });
            (Some(connection), rect)
        }
        Err(e) => {
            debug!("get_outputs failed: {}", e);
            (None, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tokio::runtime::Runtime;

    const SCREEN: Rect = Rect {
        x: 0,
        y: 0,
        width: 1920,
        height: 1080,
    };

    const SECOND: Rect = Rect {
        x: 1920,
        y: 0,
        width: 2560,
        height: 1440,
    };

    static SLOW_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn slow_sway(connection: Option<Connection>) -> (Option<Connection>, Option<Rect>) {
        SLOW_CALLS.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(600));
        (connection, Some(SECOND))
    }

    fn quick_sway(connection: Option<Connection>) -> (Option<Connection>, Option<Rect>) {
        (connection, Some(SECOND))
    }

    fn lines(buf: &[u8]) -> Vec<Value> {
        String::from_utf8_lossy(buf)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn places_each_corner() {
        assert_eq!(place(Anchor::TopLeft, SCREEN, 430, 150, 24, 24), (24, 24));
        assert_eq!(place(Anchor::TopRight, SCREEN, 430, 150, 24, 24), (1466, 24));
        assert_eq!(place(Anchor::BottomLeft, SCREEN, 430, 150, 24, 48), (24, 882));
        assert_eq!(place(Anchor::BottomRight, SCREEN, 430, 150, 24, 48), (1466, 882));
    }

    #[test]
    fn placement_follows_output_offset() {
        let second = Rect {
            x: 1920,
            y: 0,
            width: 2560,
            height: 1440,
        };
        assert_eq!(place(Anchor::TopLeft, second, 430, 150, 24, 24), (1944, 24));
    }

    #[test]
    fn percent_is_relative_to_ceiling() {
        let content = Content::new(VolumeState { level: 75, muted: false }, 150, true, &TrackState::default());
        assert_eq!(content.percent, 50);
        let content = Content::new(VolumeState { level: 75, muted: false }, 0, true, &TrackState::default());
        assert_eq!(content.percent, 0);
        let content = Content::new(
            VolumeState {
                level: u32::MAX,
                muted: false,
            },
            u32::MAX,
            true,
            &TrackState::default(),
        );
        assert_eq!(content.percent, 100);
    }

    #[test]
    fn screen_uses_fallback_without_sway() {
        let mut surface = EwwSurface::new(Vec::new(), SCREEN, None);
        assert_eq!(surface.screen(), SCREEN);
    }

    #[test]
    fn screen_follows_the_focused_output() {
        let rt = Runtime::new().unwrap();
        let outputs = SwayOutputs::with_lookup(rt.handle().clone(), Duration::from_secs(1), quick_sway);
        let mut surface = EwwSurface::new(Vec::new(), SCREEN, Some(outputs));
        assert_eq!(surface.screen(), SECOND);
    }

    #[test]
    fn slow_sway_is_bounded_and_not_asked_again() {
        let rt = Runtime::new().unwrap();
        let outputs = SwayOutputs::with_lookup(rt.handle().clone(), Duration::from_millis(50), slow_sway);
        let mut surface = EwwSurface::new(Vec::new(), SCREEN, Some(outputs));

        let started = Instant::now();
        assert_eq!(surface.screen(), SCREEN);
        assert!(started.elapsed() < Duration::from_millis(500));

        assert_eq!(surface.screen(), SCREEN);
        assert_eq!(SLOW_CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn commands_emit_json_lines() {
        let mut surface = EwwSurface::new(Vec::new(), SCREEN, None);
        let frame = Frame {
            x: 24,
            y: 24,
            width: 430,
            height: 150,
            font: "Noto Sans".into(),
            content: Content {
                volume: 40,
                ..Content::default()
            },
            ..Frame::default()
        };

        surface.display(&frame);
        surface.animate_in();
        surface.animate_out();
        surface.hide();

        let out = lines(&surface.out);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0]["visible"], true);
        assert_eq!(out[0]["x"], 24);
        assert_eq!(out[0]["content"]["volume"], 40);
        assert_eq!(out[1]["animation"], "in");
        assert_eq!(out[2]["animation"], "out");
        assert_eq!(out[3]["visible"], false);
    }

    #[test]
    fn unchanged_content_is_not_reprinted() {
        let mut surface = EwwSurface::new(Vec::new(), SCREEN, None);
        surface.display(&Frame::default());
        surface.update(&Content::default());
        assert_eq!(lines(&surface.out).len(), 1);

        let mut track = TrackState::default();
        track.title = "New".into();
        surface.update(&Content {
            track,
            ..Content::default()
        });
        let out = lines(&surface.out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1]["content"]["track"]["title"], "New");
    }
}
