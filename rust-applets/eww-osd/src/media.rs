use crate::error::ProbeError;
use crate::exec::CommandRunner;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;
use zbus::fdo::DBusProxy;
use zbus::proxy;
use zbus::proxy::CacheProperties;
use zbus::zvariant::{OwnedValue, Value};
use zbus::Connection;

const PLAYERCTL: &str = "playerctl";
const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";

/// Where control actions for the current track should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlHandle {
    /// A player name as listed by `playerctl -l`.
    Playerctl(String),
    /// A full MPRIS bus name.
    Mpris(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    PlayPause,
    Next,
    Previous,
}

impl MediaAction {
    fn playerctl_verb(self) -> &'static str {
        match self {
            MediaAction::PlayPause => "play-pause",
            MediaAction::Next => "next",
            MediaAction::Previous => "previous",
        }
    }
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct TrackState {
    pub title: String,
    pub artist: String,
    pub art_url: String,
    pub player_name: String,
    pub playing: bool,
    #[serde(skip)]
    pub control: Option<ControlHandle>,
}

// ==================================================================================
// TRAIT DEFINITION (Allows Mocking for Tests)
// ==================================================================================

pub trait MediaSource: Send {
    fn resolve(&mut self) -> Result<TrackState, ProbeError>;
    fn control(&mut self, handle: &ControlHandle, action: MediaAction) -> Result<(), ProbeError>;
}

/// First playing candidate, else the first one seen.
///
/// The iterator is consumed lazily so status queries stop at the first
/// playing player.
pub fn pick_player<T>(candidates: impl IntoIterator<Item = (T, bool)>) -> Option<(T, bool)> {
    let mut first = None;
    for (candidate, playing) in candidates {
        if playing {
            return Some((candidate, true));
        }
        if first.is_none() {
            first = Some((candidate, false));
        }
    }
    first
}

fn is_playing(status: &str) -> bool {
    status.trim().eq_ignore_ascii_case("playing")
}

fn foreign_handle(tier: &str, handle: &ControlHandle) -> ProbeError {
    ProbeError::unavailable(tier, format!("cannot control {:?}", handle))
}

// ==================================================================================
// TIER 1: PLAYERCTL
// ==================================================================================

pub struct Playerctl {
    runner: Arc<dyn CommandRunner>,
}

impl Playerctl {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// `playerctl -p <player> args..`, trimmed, empty on failure.
    fn query(&self, player: &str, args: &[&str]) -> String {
        let mut full = vec!["-p", player];
        full.extend_from_slice(args);
        self.runner
            .run(PLAYERCTL, &full)
            .map(|out| out.trim().to_string())
            .unwrap_or_default()
    }
}

impl MediaSource for Playerctl {
    fn resolve(&mut self) -> Result<TrackState, ProbeError> {
        if !self.runner.is_discoverable(PLAYERCTL) {
            return Err(ProbeError::unavailable(PLAYERCTL, "not found on PATH"));
        }

        let listed = self.runner.run(PLAYERCTL, &["-l"])?;
        let players: Vec<&str> = listed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let (selected, playing) = pick_player(
            players
                .iter()
                .map(|player| (*player, is_playing(&self.query(player, &["status"])))),
        )
        .ok_or(ProbeError::NoPlayers)?;

        let player_name = self.query(selected, &["metadata", "--format", "{{playerName}}"]);

        Ok(TrackState {
            title: self.query(selected, &["metadata", "xesam:title"]),
            artist: self.query(selected, &["metadata", "xesam:artist"]),
            art_url: self.query(selected, &["metadata", "mpris:artUrl"]),
            player_name: if player_name.is_empty() {
                selected.to_string()
            } else {
                player_name
            },
            playing,
            control: Some(ControlHandle::Playerctl(selected.to_string())),
        })
    }

    fn control(&mut self, handle: &ControlHandle, action: MediaAction) -> Result<(), ProbeError> {
        let ControlHandle::Playerctl(player) = handle else {
            return Err(foreign_handle(PLAYERCTL, handle));
        };
        self.runner
            .run(PLAYERCTL, &["-p", player, action.playerctl_verb()])
            .map(|_| ())
    }
}

// ==================================================================================
// TIER 2: MPRIS OVER THE SESSION BUS
// ==================================================================================

#[proxy(
    interface = "org.mpris.MediaPlayer2.Player",
    default_path = "/org/mpris/MediaPlayer2",
    gen_blocking = false
)]
trait MprisPlayer {
    fn play_pause(&self) -> zbus::Result<()>;
    fn next(&self) -> zbus::Result<()>;
    fn previous(&self) -> zbus::Result<()>;

    #[zbus(property)]
    fn playback_status(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn metadata(&self) -> zbus::Result<HashMap<String, OwnedValue>>;
}

#[proxy(
    interface = "org.mpris.MediaPlayer2",
    default_path = "/org/mpris/MediaPlayer2",
    gen_blocking = false
)]
trait MprisRoot {
    #[zbus(property)]
    fn identity(&self) -> zbus::Result<String>;
}

/// Lazily connects to the session bus and keeps the connection around.
pub struct MprisBus {
    handle: Handle,
    timeout: Duration,
    connection: Option<Connection>,
}

impl MprisBus {
    pub fn new(handle: Handle, timeout: Duration) -> Self {
        Self {
            handle,
            timeout,
            connection: None,
        }
    }

    fn connection(&mut self) -> Result<Connection, ProbeError> {
        if let Some(connection) = &self.connection {
            return Ok(connection.clone());
        }
        let connection = self.block_on(Connection::session())??;
        self.connection = Some(connection.clone());
        Ok(connection)
    }

    fn block_on<F: Future>(&self, future: F) -> Result<F::Output, ProbeError> {
        self.handle
            .block_on(tokio::time::timeout(self.timeout, future))
            .map_err(|_| ProbeError::TimedOut {
                program: "session bus".to_string(),
            })
    }
}

impl MediaSource for MprisBus {
    fn resolve(&mut self) -> Result<TrackState, ProbeError> {
        let connection = self.connection()?;
        self.block_on(resolve_on_bus(&connection))?
    }

    fn control(&mut self, handle: &ControlHandle, action: MediaAction) -> Result<(), ProbeError> {
        let ControlHandle::Mpris(bus_name) = handle else {
            return Err(foreign_handle("session bus", handle));
        };
        let connection = self.connection()?;
        self.block_on(async {
            let player = player_proxy(&connection, bus_name).await?;
            match action {
                MediaAction::PlayPause => player.play_pause().await,
                MediaAction::Next => player.next().await,
                MediaAction::Previous => player.previous().await,
            }
        })?
        .map_err(ProbeError::from)
    }
}

async fn player_proxy<'a>(
    connection: &Connection,
    bus_name: &'a str,
) -> zbus::Result<MprisPlayerProxy<'a>> {
    MprisPlayerProxy::builder(connection)
        .destination(bus_name)?
        .cache_properties(CacheProperties::No)
        .build()
        .await
}

async fn resolve_on_bus(connection: &Connection) -> Result<TrackState, ProbeError> {
    let names = DBusProxy::new(connection).await?.list_names().await?;
    let candidates: Vec<String> = names
        .iter()
        .map(|name| name.to_string())
        .filter(|name| name.starts_with(MPRIS_PREFIX))
        .collect();

    let mut scanned = Vec::with_capacity(candidates.len());
    for name in candidates {
        let status = match player_proxy(connection, &name).await {
            Ok(player) => player.playback_status().await.unwrap_or_default(),
            Err(_) => String::new(),
        };
        let playing = is_playing(&status);
        scanned.push((name, status));
        if playing {
            break;
        }
    }
    let (selected, playing) = select_bus_player(scanned).ok_or(ProbeError::NoPlayers)?;

    let metadata = player_proxy(connection, &selected)
        .await?
        .metadata()
        .await
        .unwrap_or_default();
    let identity = match MprisRootProxy::builder(connection)
        .destination(selected.as_str())?
        .cache_properties(CacheProperties::No)
        .build()
        .await
    {
        Ok(root) => root.identity().await.unwrap_or_default(),
        Err(_) => String::new(),
    };

    let mut track = track_from_metadata(&metadata);
    track.player_name = bus_player_name(&selected, identity);
    track.playing = playing;
    track.control = Some(ControlHandle::Mpris(selected));
    Ok(track)
}

/// Picks among `(bus name, PlaybackStatus)` pairs in listing order.
fn select_bus_player(
    statuses: impl IntoIterator<Item = (String, String)>,
) -> Option<(String, bool)> {
    pick_player(statuses.into_iter().map(|(name, status)| {
        let playing = is_playing(&status);
        (name, playing)
    }))
}

/// `Identity` when the player reports one, else the bus-name suffix.
fn bus_player_name(bus_name: &str, identity: String) -> String {
    if identity.is_empty() {
        bus_name.strip_prefix(MPRIS_PREFIX).unwrap_or(bus_name).to_string()
    } else {
        identity
    }
}

fn track_from_metadata(metadata: &HashMap<String, OwnedValue>) -> TrackState {
    let field = |key: &str| {
        metadata
            .get(key)
            .and_then(|value| value_text(value))
            .unwrap_or_default()
    };
    TrackState {
        title: field("xesam:title"),
        artist: metadata
            .get("xesam:artist")
            .and_then(|value| first_text(value))
            .unwrap_or_default(),
        art_url: field("mpris:artUrl"),
        ..TrackState::default()
    }
}

/// Coerces a metadata value to text; containers and fds yield nothing.
fn value_text(value: &Value<'_>) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.to_string()),
        Value::ObjectPath(path) => Some(path.to_string()),
        Value::Value(inner) => value_text(inner),
        Value::Bool(b) => Some(b.to_string()),
        Value::U8(n) => Some(n.to_string()),
        Value::I16(n) => Some(n.to_string()),
        Value::U16(n) => Some(n.to_string()),
        Value::I32(n) => Some(n.to_string()),
        Value::U32(n) => Some(n.to_string()),
        Value::I64(n) => Some(n.to_string()),
        Value::U64(n) => Some(n.to_string()),
        Value::F64(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_text(value: &Value<'_>) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().next().and_then(value_text),
        Value::Value(inner) => first_text(inner),
        other => value_text(other),
    }
}

// ==================================================================================
// TWO-TIER RESOLVER
// ==================================================================================

/// Tier 1 first; tier 2 only when tier 1 has nothing.
pub struct Resolver<P = Playerctl, B = MprisBus> {
    playerctl: P,
    bus: B,
}

impl<P: MediaSource, B: MediaSource> Resolver<P, B> {
    pub fn new(playerctl: P, bus: B) -> Self {
        Self { playerctl, bus }
    }
}

impl<P: MediaSource, B: MediaSource> MediaSource for Resolver<P, B> {
    fn resolve(&mut self) -> Result<TrackState, ProbeError> {
        match self.playerctl.resolve() {
            Ok(track) => Ok(track),
            Err(e) => {
                debug!("playerctl tier unavailable ({}), trying session bus", e);
                self.bus.resolve()
            }
        }
    }

    fn control(&mut self, handle: &ControlHandle, action: MediaAction) -> Result<(), ProbeError> {
        match handle {
            ControlHandle::Playerctl(_) => self.playerctl.control(handle, action),
            ControlHandle::Mpris(_) => self.bus.control(handle, action),
        }
    }
}
