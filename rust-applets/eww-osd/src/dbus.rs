use crate::daemon::Signal;
use anyhow::Context;
use std::sync::mpsc::Sender;
use tracing::warn;
use zbus::fdo::{RequestNameFlags, RequestNameReply};
use zbus::{connection, interface, proxy, Connection};

pub const SERVICE_NAME: &str = "org.eww.Osd";
pub const OBJECT_PATH: &str = "/org/eww/Osd";

/// Bus-facing side of the daemon. Every call becomes a queued signal.
pub struct OsdService {
    signals: Sender<Signal>,
}

impl OsdService {
    pub fn new(signals: Sender<Signal>) -> Self {
        Self { signals }
    }

    fn post(&self, signal: Signal) {
        if self.signals.send(signal).is_err() {
            warn!("event loop gone, dropping {:?}", signal);
        }
    }
}

#[interface(name = "org.eww.Osd")]
impl OsdService {
    fn show_volume(&self, level: i32, muted: bool) {
        self.post(Signal::ShowVolume {
            level: i64::from(level),
            muted,
        });
    }

    /// Pointer entered or left the widget.
    fn hover_changed(&self, hovering: bool) {
        self.post(Signal::Hover(hovering));
    }

    fn play_pause(&self) {
        self.post(Signal::PlayPause);
    }

    fn next(&self) {
        self.post(Signal::Next);
    }

    fn previous(&self) {
        self.post(Signal::Previous);
    }
}

pub enum Registration {
    /// Keep the connection alive for as long as the service should answer.
    Serving(Connection),
    AlreadyRunning,
}

/// Exports [`OsdService`] and claims [`SERVICE_NAME`] without queueing.
pub async fn serve(signals: Sender<Signal>) -> anyhow::Result<Registration> {
    let connection = connection::Builder::session()
        .context("session bus address")?
        .serve_at(OBJECT_PATH, OsdService::new(signals))
        .context("exporting the OSD object")?
        .build()
        .await
        .context("connecting to the session bus")?;

    match connection
        .request_name_with_flags(SERVICE_NAME, RequestNameFlags::DoNotQueue.into())
        .await
    {
        Ok(RequestNameReply::PrimaryOwner) | Ok(RequestNameReply::AlreadyOwner) => {
            Ok(Registration::Serving(connection))
        }
        Ok(_) | Err(zbus::Error::NameTaken) => Ok(Registration::AlreadyRunning),
        Err(e) => Err(e).context("requesting the service name"),
    }
}

// ==================================================================================
// CLIENT
// ==================================================================================

#[proxy(
    interface = "org.eww.Osd",
    default_service = "org.eww.Osd",
    default_path = "/org/eww/Osd",
    gen_blocking = false
)]
pub trait OsdControl {
    fn show_volume(&self, level: i32, muted: bool) -> zbus::Result<()>;
    fn hover_changed(&self, hovering: bool) -> zbus::Result<()>;
    fn play_pause(&self) -> zbus::Result<()>;
    fn next(&self) -> zbus::Result<()>;
    fn previous(&self) -> zbus::Result<()>;
}

pub async fn connect() -> anyhow::Result<OsdControlProxy<'static>> {
    let connection = Connection::session()
        .await
        .context("connecting to the session bus")?;
    OsdControlProxy::new(&connection)
        .await
        .context("building the OSD proxy")
}
