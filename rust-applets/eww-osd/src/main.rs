mod config;
mod coordinator;
mod daemon;
mod dbus;
mod error;
mod exec;
mod listener;
mod media;
mod osd;
mod probe;
mod surface;
mod timer;

#[cfg(test)]
mod testing;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use config::OverlayConfig;
use daemon::Mode;
use exec::SystemRunner;
use probe::{step_level, AudioProbe, Pactl};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.config/eww-osd/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Commands {
    /// Serve the bus and follow volume and media changes
    Daemon,
    /// Serve the bus and show the current volume once
    Show,
    #[command(flatten)]
    Client(ClientCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum ClientCommand {
    /// Ask the running daemon to show a level
    ShowVolume {
        level: i32,
        #[arg(long)]
        muted: bool,
    },
    /// Report pointer hover from the widget
    Hover {
        #[arg(action = ArgAction::Set)]
        hovering: bool,
    },
    PlayPause,
    Next,
    Previous,
    /// Raise the default sink by step_percent
    Up,
    /// Lower the default sink by step_percent
    Down,
    ToggleMute,
}

/// What a client asks of the daemon once local volume changes are done.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Request {
    ShowVolume(i32, bool),
    Hover(bool),
    PlayPause,
    Next,
    Previous,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eww_osd=info"));
    // stdout belongs to the eww widget
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// ==================================================================================
// CLIENT LOGIC
// ==================================================================================

fn step_volume(pactl: &Pactl, config: &OverlayConfig, up: bool) -> anyhow::Result<Request> {
    let current = pactl.volume()?;
    let level = step_level(current, config.step_percent, up, config.max_volume);
    pactl.set_volume(level)?;
    Ok(Request::ShowVolume(level as i32, pactl.muted()?))
}

fn toggle_mute(pactl: &Pactl) -> anyhow::Result<Request> {
    let muted = !pactl.muted()?;
    pactl.set_muted(muted)?;
    Ok(Request::ShowVolume(pactl.volume()? as i32, muted))
}

async fn deliver(request: Request) -> anyhow::Result<()> {
    let osd = dbus::connect().await?;
    match request {
        Request::ShowVolume(level, muted) => osd.show_volume(level, muted).await,
        Request::Hover(hovering) => osd.hover_changed(hovering).await,
        Request::PlayPause => osd.play_pause().await,
        Request::Next => osd.next().await,
        Request::Previous => osd.previous().await,
    }
    .context("Daemon not running. Run 'daemon' first.")
}

fn run_client(handle: &Handle, config: &OverlayConfig, command: ClientCommand) -> anyhow::Result<()> {
    let pactl = || Pactl::new(Arc::new(SystemRunner::new(handle.clone(), config.command_timeout())));
    let request = match command {
        ClientCommand::ShowVolume { level, muted } => Request::ShowVolume(level, muted),
        ClientCommand::Hover { hovering } => Request::Hover(hovering),
        ClientCommand::PlayPause => Request::PlayPause,
        ClientCommand::Next => Request::Next,
        ClientCommand::Previous => Request::Previous,
        ClientCommand::Up => step_volume(&pactl(), config, true)?,
        ClientCommand::Down => step_volume(&pactl(), config, false)?,
        ClientCommand::ToggleMute => toggle_mute(&pactl())?,
    };
    handle.block_on(deliver(request))
}

// ==================================================================================
// MAIN ENTRY
// ==================================================================================

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging();

    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } == 0 {
        anyhow::bail!("Do not run as root. Use your user session (D-Bus/Wayland) instead.");
    }

    let config = match args.config.or_else(config::default_config_path) {
        Some(path) => config::load(&path)?,
        None => OverlayConfig::default(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting the tokio runtime")?;

    let timeout = config.command_timeout();
    let result = match args.command {
        Commands::Daemon => daemon::run(runtime.handle(), Arc::new(config), Mode::Listen),
        Commands::Show => daemon::run(runtime.handle(), Arc::new(config), Mode::ShowOnce),
        Commands::Client(command) => run_client(runtime.handle(), &config, command),
    };
    // A timed-out lookup may still be parked on the blocking pool.
    runtime.shutdown_timeout(timeout);
    result
}

// ==================================================================================
// TESTS
// ==================================================================================
