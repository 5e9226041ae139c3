use crate::daemon::Signal;
use crate::exec::is_on_path;
use std::process::Stdio;
use std::sync::mpsc::Sender;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A long-running event source: one child process whose stdout lines become
/// signals for the event loop.
#[derive(Debug, Clone, Copy)]
pub struct Subscription {
    pub name: &'static str,
    pub program: &'static str,
    pub args: &'static [&'static str],
    /// Skip spawning entirely when the program is not on `PATH`.
    pub require_discoverable: bool,
    pub relevant: fn(&str) -> bool,
    pub signal: Signal,
}

fn mentions_sink_or_server(line: &str) -> bool {
    line.contains("sink") || line.contains("server")
}

fn every_line(_: &str) -> bool {
    true
}

impl Subscription {
    /// `pactl subscribe`: sink and server events hint at a volume change.
    pub fn audio() -> Self {
        Subscription {
            name: "pactl subscribe",
            program: "pactl",
            args: &["subscribe"],
            require_discoverable: false,
            relevant: mentions_sink_or_server,
            signal: Signal::PossibleVolumeChange,
        }
    }

    /// `playerctl -F metadata`: any line means the active track moved.
    pub fn media() -> Self {
        Subscription {
            name: "playerctl follow",
            program: "playerctl",
            args: &[
                "-F",
                "metadata",
                "--format",
                "{{status}}|{{xesam:title}}|{{xesam:artist}}|{{mpris:artUrl}}|{{playerName}}",
            ],
            require_discoverable: true,
            relevant: every_line,
            signal: Signal::PossibleMediaChange,
        }
    }
}

/// A running listener task. The task also ends when the child closes its
/// output or the event loop hangs up.
pub struct Listener {
    name: &'static str,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Listener {
    pub fn spawn(handle: &Handle, sub: Subscription, signals: Sender<Signal>) -> Self {
        let (stop, stopped) = watch::channel(false);
        let task = handle.spawn(listen(sub, signals, stopped));
        Listener {
            name: sub.name,
            stop,
            task,
        }
    }

    /// Terminates the child and waits for the task to finish.
    pub fn stop(self, handle: &Handle) {
        let _ = self.stop.send(true);
        if let Err(e) = handle.block_on(self.task) {
            warn!("{} listener task failed: {}", self.name, e);
        }
    }
}

async fn listen(sub: Subscription, signals: Sender<Signal>, mut stopped: watch::Receiver<bool>) {
    if sub.require_discoverable && !is_on_path(sub.program) {
        debug!("{} not found, {} listener disabled", sub.program, sub.name);
        return;
    }

    let mut child = match Command::new(sub.program)
        .args(sub.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            debug!("failed to start {}: {}", sub.name, e);
            return;
        }
    };

    let Some(stdout) = child.stdout.take() else {
        warn!("{} has no stdout", sub.name);
        return;
    };
    let mut lines = BufReader::new(stdout).lines();
    info!("{} listener started", sub.name);

    loop {
        tokio::select! {
            _ = stopped.changed() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !(sub.relevant)(&line) {
                        continue;
                    }
                    if signals.send(sub.signal).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("{} closed its output", sub.name);
                    break;
                }
                Err(e) => {
                    warn!("{} read error: {}", sub.name, e);
                    break;
                }
            },
        }
    }

    let _ = child.kill().await;
    debug!("{} listener stopped", sub.name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{self, RecvTimeoutError};
    use std::time::Duration;
    use tokio::runtime::Runtime;

    fn subscription(args: &'static [&'static str], require_discoverable: bool, program: &'static str) -> Subscription {
        Subscription {
            name: "test",
            program,
            args,
            require_discoverable,
            relevant: mentions_sink_or_server,
            signal: Signal::PossibleVolumeChange,
        }
    }

    #[test]
    fn audio_filter_matches_sink_and_server_events() {
        let relevant = Subscription::audio().relevant;
        assert!(relevant("Event 'change' on sink #47"));
        assert!(relevant("Event 'change' on server #-1"));
        assert!(!relevant("Event 'new' on client #312"));
        assert!(!relevant("Event 'change' on source-output #9"));
    }

    #[test]
    fn media_listener_requires_playerctl() {
        let media = Subscription::media();
        assert!(media.require_discoverable);
        assert!((media.relevant)("Playing|Song|Band||spotify"));
        assert_eq!(media.signal, Signal::PossibleMediaChange);
    }

    #[test]
    fn relevant_lines_become_signals() {
        let rt = Runtime::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let script = &[
            "-c",
            "printf 'Event change on sink #1\\nEvent new on client #2\\nEvent change on server #-1\\n'",
        ];
        let listener = Listener::spawn(rt.handle(), subscription(script, false, "sh"), tx);

        let mut received = Vec::new();
        while let Ok(signal) = rx.recv_timeout(Duration::from_secs(5)) {
            received.push(signal);
        }
        listener.stop(rt.handle());

        assert_eq!(received, vec![Signal::PossibleVolumeChange; 2]);
    }

    #[test]
    fn undiscoverable_program_never_spawns() {
        let rt = Runtime::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let listener = Listener::spawn(rt.handle(), subscription(&[], true, "eww-osd-no-such-tool"), tx);

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        );
        listener.stop(rt.handle());
    }

    #[test]
    fn stop_ends_a_running_child() {
        let rt = Runtime::new().unwrap();
        let (tx, _rx) = mpsc::channel();
        let script = &["-c", "while true; do sleep 1; done"];
        let listener = Listener::spawn(rt.handle(), subscription(script, false, "sh"), tx);

        std::thread::sleep(Duration::from_millis(100));
        listener.stop(rt.handle());
    }
}
