//! The online/offline status file and the systemd watchdog protocol: a
//! heartbeat file the daemon overwrites on every watchdog tick, and a gap
//! check that suppresses repeat "I'm back!" notifications across a crash
//! loop.
//!
//! The protocol is eleven lines of `AF_UNIX SOCK_DGRAM`, so this talks to
//! `$NOTIFY_SOCKET` directly instead of adding a single-purpose crate
//! for it.

use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

const OFFLINE_GAP_THRESHOLD_MINUTES: i64 = 5;
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatState {
    pub status: String,
    pub at: DateTime<Utc>,
}

pub async fn read(path: &Path) -> Option<HeartbeatState> {
    let raw = fs::read_to_string(path).await.ok()?;
    serde_json::from_str(&raw).ok()
}

pub async fn write(path: &Path, status: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let state = HeartbeatState {
        status: status.to_string(),
        at: Utc::now(),
    };
    fs::write(path, serde_json::to_string(&state)?).await?;
    Ok(())
}

/// True when the previous heartbeat is absent, shows `offline`, or is
/// stale by more than 5 minutes — the three conditions under which the
/// "online" announcement should actually fire instead of being suppressed.
pub fn should_announce_online(previous: Option<&HeartbeatState>) -> bool {
    match previous {
        None => true,
        Some(state) if state.status != "online" => true,
        Some(state) => (Utc::now() - state.at).num_minutes() > OFFLINE_GAP_THRESHOLD_MINUTES,
    }
}

/// Best-effort `sd_notify(3)` replacement: sends datagrams to
/// `$NOTIFY_SOCKET` if the process was launched under systemd with
/// `Type=notify`. A no-op (logged once) everywhere else.
pub struct SystemdNotifier {
    socket: Option<UnixDatagram>,
}

impl SystemdNotifier {
    pub fn connect() -> Self {
        let socket = std::env::var_os("NOTIFY_SOCKET").and_then(|path| {
            let path = PathBuf::from(path);
            let sock = UnixDatagram::unbound().ok()?;
            sock.connect(&path).ok()?;
            Some(sock)
        });
        if socket.is_none() {
            warn!("NOTIFY_SOCKET not set; running without a process supervisor watchdog");
        }
        Self { socket }
    }

    pub fn notify_ready(&self) {
        self.send("READY=1");
    }

    pub fn notify_watchdog(&self) {
        self.send("WATCHDOG=1");
    }

    pub fn notify_stopping(&self) {
        self.send("STOPPING=1");
    }

    fn send(&self, message: &str) {
        if let Some(sock) = &self.socket {
            let _ = sock.send(message.as_bytes());
        }
    }
}

/// Spawns the 60-second watchdog ping loop; every ping also overwrites
/// the heartbeat file so a liveness check and the crash-loop gap check
/// share one timestamp.
pub fn spawn_watchdog_loop(notifier: SystemdNotifier, heartbeat_path: PathBuf) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(WATCHDOG_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            notifier.notify_watchdog();
            if let Err(e) = write(&heartbeat_path, "online").await {
                warn!(error = %e, "failed to refresh heartbeat file");
            }
        }
    })
}
