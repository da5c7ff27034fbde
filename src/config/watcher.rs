//! Configuration file watcher for hot reload.
//!
//! Editors tend to emit several events per save (truncate, write, rename).
//! The first relevant event arms a debounce timer, later ones are coalesced,
//! and a single reload runs once the window has elapsed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::reload::Reloader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchState {
    Idle,
    Debouncing { deadline: Instant },
}

/// Timer-guarded coalescing of change notifications.
///
/// Pure state machine; callers pass the current time in.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    state: WatchState,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: WatchState::Idle,
        }
    }

    /// Record a change. Returns `true` if it started a new debounce window,
    /// `false` if it was coalesced into the pending one.
    pub fn on_change(&mut self, now: Instant) -> bool {
        match self.state {
            WatchState::Idle => {
                self.state = WatchState::Debouncing {
                    deadline: now + self.window,
                };
                true
            }
            WatchState::Debouncing { .. } => false,
        }
    }

    /// Returns `true` exactly once per window, when it has elapsed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.state {
            WatchState::Debouncing { deadline } if now >= deadline => {
                self.state = WatchState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            WatchState::Idle => None,
            WatchState::Debouncing { deadline } => Some(deadline),
        }
    }
}

/// Keeps the OS watcher alive alongside the task driving reloads.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    pub task: JoinHandle<()>,
}

/// Watches the config file and reloads routes on settled changes.
pub struct ConfigWatcher {
    path: PathBuf,
    file_name: Option<OsString>,
    debounce: Duration,
    reloader: Arc<Reloader>,
}

impl ConfigWatcher {
    pub fn new(reloader: Arc<Reloader>, debounce: Duration) -> Self {
        let path = reloader.path().to_path_buf();
        Self {
            file_name: path.file_name().map(OsString::from),
            path,
            debounce,
            reloader,
        }
    }

    /// Start watching. The parent directory is watched rather than the file
    /// itself so that atomic rename-over saves are still seen.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> Result<WatchHandle, notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;

        let dir = watch_dir(&self.path);
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, debounce_ms = self.debounce.as_millis() as u64, "Config watcher started");

        let task = tokio::spawn(self.run(rx, shutdown));
        Ok(WatchHandle {
            _watcher: watcher,
            task,
        })
    }

    /// Drive the debounce state machine from a stream of notify events.
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut debouncer = Debouncer::new(self.debounce);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(Ok(event)) => {
                        if self.is_relevant(&event) && debouncer.on_change(Instant::now()) {
                            tracing::debug!(kind = ?event.kind, "Config change detected");
                        }
                    }
                    Some(Err(e)) => tracing::error!(error = %e, "Config watch error"),
                    None => {
                        tracing::warn!("Config watcher channel closed");
                        break;
                    }
                },
                _ = sleep_until_opt(debouncer.deadline()) => {
                    if debouncer.poll(Instant::now()) {
                        let reloader = Arc::clone(&self.reloader);
                        // Reload reads the file; keep it off the async workers.
                        // Failures are logged by the reloader; the old table stays.
                        let _ = tokio::task::spawn_blocking(move || reloader.reload()).await;
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Config watcher stopping");
                    break;
                }
            }
        }
    }

    fn is_relevant(&self, event: &Event) -> bool {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return false;
        }
        match &self.file_name {
            Some(name) => event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(name.as_os_str())),
            None => true,
        }
    }
}

fn watch_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
