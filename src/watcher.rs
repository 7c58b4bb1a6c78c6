//! Folder watching with debounced rescans
//!
//! `ScriptWatcher` subscribes to every registered folder and turns bursts of
//! filesystem events into a single `ScriptReloadEvent::Rescan`. The watcher
//! never touches the registry itself; the receiver decides what to rebuild.

use notify::{
    recommended_watcher, EventKind, RecommendedWatcher, RecursiveMode, Result as NotifyResult,
    Watcher,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Quiet period after the last event before a rescan is requested
pub const DEBOUNCE_MS: u64 = 500;

/// Event emitted when scripts need to be rescanned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptReloadEvent {
    /// Paths reported changed during the burst, sorted and deduplicated
    Rescan { paths: Vec<PathBuf> },
}

/// Trailing-edge debouncer: one pending deadline, reset by every event
#[derive(Debug)]
pub struct Debouncer {
    last_event: Option<Instant>,
    paths: BTreeSet<PathBuf>,
    duration: Duration,
}

impl Debouncer {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            last_event: None,
            paths: BTreeSet::new(),
            duration: Duration::from_millis(debounce_ms),
        }
    }

    pub fn record(&mut self, path: PathBuf) {
        self.record_at(path, Instant::now());
    }

    pub fn record_at(&mut self, path: PathBuf, now: Instant) {
        self.last_event = Some(now);
        self.paths.insert(path);
    }

    /// Changed paths once the window has passed since the last event, at most once per burst
    pub fn take_ready(&mut self) -> Option<Vec<PathBuf>> {
        self.take_ready_at(Instant::now())
    }

    pub fn take_ready_at(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        let last = self.last_event?;
        if now.saturating_duration_since(last) < self.duration {
            return None;
        }
        self.last_event = None;
        Some(std::mem::take(&mut self.paths).into_iter().collect())
    }

    pub fn has_pending(&self) -> bool {
        self.last_event.is_some()
    }

    /// Remaining wait before `take_ready` can fire; None when nothing is pending
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        self.last_event
            .map(|last| (last + self.duration).saturating_duration_since(now))
    }
}

enum WatchMessage {
    Fs(NotifyResult<notify::Event>),
    SetFolders(Vec<PathBuf>),
    Stop,
}

/// Watches registered script folders (non-recursively) and emits debounced rescan events
pub struct ScriptWatcher {
    folders: Vec<PathBuf>,
    debounce_ms: u64,
    tx: Option<Sender<ScriptReloadEvent>>,
    control: Option<Sender<WatchMessage>>,
    watcher_thread: Option<thread::JoinHandle<()>>,
}

impl ScriptWatcher {
    /// Returns the watcher and the receiver its rescan events arrive on
    pub fn new(folders: Vec<PathBuf>) -> (Self, Receiver<ScriptReloadEvent>) {
        Self::with_debounce(folders, DEBOUNCE_MS)
    }

    pub fn with_debounce(
        folders: Vec<PathBuf>,
        debounce_ms: u64,
    ) -> (Self, Receiver<ScriptReloadEvent>) {
        let (tx, rx) = channel();
        let watcher = ScriptWatcher {
            folders,
            debounce_ms,
            tx: Some(tx),
            control: None,
            watcher_thread: None,
        };
        (watcher, rx)
    }

    /// Subscribe to the folders and spawn the background loop
    pub fn start(&mut self) -> NotifyResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| std::io::Error::other("watcher already started"))?;

        let (msg_tx, msg_rx) = channel();
        let fs_tx = msg_tx.clone();
        let mut watcher = recommended_watcher(move |res: NotifyResult<notify::Event>| {
            let _ = fs_tx.send(WatchMessage::Fs(res));
        })?;

        let mut watched = Vec::new();
        for folder in &self.folders {
            if watch_folder(&mut watcher, folder) {
                watched.push(folder.clone());
            }
        }
        info!(
            folder_count = watched.len(),
            debounce_ms = self.debounce_ms,
            "Script watcher started"
        );

        let debounce_ms = self.debounce_ms;
        let handle = thread::Builder::new()
            .name("script-watcher".to_string())
            .spawn(move || watch_loop(watcher, watched, msg_rx, tx, debounce_ms))?;

        self.control = Some(msg_tx);
        self.watcher_thread = Some(handle);
        Ok(())
    }

    /// Replace the watched folder set
    pub fn update_folders(&mut self, folders: Vec<PathBuf>) {
        if let Some(control) = &self.control {
            if control.send(WatchMessage::SetFolders(folders.clone())).is_err() {
                debug!("Script watcher loop already ended");
            }
        }
        self.folders = folders;
    }

    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }

    pub fn is_running(&self) -> bool {
        self.watcher_thread
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the loop and wait for it to exit
    pub fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(WatchMessage::Stop);
        }
        if let Some(handle) = self.watcher_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ScriptWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_folder<W: Watcher>(watcher: &mut W, folder: &Path) -> bool {
    if !folder.is_dir() {
        debug!(folder = %folder.display(), "Not watching missing folder");
        return false;
    }
    match watcher.watch(folder, RecursiveMode::NonRecursive) {
        Ok(()) => true,
        Err(e) => {
            warn!(folder = %folder.display(), error = %e, "Failed to watch folder");
            false
        }
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

fn watch_loop(
    mut watcher: RecommendedWatcher,
    mut watched: Vec<PathBuf>,
    msg_rx: Receiver<WatchMessage>,
    tx: Sender<ScriptReloadEvent>,
    debounce_ms: u64,
) {
    let mut debouncer = Debouncer::new(debounce_ms);

    loop {
        let message = match debouncer.time_until_ready(Instant::now()) {
            Some(wait) => msg_rx.recv_timeout(wait),
            None => msg_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match message {
            Ok(WatchMessage::Fs(Ok(event))) => {
                if is_change(&event.kind) {
                    for path in event.paths {
                        debouncer.record(path);
                    }
                }
            }
            Ok(WatchMessage::Fs(Err(e))) => {
                warn!(error = %e, watcher = "scripts", "File watcher error, stopping");
                break;
            }
            Ok(WatchMessage::SetFolders(folders)) => {
                for old in watched.iter().filter(|f| !folders.contains(f)) {
                    if let Err(e) = watcher.unwatch(old) {
                        debug!(folder = %old.display(), error = %e, "Unwatch failed");
                    }
                }
                let mut next = Vec::new();
                for folder in folders {
                    if watched.contains(&folder) || watch_folder(&mut watcher, &folder) {
                        next.push(folder);
                    }
                }
                info!(folder_count = next.len(), "Script watcher folders updated");
                watched = next;
            }
            Ok(WatchMessage::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if let Some(paths) = debouncer.take_ready() {
            info!(path_count = paths.len(), "Emitting script rescan event");
            if tx.send(ScriptReloadEvent::Rescan { paths }).is_err() {
                break;
            }
        }
    }

    info!(watcher = "scripts", "Script watcher shutting down");
}
