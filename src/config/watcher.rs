//! Configuration File Watcher
//!
//! Watches the config file for writes, re-parses it after a short debounce,
//! and pushes the new [`Config`] to registered reload callbacks. Parse
//! failures are logged and the previous configuration stays live.
//!
//! Callbacks run on the watcher's own thread; they are expected to hand the
//! update off quickly (swap a resolver, update discovery sources) rather
//! than do arbitrary work inline.

use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::Config;
use crate::error::{Result, StudioError};

/// Quiet period before a change triggers a reload. Editors often produce a
/// burst of write events for a single save.
pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

type ReloadCallback = Arc<dyn Fn(&Config) + Send + Sync>;

enum WatchMessage {
    Event(notify::Result<Event>),
    Stop,
}

/// Watches a configuration file and re-parses it on change.
pub struct ConfigWatcher {
    path: PathBuf,
    callbacks: Arc<Mutex<Vec<ReloadCallback>>>,
    control: Option<Sender<WatchMessage>>,
    watcher: Option<RecommendedWatcher>,
    handle: Option<JoinHandle<()>>,
}

impl ConfigWatcher {
    /// Create a watcher for a previously loaded config. Returns an error if
    /// the config was not loaded from a file.
    pub fn new(config: &Config) -> Result<Self> {
        let path = config
            .path()
            .ok_or_else(|| StudioError::config("config was not loaded from a file"))?
            .to_path_buf();

        Ok(Self {
            path,
            callbacks: Arc::new(Mutex::new(Vec::new())),
            control: None,
            watcher: None,
            handle: None,
        })
    }

    /// Register a callback invoked with each successfully reloaded config.
    pub fn on_reload(&self, callback: impl Fn(&Config) + Send + Sync + 'static) {
        self.callbacks.lock().push(Arc::new(callback));
    }

    /// Begin watching. The parent directory is watched rather than the file
    /// itself so that replace-on-save editors do not silently detach us.
    pub fn start(&mut self) -> Result<()> {
        let (tx, rx) = mpsc::channel::<WatchMessage>();

        let event_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = event_tx.send(WatchMessage::Event(res));
        })
        .map_err(|e| StudioError::config(format!("could not create config watcher: {e}")))?;

        let watch_dir = self.path.parent().unwrap_or(&self.path).to_path_buf();
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| StudioError::config(format!("could not watch {}: {e}", watch_dir.display())))?;

        let path = self.path.clone();
        let callbacks = Arc::clone(&self.callbacks);

        let handle = std::thread::Builder::new()
            .name("config-watcher".to_string())
            .spawn(move || watch_loop(&rx, &path, &callbacks))
            .map_err(|e| StudioError::config(format!("could not spawn watcher thread: {e}")))?;

        self.control = Some(tx);
        self.watcher = Some(watcher);
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop watching and join the worker thread.
    pub fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(WatchMessage::Stop);
        }
        self.watcher = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_loop(
    rx: &mpsc::Receiver<WatchMessage>,
    path: &PathBuf,
    callbacks: &Mutex<Vec<ReloadCallback>>,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        let message = match deadline {
            Some(at) => match rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => {
                    deadline = None;
                    reload(path, callbacks);
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => return,
            },
            None => match rx.recv() {
                Ok(message) => message,
                Err(_) => return,
            },
        };

        match message {
            WatchMessage::Stop => return,
            WatchMessage::Event(Ok(event)) => {
                if touches_config(&event, path) {
                    deadline = Some(Instant::now() + RELOAD_DEBOUNCE);
                }
            }
            WatchMessage::Event(Err(e)) => {
                warn!(error = %e, "config watcher error");
            }
        }
    }
}

/// True when a write or create event concerns the config file.
fn touches_config(event: &Event, path: &PathBuf) -> bool {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| p == path || p.file_name() == path.file_name())
}

fn reload(path: &PathBuf, callbacks: &Mutex<Vec<ReloadCallback>>) {
    let config = match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config reload failed; keeping previous config");
            return;
        }
    };

    debug!(path = %path.display(), "config reloaded");

    // Snapshot under the lock, invoke outside it.
    let listeners: Vec<ReloadCallback> = callbacks.lock().iter().cloned().collect();
    for listener in &listeners {
        listener(&config);
    }
}
