//! Database Discovery
//!
//! Maintains the set of discovered database files consistent with the
//! configured sources and notifies subscribers of the delta.
//!
//! # Source Expansion
//! - paths with glob metacharacters expand through a recursive glob
//! - directories are walked (honoring the per-source `recursive` flag)
//! - explicit files are admitted unconditionally
//! - anything else is logged and skipped; a bad source never fails the scan
//!
//! Globs and walks retain files whose extension is one of `.db`, `.sqlite`,
//! `.sqlite3`, `.db3`.
//!
//! # Watching
//! After each scan the parent directories of admitted sources are watched.
//! Create/remove/rename events for admitted-extension files trigger a full
//! rescan, debounced 100 ms so rapid bursts coalesce. Subscribers receive
//! `added`/`removed` deltas computed against the previous snapshot, invoked
//! outside the internal lock.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::DatabaseSource;
use crate::error::{Result, StudioError};

/// Quiet period before filesystem events trigger a rescan
pub const RESCAN_DEBOUNCE: Duration = Duration::from_millis(100);

/// File extensions admitted as SQLite databases
const SQLITE_EXTENSIONS: [&str; 4] = ["db", "sqlite", "sqlite3", "db3"];

/// A database file admitted by discovery
#[derive(Debug, Clone)]
pub struct DiscoveredDatabase {
    /// Absolute path; the unique key of the discovery snapshot
    pub path: PathBuf,
    /// Human-facing alias generated from the source's alias template
    pub alias: String,
    /// Description inherited from the source
    pub description: String,
    /// File size in bytes at scan time
    pub size: u64,
    /// File modification time at scan time
    pub mod_time: DateTime<Utc>,
    /// The source this file was discovered through
    pub source: DatabaseSource,
}

type ChangeCallback = Arc<dyn Fn(&[Arc<DiscoveredDatabase>], &[Arc<DiscoveredDatabase>]) + Send + Sync>;

#[derive(Default)]
struct Snapshot {
    /// Path → database; path uniqueness is the primary invariant
    databases: HashMap<PathBuf, Arc<DiscoveredDatabase>>,
    /// Alias → path, first-seen-wins; collided aliases resolve here to the
    /// earlier discovery and the later file stays reachable by path only
    aliases: HashMap<String, PathBuf>,
}

struct DiscoveryInner {
    sources: Mutex<Vec<DatabaseSource>>,
    snapshot: RwLock<Snapshot>,
    callbacks: Mutex<Vec<ChangeCallback>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched: Mutex<HashSet<PathBuf>>,
}

enum WatchMessage {
    Event(notify::Result<Event>),
    Stop,
}

/// Discovers database files and watches their directories for changes.
pub struct Discovery {
    inner: Arc<DiscoveryInner>,
    control: Option<Sender<WatchMessage>>,
    handle: Option<JoinHandle<()>>,
}

impl Discovery {
    /// Create a discovery service over the given sources. No scanning
    /// happens until [`Discovery::start`].
    #[must_use]
    pub fn new(sources: Vec<DatabaseSource>) -> Self {
        Self {
            inner: Arc::new(DiscoveryInner {
                sources: Mutex::new(sources),
                snapshot: RwLock::new(Snapshot::default()),
                callbacks: Mutex::new(Vec::new()),
                watcher: Mutex::new(None),
                watched: Mutex::new(HashSet::new()),
            }),
            control: None,
            handle: None,
        }
    }

    /// Register a callback for added/removed databases. Callbacks run on
    /// the thread performing the scan, outside the internal lock.
    pub fn on_change(
        &self,
        callback: impl Fn(&[Arc<DiscoveredDatabase>], &[Arc<DiscoveredDatabase>]) + Send + Sync + 'static,
    ) {
        self.inner.callbacks.lock().push(Arc::new(callback));
    }

    /// Perform the first scan synchronously and begin the watcher loop.
    pub fn start(&mut self) -> Result<()> {
        let (tx, rx) = mpsc::channel::<WatchMessage>();

        let event_tx = tx.clone();
        let watcher = notify::recommended_watcher(move |res| {
            let _ = event_tx.send(WatchMessage::Event(res));
        })
        .map_err(|e| StudioError::internal(format!("could not create discovery watcher: {e}")))?;
        *self.inner.watcher.lock() = Some(watcher);

        scan(&self.inner);

        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("db-discovery".to_string())
            .spawn(move || watch_loop(&rx, &inner))
            .map_err(|e| StudioError::internal(format!("could not spawn discovery thread: {e}")))?;

        self.control = Some(tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// Close the watcher and stop the loop.
    pub fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(WatchMessage::Stop);
        }
        *self.inner.watcher.lock() = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// All discovered databases.
    #[must_use]
    pub fn databases(&self) -> Vec<Arc<DiscoveredDatabase>> {
        self.inner.snapshot.read().databases.values().cloned().collect()
    }

    /// Look up a database by absolute path or alias. Paths take precedence;
    /// alias lookups resolve first-seen on collision.
    #[must_use]
    pub fn get(&self, path_or_alias: &str) -> Option<Arc<DiscoveredDatabase>> {
        let snapshot = self.inner.snapshot.read();
        if let Some(db) = snapshot.databases.get(Path::new(path_or_alias)) {
            return Some(Arc::clone(db));
        }
        snapshot
            .aliases
            .get(path_or_alias)
            .and_then(|path| snapshot.databases.get(path))
            .map(Arc::clone)
    }

    /// Force a rescan of all sources.
    pub fn refresh(&self) {
        scan(&self.inner);
    }

    /// Replace the source list and rescan.
    pub fn update_sources(&self, sources: Vec<DatabaseSource>) {
        *self.inner.sources.lock() = sources;
        scan(&self.inner);
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The watcher loop: debounce relevant events, then rescan.
fn watch_loop(rx: &mpsc::Receiver<WatchMessage>, inner: &Arc<DiscoveryInner>) {
    let mut deadline: Option<Instant> = None;

    loop {
        let message = match deadline {
            Some(at) => match rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => {
                    deadline = None;
                    scan(inner);
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
                if is_relevant(&event) {
                    deadline = Some(Instant::now() + RESCAN_DEBOUNCE);
                }
            }
            WatchMessage::Event(Err(e)) => {
                warn!(error = %e, "discovery watcher error");
            }
        }
    }
}

/// A create/remove/rename event for a file with an admitted extension.
fn is_relevant(event: &Event) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(notify::event::ModifyKind::Name(_))
    );
    kind_matches && event.paths.iter().any(|p| is_sqlite_file(p))
}

/// Scan all sources, swap the snapshot, register watches, and notify
/// subscribers of the delta.
fn scan(inner: &Arc<DiscoveryInner>) {
    let sources = inner.sources.lock().clone();

    let mut fresh = Snapshot::default();
    let mut watch_dirs: HashSet<PathBuf> = HashSet::new();

    for source in &sources {
        let (found, dirs) = discover_source(source);
        for db in found {
            let db = Arc::new(db);
            if let Some(previous) = fresh.aliases.get(&db.alias) {
                if previous != &db.path {
                    debug!(
                        alias = %db.alias,
                        path = %db.path.display(),
                        "alias collision; database reachable by path only"
                    );
                }
            } else {
                fresh.aliases.insert(db.alias.clone(), db.path.clone());
            }
            fresh.databases.entry(db.path.clone()).or_insert(db);
        }
        watch_dirs.extend(dirs);
    }

    // Compute the delta and swap under the write lock.
    let (added, removed) = {
        let mut snapshot = inner.snapshot.write();

        let added: Vec<Arc<DiscoveredDatabase>> = fresh
            .databases
            .iter()
            .filter(|(path, _)| !snapshot.databases.contains_key(*path))
            .map(|(_, db)| Arc::clone(db))
            .collect();
        let removed: Vec<Arc<DiscoveredDatabase>> = snapshot
            .databases
            .iter()
            .filter(|(path, _)| !fresh.databases.contains_key(*path))
            .map(|(_, db)| Arc::clone(db))
            .collect();

        *snapshot = fresh;
        (added, removed)
    };

    register_watches(inner, &watch_dirs);

    if added.is_empty() && removed.is_empty() {
        return;
    }

    // Snapshot the callback list under the lock, invoke outside it.
    let listeners: Vec<ChangeCallback> = inner.callbacks.lock().iter().cloned().collect();
    for listener in &listeners {
        listener(&added, &removed);
    }
}

fn register_watches(inner: &Arc<DiscoveryInner>, dirs: &HashSet<PathBuf>) {
    let mut watcher_slot = inner.watcher.lock();
    let Some(watcher) = watcher_slot.as_mut() else {
        return;
    };

    let mut watched = inner.watched.lock();
    for dir in dirs {
        if watched.contains(dir) {
            continue;
        }
        match watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                watched.insert(dir.clone());
            }
            Err(e) => warn!(dir = %dir.display(), error = %e, "could not watch directory"),
        }
    }
}

/// Expand a single source into discovered databases and the directories to
/// watch for it. Failures are logged and yield an empty result.
fn discover_source(source: &DatabaseSource) -> (Vec<DiscoveredDatabase>, Vec<PathBuf>) {
    let path = source.path.as_str();

    if path.contains(['*', '?', '[']) {
        return discover_glob(source, path);
    }

    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(source = path, error = %e, "skipping database source");
            return (Vec::new(), Vec::new());
        }
    };

    if metadata.is_dir() {
        return discover_directory(source, path);
    }

    // Explicit files are admitted unconditionally, whatever the extension.
    match make_discovered(Path::new(path), source) {
        Ok(db) => {
            let watch = db.path.parent().map(Path::to_path_buf).into_iter().collect();
            (vec![db], watch)
        }
        Err(e) => {
            warn!(source = path, error = %e, "skipping database source");
            (Vec::new(), Vec::new())
        }
    }
}

fn discover_glob(source: &DatabaseSource, pattern: &str) -> (Vec<DiscoveredDatabase>, Vec<PathBuf>) {
    let entries = match glob::glob(pattern) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(source = pattern, error = %e, "invalid glob source");
            return (Vec::new(), Vec::new());
        }
    };

    let mut databases = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(source = pattern, error = %e, "unreadable glob entry");
                continue;
            }
        };
        if !is_sqlite_file(&path) || !path.is_file() {
            continue;
        }
        match make_discovered(&path, source) {
            Ok(db) => databases.push(db),
            Err(e) => warn!(path = %path.display(), error = %e, "could not stat database"),
        }
    }

    // Watch the fixed directory prefix before the first metacharacter.
    let meta_at = pattern.find(['*', '?', '[']).unwrap_or(pattern.len());
    let prefix = &pattern[..meta_at];
    let watch_dir = if prefix.ends_with(std::path::MAIN_SEPARATOR) {
        Some(PathBuf::from(prefix.trim_end_matches(std::path::MAIN_SEPARATOR)))
    } else {
        Path::new(prefix).parent().map(Path::to_path_buf)
    };
    let watch = watch_dir.filter(|p| !p.as_os_str().is_empty()).into_iter().collect();

    (databases, watch)
}

fn discover_directory(source: &DatabaseSource, dir: &str) -> (Vec<DiscoveredDatabase>, Vec<PathBuf>) {
    let max_depth = if source.recursive { usize::MAX } else { 1 };

    let mut databases = Vec::new();
    for entry in walkdir::WalkDir::new(dir)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() || !is_sqlite_file(entry.path()) {
            continue;
        }
        match make_discovered(entry.path(), source) {
            Ok(db) => databases.push(db),
            Err(e) => warn!(path = %entry.path().display(), error = %e, "could not stat database"),
        }
    }

    (databases, vec![PathBuf::from(dir)])
}

fn make_discovered(path: &Path, source: &DatabaseSource) -> std::io::Result<DiscoveredDatabase> {
    let abs = path.canonicalize()?;
    let metadata = std::fs::metadata(&abs)?;
    let mod_time: DateTime<Utc> = metadata.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());

    Ok(DiscoveredDatabase {
        alias: alias_for(&abs, source),
        description: source.description.clone(),
        size: metadata.len(),
        mod_time,
        source: source.clone(),
        path: abs,
    })
}

/// Generate the alias for a discovered file: the source's template with the
/// wildcard replaced by the file stem, or the stem itself.
fn alias_for(path: &Path, source: &DatabaseSource) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();

    if source.alias.is_empty() {
        return stem.to_string();
    }
    if source.alias.contains('*') {
        return source.alias.replace('*', stem);
    }
    source.alias.clone()
}

/// Whether a path carries one of the admitted SQLite extensions.
fn is_sqlite_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .is_some_and(|ext| SQLITE_EXTENSIONS.contains(&ext.as_str()))
}
