//! Keeps a [`FileVersionStore`] in step with the filesystem.
//!
//! OS events are collected for a short debounce window and then applied path by path in
//! the order each path was first seen. Every change is applied by re-reading the path's
//! current state from disk, so a burst of events for one file collapses into a single
//! version bump and versions never move backwards.

use crate::config::Config;
use crate::scan::{self, ScanOptions};
use crate::store::{self, FileVersionStore};
use crate::util;
use anyhow::{Context, Result};
use clap::ValueEnum;
use ignore::Match as IgnoreMatch;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_FALLBACK_SCAN_SECS: u64 = 2;
const IDLE_POLL: Duration = Duration::from_millis(200);

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum WatchMode {
    Off,
    /// OS events, falling back to periodic rescans when they are unavailable.
    Auto,
    On,
}

#[derive(Clone, Copy, Debug)]
pub struct WatchConfig {
    pub mode: WatchMode,
    pub debounce: Duration,
    pub fallback_scan: Duration,
    /// Enumerate the roots into the store before watching.
    pub bootstrap: bool,
    pub scan_options: ScanOptions,
}

impl WatchConfig {
    pub fn new(mode: WatchMode, debounce_ms: u64, no_ignore: bool) -> Self {
        Self {
            mode,
            debounce: Duration::from_millis(debounce_ms.max(1)),
            scan_options: ScanOptions::new(no_ignore),
            ..Self::default()
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::Auto,
            debounce: Duration::from_millis(Config::get().debounce_ms.max(1)),
            fallback_scan: Duration::from_secs(DEFAULT_FALLBACK_SCAN_SECS),
            bootstrap: true,
            scan_options: ScanOptions::default(),
        }
    }
}

pub struct WatchHandle {
    stop: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let _ = self.stop.send(());
    }
}

/// Paths waiting to be applied, in first-seen order.
#[derive(Default)]
struct PendingPaths {
    order: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

impl PendingPaths {
    fn push(&mut self, path: PathBuf) {
        if self.seen.insert(path.clone()) {
            self.order.push(path);
        }
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn drain(&mut self) -> Vec<PathBuf> {
        self.seen.clear();
        std::mem::take(&mut self.order)
    }
}

/// Track every file under `roots` with a tracked extension. Returns how many were added.
pub fn seed(store: &FileVersionStore, roots: &[PathBuf], options: ScanOptions) -> usize {
    let mut added = 0;
    for root in roots {
        for path in scan::scan_tracked_files(root, store.extensions(), options) {
            match store.add_file(&path) {
                Ok(Some(_)) => added += 1,
                Ok(None) => {}
                Err(err) => warn!(path = %path.display(), "seed failed: {err}"),
            }
        }
    }
    added
}

/// Bring the store in line with a fresh scan of `roots`. Returns the number of changes.
pub fn reconcile(store: &FileVersionStore, roots: &[PathBuf], options: ScanOptions) -> usize {
    let mut on_disk = HashSet::new();
    let mut changed = 0;
    for root in roots {
        for path in scan::scan_tracked_files(root, store.extensions(), options) {
            if apply_path(store, &path) {
                changed += 1;
            }
            on_disk.insert(util::canonical_path(&path));
        }
    }
    for path in store.paths() {
        let under_root = roots.iter().any(|root| path.starts_with(root));
        if under_root && !on_disk.contains(&path) && store.remove_file(&path) {
            changed += 1;
        }
    }
    changed
}

/// Apply the current disk state of `path`. Returns whether the store changed.
pub fn apply_path(store: &FileVersionStore, path: &Path) -> bool {
    if !store.tracks(path) {
        return false;
    }
    if !path.is_file() {
        return store.remove_file(path);
    }
    if let Some(existing) = store.get(path) {
        match fs::read_to_string(path) {
            Ok(content) if store::hash_content(&content) == existing.hash => return false,
            Ok(_) => {}
            Err(err) => {
                debug!(path = %path.display(), "read failed, keeping previous version: {err}");
                return false;
            }
        }
    }
    match store.update_file(path) {
        Ok(version) => version.is_some(),
        Err(err) => {
            warn!(path = %path.display(), "update failed: {err}");
            false
        }
    }
}

pub fn start(
    roots: Vec<PathBuf>,
    store: FileVersionStore,
    config: WatchConfig,
) -> Result<Option<WatchHandle>> {
    if config.mode == WatchMode::Off {
        return Ok(None);
    }
    let (ready_tx, ready_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        if let Err(err) = run_loop(roots, store, config, stop_rx, ready_tx) {
            warn!("watch error: {err:#}");
        }
    });
    match ready_rx.recv_timeout(Duration::from_secs(2)) {
        Ok(Err(err)) => Err(err),
        Ok(Ok(())) | Err(_) => Ok(Some(WatchHandle {
            stop: stop_tx,
            thread: Some(handle),
        })),
    }
}

fn run_loop(
    roots: Vec<PathBuf>,
    store: FileVersionStore,
    config: WatchConfig,
    stop_rx: Receiver<()>,
    ready: Sender<Result<()>>,
) -> Result<()> {
    let roots: Vec<PathBuf> = roots
        .into_iter()
        .map(|root| util::canonical_path(&root))
        .collect();
    if config.bootstrap {
        let added = seed(&store, &roots, config.scan_options);
        debug!(added, "watch bootstrap");
    }

    let filter = PathFilter::new(&roots, config.scan_options.no_ignore);
    let (mut watcher, mut event_rx) = match try_start_watcher(&roots) {
        Ok((watcher, rx)) => {
            let _ = ready.send(Ok(()));
            (Some(watcher), Some(rx))
        }
        Err(err) => {
            if config.mode == WatchMode::On {
                let _ = ready.send(Err(err));
                return Ok(());
            }
            warn!("watch disabled, falling back to scan: {err:#}");
            let _ = ready.send(Ok(()));
            (None, None)
        }
    };
    info!(roots = roots.len(), "watching");

    let mut pending = PendingPaths::default();
    let mut last_event = Instant::now();
    let mut last_fallback = Instant::now();
    let mut rescan = false;

    loop {
        if stop_requested(&stop_rx) {
            return Ok(());
        }

        let Some(rx) = event_rx.as_ref().filter(|_| watcher.is_some()) else {
            if last_fallback.elapsed() >= config.fallback_scan {
                let changed = reconcile(&store, &roots, config.scan_options);
                debug!(changed, "watch fallback scan");
                last_fallback = Instant::now();
            } else {
                thread::sleep(IDLE_POLL);
            }
            continue;
        };

        let wait = if pending.is_empty() {
            IDLE_POLL
        } else {
            config.debounce
        };
        match rx.recv_timeout(wait) {
            Ok(Ok(event)) => {
                if event.need_rescan() {
                    rescan = true;
                } else if !is_noise_event(&event) {
                    for path in &event.paths {
                        if !filter.is_ignored(path) {
                            pending.push(path.clone());
                        }
                    }
                }
                last_event = Instant::now();
            }
            Ok(Err(err)) => {
                if should_fallback(&err, config.mode) {
                    warn!("watch fallback to scan: {err}");
                    watcher = None;
                    event_rx = None;
                    reconcile(&store, &roots, config.scan_options);
                    last_fallback = Instant::now();
                } else {
                    warn!("watch error: {err}");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                watcher = None;
                event_rx = None;
                if config.mode == WatchMode::Auto {
                    reconcile(&store, &roots, config.scan_options);
                    last_fallback = Instant::now();
                } else {
                    return Ok(());
                }
            }
        }

        if rescan {
            let changed = reconcile(&store, &roots, config.scan_options);
            debug!(changed, "watch rescan");
            pending.drain();
            rescan = false;
        } else if !pending.is_empty() && last_event.elapsed() >= config.debounce {
            for path in pending.drain() {
                apply_path(&store, &path);
            }
        }
    }
}

fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    match stop_rx.try_recv() {
        Ok(()) => true,
        Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

fn try_start_watcher(
    roots: &[PathBuf],
) -> Result<(RecommendedWatcher, Receiver<notify::Result<Event>>)> {
    let (event_tx, event_rx) = mpsc::channel();
    let handler = move |res| {
        let _ = event_tx.send(res);
    };
    let mut watcher = notify::recommended_watcher(handler)?;
    for root in roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("watch {}", root.display()))?;
    }
    Ok((watcher, event_rx))
}

fn is_noise_event(event: &Event) -> bool {
    matches!(event.kind, EventKind::Access(_))
}

fn should_fallback(err: &notify::Error, mode: WatchMode) -> bool {
    if mode != WatchMode::Auto {
        return false;
    }
    matches!(
        &err.kind,
        notify::ErrorKind::MaxFilesWatch
            | notify::ErrorKind::WatchNotFound
            | notify::ErrorKind::PathNotFound
    )
}

/// Ignore rules for event paths: skipped directories plus each root's `.gitignore`.
struct PathFilter {
    no_ignore: bool,
    matchers: Vec<(PathBuf, Gitignore)>,
}

impl PathFilter {
    fn new(roots: &[PathBuf], no_ignore: bool) -> Self {
        let matchers = if no_ignore {
            Vec::new()
        } else {
            roots
                .iter()
                .map(|root| (root.clone(), build_gitignore(root)))
                .collect()
        };
        Self {
            no_ignore,
            matchers,
        }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let skipped = path.components().any(|component| {
            scan::is_skipped_dir_name(&component.as_os_str().to_string_lossy())
        });
        if skipped {
            return true;
        }
        if self.no_ignore {
            return false;
        }
        let is_dir = path.is_dir();
        self.matchers
            .iter()
            .filter(|(root, _)| path.starts_with(root))
            .any(|(_, matcher)| {
                matches!(
                    matcher.matched_path_or_any_parents(path, is_dir),
                    IgnoreMatch::Ignore(_)
                )
            })
    }
}

fn build_gitignore(root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    for name in [".gitignore", ".ignore"] {
        let path = root.join(name);
        if path.is_file() {
            if let Some(err) = builder.add(&path) {
                warn!(path = %path.display(), "ignore parse error: {err}");
            }
        }
    }
    builder.build().unwrap_or_else(|err| {
        warn!("ignore build error: {err}");
        Gitignore::empty()
    })
}
