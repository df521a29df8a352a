use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::model::{FileEvent, TrackedFile};
use crate::util;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

/// In-memory view of the tracked source files.
///
/// Cloning the store yields another handle onto the same state. Every mutation
/// broadcasts a [`FileEvent`] while the write lock is held, so subscribers observe events
/// for one path in the order the mutations happened.
#[derive(Clone)]
pub struct FileVersionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    extensions: Vec<String>,
    files: RwLock<HashMap<PathBuf, TrackedFile>>,
    subscribers: Mutex<Vec<Sender<FileEvent>>>,
}

impl FileVersionStore {
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                extensions,
                files: RwLock::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_default_extensions() -> Self {
        Self::new(Config::get().extensions.clone())
    }

    pub fn extensions(&self) -> &[String] {
        &self.inner.extensions
    }

    /// Whether `path` has one of the tracked extensions.
    pub fn tracks(&self, path: &Path) -> bool {
        util::has_extension(path, &self.inner.extensions)
    }

    /// Start tracking `path` at version 0. Returns `None` for untracked extensions.
    ///
    /// Adding a path that is already tracked behaves like [`update_file`](Self::update_file)
    /// so versions never go backwards.
    pub fn add_file(&self, path: &Path) -> EngineResult<Option<u64>> {
        if !self.tracks(path) {
            return Ok(None);
        }
        let key = util::canonical_path(path);
        let content = read_content(&key)?;
        let mut files = self.write_files();
        if let Some(existing) = files.get_mut(&key) {
            let version = existing.version + 1;
            existing.hash = hash_content(&content);
            existing.content = content.clone();
            existing.version = version;
            debug!(path = %key.display(), version, "file re-added");
            self.broadcast(FileEvent::Updated {
                path: key,
                content,
                version,
            });
            return Ok(Some(version));
        }
        files.insert(
            key.clone(),
            TrackedFile {
                path: key.clone(),
                hash: hash_content(&content),
                content: content.clone(),
                version: 0,
            },
        );
        debug!(path = %key.display(), "file added");
        self.broadcast(FileEvent::Added { path: key, content });
        Ok(Some(0))
    }

    /// Re-read `path` and bump its version. Unknown paths are added instead.
    ///
    /// A failed read leaves the previous content and version untouched.
    pub fn update_file(&self, path: &Path) -> EngineResult<Option<u64>> {
        if !self.tracks(path) {
            return Ok(None);
        }
        let key = util::canonical_path(path);
        if !self.read_files().contains_key(&key) {
            return self.add_file(&key);
        }
        let content = read_content(&key)?;
        let mut files = self.write_files();
        let Some(existing) = files.get_mut(&key) else {
            drop(files);
            return self.add_file(&key);
        };
        let version = existing.version + 1;
        existing.hash = hash_content(&content);
        existing.content = content.clone();
        existing.version = version;
        debug!(path = %key.display(), version, "file updated");
        self.broadcast(FileEvent::Updated {
            path: key,
            content,
            version,
        });
        Ok(Some(version))
    }

    /// Stop tracking `path`. Returns whether it was tracked.
    pub fn remove_file(&self, path: &Path) -> bool {
        let key = util::canonical_path(path);
        let mut files = self.write_files();
        if files.remove(&key).is_none() {
            return false;
        }
        debug!(path = %key.display(), "file removed");
        self.broadcast(FileEvent::Removed { path: key });
        true
    }

    pub fn get(&self, path: &Path) -> Option<TrackedFile> {
        let files = self.read_files();
        files
            .get(path)
            .or_else(|| files.get(&util::canonical_path(path)))
            .cloned()
    }

    pub fn version(&self, path: &Path) -> Option<u64> {
        self.get(path).map(|file| file.version)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    /// Tracked paths in sorted order.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.read_files().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.read_files().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> Receiver<FileEvent> {
        let (tx, rx) = mpsc::channel();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn broadcast(&self, event: FileEvent) {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn read_files(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PathBuf, TrackedFile>> {
        self.inner
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_files(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<PathBuf, TrackedFile>> {
        self.inner
            .files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn hash_content(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

fn read_content(path: &Path) -> EngineResult<Arc<str>> {
    std::fs::read_to_string(path)
        .map(Arc::from)
        .map_err(|err| EngineError::io(path, err))
}
