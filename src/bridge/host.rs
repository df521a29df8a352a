//! The compiler host: answers "what is the text and version of this file" for every
//! resolver, preferring the version store and falling back to disk.

use super::modules::{self, ResolveMode};
use crate::model::FileEvent;
use crate::store::{self, FileVersionStore};
use crate::syntax::ParsedFile;
use crate::tsconfig::TsConfig;
use crate::util;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace, warn};

/// Parse trees kept for files outside the store, mostly `node_modules` sources.
const MAX_UNTRACKED_PARSES: usize = 256;

/// Text and version of a script as seen at one moment.
#[derive(Debug, Clone)]
pub struct ScriptSnapshot {
    pub path: PathBuf,
    pub content: Arc<str>,
    /// Store version, or `None` for files read straight from disk.
    pub version: Option<u64>,
    /// blake3 hash of `content`.
    pub hash: String,
}

pub struct ScriptHost {
    root: PathBuf,
    config: TsConfig,
    store: FileVersionStore,
    parsed: Mutex<ParseCache>,
}

struct CachedParse {
    hash: String,
    parsed: Arc<ParsedFile>,
    tracked: bool,
}

/// Parse trees by canonical path. Store events evict the trees of changed and removed
/// files; untracked trees are dropped wholesale once there are too many.
struct ParseCache {
    entries: HashMap<PathBuf, CachedParse>,
    untracked: usize,
    events: Receiver<FileEvent>,
}

impl ParseCache {
    fn new(events: Receiver<FileEvent>) -> Self {
        Self {
            entries: HashMap::new(),
            untracked: 0,
            events,
        }
    }

    fn apply_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.forget(event.path());
        }
    }

    fn forget(&mut self, path: &Path) {
        if let Some(entry) = self.entries.remove(path) {
            if !entry.tracked {
                self.untracked -= 1;
            }
        }
    }

    fn get(&mut self, path: &Path, hash: &str) -> Option<Arc<ParsedFile>> {
        self.apply_events();
        self.entries
            .get(path)
            .filter(|entry| entry.hash == hash)
            .map(|entry| Arc::clone(&entry.parsed))
    }

    fn insert(&mut self, path: PathBuf, entry: CachedParse) {
        self.apply_events();
        self.forget(&path);
        if !entry.tracked {
            if self.untracked >= MAX_UNTRACKED_PARSES {
                trace!(dropped = self.untracked, "untracked parse cache full");
                self.entries.retain(|_, cached| cached.tracked);
                self.untracked = 0;
            }
            self.untracked += 1;
        }
        self.entries.insert(path, entry);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl ScriptHost {
    pub fn new(project_root: &Path, config: TsConfig, store: FileVersionStore) -> Self {
        let events = store.subscribe();
        Self {
            root: util::canonical_path(project_root),
            config,
            store,
            parsed: Mutex::new(ParseCache::new(events)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &TsConfig {
        &self.config
    }

    pub fn store(&self) -> &FileVersionStore {
        &self.store
    }

    /// Tracked file content and version are read together from the store, so a
    /// snapshot never pairs new text with an old version.
    pub fn snapshot(&self, path: &Path) -> Option<ScriptSnapshot> {
        if let Some(tracked) = self.store.get(path) {
            return Some(ScriptSnapshot {
                path: tracked.path,
                content: tracked.content,
                version: Some(tracked.version),
                hash: tracked.hash,
            });
        }
        let path = util::canonical_path(path);
        let content = fs::read_to_string(&path).ok()?;
        Some(ScriptSnapshot {
            hash: store::hash_content(&content),
            content: Arc::from(content),
            version: None,
            path,
        })
    }

    pub fn script_text(&self, path: &Path) -> Option<Arc<str>> {
        self.snapshot(path).map(|snapshot| snapshot.content)
    }

    /// Tracked script file names.
    pub fn script_files(&self) -> Vec<PathBuf> {
        self.store.paths()
    }

    /// Parse tree for the current content of `path`, reused while the content is unchanged.
    pub fn parsed(&self, path: &Path) -> Option<Arc<ParsedFile>> {
        let snapshot = self.snapshot(path)?;
        if let Some(parsed) = self
            .parsed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&snapshot.path, &snapshot.hash)
        {
            return Some(parsed);
        }
        let parsed = match ParsedFile::parse(&snapshot.path, snapshot.content) {
            Ok(parsed) => Arc::new(parsed),
            Err(err) => {
                warn!(path = %snapshot.path.display(), "parse failed: {err}");
                return None;
            }
        };
        debug!(path = %snapshot.path.display(), version = ?snapshot.version, "parsed script");
        let entry = CachedParse {
            hash: snapshot.hash,
            parsed: Arc::clone(&parsed),
            tracked: snapshot.version.is_some(),
        };
        self.parsed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.path, entry);
        Some(parsed)
    }

    pub fn resolve_module(&self, from: &Path, specifier: &str, mode: ResolveMode) -> Option<PathBuf> {
        modules::resolve_module(&self.config, from, specifier, mode)
    }

    /// Path relative to the project root, `/`-separated.
    pub fn relative_path(&self, path: &Path) -> String {
        util::display_rel_path(&self.root, path)
    }
}
