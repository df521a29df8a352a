use crate::util;
use ignore::{DirEntry, WalkBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Directories never walked, whatever the ignore files say.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    pub no_ignore: bool,
}

impl ScanOptions {
    pub fn new(no_ignore: bool) -> Self {
        Self { no_ignore }
    }
}

/// Recursively list files under `root` whose extension is tracked, in sorted order.
pub fn scan_tracked_files(root: &Path, extensions: &[String], options: ScanOptions) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut builder = WalkBuilder::new(root);
    if options.no_ignore {
        builder
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false);
    } else {
        builder
            .ignore(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .require_git(false);
    }
    let walker = builder
        .hidden(false)
        .filter_entry(|entry| !is_skipped_entry(entry))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                warn!("walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if util::has_extension(path, extensions) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    files
}

pub fn is_skipped_dir_name(name: &str) -> bool {
    SKIPPED_DIRS.contains(&name)
}

fn is_skipped_entry(entry: &DirEntry) -> bool {
    let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
    is_dir && entry.depth() > 0 && is_skipped_dir_name(&entry.file_name().to_string_lossy())
}
