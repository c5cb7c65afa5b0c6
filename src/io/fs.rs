//! Filesystem capability: bounded reads and ignore-aware walks.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::core::errors::{Result, WardenError};

/// Ignore globs applied to every walk in addition to the configured set.
pub const DEFAULT_IGNORE_GLOBS: &[&str] = &[
    "**/.git/**",
    "**/.hg/**",
    "**/target/**",
    "**/node_modules/**",
    "**/__pycache__/**",
    "**/.venv/**",
    "**/venv/**",
    "**/dist/**",
    "**/build/**",
    "**/coverage/**",
    "**/*.min.js",
    "**/*.lock",
];

/// Files larger than this are skipped during discovery (10 MiB).
const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Compile the default ignore set plus any extra globs.
pub fn build_ignore_set(extra_globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for glob in DEFAULT_IGNORE_GLOBS {
        builder.add(Glob::new(glob).expect("built-in ignore globs are valid"));
    }
    for glob in extra_globs {
        let compiled = Glob::new(glob).map_err(|e| {
            WardenError::config_field(format!("invalid ignore glob '{glob}': {e}"), "ignore_globs")
        })?;
        builder.add(compiled);
    }
    builder
        .build()
        .map_err(|e| WardenError::config(format!("failed to build ignore set: {e}")))
}

/// Filesystem capability consumed by the incremental selector.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file's raw bytes.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Enumerate non-ignored files under `root`, repo-relative paths.
    fn walk(&self, root: &Path, ignore: &GlobSet) -> Result<Vec<PathBuf>>;
}

/// Default capability backed by the local filesystem.
#[derive(Debug, Default, Clone)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| WardenError::io(format!("failed to read {}", path.display()), e))
    }

    fn walk(&self, root: &Path, ignore: &GlobSet) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(root).follow_links(false).into_iter().filter_entry(|e| {
            let relative = e.path().strip_prefix(root).unwrap_or(e.path());
            // Check directories too so ignored trees are pruned, not just
            // their files filtered.
            !ignore.is_match(relative) || relative.as_os_str().is_empty()
        }) {
            let entry = entry
                .map_err(|e| WardenError::discovery("filesystem", format!("walk failed: {e}")))?;

            if !entry.file_type().is_file() {
                continue;
            }
            if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(false) {
                tracing::warn!("skipping oversized file {}", entry.path().display());
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            if ignore.is_match(&relative) {
                continue;
            }
            files.push(relative);
        }

        files.sort();
        Ok(files)
    }
}
