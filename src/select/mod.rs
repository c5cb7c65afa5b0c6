//! Incremental selector: computes the candidate file set.
//!
//! `full` mode enumerates all non-ignored files under the project root;
//! `incremental` mode asks the VCS capability for the changed set between
//! two refs. Missing capability or a failed diff falls back to `full`
//! with an `incremental_fallback` advisory.

pub mod ci;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::config::PipelineConfig;
use crate::core::errors::Result;
use crate::core::files::CodeFile;
use crate::io::fs::{build_ignore_set, FileSystem};
use crate::io::vcs::Vcs;

/// Which mode actually produced the file set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// All non-ignored files under the root
    Full,
    /// Only VCS-changed files
    Incremental,
}

/// Candidate files plus anything the selector had to note along the way.
#[derive(Debug)]
pub struct SelectionOutcome {
    /// Snapshots in path order
    pub files: Vec<Arc<CodeFile>>,

    /// Mode that actually ran (after any fallback)
    pub mode: SelectionMode,

    /// Advisories (fallbacks, unreadable files)
    pub advisories: Vec<String>,
}

/// Computes the list of `CodeFile`s to analyze.
pub struct FileSelector {
    fs: Arc<dyn FileSystem>,
}

impl FileSelector {
    /// Selector over the given filesystem capability.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Compute the candidate set for one pipeline run.
    pub async fn select(
        &self,
        root: &Path,
        config: &PipelineConfig,
        vcs: Option<&dyn Vcs>,
    ) -> Result<SelectionOutcome> {
        let ignore = build_ignore_set(&config.ignore_globs)?;
        let mut advisories = Vec::new();

        let all_paths = self.fs.walk(root, &ignore)?;

        let (candidates, mode) = if config.incremental {
            match self.changed_paths(config, vcs).await {
                Some(changed) => {
                    let filtered: Vec<_> = all_paths
                        .iter()
                        .filter(|path| {
                            changed.contains(&path.to_string_lossy().replace('\\', "/"))
                        })
                        .cloned()
                        .collect();
                    info!(
                        "incremental selection: {} of {} files changed",
                        filtered.len(),
                        all_paths.len()
                    );
                    (filtered, SelectionMode::Incremental)
                }
                None => {
                    advisories.push("incremental_fallback".to_string());
                    (all_paths, SelectionMode::Full)
                }
            }
        } else {
            (all_paths, SelectionMode::Full)
        };

        let mut files = Vec::with_capacity(candidates.len());
        for relative in candidates {
            let absolute = root.join(&relative);
            match self.fs.read(&absolute).await {
                Ok(bytes) => {
                    let path = relative.to_string_lossy().replace('\\', "/");
                    files.push(Arc::new(CodeFile::from_bytes(path, &bytes)));
                }
                Err(err) => {
                    warn!("skipping unreadable file {}: {err}", relative.display());
                    advisories.push(format!("unreadable_file: {}", relative.display()));
                }
            }
        }

        Ok(SelectionOutcome {
            files,
            mode,
            advisories,
        })
    }

    /// Resolve refs and query the VCS capability. `None` means "fall back
    /// to full" — capability absent, refs unresolvable, or diff failed.
    async fn changed_paths(
        &self,
        config: &PipelineConfig,
        vcs: Option<&dyn Vcs>,
    ) -> Option<std::collections::HashSet<String>> {
        let vcs = match vcs {
            Some(vcs) => vcs,
            None => {
                warn!("incremental mode requested but no VCS capability present");
                return None;
            }
        };

        let (base, head) = match (&config.base_ref, &config.head_ref) {
            (Some(base), Some(head)) => (base.clone(), head.clone()),
            (Some(base), None) => (base.clone(), "HEAD".to_string()),
            _ => {
                let refs = ci::detect_refs(ci::process_env)?;
                info!(
                    "incremental refs from {}: {}..{}",
                    refs.platform, refs.base, refs.head
                );
                (refs.base, refs.head)
            }
        };

        match vcs.changed_files(&base, &head).await {
            Ok(changed) => Some(changed),
            Err(err) => {
                warn!("changed-files query failed ({base}..{head}): {err}");
                None
            }
        }
    }
}
