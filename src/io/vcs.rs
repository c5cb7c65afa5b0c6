//! VCS capability: changed-file queries for incremental mode.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::Repository;

use crate::core::errors::{Result, WardenError};

/// Capability trait for version-control diff queries.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Paths (repo-relative, POSIX separators) changed between two refs.
    async fn changed_files(&self, base: &str, head: &str) -> Result<HashSet<String>>;
}

/// Default capability backed by a local git repository.
#[derive(Debug, Clone)]
pub struct GitVcs {
    root: PathBuf,
}

impl GitVcs {
    /// Open the repository containing `root`. Fails when `root` is not
    /// inside a git work tree.
    pub fn discover(root: &Path) -> Result<Self> {
        Repository::discover(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn diff_refs(root: &Path, base: &str, head: &str) -> Result<HashSet<String>> {
        let repo = Repository::discover(root)?;

        let base_tree = repo
            .revparse_single(base)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| WardenError::vcs(format!("cannot resolve base ref '{base}': {e}")))?
            .tree()?;
        let head_tree = repo
            .revparse_single(head)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| WardenError::vcs(format!("cannot resolve head ref '{head}': {e}")))?
            .tree()?;

        let diff = repo.diff_tree_to_tree(Some(&base_tree), Some(&head_tree), None)?;

        let mut changed = HashSet::new();
        for delta in diff.deltas() {
            if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
                changed.insert(path.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl Vcs for GitVcs {
    async fn changed_files(&self, base: &str, head: &str) -> Result<HashSet<String>> {
        let root = self.root.clone();
        let base = base.to_string();
        let head = head.to_string();

        // libgit2 is synchronous; keep the diff off the async workers.
        tokio::task::spawn_blocking(move || Self::diff_refs(&root, &base, &head))
            .await
            .map_err(|e| WardenError::internal(format!("vcs diff task failed: {e}")))?
    }
}
