//! Repository-level result cache.
//!
//! In-memory memoization of repository-scope frame results, keyed by frame
//! id, scoped to one orchestrator instance. Never persisted across runs —
//! freshness over reuse. The mutex covers the whole read-modify-write so a
//! parallelized runner stays correct.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::core::findings::{FrameResult, FrameStatus};

/// Memoization for repository-scope frame results.
#[derive(Debug, Default)]
pub struct RepositoryCache {
    enabled: bool,
    entries: Mutex<HashMap<String, FrameResult>>,
}

impl RepositoryCache {
    /// A cache that is consulted only when `enabled`.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cache hit for a frame id. Hits come back with `duration_ms = 0`
    /// since no work was performed.
    pub fn get(&self, frame_id: &str) -> Option<FrameResult> {
        if !self.enabled {
            return None;
        }
        self.entries.lock().get(frame_id).map(|cached| {
            let mut hit = cached.clone();
            hit.duration_ms = 0;
            hit
        })
    }

    /// Populate the cache. Only successful executions are stored; error
    /// results are always retried on the next invocation.
    pub fn store(&self, result: &FrameResult) {
        if !self.enabled || result.status == FrameStatus::Error {
            return;
        }
        self.entries
            .lock()
            .insert(result.frame_id.clone(), result.clone());
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
