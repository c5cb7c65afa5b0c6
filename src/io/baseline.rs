//! Baseline store capability and baseline diffing.
//!
//! A baseline is an opaque blob of finding fingerprints from a previous
//! run. Front-ends use it to report only findings introduced since the
//! baseline was recorded. The core writes baselines exclusively through
//! the [`BaselineStore`] capability.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::results::PipelineResult;
use crate::core::errors::{Result, WardenError};
use crate::core::findings::Finding;

/// Current baseline blob format version.
const BASELINE_VERSION: u32 = 1;

/// Recorded fingerprints from a previous run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    /// Blob format version
    pub version: u32,

    /// When the baseline was recorded
    pub created_at: DateTime<Utc>,

    /// Scan id of the recording run
    pub scan_id: String,

    /// Stable finding fingerprints
    pub fingerprints: HashSet<String>,
}

impl Baseline {
    /// Record a baseline from a pipeline result.
    pub fn from_result(result: &PipelineResult) -> Self {
        Self {
            version: BASELINE_VERSION,
            created_at: Utc::now(),
            scan_id: result.scan_id.clone(),
            fingerprints: result.findings.iter().map(fingerprint).collect(),
        }
    }

    /// True when the finding was already known at baseline time.
    pub fn contains(&self, finding: &Finding) -> bool {
        self.fingerprints.contains(&fingerprint(finding))
    }

    /// Partition findings into (new, baselined).
    pub fn partition<'a>(&self, findings: &'a [Finding]) -> (Vec<&'a Finding>, Vec<&'a Finding>) {
        findings.iter().partition(|f| !self.contains(f))
    }
}

/// Stable fingerprint: frame, location, and the first 64 chars of the
/// message. Deliberately excludes ids, which are fresh every run.
pub fn fingerprint(finding: &Finding) -> String {
    let prefix: String = finding.message.chars().take(64).collect();
    format!("{}|{}|{}", finding.frame_id, finding.location, prefix)
}

/// Capability trait for baseline persistence.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Load a baseline, `None` when absent.
    async fn load(&self, path: &Path) -> Result<Option<Baseline>>;

    /// Store a baseline at the given path.
    async fn store(&self, path: &Path, baseline: &Baseline) -> Result<()>;
}

/// Default store: one JSON file per baseline.
#[derive(Debug, Default, Clone)]
pub struct JsonBaselineStore;

#[async_trait]
impl BaselineStore for JsonBaselineStore {
    async fn load(&self, path: &Path) -> Result<Option<Baseline>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let baseline: Baseline = serde_json::from_slice(&bytes)?;
                if baseline.version != BASELINE_VERSION {
                    return Err(WardenError::validation(format!(
                        "unsupported baseline version {}",
                        baseline.version
                    )));
                }
                Ok(Some(baseline))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WardenError::io(
                format!("failed to read baseline {}", path.display()),
                e,
            )),
        }
    }

    async fn store(&self, path: &Path, baseline: &Baseline) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(baseline)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                WardenError::io(format!("failed to create {}", parent.display()), e)
            })?;
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| WardenError::io(format!("failed to write {}", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::findings::Severity;
    use tempfile::TempDir;

    fn finding(frame: &str, location: &str, message: &str) -> Finding {
        Finding {
            id: format!("{frame}:0"),
            frame_id: frame.to_string(),
            severity: Severity::Medium,
            message: message.to_string(),
            location: location.to_string(),
            code_snippet: None,
            suggestion: None,
            detail: None,
            is_blocker_source: false,
        }
    }

    #[test]
    fn fingerprint_ignores_ids() {
        let mut a = finding("security", "a.py:2", "dangerous call");
        let b = finding("security", "a.py:2", "dangerous call");
        a.id = "different".to_string();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn partition_splits_new_from_known() {
        let known = finding("security", "a.py:2", "dangerous call");
        let baseline = Baseline {
            version: BASELINE_VERSION,
            created_at: Utc::now(),
            scan_id: "cafe0123".to_string(),
            fingerprints: [fingerprint(&known)].into_iter().collect(),
        };

        let fresh = finding("security", "b.py:9", "new issue");
        let findings = vec![known.clone(), fresh.clone()];
        let (new, baselined) = baseline.partition(&findings);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].location, "b.py:9");
        assert_eq!(baselined.len(), 1);
        assert_eq!(baselined[0].location, "a.py:2");
    }

    #[tokio::test]
    async fn json_store_round_trips() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/baseline.json");
        let store = JsonBaselineStore;

        assert!(store.load(&path).await.unwrap().is_none());

        let baseline = Baseline {
            version: BASELINE_VERSION,
            created_at: Utc::now(),
            scan_id: "cafe0123".to_string(),
            fingerprints: ["security|a.py:2|dangerous call".to_string()]
                .into_iter()
                .collect(),
        };
        store.store(&path, &baseline).await.unwrap();

        let loaded = store.load(&path).await.unwrap().unwrap();
        assert_eq!(loaded.scan_id, "cafe0123");
        assert_eq!(loaded.fingerprints.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_baseline_is_an_error_not_a_panic() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("baseline.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = JsonBaselineStore;
        assert!(store.load(&path).await.is_err());
    }
}
