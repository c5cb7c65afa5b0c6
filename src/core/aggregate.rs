//! Result aggregation: cross-frame deduplication, severity ranking, and
//! metric counts.
//!
//! Dedup is keyed on `(location, first 64 chars of message)`; the
//! higher-severity duplicate survives, ties keep the first seen. Findings
//! without a real location never collide — each gets a synthetic unique
//! key so unlocalized findings are never silently merged.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::core::findings::{Finding, FrameResult, Severity};

/// Aggregated findings plus the counters exposed in pipeline metrics.
#[derive(Debug, Default)]
pub struct AggregationOutcome {
    /// Deduplicated findings in first-seen order
    pub findings: Vec<Finding>,

    /// Count of findings per canonical severity label, highest first
    pub by_severity: IndexMap<String, usize>,

    /// Count of surviving findings per frame id
    pub by_frame: IndexMap<String, usize>,

    /// Number of findings removed as duplicates
    pub deduplicated: usize,

    /// Anomalies observed while aggregating
    pub advisories: Vec<String>,
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum DedupKey {
    Located(String, String),
    Unlocalized(usize),
}

/// Deduplicates and ranks findings across frame results.
#[derive(Debug, Default)]
pub struct ResultAggregator;

impl ResultAggregator {
    /// Create a new aggregator.
    pub fn new() -> Self {
        Self
    }

    /// Aggregate findings across frame results.
    ///
    /// `frame_results` must already be in deterministic order (the
    /// orchestrator sorts by frame id); insertion order among distinct
    /// keys is preserved in the output.
    pub fn aggregate(&self, frame_results: &[FrameResult]) -> AggregationOutcome {
        let mut outcome = AggregationOutcome::default();
        let mut deduped: IndexMap<DedupKey, Finding> = IndexMap::new();
        let mut unlocalized_counter = 0usize;

        for frame_result in frame_results {
            if frame_result.frame_id.trim().is_empty() {
                outcome
                    .advisories
                    .push("frame result with empty frame id skipped".to_string());
                continue;
            }

            for finding in &frame_result.findings {
                if finding.location.is_empty() {
                    // Cannot happen for normalizer-produced findings; guard
                    // against providers bypassing the ingress point.
                    outcome.advisories.push(format!(
                        "finding '{}' with empty location skipped",
                        finding.id
                    ));
                    continue;
                }

                let key = if finding.is_unlocalized() {
                    unlocalized_counter += 1;
                    DedupKey::Unlocalized(unlocalized_counter - 1)
                } else {
                    DedupKey::Located(finding.location.clone(), message_prefix(&finding.message))
                };

                match deduped.get_mut(&key) {
                    Some(existing) => {
                        outcome.deduplicated += 1;
                        if finding.severity > existing.severity {
                            *existing = finding.clone();
                        }
                    }
                    None => {
                        deduped.insert(key, finding.clone());
                    }
                }
            }
        }

        let mut findings: Vec<Finding> = deduped.into_values().collect();
        ensure_unique_ids(&mut findings);

        for severity in Severity::ALL {
            let count = findings.iter().filter(|f| f.severity == severity).count();
            outcome.by_severity.insert(severity.as_str().to_string(), count);
        }

        for finding in &findings {
            *outcome.by_frame.entry(finding.frame_id.clone()).or_insert(0) += 1;
        }

        outcome.findings = findings;
        outcome
    }
}

/// First 64 characters of the message, used as the dedup fingerprint.
fn message_prefix(message: &str) -> String {
    message.chars().take(64).collect()
}

/// Frame-supplied ids may collide across frames; suffix duplicates so the
/// result-level uniqueness invariant holds.
fn ensure_unique_ids(findings: &mut [Finding]) {
    let mut seen: HashSet<String> = HashSet::with_capacity(findings.len());
    for finding in findings.iter_mut() {
        if seen.insert(finding.id.clone()) {
            continue;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}#{}", finding.id, n);
            if seen.insert(candidate.clone()) {
                finding.id = candidate;
                break;
            }
            n += 1;
        }
    }
}
