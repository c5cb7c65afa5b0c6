//! Pipeline result models.
//!
//! Field order on [`PipelineResult`] is part of the contract: serializers
//! upstream rely on `scan_id, pipeline_id, status, started_at, ended_at,
//! phases, findings, frame_results, metrics, advisories` for deterministic
//! JSON/SARIF output.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::config::{PhaseId, PipelineConfig};
use crate::core::findings::{Finding, FrameResult, Severity};

/// Terminal status of one pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// All frames passed (or none ran)
    Completed,
    /// Non-blocker failures only
    CompletedWithFailures,
    /// At least one blocker frame failed or errored
    Failed,
    /// The wall-clock budget expired
    TimedOut,
    /// Cooperative cancellation fired
    Cancelled,
}

impl PipelineStatus {
    /// Canonical snake_case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Completed => "completed",
            PipelineStatus::CompletedWithFailures => "completed_with_failures",
            PipelineStatus::Failed => "failed",
            PipelineStatus::TimedOut => "timed_out",
            PipelineStatus::Cancelled => "cancelled",
        }
    }
}

/// Outcome of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Phase ran to completion
    Completed,
    /// Phase was disabled or gated off
    Skipped,
    /// Phase was interrupted by timeout or cancellation
    Interrupted,
}

/// Summary of one phase's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSummary {
    /// Phase identifier
    pub phase: PhaseId,

    /// Outcome
    pub status: PhaseStatus,

    /// Wall-clock duration
    pub duration_ms: u64,

    /// Frame invocations performed in this phase
    pub frames_executed: usize,
}

impl PhaseSummary {
    /// A skipped phase.
    pub fn skipped(phase: PhaseId) -> Self {
        Self {
            phase,
            status: PhaseStatus::Skipped,
            duration_ms: 0,
            frames_executed: 0,
        }
    }
}

/// Counters exposed on every result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineMetrics {
    /// Files in the inventory (binary files included)
    pub total_files: usize,

    /// Files that per-file frames actually ran on
    pub files_analyzed: usize,

    /// Binary files excluded from per-file phases
    pub binary_files: usize,

    /// Total frame invocations
    pub frames_executed: usize,

    /// Passed invocations
    pub frames_passed: usize,
    /// Failed invocations
    pub frames_failed: usize,
    /// Errored invocations (raise, panic, timeout, cancel)
    pub frames_errored: usize,
    /// Skipped invocations
    pub frames_skipped: usize,

    /// Findings before deduplication
    pub findings_reported: usize,

    /// Findings removed as duplicates
    pub findings_deduplicated: usize,

    /// Surviving findings per canonical severity label
    pub findings_by_severity: IndexMap<String, usize>,

    /// Surviving findings per frame id
    pub findings_by_frame: IndexMap<String, usize>,

    /// Total pipeline duration
    pub duration_ms: u64,
}

/// Top-level output of one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// 8-character correlation identifier
    pub scan_id: String,

    /// Unique pipeline execution id
    pub pipeline_id: Uuid,

    /// Terminal status
    pub status: PipelineStatus,

    /// Execution start (UTC)
    pub started_at: DateTime<Utc>,

    /// Execution end (UTC)
    pub ended_at: DateTime<Utc>,

    /// Per-phase summaries in phase order
    pub phases: Vec<PhaseSummary>,

    /// Deduplicated findings in first-seen order
    pub findings: Vec<Finding>,

    /// Frame results keyed by frame id, sorted by frame id
    pub frame_results: IndexMap<String, FrameResult>,

    /// Counters
    pub metrics: PipelineMetrics,

    /// Non-fatal warnings accumulated across the run
    pub advisories: Vec<String>,

    /// Auxiliary metadata (scan id, engine version, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PipelineResult {
    /// Number of findings at or above the given severity.
    pub fn findings_at_least(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity >= severity).count()
    }

    /// Whether the run should gate a CI job, honoring the configured
    /// escalation flags.
    pub fn is_gating(&self, config: &PipelineConfig) -> bool {
        match self.status {
            PipelineStatus::Failed => true,
            PipelineStatus::CompletedWithFailures => {
                (config.fail_on_critical && self.findings_at_least(Severity::Critical) > 0)
                    || (config.fail_on_high && self.findings_at_least(Severity::High) > 0)
            }
            _ => false,
        }
    }

    /// Documented exit-code contract: 0 completed, 1 failed/gating,
    /// 2 timed out, 130 cancelled.
    pub fn exit_code(&self, config: &PipelineConfig) -> i32 {
        match self.status {
            PipelineStatus::Completed => 0,
            PipelineStatus::Failed => 1,
            PipelineStatus::CompletedWithFailures => {
                if self.is_gating(config) {
                    1
                } else {
                    0
                }
            }
            PipelineStatus::TimedOut => 2,
            PipelineStatus::Cancelled => 130,
        }
    }
}
