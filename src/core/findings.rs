//! Core domain model for validation findings and frame results.
//!
//! These are pure value types: frames produce them, the aggregator
//! deduplicates them, and the pipeline result carries them out to the
//! caller. Nothing in here mutates after aggregation.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel location for findings a frame could not localize.
pub const UNKNOWN_LOCATION: &str = "unknown:0";

/// Issue severity with a total order: critical > high > medium > low > info.
///
/// Textual parsing is case-insensitive and normalizes to the canonical
/// lower-case label; unknown labels rank as [`Severity::Low`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, never gating
    Info,
    /// Default rank for unknown input
    #[default]
    Low,
    /// Worth fixing soon
    Medium,
    /// Should gate merges when configured
    High,
    /// Always worth blocking on
    Critical,
}

impl Severity {
    /// All severities, highest first.
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Canonical lower-case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Case-insensitive parse of a textual severity label.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }

    /// Parse with the normalizer's fallback rule: unknown maps to `Low`.
    pub fn parse_or_low(label: &str) -> Self {
        Self::parse(label).unwrap_or(Severity::Low)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority of a frame within a phase (critical runs first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FramePriority {
    /// Runs first within a phase
    Critical,
    /// Runs before medium and low
    High,
    /// Default priority
    #[default]
    Medium,
    /// Runs last
    Low,
}

impl FramePriority {
    /// Sort key; lower runs earlier.
    pub fn sort_key(&self) -> u8 {
        match self {
            FramePriority::Critical => 0,
            FramePriority::High => 1,
            FramePriority::Medium => 2,
            FramePriority::Low => 3,
        }
    }
}

/// Functional category a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FrameCategory {
    /// Vulnerability and dangerous-sink checks
    Security,
    /// Maintainability and style heuristics
    Quality,
    /// Repository-level structure checks
    Architectural,
    /// Error-handling and fault-tolerance checks
    Resilience,
    /// Conformance to project specifications
    Spec,
    /// User-supplied frames
    #[default]
    Custom,
}

impl FrameCategory {
    /// Canonical lower-case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameCategory::Security => "security",
            FrameCategory::Quality => "quality",
            FrameCategory::Architectural => "architectural",
            FrameCategory::Resilience => "resilience",
            FrameCategory::Spec => "spec",
            FrameCategory::Custom => "custom",
        }
    }
}

/// Whether a frame processes one file at a time or the whole repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FrameScope {
    /// One `CodeFile` per invocation; must tolerate concurrent calls
    #[default]
    File,
    /// All files at once; executed at most once per pipeline
    Repository,
}

/// Outcome classification of a single frame invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FrameStatus {
    /// Frame ran and found nothing gating
    #[default]
    Passed,
    /// Frame ran and its checks failed
    Failed,
    /// Frame ran with non-gating findings
    Warning,
    /// Frame was not applicable or disabled
    Skipped,
    /// Frame raised, timed out, or was cancelled
    Error,
}

impl FrameStatus {
    /// True for the statuses that count as a failure when deriving the
    /// pipeline status.
    pub fn is_failure(&self) -> bool {
        matches!(self, FrameStatus::Failed | FrameStatus::Error)
    }
}

/// A single issue reported by a frame.
///
/// Findings are only ever constructed through the normalizer
/// ([`crate::core::normalize::FindingNormalizer`]); every field here is
/// already bounded and non-empty by the time a `Finding` exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Stable identifier, unique within one `PipelineResult`
    pub id: String,

    /// Frame that produced this finding
    pub frame_id: String,

    /// Normalized severity
    pub severity: Severity,

    /// Plain-text description, at most 2 KiB
    pub message: String,

    /// `path:line[:col]`, or `"unknown:0"` when not localizable
    pub location: String,

    /// Optional offending snippet, at most 1 KiB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,

    /// Optional remediation suggestion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,

    /// Optional free-form detail (rule name, verdict tags, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// True when the owning frame is a blocker
    pub is_blocker_source: bool,
}

impl Finding {
    /// True when the finding carries no usable source location.
    pub fn is_unlocalized(&self) -> bool {
        self.location == UNKNOWN_LOCATION
    }

    /// File part of the location, if localized.
    pub fn location_path(&self) -> Option<&str> {
        if self.is_unlocalized() {
            return None;
        }
        self.location.rsplitn(3, ':').last()
    }
}

/// Output of one frame invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameResult {
    /// Frame identifier (snake_case)
    pub frame_id: String,

    /// Display name of the frame
    pub frame_name: String,

    /// Outcome classification
    pub status: FrameStatus,

    /// Wall-clock duration in milliseconds; 0 for cache hits
    pub duration_ms: u64,

    /// Number of findings after normalization and capping
    pub issues_found: usize,

    /// Propagates to pipeline status when `status` is a failure
    pub is_blocker: bool,

    /// Normalized findings
    pub findings: Vec<Finding>,

    /// Opaque frame-specific metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl FrameResult {
    /// Construct an empty passed result for a frame.
    pub fn passed(frame_id: impl Into<String>, frame_name: impl Into<String>) -> Self {
        Self {
            frame_id: frame_id.into(),
            frame_name: frame_name.into(),
            status: FrameStatus::Passed,
            duration_ms: 0,
            issues_found: 0,
            is_blocker: false,
            findings: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Construct a synthetic error result; used by the runner when a frame
    /// raises, panics, times out, or observes cancellation.
    pub fn error(
        frame_id: impl Into<String>,
        frame_name: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            frame_id: frame_id.into(),
            frame_name: frame_name.into(),
            status: FrameStatus::Error,
            duration_ms,
            issues_found: 0,
            is_blocker: false,
            findings: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// True when this result forces the pipeline into `failed`.
    pub fn is_blocking_failure(&self) -> bool {
        self.is_blocker && self.status.is_failure()
    }
}

/// Per-file classification computed by the classification phase and
/// consumed by frames to gate expensive checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeCharacteristics {
    /// File contains async/await or event-loop constructs
    pub has_async_operations: bool,

    /// File talks to a database or ORM
    pub has_database_operations: bool,

    /// File consumes external/user input
    pub has_user_input: bool,

    /// File contains authentication or session logic
    pub has_authentication_logic: bool,

    /// File contains cryptographic operations
    pub has_cryptographic_operations: bool,

    /// Heuristic complexity score, 1..=10
    pub complexity_score: u8,
}

impl Default for CodeCharacteristics {
    fn default() -> Self {
        Self {
            has_async_operations: false,
            has_database_operations: false,
            has_user_input: false,
            has_authentication_logic: false,
            has_cryptographic_operations: false,
            complexity_score: 1,
        }
    }
}

impl CodeCharacteristics {
    /// True when any sensitive trait is present, used by security frames
    /// to decide whether deeper checks pay off.
    pub fn is_security_sensitive(&self) -> bool {
        self.has_user_input
            || self.has_authentication_logic
            || self.has_cryptographic_operations
            || self.has_database_operations
    }
}
