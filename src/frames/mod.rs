//! Validation frames — pluggable analyzer strategies.
//!
//! A frame is an object-safe async strategy with immutable metadata and a
//! single `execute` operation. File-scope frames receive one file per
//! invocation and must tolerate concurrent calls; repository-scope frames
//! receive the whole inventory and run single-threaded, memoized by the
//! repository cache.

pub mod builtin;
pub mod manifest;
pub mod registry;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::errors::Result;
use crate::core::files::CodeFile;
use crate::core::findings::{
    CodeCharacteristics, Finding, FrameCategory, FramePriority, FrameScope, FrameStatus,
};
use crate::core::normalize::RawFinding;
use crate::llm::client::LlmClient;

pub use registry::{DiscoverySource, FrameRegistry, RegistryLoadReport, FRAME_PATH_ENV};

/// Declaration of the languages a frame can analyze.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Applicability {
    /// Language tags this frame handles (canonical keys, lower-case)
    #[serde(default)]
    pub languages: HashSet<String>,

    /// Frame applies to every file regardless of language
    #[serde(default)]
    pub always: bool,
}

impl Applicability {
    /// Applicable to every language.
    pub fn any() -> Self {
        Self {
            languages: HashSet::new(),
            always: true,
        }
    }

    /// Applicable to the given language tags.
    pub fn languages<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            languages: tags.into_iter().map(|t| t.into().to_lowercase()).collect(),
            always: false,
        }
    }

    /// True when a file of `language` is in scope for the frame.
    pub fn matches(&self, language: &str) -> bool {
        self.always || self.languages.contains(&language.to_lowercase())
    }
}

/// Immutable metadata attached to every frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Canonical snake_case identifier, unique within the registry
    pub id: String,

    /// Human-friendly display name
    pub name: String,

    /// What the frame checks
    pub description: String,

    /// Functional category
    pub category: FrameCategory,

    /// Scheduling priority within a phase
    pub priority: FramePriority,

    /// File or repository scope
    pub scope: FrameScope,

    /// Failure of this frame forces pipeline `failed`
    pub is_blocker: bool,

    /// Frame version string
    pub version: String,

    /// Languages this frame applies to
    pub applicability: Applicability,

    /// Minimum compatible core version (inclusive), if constrained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_core_version: Option<String>,

    /// Maximum compatible core version (inclusive), if constrained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_core_version: Option<String>,
}

impl FrameMetadata {
    /// Metadata with defaults for the optional constraints.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        category: FrameCategory,
        scope: FrameScope,
    ) -> Self {
        Self {
            id: canonical_frame_id(&id.into()),
            name: name.into(),
            description: description.into(),
            category,
            priority: FramePriority::Medium,
            scope,
            is_blocker: false,
            version: "1.0.0".to_string(),
            applicability: Applicability::any(),
            min_core_version: None,
            max_core_version: None,
        }
    }

    /// Set the scheduling priority.
    pub fn with_priority(mut self, priority: FramePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the frame as a blocker.
    pub fn blocker(mut self) -> Self {
        self.is_blocker = true;
        self
    }

    /// Set the applicability declaration.
    pub fn with_applicability(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }
}

/// Normalize a frame identifier to canonical snake_case.
pub fn canonical_frame_id(raw: &str) -> String {
    raw.trim().to_lowercase().replace(['-', ' ', '.'], "_")
}

/// Parse a `major.minor.patch` version string, tolerating missing parts.
pub fn version_tuple(version: &str) -> Option<(u64, u64, u64)> {
    let mut parts = version.trim().splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().unwrap_or("0").parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    Some((major, minor, patch))
}

/// Check a frame's declared core-version window against the running core.
pub fn core_version_compatible(metadata: &FrameMetadata, core_version: &str) -> bool {
    let Some(core) = version_tuple(core_version) else {
        return true;
    };

    if let Some(min) = metadata.min_core_version.as_deref().and_then(version_tuple) {
        if core < min {
            return false;
        }
    }
    if let Some(max) = metadata.max_core_version.as_deref().and_then(version_tuple) {
        if core > max {
            return false;
        }
    }
    true
}

/// Validated project-intelligence payload injected into frame contexts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectIntelligence {
    /// Application entry points
    pub entry_points: Vec<String>,

    /// Known authentication code patterns
    pub auth_patterns: Vec<String>,

    /// Sinks that must never receive tainted data
    pub critical_sinks: Vec<String>,
}

impl ProjectIntelligence {
    /// Validate an opaque JSON payload against the required shape.
    pub fn from_value(value: &serde_json::Value) -> std::result::Result<Self, String> {
        if !value.is_object() {
            return Err("project intelligence must be an object".to_string());
        }
        serde_json::from_value(value.clone())
            .map_err(|e| format!("invalid project intelligence shape: {e}"))
    }
}

/// Read-only execution context handed to a frame.
///
/// Built by the frame runner per invocation; everything in here is either
/// owned, shared immutably, or already sanitized.
#[derive(Clone)]
pub struct FrameContext {
    /// The file under analysis (file-scope invocations)
    pub code_file: Option<Arc<CodeFile>>,

    /// Full file inventory (repository-scope invocations)
    pub code_files: Arc<Vec<Arc<CodeFile>>>,

    /// Classification for the file under analysis, when phase 2 has run
    pub characteristics: Option<CodeCharacteristics>,

    /// Findings from earlier frames, sanitized for injection safety
    pub prior_findings: Vec<Finding>,

    /// Optional read-only memory context from the host
    pub memory_context: Option<Arc<String>>,

    /// Cooperative cancellation token; observed at suspension points
    pub cancellation: CancellationToken,

    /// Optional LLM capability for context-aware frames
    pub llm: Option<Arc<dyn LlmClient>>,

    /// Optional validated project intelligence
    pub project_intelligence: Option<Arc<ProjectIntelligence>>,

    /// Opaque per-frame options from `PipelineConfig.frame_config`
    pub frame_config: Option<serde_json::Value>,
}

impl FrameContext {
    /// Minimal context for one file; used by tests and simple embedders.
    pub fn for_file(file: Arc<CodeFile>) -> Self {
        Self {
            code_file: Some(file),
            code_files: Arc::new(Vec::new()),
            characteristics: None,
            prior_findings: Vec::new(),
            memory_context: None,
            cancellation: CancellationToken::new(),
            llm: None,
            project_intelligence: None,
            frame_config: None,
        }
    }

    /// Minimal context for a repository-scope invocation.
    pub fn for_repository(files: Arc<Vec<Arc<CodeFile>>>) -> Self {
        Self {
            code_file: None,
            code_files: files,
            characteristics: None,
            prior_findings: Vec::new(),
            memory_context: None,
            cancellation: CancellationToken::new(),
            llm: None,
            project_intelligence: None,
            frame_config: None,
        }
    }

    /// The file under analysis, or an error-friendly `None` for repo scope.
    pub fn file(&self) -> Option<&Arc<CodeFile>> {
        self.code_file.as_ref()
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Raw output of one frame invocation, before normalization.
///
/// The runner turns this into a [`crate::core::findings::FrameResult`],
/// filling in identity, duration, and normalized findings.
#[derive(Debug, Default)]
pub struct FrameOutput {
    /// Outcome classification
    pub status: FrameStatus,

    /// Unnormalized findings
    pub findings: Vec<RawFinding>,

    /// Opaque frame-specific metadata
    pub metadata: HashMap<String, serde_json::Value>,
}

impl FrameOutput {
    /// A clean pass with no findings.
    pub fn passed() -> Self {
        Self::default()
    }

    /// Findings with a status derived from whether any were produced:
    /// empty passes, non-empty warns.
    pub fn warning_if_findings(findings: Vec<RawFinding>) -> Self {
        let status = if findings.is_empty() {
            FrameStatus::Passed
        } else {
            FrameStatus::Warning
        };
        Self {
            status,
            findings,
            metadata: HashMap::new(),
        }
    }

    /// Findings with a failed status when any were produced; used by
    /// gating frames.
    pub fn failed_if_findings(findings: Vec<RawFinding>) -> Self {
        let status = if findings.is_empty() {
            FrameStatus::Passed
        } else {
            FrameStatus::Failed
        };
        Self {
            status,
            findings,
            metadata: HashMap::new(),
        }
    }

    /// A skipped invocation (not applicable, disabled, or gated off).
    pub fn skipped() -> Self {
        Self {
            status: FrameStatus::Skipped,
            findings: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

/// A pluggable analyzer strategy.
#[async_trait]
pub trait Frame: Send + Sync {
    /// Immutable frame metadata.
    fn metadata(&self) -> &FrameMetadata;

    /// Execute against the context. File-scope frames read
    /// `ctx.code_file`; repository-scope frames read `ctx.code_files`.
    async fn execute(&self, ctx: &FrameContext) -> Result<FrameOutput>;

    /// Canonical frame id.
    fn id(&self) -> &str {
        &self.metadata().id
    }
}

/// A source of frames registered programmatically by the embedding
/// application — the Rust rendition of installed-package entry points.
pub trait FrameProvider: Send + Sync {
    /// Name used in discovery logs and conflict advisories.
    fn source_name(&self) -> &str;

    /// Frames contributed by this provider.
    fn provide(&self) -> Vec<Arc<dyn Frame>>;
}
