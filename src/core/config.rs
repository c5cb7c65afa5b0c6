//! Pipeline configuration value object.
//!
//! The front-ends parse configuration files themselves and hand the core an
//! already-parsed [`PipelineConfig`]. `validate()` is the single
//! precondition gate: it is the only place a pipeline run can fail before
//! phase 0.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WardenError};

/// Identifier of one of the orchestrator phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseId {
    /// Phase 0: file metadata, hashing, binary detection
    PreAnalysis,
    /// Phase 1: per-file quality metrics and AST summaries
    Analysis,
    /// Phase 2: compute `CodeCharacteristics` (mandatory)
    Classification,
    /// Phase 3: execute selected frames (mandatory)
    Validation,
    /// Phase 3.5: LLM-assisted false-positive flagging
    Verification,
    /// Phase 4: generate fix suggestions
    Fortification,
    /// Phase 5: generate code-quality suggestions
    Cleaning,
}

impl PhaseId {
    /// All phases in execution order.
    pub const ORDER: [PhaseId; 7] = [
        PhaseId::PreAnalysis,
        PhaseId::Analysis,
        PhaseId::Classification,
        PhaseId::Validation,
        PhaseId::Verification,
        PhaseId::Fortification,
        PhaseId::Cleaning,
    ];

    /// Canonical snake_case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseId::PreAnalysis => "pre_analysis",
            PhaseId::Analysis => "analysis",
            PhaseId::Classification => "classification",
            PhaseId::Validation => "validation",
            PhaseId::Verification => "verification",
            PhaseId::Fortification => "fortification",
            PhaseId::Cleaning => "cleaning",
        }
    }

    /// Classification and validation cannot be disabled.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, PhaseId::Classification | PhaseId::Validation)
    }
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How frame invocations are scheduled within the validation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// One invocation at a time, in deterministic order
    Sequential,
    /// Bounded fan-out across (frame, file) pairs
    #[default]
    Parallel,
    /// Sequential, stopping at the first failed or errored result
    FailFast,
}

/// Default per-frame timeout for file-scope frames (30 s).
pub const DEFAULT_FILE_FRAME_TIMEOUT_MS: u64 = 30_000;

/// Default per-frame timeout for repository-scope frames (300 s).
pub const DEFAULT_REPO_FRAME_TIMEOUT_MS: u64 = 300_000;

/// Recognized configuration options for one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Opt-in phases; classification and validation always run
    #[serde(default = "PipelineConfig::default_enabled_phases")]
    pub enabled_phases: HashSet<PhaseId>,

    /// Frames to execute; empty means the full registry
    #[serde(default)]
    pub enabled_frames: Vec<String>,

    /// Frames excluded from execution
    #[serde(default)]
    pub disabled_frames: Vec<String>,

    /// Override for the per-frame timeout; `None` uses the per-scope
    /// defaults (30 s file-scope, 300 s repository-scope)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_frame_timeout_ms: Option<u64>,

    /// Whole-pipeline wall-clock budget
    #[serde(default = "PipelineConfig::default_pipeline_timeout_ms")]
    pub pipeline_timeout_ms: u64,

    /// Bounded worker count for parallel fan-out
    #[serde(default = "PipelineConfig::default_parallel_workers")]
    pub parallel_workers: usize,

    /// Scheduling strategy for the validation phase
    #[serde(default)]
    pub execution_strategy: ExecutionStrategy,

    /// Analyze only VCS-changed files when a VCS capability is present
    #[serde(default)]
    pub incremental: bool,

    /// Force-enable or force-disable LLM verification; `None` follows
    /// capability presence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_enabled: Option<bool>,

    /// Token budget for LLM content slices
    #[serde(default = "PipelineConfig::default_llm_token_budget")]
    pub llm_token_budget: usize,

    /// Escalate `completed_with_failures` to exit code 1 on critical findings
    #[serde(default = "PipelineConfig::default_true")]
    pub fail_on_critical: bool,

    /// Escalate `completed_with_failures` to exit code 1 on high findings
    #[serde(default)]
    pub fail_on_high: bool,

    /// Memoize repository-scope frame results for the orchestrator lifetime
    #[serde(default = "PipelineConfig::default_true")]
    pub repository_cache_enabled: bool,

    /// Extra ignore globs on top of the built-in default set
    #[serde(default)]
    pub ignore_globs: Vec<String>,

    /// Additional frame-manifest directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_rules_path: Option<PathBuf>,

    /// Base ref override for incremental mode (normally CI-detected)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_ref: Option<String>,

    /// Head ref override for incremental mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_ref: Option<String>,

    /// Per-frame opaque options, forwarded to frames unchanged
    #[serde(default)]
    pub frame_config: HashMap<String, serde_json::Value>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled_phases: Self::default_enabled_phases(),
            enabled_frames: Vec::new(),
            disabled_frames: Vec::new(),
            per_frame_timeout_ms: None,
            pipeline_timeout_ms: Self::default_pipeline_timeout_ms(),
            parallel_workers: Self::default_parallel_workers(),
            execution_strategy: ExecutionStrategy::default(),
            incremental: false,
            llm_enabled: None,
            llm_token_budget: Self::default_llm_token_budget(),
            fail_on_critical: true,
            fail_on_high: false,
            repository_cache_enabled: true,
            ignore_globs: Vec::new(),
            custom_rules_path: None,
            base_ref: None,
            head_ref: None,
            frame_config: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    fn default_enabled_phases() -> HashSet<PhaseId> {
        [PhaseId::Classification, PhaseId::Validation]
            .into_iter()
            .collect()
    }

    fn default_pipeline_timeout_ms() -> u64 {
        300_000
    }

    fn default_parallel_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    fn default_llm_token_budget() -> usize {
        3_000
    }

    fn default_true() -> bool {
        true
    }

    /// True when `phase` should run for this configuration. Mandatory
    /// phases always run; the rest are opt-in.
    pub fn phase_enabled(&self, phase: PhaseId) -> bool {
        phase.is_mandatory() || self.enabled_phases.contains(&phase)
    }

    /// Per-frame timeout for the given scope, honoring the override.
    pub fn frame_timeout_ms(&self, scope: crate::core::findings::FrameScope) -> u64 {
        self.per_frame_timeout_ms.unwrap_or(match scope {
            crate::core::findings::FrameScope::File => DEFAULT_FILE_FRAME_TIMEOUT_MS,
            crate::core::findings::FrameScope::Repository => DEFAULT_REPO_FRAME_TIMEOUT_MS,
        })
    }

    /// Validate mandatory invariants. This is the `ConfigError` gate; the
    /// pipeline refuses to start on any violation.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline_timeout_ms == 0 {
            return Err(WardenError::config_field(
                "pipeline timeout must be positive",
                "pipeline_timeout_ms",
            ));
        }

        if let Some(frame_timeout) = self.per_frame_timeout_ms {
            if frame_timeout == 0 {
                return Err(WardenError::config_field(
                    "per-frame timeout must be positive",
                    "per_frame_timeout_ms",
                ));
            }
        }

        if self.parallel_workers == 0 {
            return Err(WardenError::config_field(
                "worker count must be positive",
                "parallel_workers",
            ));
        }

        if self.llm_token_budget == 0 {
            return Err(WardenError::config_field(
                "LLM token budget must be positive",
                "llm_token_budget",
            ));
        }

        for glob in &self.ignore_globs {
            globset::Glob::new(glob).map_err(|e| {
                WardenError::config_field(format!("invalid ignore glob '{glob}': {e}"), "ignore_globs")
            })?;
        }

        for frame_id in self.enabled_frames.iter().chain(&self.disabled_frames) {
            if frame_id.trim().is_empty() {
                return Err(WardenError::config_field(
                    "frame ids must be non-empty",
                    "enabled_frames",
                ));
            }
        }

        Ok(())
    }
}
