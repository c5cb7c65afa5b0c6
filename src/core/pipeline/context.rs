//! Pipeline context, capability bundle, and the execution state machine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::api::results::{PhaseSummary, PipelineStatus};
use crate::core::config::PhaseId;
use crate::core::files::CodeFile;
use crate::core::findings::{CodeCharacteristics, FrameResult};
use crate::io::ast::{AstProvider, AstSummary};
use crate::io::baseline::BaselineStore;
use crate::io::fs::FileSystem;
use crate::io::vcs::Vcs;
use crate::llm::client::LlmClient;

/// Injected collaborator capabilities for one pipeline.
///
/// Everything here is optional; the orchestrator degrades phase by phase
/// when a capability is absent.
#[derive(Clone, Default)]
pub struct CapabilityBundle {
    /// LLM provider for the verification phase
    pub llm: Option<Arc<dyn LlmClient>>,

    /// AST parser for the analysis phase
    pub ast: Option<Arc<dyn AstProvider>>,

    /// VCS diff queries for incremental selection
    pub vcs: Option<Arc<dyn Vcs>>,

    /// Baseline persistence
    pub baseline: Option<Arc<dyn BaselineStore>>,

    /// Filesystem access for the selector
    pub fs: Option<Arc<dyn FileSystem>>,

    /// Opaque project intelligence, validated by the frame runner
    pub project_intelligence: Option<serde_json::Value>,

    /// Read-only memory context forwarded to frames
    pub memory_context: Option<Arc<String>>,
}

impl CapabilityBundle {
    /// Empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an LLM client.
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Attach an AST provider.
    pub fn with_ast(mut self, ast: Arc<dyn AstProvider>) -> Self {
        self.ast = Some(ast);
        self
    }

    /// Attach a VCS capability.
    pub fn with_vcs(mut self, vcs: Arc<dyn Vcs>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    /// Attach a baseline store.
    pub fn with_baseline(mut self, baseline: Arc<dyn BaselineStore>) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// Attach a filesystem capability.
    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Attach raw project intelligence (validated later by the runner).
    pub fn with_project_intelligence(mut self, value: serde_json::Value) -> Self {
        self.project_intelligence = Some(value);
        self
    }

    /// Attach a memory context string.
    pub fn with_memory_context(mut self, memory: impl Into<String>) -> Self {
        self.memory_context = Some(Arc::new(memory.into()));
        self
    }
}

/// Per-file record produced by the pre-analysis and analysis phases.
#[derive(Debug, Clone, Default)]
pub struct FileAnalysis {
    /// Line count
    pub line_count: usize,

    /// Mean line length in characters
    pub avg_line_length: f64,

    /// AST summary from the provider, when available
    pub ast: Option<AstSummary>,
}

/// Execution state of one pipeline run.
///
/// Transitions only advance through the phase list; fatal error or
/// cancellation jumps straight to `Finishing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, not yet started
    Ready,
    /// A phase is executing
    Running(PhaseId),
    /// Between one phase and the next
    Awaiting(PhaseId),
    /// Building the final result
    Finishing,
    /// Terminal
    Done(PipelineStatus),
}

impl PipelineState {
    /// Whether moving to `next` is a legal transition.
    pub fn can_transition(&self, next: &PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Ready, Running(_)) => true,
            (Running(a), Awaiting(b)) => phase_index(*b) >= phase_index(*a),
            (Awaiting(a), Running(b)) => phase_index(*b) >= phase_index(*a),
            // Fatal error or cancellation can jump from anywhere.
            (_, Finishing) => !matches!(self, Done(_)),
            (Finishing, Done(_)) => true,
            _ => false,
        }
    }
}

fn phase_index(phase: PhaseId) -> usize {
    PhaseId::ORDER.iter().position(|p| *p == phase).unwrap_or(0)
}

/// Mutable state threaded through the phases of one run.
///
/// Single-writer by construction: only the orchestrator mutates it, and
/// frames see read-only views through `FrameContext`.
pub struct PipelineContext {
    /// Correlation id bound to the logging span
    pub scan_id: String,

    /// Unique execution id
    pub pipeline_id: Uuid,

    /// Execution start
    pub started_at: DateTime<Utc>,

    /// File inventory (binary files included)
    pub files: Arc<Vec<Arc<CodeFile>>>,

    /// Per-file analysis records (phase 0/1)
    pub analysis: HashMap<String, FileAnalysis>,

    /// Per-file characteristics (phase 2)
    pub characteristics: HashMap<String, CodeCharacteristics>,

    /// Completed frame invocations
    pub frame_results: Vec<FrameResult>,

    /// Non-fatal warnings accumulated so far
    pub advisories: Vec<String>,

    /// Completed phase summaries
    pub phases: Vec<PhaseSummary>,

    /// State machine position
    pub state: PipelineState,
}

impl PipelineContext {
    /// Fresh context for one run.
    pub fn new(scan_id: String, files: Vec<Arc<CodeFile>>) -> Self {
        Self {
            scan_id,
            pipeline_id: Uuid::new_v4(),
            started_at: Utc::now(),
            files: Arc::new(files),
            analysis: HashMap::new(),
            characteristics: HashMap::new(),
            frame_results: Vec::new(),
            advisories: Vec::new(),
            phases: Vec::new(),
            state: PipelineState::Ready,
        }
    }

    /// Record an advisory.
    pub fn advise(&mut self, message: impl Into<String>) {
        self.advisories.push(message.into());
    }

    /// Move the state machine, asserting legality in debug builds.
    pub fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition(&next),
            "illegal pipeline transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// Files that per-file phases operate on.
    pub fn analyzable_files(&self) -> Vec<Arc<CodeFile>> {
        self.files
            .iter()
            .filter(|f| f.is_analyzable())
            .cloned()
            .collect()
    }

    /// True when any completed blocker frame failed.
    pub fn has_blocking_failure(&self) -> bool {
        self.frame_results.iter().any(|r| r.is_blocking_failure())
    }

    /// True when any non-blocker frame failed or errored.
    pub fn has_nonblocking_failure(&self) -> bool {
        self.frame_results
            .iter()
            .any(|r| !r.is_blocker && r.status.is_failure())
    }
}
